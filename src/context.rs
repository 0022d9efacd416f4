//! Per-run call context.
//!
//! Every external call in a run goes through [`RunContext`]. It applies the
//! optional per-call timeout, turns every failure into an absent outcome,
//! tallies usage, and appends to the run's trace.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::gateway::{Attribution, ChatGateway, ChatModel, ChatRequest, ProviderError};
use crate::prompts::PromptInstance;
use crate::search::{SearchError, SearchGateway, SearchHit};
use crate::trace::{CallTrace, RunTrace, TraceEvent, TraceSink};

/// Output token floor for the GPT-5 family, which can spend its whole budget
/// on hidden reasoning and return empty content under small caps.
const GPT5_MIN_OUTPUT_TOKENS: u32 = 512;

/// Raise `base` for model families that need headroom before visible output.
pub fn output_token_cap(model: &str, base: u32) -> u32 {
    if model.starts_with("openai/gpt-5") {
        base.max(GPT5_MIN_OUTPUT_TOKENS)
    } else {
        base
    }
}

/// Totals for the external calls made by one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunUsage {
    pub completion_calls: u64,
    pub failed_completion_calls: u64,
    pub search_calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_nanodollars: i64,
}

/// Result of one completion call: trimmed non-empty text, or nothing.
#[derive(Debug, Clone)]
pub struct Completion {
    pub text: Option<String>,
    pub call: CallTrace,
}

/// Sampling parameters for one completion call.
#[derive(Debug, Clone, Copy)]
pub struct Sampling {
    pub temperature: f32,
    pub max_tokens: u32,
    pub json: bool,
}

impl Sampling {
    pub const fn new(temperature: f32, max_tokens: u32) -> Self {
        Self {
            temperature,
            max_tokens,
            json: false,
        }
    }

    pub const fn json(mut self) -> Self {
        self.json = true;
        self
    }
}

pub struct RunContext<'a> {
    gateway: &'a dyn ChatGateway,
    run_id: Uuid,
    call_timeout: Option<Duration>,
    cancel: Option<&'a AtomicBool>,
    sink: Option<&'a dyn TraceSink>,
    sink_failed: AtomicBool,
    trace: Mutex<RunTrace>,
    completion_calls: AtomicU64,
    failed_completion_calls: AtomicU64,
    search_calls: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    cost_nanodollars: AtomicI64,
}

impl<'a> RunContext<'a> {
    pub fn new(gateway: &'a dyn ChatGateway, run_id: Uuid, topic: &str) -> Self {
        Self {
            gateway,
            run_id,
            call_timeout: None,
            cancel: None,
            sink: None,
            sink_failed: AtomicBool::new(false),
            trace: Mutex::new(RunTrace::new(run_id, topic)),
            completion_calls: AtomicU64::new(0),
            failed_completion_calls: AtomicU64::new(0),
            search_calls: AtomicU64::new(0),
            input_tokens: AtomicU64::new(0),
            output_tokens: AtomicU64::new(0),
            cost_nanodollars: AtomicI64::new(0),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.call_timeout = timeout;
        self
    }

    pub fn with_cancel(mut self, cancel: Option<&'a AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_trace_sink(mut self, sink: Option<&'a dyn TraceSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .map(|flag| flag.load(Ordering::Relaxed))
            .unwrap_or(false)
    }

    pub fn usage(&self) -> RunUsage {
        RunUsage {
            completion_calls: self.completion_calls.load(Ordering::Relaxed),
            failed_completion_calls: self.failed_completion_calls.load(Ordering::Relaxed),
            search_calls: self.search_calls.load(Ordering::Relaxed),
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
            cost_nanodollars: self.cost_nanodollars.load(Ordering::Relaxed),
        }
    }

    pub fn completion_calls(&self) -> u64 {
        self.completion_calls.load(Ordering::Relaxed)
    }

    /// Take the trace recorded so far, leaving an empty one behind.
    pub fn take_trace(&self) -> RunTrace {
        let mut guard = match self.trace.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let topic = guard.topic.clone();
        std::mem::replace(&mut *guard, RunTrace::new(self.run_id, topic))
    }

    /// Append an event to the trace and stream it to the sink, if any.
    ///
    /// A failing sink is logged once and then ignored; the in-memory trace
    /// stays complete.
    pub fn record(&self, event: TraceEvent) {
        let entry = {
            let mut guard = match self.trace.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.push(event).clone()
        };

        let Some(sink) = self.sink else {
            return;
        };
        if self.sink_failed.load(Ordering::Relaxed) {
            return;
        }
        if let Err(err) = sink.record(entry) {
            self.sink_failed.store(true, Ordering::Relaxed);
            warn!(run_id = %self.run_id, error = %err, "trace sink failed; streaming disabled");
        }
    }

    /// Run one completion. Failures, timeouts, and blank responses all come
    /// back as `text: None`.
    pub async fn complete(
        &self,
        caller: &'static str,
        model: &str,
        prompt: &PromptInstance,
        sampling: Sampling,
    ) -> Completion {
        let mut req = ChatRequest::new(
            ChatModel::openrouter(model),
            prompt.to_messages(),
            Attribution::new(caller).with_run(self.run_id),
        )
        .temperature(sampling.temperature)
        .max_tokens(output_token_cap(model, sampling.max_tokens));
        if sampling.json {
            req = req.json();
        }

        let mut call = CallTrace {
            caller: caller.to_string(),
            model: model.to_string(),
            template_slug: prompt.template_slug.to_string(),
            prompt_hash: prompt.hash(),
            response: None,
            error: None,
            input_tokens: 0,
            output_tokens: 0,
            latency_ms: 0,
        };

        self.completion_calls.fetch_add(1, Ordering::Relaxed);
        let start = Instant::now();
        let result = match self.call_timeout {
            Some(limit) => match tokio::time::timeout(limit, self.gateway.chat(req)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::timeout(limit)),
            },
            None => self.gateway.chat(req).await,
        };
        call.latency_ms = start.elapsed().as_millis() as u64;

        let text = match result {
            Ok(resp) => {
                self.input_tokens
                    .fetch_add(resp.input_tokens as u64, Ordering::Relaxed);
                self.output_tokens
                    .fetch_add(resp.output_tokens as u64, Ordering::Relaxed);
                self.cost_nanodollars
                    .fetch_add(resp.cost_nanodollars, Ordering::Relaxed);
                call.input_tokens = resp.input_tokens;
                call.output_tokens = resp.output_tokens;

                let content = resp.content.trim().to_string();
                call.response = Some(content.clone());
                if content.is_empty() {
                    debug!(caller, model, "completion returned no text");
                    None
                } else {
                    Some(content)
                }
            }
            Err(err) => {
                self.failed_completion_calls.fetch_add(1, Ordering::Relaxed);
                warn!(
                    caller,
                    model,
                    code = err.code(),
                    error = %err,
                    "completion unavailable"
                );
                call.error = Some(err.to_string());
                None
            }
        };

        Completion { text, call }
    }

    /// Run one search under the per-call timeout.
    pub async fn search(
        &self,
        search: &dyn SearchGateway,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        self.search_calls.fetch_add(1, Ordering::Relaxed);
        match self.call_timeout {
            Some(limit) => tokio::time::timeout(limit, search.search(query, max_results))
                .await
                .unwrap_or_else(|_| Err(SearchError::Timeout(limit))),
            None => search.search(query, max_results).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::ScriptedChatGateway;
    use crate::prompts::JOKE;

    #[test]
    fn gpt5_gets_headroom() {
        assert_eq!(output_token_cap("openai/gpt-5-mini", 10), 512);
        assert_eq!(output_token_cap("openai/gpt-4o-mini", 10), 10);
        assert_eq!(output_token_cap("openai/gpt-5", 900), 900);
    }

    #[tokio::test]
    async fn failures_and_blanks_are_absent() {
        let gateway = ScriptedChatGateway::new()
            .reply("ok", "  a joke  ")
            .reply("blank", "   ")
            .fail("down");
        let ctx = RunContext::new(&gateway, Uuid::new_v4(), "coffee");
        let prompt = JOKE.render(&[("topic", "coffee"), ("plan", "p")]);
        let sampling = Sampling::new(0.9, 200);

        let ok = ctx.complete("ok", "m", &prompt, sampling).await;
        assert_eq!(ok.text.as_deref(), Some("a joke"));
        assert!(ctx.complete("blank", "m", &prompt, sampling).await.text.is_none());
        let down = ctx.complete("down", "m", &prompt, sampling).await;
        assert!(down.text.is_none());
        assert!(down.call.error.is_some());

        let usage = ctx.usage();
        assert_eq!(usage.completion_calls, 3);
        assert_eq!(usage.failed_completion_calls, 1);
    }

    #[tokio::test]
    async fn requests_carry_run_attribution_and_sampling() {
        let gateway = ScriptedChatGateway::new().reply("judge", "{}");
        let run_id = Uuid::new_v4();
        let ctx = RunContext::new(&gateway, run_id, "coffee");
        let prompt = JOKE.render(&[("topic", "coffee"), ("plan", "p")]);

        ctx.complete("judge", "m", &prompt, Sampling::new(0.3, 400).json())
            .await;

        let req = &gateway.requests()[0];
        assert_eq!(req.attribution.run_id, Some(run_id));
        assert_eq!(req.max_tokens, Some(400));
        assert!(req.json_mode);
    }

    #[test]
    fn cancel_flag_is_observed() {
        let gateway = ScriptedChatGateway::new();
        let flag = AtomicBool::new(false);
        let ctx = RunContext::new(&gateway, Uuid::new_v4(), "coffee").with_cancel(Some(&flag));
        assert!(!ctx.is_cancelled());
        flag.store(true, Ordering::Relaxed);
        assert!(ctx.is_cancelled());
    }
}
