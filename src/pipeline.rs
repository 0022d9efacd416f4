//! Topic → plan search → novelty + funniness scoring → ranked jokes.
//!
//! One call to [`run_pipeline`] is one run: it owns its observations, plans,
//! candidates, and trace, and shares nothing with other runs. External calls
//! are made one at a time.
//!
//! Usage:
//! ```bash
//! punchline generate --topic coffee --out session.json --trace trace.jsonl
//! ```

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::context::{RunContext, RunUsage};
use crate::gateway::{ChatGateway, ProviderError, ProviderGateway, UsageSink};
use crate::plansearch::{
    run_plansearch, CandidateJoke, Observation, Plan, PlanSearchConfig, PlanSearchModels,
    SearchStatus,
};
use crate::scoring::{funniness, novelty, rank, FunninessVerdict, NoveltyConfig, NoveltyScore};
use crate::scoring::{RankedResult, ScoreCombiner, WeightedAverage};
use crate::search::{BraveSearchAdapter, SearchError, SearchGateway};
use crate::trace::{JsonlTraceSink, RunTrace, TraceError, TraceSink, TraceSummary};

pub const DEFAULT_MODEL: &str = "openai/gpt-4o-mini";

// =============================================================================
// Types
// =============================================================================

/// Model id per pipeline role.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct ModelChoices {
    pub observation: String,
    pub plan: String,
    pub joke: String,
    /// Without a critique model, critique-refinement is skipped.
    #[serde(default)]
    pub critique: Option<String>,
    /// Without a novelty model, perceived novelty takes its neutral default.
    #[serde(default)]
    pub novelty: Option<String>,
    pub judge: String,
}

impl ModelChoices {
    /// Same model for every role, optional roles included.
    pub fn uniform(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            observation: model.clone(),
            plan: model.clone(),
            joke: model.clone(),
            critique: Some(model.clone()),
            novelty: Some(model.clone()),
            judge: model,
        }
    }

    pub fn plansearch(&self) -> PlanSearchModels {
        PlanSearchModels {
            observation: self.observation.clone(),
            plan: self.plan.clone(),
            joke: self.joke.clone(),
            critique: self.critique.clone(),
        }
    }
}

impl Default for ModelChoices {
    fn default() -> Self {
        Self::uniform(DEFAULT_MODEL)
    }
}

fn default_num_top_jokes() -> usize {
    3
}

/// Input to a pipeline run.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct PipelineRequest {
    pub topic: String,
    #[serde(default)]
    pub models: ModelChoices,
    #[serde(default = "default_num_top_jokes")]
    pub num_top_jokes: usize,
    #[serde(default)]
    pub plansearch: PlanSearchConfig,
    #[serde(default)]
    pub novelty: NoveltyConfig,
    /// Replaces the judge's default length/order bias paragraph.
    #[serde(default)]
    pub bias_instructions: Option<String>,
    /// Wall-clock limit per external call; a timeout counts as unavailable.
    #[serde(default)]
    pub call_timeout_secs: Option<u64>,
}

impl PipelineRequest {
    pub fn new(topic: impl Into<String>, models: ModelChoices) -> Self {
        Self {
            topic: topic.into(),
            models,
            num_top_jokes: default_num_top_jokes(),
            plansearch: PlanSearchConfig::default(),
            novelty: NoveltyConfig::default(),
            bias_instructions: None,
            call_timeout_secs: None,
        }
    }

    /// Reject malformed input before any external call. Returns `num_top_jokes`.
    pub fn validate(&self) -> Result<NonZeroUsize, PipelineError> {
        if self.topic.trim().is_empty() {
            return Err(PipelineError::InvalidRequest("topic must not be empty".into()));
        }
        let top_n = NonZeroUsize::new(self.num_top_jokes).ok_or_else(|| {
            PipelineError::InvalidRequest("num_top_jokes must be at least 1".into())
        })?;

        let required = [
            ("observation", Some(&self.models.observation)),
            ("plan", Some(&self.models.plan)),
            ("joke", Some(&self.models.joke)),
            ("judge", Some(&self.models.judge)),
            ("critique", self.models.critique.as_ref()),
            ("novelty", self.models.novelty.as_ref()),
        ];
        for (role, model) in required {
            if model.is_some_and(|m| m.trim().is_empty()) {
                return Err(PipelineError::InvalidRequest(format!(
                    "{role} model must not be blank"
                )));
            }
        }

        let ps = &self.plansearch;
        for (name, value) in [
            ("plansearch.num_first_order_obs", ps.num_first_order_obs),
            ("plansearch.max_plans_to_develop", ps.max_plans_to_develop),
            ("plansearch.max_combination_size", ps.max_combination_size),
            ("novelty.query_word_window", self.novelty.query_word_window),
            ("novelty.max_search_results", self.novelty.max_search_results),
        ] {
            if value == 0 {
                return Err(PipelineError::InvalidRequest(format!(
                    "{name} must be at least 1"
                )));
            }
        }

        let nv = &self.novelty;
        for (name, value) in [
            ("plansearch.deepening_source_factor", ps.deepening_source_factor),
            ("novelty.web_penalty_weight", nv.web_penalty_weight),
            ("novelty.widely_found_penalty", nv.widely_found_penalty),
            ("novelty.found_penalty", nv.found_penalty),
            ("novelty.search_error_penalty", nv.search_error_penalty),
            ("novelty.neutral_perceived_novelty", nv.neutral_perceived_novelty),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(PipelineError::InvalidRequest(format!(
                    "{name} must be a finite non-negative number"
                )));
            }
        }

        if self.call_timeout_secs == Some(0) {
            return Err(PipelineError::InvalidRequest(
                "call_timeout_secs must be at least 1".into(),
            ));
        }

        Ok(top_n)
    }
}

/// Host-side hooks for a run.
#[derive(Default, Clone, Copy)]
pub struct RunOptions<'a> {
    /// Defaults to [`WeightedAverage::default`].
    pub combiner: Option<&'a dyn ScoreCombiner>,
    pub trace_sink: Option<&'a dyn TraceSink>,
    /// Checked between external calls.
    pub cancel: Option<&'a AtomicBool>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Completed,
    /// Stopped early; results cover whatever was fully scored.
    Cancelled,
    /// The topic produced no seed observations. Results are empty.
    NoObservations,
}

/// Both score records for one candidate, as far as they got.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CandidateScores {
    pub candidate_id: usize,
    pub novelty: Option<NoveltyScore>,
    pub funniness: Option<FunninessVerdict>,
}

/// Everything one run produced.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineSession {
    pub id: Uuid,
    pub created_at: String,
    pub topic: String,
    pub status: RunStatus,
    pub request: PipelineRequest,
    pub observations: Vec<Observation>,
    pub plans: Vec<Plan>,
    pub candidates: Vec<CandidateJoke>,
    pub scores: Vec<CandidateScores>,
    pub results: Vec<RankedResult>,
    pub summary: TraceSummary,
    pub usage: RunUsage,
    pub trace: RunTrace,
}

// =============================================================================
// Pipeline errors
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error("Capability unavailable: {0}")]
    Unavailable(String),
    #[error("Trace error: {0}")]
    Trace(#[from] TraceError),
}

// =============================================================================
// Capabilities from the environment
// =============================================================================

/// Build the completion gateway and, if configured, the search adapter.
///
/// A missing OpenRouter key is fatal; a missing Brave key just means the run
/// has no web check.
pub fn connect_from_env<U: UsageSink>(
    usage_sink: Arc<U>,
) -> Result<(ProviderGateway<U>, Option<BraveSearchAdapter>), PipelineError> {
    let gateway = ProviderGateway::from_env(usage_sink).map_err(|e| match e {
        ProviderError::Config(msg) => PipelineError::Unavailable(msg),
        other => PipelineError::Unavailable(other.to_string()),
    })?;

    let search = match BraveSearchAdapter::from_env() {
        Ok(search) => Some(search),
        Err(SearchError::Config(msg)) => {
            info!(reason = %msg, "web search not configured; novelty uses model signal only");
            None
        }
        Err(err) => return Err(PipelineError::Unavailable(err.to_string())),
    };

    Ok((gateway, search))
}

// =============================================================================
// Full pipeline
// =============================================================================

/// Run the full pipeline for one request.
///
/// Every external-call failure is absorbed where it happens; the only errors
/// returned are malformed input (before any call is made) and trace setup.
pub async fn run_pipeline(
    gateway: &dyn ChatGateway,
    search: Option<&dyn SearchGateway>,
    options: RunOptions<'_>,
    req: PipelineRequest,
) -> Result<PipelineSession, PipelineError> {
    let top_n = req.validate()?;
    let run_id = Uuid::new_v4();
    let created_at = Utc::now().to_rfc3339();
    let topic = req.topic.trim().to_string();

    let ctx = RunContext::new(gateway, run_id, &topic)
        .with_call_timeout(req.call_timeout_secs.map(Duration::from_secs))
        .with_cancel(options.cancel)
        .with_trace_sink(options.trace_sink);

    info!(%run_id, topic = %topic, "pipeline started");

    // --- Phase 1: Plan search ---
    let outcome = run_plansearch(&ctx, &topic, &req.models.plansearch(), &req.plansearch).await;

    let mut status = match outcome.status {
        SearchStatus::Completed => RunStatus::Completed,
        SearchStatus::Cancelled => RunStatus::Cancelled,
        SearchStatus::NoSeedObservations => {
            warn!(%run_id, topic = %topic, "could not generate ideas for topic");
            RunStatus::NoObservations
        }
    };

    // --- Phase 2: Score ---
    let mut novelty_by_id: HashMap<usize, NoveltyScore> = HashMap::new();
    let mut funniness_by_id: HashMap<usize, FunninessVerdict> = HashMap::new();

    if status == RunStatus::Completed {
        for candidate in &outcome.candidates {
            if ctx.is_cancelled() {
                status = RunStatus::Cancelled;
                break;
            }
            let novelty = novelty::score(
                &ctx,
                search,
                candidate,
                req.models.novelty.as_deref(),
                &req.novelty,
            )
            .await;
            novelty_by_id.insert(candidate.id, novelty);

            if ctx.is_cancelled() {
                status = RunStatus::Cancelled;
                break;
            }
            let verdict = funniness::score(
                &ctx,
                candidate,
                &req.models.judge,
                req.bias_instructions.as_deref(),
            )
            .await;
            funniness_by_id.insert(candidate.id, verdict);
        }
    } else if status == RunStatus::Cancelled {
        // Candidates already produced are kept but cannot be scored.
        info!(%run_id, candidates = outcome.candidates.len(), "cancelled before scoring");
    }

    // --- Phase 3: Rank ---
    let default_combiner = WeightedAverage::default();
    let combiner: &dyn ScoreCombiner = match options.combiner {
        Some(combiner) => combiner,
        None => &default_combiner,
    };
    let results = rank(
        &outcome.candidates,
        &novelty_by_id,
        &funniness_by_id,
        top_n,
        combiner,
    );

    let scores = outcome
        .candidates
        .iter()
        .map(|c| CandidateScores {
            candidate_id: c.id,
            novelty: novelty_by_id.remove(&c.id),
            funniness: funniness_by_id.remove(&c.id),
        })
        .collect();

    let trace = ctx.take_trace();
    let summary = trace.summary();
    let usage = ctx.usage();

    info!(
        %run_id,
        status = ?status,
        candidates = outcome.candidates.len(),
        results = results.len(),
        completion_calls = usage.completion_calls,
        cost_nanodollars = usage.cost_nanodollars,
        "pipeline finished"
    );

    Ok(PipelineSession {
        id: run_id,
        created_at,
        topic,
        status,
        request: req,
        observations: outcome.observations,
        plans: outcome.plans,
        candidates: outcome.candidates,
        scores,
        results,
        summary,
        usage,
        trace,
    })
}

/// Run with defaults for everything but the topic, models, and result count.
pub async fn run(
    gateway: &dyn ChatGateway,
    search: Option<&dyn SearchGateway>,
    topic: &str,
    models: ModelChoices,
    num_top_jokes: usize,
) -> Result<PipelineSession, PipelineError> {
    let mut req = PipelineRequest::new(topic, models);
    req.num_top_jokes = num_top_jokes;
    run_pipeline(gateway, search, RunOptions::default(), req).await
}

/// Convenience: run the pipeline and stream its trace to a JSONL file.
pub async fn run_pipeline_with_trace_file(
    gateway: &dyn ChatGateway,
    search: Option<&dyn SearchGateway>,
    options: RunOptions<'_>,
    trace_path: Option<PathBuf>,
    req: PipelineRequest,
) -> Result<PipelineSession, PipelineError> {
    // Validate first so a bad request does not leave an empty trace file.
    req.validate()?;

    let (trace_sink, trace_worker) = match trace_path {
        Some(path) => {
            let (sink, worker) = JsonlTraceSink::new(path)?;
            (Some(sink), Some(worker))
        }
        None => (None, None),
    };

    let options = RunOptions {
        trace_sink: trace_sink
            .as_ref()
            .map(|s| s as &dyn TraceSink)
            .or(options.trace_sink),
        ..options
    };
    let result = run_pipeline(gateway, search, options, req).await;

    drop(trace_sink);
    if let Some(worker) = trace_worker {
        if let Err(err) = worker.join() {
            warn!(error = %err, "trace writer failed");
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_defaults_from_minimal_json() {
        let req: PipelineRequest = serde_json::from_str(r#"{"topic": "coffee"}"#).unwrap();
        assert_eq!(req.num_top_jokes, 3);
        assert_eq!(req.models, ModelChoices::default());
        assert_eq!(req.plansearch.max_plans_to_develop, 5);
        assert!(req.validate().is_ok());
    }

    #[test]
    fn validation_rejects_malformed_input() {
        let base = PipelineRequest::new("coffee", ModelChoices::uniform("m/x"));

        let mut blank_topic = base.clone();
        blank_topic.topic = "   ".into();
        assert!(matches!(
            blank_topic.validate(),
            Err(PipelineError::InvalidRequest(_))
        ));

        let mut zero_top = base.clone();
        zero_top.num_top_jokes = 0;
        assert!(zero_top.validate().is_err());

        let mut blank_judge = base.clone();
        blank_judge.models.judge = "".into();
        assert!(blank_judge.validate().is_err());

        let mut blank_critic = base.clone();
        blank_critic.models.critique = Some(" ".into());
        assert!(blank_critic.validate().is_err());

        let mut nan_weight = base.clone();
        nan_weight.novelty.web_penalty_weight = f64::NAN;
        assert!(nan_weight.validate().is_err());

        let mut zero_timeout = base;
        zero_timeout.call_timeout_secs = Some(0);
        assert!(zero_timeout.validate().is_err());
    }

    #[test]
    fn optional_roles_may_be_absent() {
        let mut req = PipelineRequest::new("coffee", ModelChoices::uniform("m/x"));
        req.models.critique = None;
        req.models.novelty = None;
        assert_eq!(req.validate().unwrap().get(), 3);
    }
}
