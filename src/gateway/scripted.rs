//! Deterministic in-process gateway for tests and offline demos.
//!
//! Responses are routed on `Attribution::caller`, so a test can script each
//! pipeline stage independently without matching on prompt text.

use std::sync::Mutex;

use async_trait::async_trait;

use super::error::ProviderError;
use super::types::{ChatRequest, ChatResponse};
use super::ChatGateway;

type Responder = Box<dyn Fn(&ChatRequest) -> Result<String, ProviderError> + Send + Sync>;

/// A [`ChatGateway`] that answers from scripted closures.
///
/// When several routes match a caller the most recently added one wins.
/// Callers with no route get a non-retryable provider error, which the
/// pipeline treats like any other unavailable completion.
#[derive(Default)]
pub struct ScriptedChatGateway {
    routes: Vec<(&'static str, Responder)>,
    requests: Mutex<Vec<ChatRequest>>,
}

impl ScriptedChatGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every request from `caller` with the closure's text.
    pub fn on<F>(mut self, caller: &'static str, respond: F) -> Self
    where
        F: Fn(&ChatRequest) -> String + Send + Sync + 'static,
    {
        self.routes
            .push((caller, Box::new(move |req| Ok(respond(req)))));
        self
    }

    /// Answer every request from `caller` with the same text.
    pub fn reply(self, caller: &'static str, text: impl Into<String>) -> Self {
        let text = text.into();
        self.on(caller, move |_| text.clone())
    }

    /// Answer every request from `caller` with a closure that may fail.
    pub fn on_result<F>(mut self, caller: &'static str, respond: F) -> Self
    where
        F: Fn(&ChatRequest) -> Result<String, ProviderError> + Send + Sync + 'static,
    {
        self.routes.push((caller, Box::new(respond)));
        self
    }

    /// Fail every request from `caller`.
    pub fn fail(self, caller: &'static str) -> Self {
        self.on_result(caller, move |_| {
            Err(ProviderError::provider("scripted", format!("{caller} unavailable"), false))
        })
    }

    /// Every request received so far, in arrival order.
    pub fn requests(&self) -> Vec<ChatRequest> {
        match self.requests.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn call_count(&self) -> usize {
        self.requests().len()
    }

    /// Number of requests received from `caller`.
    pub fn calls_for(&self, caller: &str) -> usize {
        self.requests()
            .iter()
            .filter(|r| r.attribution.caller == caller)
            .count()
    }
}

#[async_trait]
impl ChatGateway for ScriptedChatGateway {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        match self.requests.lock() {
            Ok(mut guard) => guard.push(req.clone()),
            Err(poisoned) => poisoned.into_inner().push(req.clone()),
        }

        let caller = req.attribution.caller;
        let respond = self
            .routes
            .iter()
            .rev()
            .find(|(route, _)| *route == caller)
            .map(|(_, respond)| respond)
            .ok_or_else(|| {
                ProviderError::provider("scripted", format!("no script for {caller}"), false)
            })?;

        respond(&req).map(ChatResponse::text)
    }
}
