//! Provider gateway for OpenRouter chat completions.

pub mod error;
pub mod openrouter;
pub mod pricing;
pub mod scripted;
pub mod types;
pub mod usage;

use std::sync::Arc;
use std::time::Duration;

use tokio::time::sleep;

use openrouter::{ChatProvider, OpenRouterAdapter};
use usage::ProviderCallRecord;

pub use error::{ErrorContext, ProviderError};
pub use pricing::chat_cost;
pub use scripted::ScriptedChatGateway;
pub use types::*;
pub use usage::{NoopUsageSink, StderrUsageSink, TallyUsageSink, UsageSink, UsageTotals};

/// Anything that can answer a chat completion request.
#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError>;
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Extra attempts for retryable failures. Zero means a failed call is final.
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            retry_base_delay: Duration::from_secs(1),
        }
    }
}

pub struct ProviderGateway<U: UsageSink> {
    openrouter: OpenRouterAdapter,
    usage_sink: Arc<U>,
    config: GatewayConfig,
}

#[async_trait::async_trait]
impl<U: UsageSink> ChatGateway for ProviderGateway<U> {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        ProviderGateway::chat(self, req).await
    }
}

impl<U: UsageSink> ProviderGateway<U> {
    pub fn from_env(usage_sink: Arc<U>) -> Result<Self, ProviderError> {
        let openrouter = OpenRouterAdapter::from_env()?;
        Ok(Self {
            openrouter,
            usage_sink,
            config: GatewayConfig::default(),
        })
    }

    pub fn with_config(
        openrouter: OpenRouterAdapter,
        usage_sink: Arc<U>,
        config: GatewayConfig,
    ) -> Self {
        Self {
            openrouter,
            usage_sink,
            config,
        }
    }

    pub async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError> {
        let mut last_error: Option<ProviderError> = None;

        for attempt in 0..=self.config.max_retries {
            match self.openrouter.chat(&req).await {
                Ok(resp) => {
                    self.record_usage(&req, &resp, None).await;
                    return Ok(resp);
                }
                Err(err) => {
                    self.record_usage(&req, &ChatResponse::empty(), Some(err.code()))
                        .await;

                    if !err.is_retryable() || attempt == self.config.max_retries {
                        return Err(err);
                    }

                    let delay = backoff_delay(self.config.retry_base_delay, attempt);
                    tracing::debug!(
                        caller = req.attribution.caller,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying chat call"
                    );
                    last_error = Some(err);
                    sleep(delay).await;
                }
            }
        }

        Err(last_error
            .unwrap_or_else(|| ProviderError::provider("openrouter", "unknown error", false)))
    }

    async fn record_usage(&self, req: &ChatRequest, resp: &ChatResponse, error_code: Option<&str>) {
        let record = ProviderCallRecord::new(
            req.model.provider(),
            "chat/completions",
            req.model.model_id(),
            req.attribution.caller,
        )
        .tokens(resp.input_tokens, resp.output_tokens)
        .cost(resp.cost_nanodollars)
        .upstream_cost(resp.upstream_cost_nanodollars)
        .run(req.attribution.run_id)
        .latency(resp.latency.as_millis() as u64);

        let record = match error_code {
            Some(code) => record.error(code),
            None => record,
        };

        self.usage_sink.record(record).await;
    }
}

fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let multiplier = 2u64.pow(attempt.min(5));
    base * multiplier as u32
}

impl ChatResponse {
    fn empty() -> Self {
        Self {
            finish_reason: FinishReason::Unknown("error".to_string()),
            ..ChatResponse::text("")
        }
    }
}
