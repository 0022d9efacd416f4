//! Core types for the completion gateway.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

// =============================================================================
// ATTRIBUTION
// =============================================================================

/// Attribution for cost tracking and debugging.
///
/// Every request through the gateway carries attribution so we know:
/// - Which run it belongs to (run_id)
/// - Which code path triggered it (caller)
#[derive(Debug, Clone, Default)]
pub struct Attribution {
    /// Pipeline run this request is part of (if any).
    pub run_id: Option<Uuid>,
    /// Which code path made this call.
    /// Use a static string like "plansearch::plan" or "scoring::judge".
    pub caller: &'static str,
}

impl Attribution {
    pub fn new(caller: &'static str) -> Self {
        Self {
            caller,
            ..Default::default()
        }
    }

    pub fn with_run(mut self, run_id: Uuid) -> Self {
        self.run_id = Some(run_id);
        self
    }
}

// =============================================================================
// CHAT TYPES
// =============================================================================

/// Chat message role.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Chat model specification.
#[derive(Debug, Clone)]
pub enum ChatModel {
    /// OpenRouter model, e.g. "openai/gpt-4o-mini"
    OpenRouter(String),
}

impl ChatModel {
    pub fn openrouter(model_id: impl Into<String>) -> Self {
        ChatModel::OpenRouter(model_id.into())
    }

    pub fn model_id(&self) -> &str {
        match self {
            ChatModel::OpenRouter(id) => id,
        }
    }

    pub fn provider(&self) -> &'static str {
        match self {
            ChatModel::OpenRouter(_) => "openrouter",
        }
    }

    /// Extract route (e.g. "anthropic" from "anthropic/claude-3-5-haiku").
    pub fn route(&self) -> &str {
        match self {
            ChatModel::OpenRouter(id) => id.split('/').next().unwrap_or(id),
        }
    }
}

/// Request for chat completion.
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// Model to use.
    pub model: ChatModel,
    /// Messages in the conversation.
    pub messages: Vec<Message>,
    /// Sampling temperature (0.0 - 2.0).
    pub temperature: f32,
    /// Maximum tokens to generate.
    pub max_tokens: Option<u32>,
    /// Whether to request JSON output.
    pub json_mode: bool,
    /// Attribution for cost tracking.
    pub attribution: Attribution,
}

impl ChatRequest {
    pub fn new(model: ChatModel, messages: Vec<Message>, attribution: Attribution) -> Self {
        Self {
            model,
            messages,
            temperature: 0.0,
            max_tokens: None,
            json_mode: false,
            attribution,
        }
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.temperature = t;
        self
    }

    pub fn max_tokens(mut self, max: u32) -> Self {
        self.max_tokens = Some(max);
        self
    }

    pub fn json(mut self) -> Self {
        self.json_mode = true;
        self
    }

    /// Concatenated content of every user message, handy for test doubles
    /// that route on prompt text.
    pub fn user_text(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Reason the model stopped generating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCalls,
    Unknown(String),
}

impl From<Option<String>> for FinishReason {
    fn from(s: Option<String>) -> Self {
        match s.as_deref() {
            Some("stop") => FinishReason::Stop,
            Some("length") => FinishReason::Length,
            Some("content_filter") => FinishReason::ContentFilter,
            Some("tool_calls") => FinishReason::ToolCalls,
            Some(other) => FinishReason::Unknown(other.to_string()),
            None => FinishReason::Unknown("none".to_string()),
        }
    }
}

/// Response from chat completion.
#[derive(Debug, Clone)]
pub struct ChatResponse {
    /// Generated content.
    pub content: String,
    /// Input tokens consumed.
    pub input_tokens: u32,
    /// Output tokens generated.
    pub output_tokens: u32,
    /// Cost in nanodollars.
    pub cost_nanodollars: i64,
    /// Provider-reported upstream inference cost (nanodollars), if available.
    ///
    /// For OpenRouter this is derived from `usage.cost_details.upstream_inference_cost`.
    pub upstream_cost_nanodollars: Option<i64>,
    /// Time taken for the request.
    pub latency: Duration,
    /// Why the model stopped.
    pub finish_reason: FinishReason,
}

impl ChatResponse {
    /// A zero-usage response carrying only content. Used by test doubles.
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            input_tokens: 0,
            output_tokens: 0,
            cost_nanodollars: 0,
            upstream_cost_nanodollars: None,
            latency: Duration::from_millis(0),
            finish_reason: FinishReason::Stop,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_is_provider_prefix() {
        let m = ChatModel::openrouter("anthropic/claude-3-5-haiku");
        assert_eq!(m.route(), "anthropic");
        assert_eq!(m.provider(), "openrouter");
    }

    #[test]
    fn builder_sets_sampling_fields() {
        let req = ChatRequest::new(
            ChatModel::openrouter("openai/gpt-4o-mini"),
            vec![Message::system("sys"), Message::user("hi")],
            Attribution::new("test"),
        )
        .temperature(0.9)
        .max_tokens(200)
        .json();

        assert!((req.temperature - 0.9).abs() < 1e-6);
        assert_eq!(req.max_tokens, Some(200));
        assert!(req.json_mode);
        assert_eq!(req.user_text(), "hi");
    }

    #[test]
    fn finish_reason_from_strings() {
        assert_eq!(FinishReason::from(Some("stop".into())), FinishReason::Stop);
        assert_eq!(FinishReason::from(Some("length".into())), FinishReason::Length);
        assert_eq!(
            FinishReason::from(None),
            FinishReason::Unknown("none".to_string())
        );
    }
}
