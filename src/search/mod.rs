//! Web search capability used by the novelty scorer.

pub mod brave;
pub mod scripted;

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use brave::BraveSearchAdapter;
pub use scripted::FixedSearchGateway;

/// One web result.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    #[serde(default)]
    pub snippet: String,
}

#[derive(Debug, Error)]
pub enum SearchError {
    /// Missing or malformed credentials/endpoint.
    #[error("configuration error: {0}")]
    Config(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} error: {message}")]
    Provider {
        provider: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("timeout after {0:?}")]
    Timeout(Duration),
}

impl SearchError {
    pub fn provider(provider: &'static str, status: Option<u16>, message: impl Into<String>) -> Self {
        Self::Provider {
            provider,
            status,
            message: message.into(),
        }
    }

    /// Whether the capability should be treated as absent rather than failing.
    pub fn is_unavailable(&self) -> bool {
        match self {
            Self::Config(_) | Self::Timeout(_) => true,
            Self::Http(e) => e.is_timeout(),
            Self::Provider { .. } => false,
        }
    }

    /// Short error code for logging.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "config_error",
            Self::Http(_) => "http_error",
            Self::Provider { .. } => "provider_error",
            Self::Timeout(_) => "timeout",
        }
    }
}

/// Anything that can run an exact-phrase web search.
#[async_trait]
pub trait SearchGateway: Send + Sync {
    async fn search(
        &self,
        exact_phrase_query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, SearchError>;
}
