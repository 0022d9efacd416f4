//! Brave Search adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::Deserialize;

use super::{SearchError, SearchGateway, SearchHit};

const DEFAULT_BASE_URL: &str = "https://api.search.brave.com/res/v1";

/// Brave caps `count` at 20 per request.
const MAX_COUNT: usize = 20;

/// Maximum response body size accepted (1 MiB).
const MAX_RESPONSE_LEN: usize = 1_024 * 1_024;

#[derive(Debug, Clone)]
pub struct BraveSearchAdapter {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl BraveSearchAdapter {
    /// Create from environment variables.
    ///
    /// `BRAVE_SEARCH_API_KEY` is required; `BRAVE_SEARCH_BASE_URL` and
    /// `BRAVE_SEARCH_TIMEOUT_SECONDS` are optional.
    pub fn from_env() -> Result<Self, SearchError> {
        let api_key = std::env::var("BRAVE_SEARCH_API_KEY")
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| SearchError::Config("BRAVE_SEARCH_API_KEY not set".to_string()))?;

        let base_url =
            std::env::var("BRAVE_SEARCH_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());

        let timeout = std::env::var("BRAVE_SEARCH_TIMEOUT_SECONDS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(15));

        Self::with_config(api_key, base_url, timeout)
    }

    pub fn with_config(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, SearchError> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(SearchError::Config("Brave API key is empty".to_string()));
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let token = HeaderValue::from_str(&api_key)
            .map_err(|_| SearchError::Config("Invalid API key format".to_string()))?;
        headers.insert("X-Subscription-Token", token);

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .gzip(true)
            .build()
            .map_err(|e| SearchError::Config(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout,
        })
    }

    fn search_url(&self) -> String {
        format!("{}/web/search", self.base_url)
    }
}

#[derive(Deserialize)]
struct BraveResponse {
    #[serde(default)]
    web: Option<BraveWeb>,
}

#[derive(Deserialize)]
struct BraveWeb {
    #[serde(default)]
    results: Vec<BraveResult>,
}

#[derive(Deserialize)]
struct BraveResult {
    #[serde(default)]
    title: String,
    #[serde(default)]
    url: String,
    #[serde(default)]
    description: String,
}

/// Wrap a phrase in double quotes, dropping any quotes inside it.
fn exact_phrase(query: &str) -> String {
    format!("\"{}\"", query.replace('"', "").trim())
}

#[async_trait]
impl SearchGateway for BraveSearchAdapter {
    async fn search(
        &self,
        exact_phrase_query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let count = max_results.clamp(1, MAX_COUNT);
        let query = exact_phrase(exact_phrase_query);

        let mut response = self
            .client
            .get(self.search_url())
            .query(&[("q", query.as_str()), ("count", &count.to_string())])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    SearchError::Timeout(self.timeout)
                } else {
                    SearchError::Http(e)
                }
            })?;

        let status = response.status();

        let mut bytes = Vec::new();
        while let Some(chunk) = response.chunk().await? {
            let new_len = bytes.len() + chunk.len();
            if new_len > MAX_RESPONSE_LEN {
                return Err(SearchError::provider(
                    "brave",
                    Some(status.as_u16()),
                    format!("Response too large: {new_len} bytes"),
                ));
            }
            bytes.extend_from_slice(&chunk);
        }
        let body = String::from_utf8_lossy(&bytes);

        if !status.is_success() {
            let message: String = body.chars().take(200).collect();
            return Err(SearchError::provider("brave", Some(status.as_u16()), message));
        }

        let parsed: BraveResponse = serde_json::from_str(&body)
            .map_err(|e| SearchError::provider("brave", None, format!("Invalid JSON: {e}")))?;

        let hits = parsed
            .web
            .map(|w| w.results)
            .unwrap_or_default()
            .into_iter()
            .take(max_results)
            .map(|r| SearchHit {
                title: r.title,
                url: r.url,
                snippet: r.description,
            })
            .collect();

        Ok(hits)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_phrase_strips_inner_quotes() {
        assert_eq!(exact_phrase("say \"decaf\" again"), "\"say decaf again\"");
    }

    #[test]
    fn empty_key_rejected() {
        let err = BraveSearchAdapter::with_config("", DEFAULT_BASE_URL, Duration::from_secs(1))
            .unwrap_err();
        assert!(err.is_unavailable());
    }
}
