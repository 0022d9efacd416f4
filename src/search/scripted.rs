//! Deterministic search double.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use super::{SearchError, SearchGateway, SearchHit};

#[derive(Debug, Clone)]
enum Outcome {
    Hits(usize),
    Fail,
    Timeout,
}

/// A [`SearchGateway`] that returns the same outcome for every query and
/// records the queries it saw.
#[derive(Debug)]
pub struct FixedSearchGateway {
    outcome: Outcome,
    queries: Mutex<Vec<String>>,
}

impl FixedSearchGateway {
    fn with_outcome(outcome: Outcome) -> Self {
        Self {
            outcome,
            queries: Mutex::new(Vec::new()),
        }
    }

    /// Return `count` synthetic hits (bounded by `max_results`).
    pub fn hits(count: usize) -> Self {
        Self::with_outcome(Outcome::Hits(count))
    }

    /// Fail every query with a provider error.
    pub fn failing() -> Self {
        Self::with_outcome(Outcome::Fail)
    }

    /// Fail every query with a timeout.
    pub fn timing_out() -> Self {
        Self::with_outcome(Outcome::Timeout)
    }

    pub fn queries(&self) -> Vec<String> {
        match self.queries.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[async_trait]
impl SearchGateway for FixedSearchGateway {
    async fn search(
        &self,
        exact_phrase_query: &str,
        max_results: usize,
    ) -> Result<Vec<SearchHit>, SearchError> {
        match self.queries.lock() {
            Ok(mut guard) => guard.push(exact_phrase_query.to_string()),
            Err(poisoned) => poisoned.into_inner().push(exact_phrase_query.to_string()),
        }

        match self.outcome {
            Outcome::Hits(count) => Ok((0..count.min(max_results))
                .map(|i| SearchHit {
                    title: format!("result {i}"),
                    url: format!("https://example.com/{i}"),
                    snippet: exact_phrase_query.to_string(),
                })
                .collect()),
            Outcome::Fail => Err(SearchError::provider("fixed", Some(500), "scripted failure")),
            Outcome::Timeout => Err(SearchError::Timeout(Duration::from_secs(0))),
        }
    }
}
