//! Novelty scoring: web prevalence fused with a model's sense of freshness.
//!
//! The web check searches for the joke's closing words as an exact phrase;
//! the more hits, the larger the penalty. The perceived check asks a model
//! for a 0.0..=1.0 score. The final score is
//! `clamp(perceived - web_penalty_weight * penalty, 0, 1)`, so evidence that
//! a joke already circulates outweighs the model's impression.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::callers;
use crate::context::{RunContext, Sampling};
use crate::plansearch::CandidateJoke;
use crate::prompts::PERCEIVED_NOVELTY;
use crate::search::SearchGateway;
use crate::trace::TraceEvent;

const PERCEIVED_SAMPLING: Sampling = Sampling::new(0.3, 10);

fn default_web_penalty_weight() -> f64 {
    0.7
}

fn default_query_word_window() -> usize {
    10
}

fn default_max_search_results() -> usize {
    5
}

fn default_widely_found_hits() -> usize {
    3
}

fn default_widely_found_penalty() -> f64 {
    1.0
}

fn default_found_penalty() -> f64 {
    0.5
}

fn default_search_error_penalty() -> f64 {
    0.2
}

fn default_neutral_perceived_novelty() -> f64 {
    0.5
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoveltyConfig {
    #[serde(default = "default_web_penalty_weight")]
    pub web_penalty_weight: f64,
    /// Number of closing words used as the exact-phrase query.
    #[serde(default = "default_query_word_window")]
    pub query_word_window: usize,
    #[serde(default = "default_max_search_results")]
    pub max_search_results: usize,
    /// Hit count at or above which a joke counts as widely found.
    #[serde(default = "default_widely_found_hits")]
    pub widely_found_hits: usize,
    #[serde(default = "default_widely_found_penalty")]
    pub widely_found_penalty: f64,
    #[serde(default = "default_found_penalty")]
    pub found_penalty: f64,
    /// Penalty when the search fails for a reason other than unavailability.
    #[serde(default = "default_search_error_penalty")]
    pub search_error_penalty: f64,
    /// Perceived novelty used when no model is configured or its answer is unusable.
    #[serde(default = "default_neutral_perceived_novelty")]
    pub neutral_perceived_novelty: f64,
}

impl Default for NoveltyConfig {
    fn default() -> Self {
        Self {
            web_penalty_weight: default_web_penalty_weight(),
            query_word_window: default_query_word_window(),
            max_search_results: default_max_search_results(),
            widely_found_hits: default_widely_found_hits(),
            widely_found_penalty: default_widely_found_penalty(),
            found_penalty: default_found_penalty(),
            search_error_penalty: default_search_error_penalty(),
            neutral_perceived_novelty: default_neutral_perceived_novelty(),
        }
    }
}

/// How the web check went.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WebCheck {
    /// No search capability configured.
    NoSearch,
    /// The capability could not be reached in time or is not configured.
    Unavailable,
    /// The search failed; the conservative error penalty applies.
    Failed,
    Searched { hits: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PerceivedSource {
    Model,
    Default,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoveltyScore {
    /// 0.0 (most novel) ..= 1.0 (least novel).
    pub web_found_penalty: f64,
    pub web_check: WebCheck,
    pub web_query: String,
    /// 0.0 (least novel) ..= 1.0 (most novel).
    pub perceived_novelty: f64,
    pub perceived_source: PerceivedSource,
    pub final_score: f64,
}

impl NoveltyScore {
    pub fn web_hits(&self) -> Option<usize> {
        match self.web_check {
            WebCheck::Searched { hits } => Some(hits),
            _ => None,
        }
    }
}

/// The joke's last `window` words, or the whole joke if it is shorter.
pub fn web_query_phrase(joke: &str, window: usize) -> String {
    let words: Vec<&str> = joke.split_whitespace().collect();
    let start = words.len().saturating_sub(window);
    words[start..].join(" ")
}

pub fn penalty_for_hits(hits: usize, config: &NoveltyConfig) -> f64 {
    if hits >= config.widely_found_hits {
        config.widely_found_penalty
    } else if hits > 0 {
        config.found_penalty
    } else {
        0.0
    }
}

/// `clamp(perceived - weight * penalty, 0, 1)`; NaN collapses to 0.0.
pub fn fuse(perceived: f64, penalty: f64, weight: f64) -> f64 {
    let raw = perceived - weight * penalty;
    if raw.is_nan() {
        0.0
    } else {
        raw.clamp(0.0, 1.0)
    }
}

/// Read a 0.0..=1.0 score from a short model answer such as `0.7`,
/// `0.7.` or `Score: 0.7`. Values outside the range are clamped.
///
/// Anything that looks like a rating on another scale (`7/10`,
/// `8 out of 10`, several numbers) is rejected so the caller falls back to
/// the neutral score.
pub fn parse_perceived_novelty(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    let parsed = match trimmed.parse::<f64>() {
        Ok(value) => value,
        Err(_) => parse_labelled_score(trimmed)?,
    };
    parsed.is_finite().then(|| parsed.clamp(0.0, 1.0))
}

fn parse_labelled_score(text: &str) -> Option<f64> {
    let lower = text.to_ascii_lowercase();
    if text.contains('/') || lower.contains("out of") || lower.contains("scale") {
        return None;
    }

    let value = match text.rsplit_once(':') {
        Some((label, value)) => {
            let label = label.trim();
            let short_label = !label.is_empty()
                && label.len() <= 24
                && label.chars().all(|c| c.is_ascii_alphabetic() || c == ' ' || c == '_');
            if !short_label {
                return None;
            }
            value
        }
        None => text,
    };

    let value = value.trim().trim_end_matches('.');
    if value.is_empty() || value.split_whitespace().count() != 1 {
        return None;
    }
    value.parse::<f64>().ok()
}

/// Score one candidate. Never fails: every missing signal falls back to its
/// configured default.
pub async fn score(
    ctx: &RunContext<'_>,
    search: Option<&dyn SearchGateway>,
    candidate: &CandidateJoke,
    perceived_model: Option<&str>,
    config: &NoveltyConfig,
) -> NoveltyScore {
    let web_query = web_query_phrase(&candidate.text, config.query_word_window);

    let (web_check, web_found_penalty) = match search {
        None => (WebCheck::NoSearch, 0.0),
        Some(_) if web_query.is_empty() => (WebCheck::Searched { hits: 0 }, 0.0),
        Some(search) => match ctx
            .search(search, &web_query, config.max_search_results)
            .await
        {
            Ok(hits) => {
                let hits = hits.len();
                (WebCheck::Searched { hits }, penalty_for_hits(hits, config))
            }
            Err(err) if err.is_unavailable() => {
                warn!(
                    candidate_id = candidate.id,
                    code = err.code(),
                    error = %err,
                    "web search unavailable"
                );
                (WebCheck::Unavailable, 0.0)
            }
            Err(err) => {
                warn!(
                    candidate_id = candidate.id,
                    code = err.code(),
                    error = %err,
                    "web search failed"
                );
                (WebCheck::Failed, config.search_error_penalty)
            }
        },
    };

    let (perceived, perceived_call) = match perceived_model {
        Some(model) => {
            let prompt = PERCEIVED_NOVELTY.render(&[("joke", &candidate.text)]);
            let completion = ctx
                .complete(callers::NOVELTY, model, &prompt, PERCEIVED_SAMPLING)
                .await;
            let parsed = completion.text.as_deref().and_then(parse_perceived_novelty);
            if parsed.is_none() && completion.text.is_some() {
                debug!(
                    candidate_id = candidate.id,
                    "perceived novelty unparseable; using neutral score"
                );
            }
            (parsed, Some(completion.call))
        }
        None => (None, None),
    };

    let (perceived_novelty, perceived_source) = match perceived {
        Some(value) => (value, PerceivedSource::Model),
        None => (config.neutral_perceived_novelty, PerceivedSource::Default),
    };

    let result = NoveltyScore {
        web_found_penalty,
        web_check,
        web_query,
        perceived_novelty,
        perceived_source,
        final_score: fuse(perceived_novelty, web_found_penalty, config.web_penalty_weight),
    };

    ctx.record(TraceEvent::NoveltyCheck {
        candidate_id: candidate.id,
        score: result.clone(),
        perceived_call,
    });

    result
}
