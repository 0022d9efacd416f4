//! Scoring and ranking of candidate jokes.

pub mod funniness;
pub mod novelty;
pub mod ranking;

pub use funniness::{AbsentReason, FunninessScore, FunninessVerdict};
pub use novelty::{NoveltyConfig, NoveltyScore, PerceivedSource, WebCheck};
pub use ranking::{rank, RankedResult, ScoreCombiner, WeightedAverage};

/// Caller tags for scoring completions.
pub mod callers {
    pub const NOVELTY: &str = "scoring::novelty";
    pub const FUNNINESS: &str = "scoring::funniness";
}
