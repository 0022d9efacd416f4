//! Ranking aggregation.

use std::collections::HashMap;
use std::num::NonZeroUsize;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::funniness::{FunninessScore, FunninessVerdict};
use super::novelty::NoveltyScore;
use crate::plansearch::CandidateJoke;

/// Combines the two score records of a candidate into one number; higher ranks first.
pub trait ScoreCombiner: Send + Sync {
    fn combine(&self, novelty: &NoveltyScore, funniness: &FunninessScore) -> f64;
}

impl<F> ScoreCombiner for F
where
    F: Fn(&NoveltyScore, &FunninessScore) -> f64 + Send + Sync,
{
    fn combine(&self, novelty: &NoveltyScore, funniness: &FunninessScore) -> f64 {
        self(novelty, funniness)
    }
}

/// Weighted mean of `novelty.final_score` and `overall_funniness / 10`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeightedAverage {
    pub novelty_weight: f64,
    pub funniness_weight: f64,
}

impl Default for WeightedAverage {
    fn default() -> Self {
        Self {
            novelty_weight: 0.5,
            funniness_weight: 0.5,
        }
    }
}

impl ScoreCombiner for WeightedAverage {
    fn combine(&self, novelty: &NoveltyScore, funniness: &FunninessScore) -> f64 {
        let total = self.novelty_weight + self.funniness_weight;
        if total <= 0.0 {
            return 0.0;
        }
        let funniness = funniness.overall_funniness as f64 / 10.0;
        (self.novelty_weight * novelty.final_score + self.funniness_weight * funniness) / total
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    /// 1-based position in the final ordering.
    pub rank: usize,
    pub candidate: CandidateJoke,
    pub novelty: NoveltyScore,
    pub funniness: FunninessScore,
    pub combined_score: f64,
}

/// Order fully scored candidates by combined score, best first, and keep
/// the top `top_n`.
///
/// Candidates missing either record (or judged absent) are left out. Ties keep
/// candidate order. Non-finite combined scores are dropped.
pub fn rank(
    candidates: &[CandidateJoke],
    novelty: &HashMap<usize, NoveltyScore>,
    funniness: &HashMap<usize, FunninessVerdict>,
    top_n: NonZeroUsize,
    combiner: &dyn ScoreCombiner,
) -> Vec<RankedResult> {
    let mut scored: Vec<RankedResult> = candidates
        .iter()
        .filter_map(|candidate| {
            let novelty = novelty.get(&candidate.id)?;
            let funniness = funniness.get(&candidate.id)?.score()?;
            let combined_score = combiner.combine(novelty, funniness);
            if !combined_score.is_finite() {
                debug!(candidate_id = candidate.id, "non-finite combined score; excluded");
                return None;
            }
            Some(RankedResult {
                rank: 0,
                candidate: candidate.clone(),
                novelty: novelty.clone(),
                funniness: funniness.clone(),
                combined_score,
            })
        })
        .collect();

    // `sort_by` is stable, so equal scores keep candidate order.
    scored.sort_by(|a, b| b.combined_score.total_cmp(&a.combined_score));
    scored.truncate(top_n.get());
    for (i, result) in scored.iter_mut().enumerate() {
        result.rank = i + 1;
    }
    scored
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plansearch::{ObservationCombination, Plan};
    use crate::scoring::funniness::AbsentReason;
    use crate::scoring::novelty::{PerceivedSource, WebCheck};

    fn candidate(id: usize) -> CandidateJoke {
        CandidateJoke {
            id,
            text: format!("joke {id}"),
            plan: Plan {
                id: 0,
                topic: "coffee".into(),
                text: "plan".into(),
                combination: ObservationCombination::new(vec![]),
            },
            refined: false,
            critique: None,
        }
    }

    fn novelty(final_score: f64) -> NoveltyScore {
        NoveltyScore {
            web_found_penalty: 0.0,
            web_check: WebCheck::NoSearch,
            web_query: String::new(),
            perceived_novelty: final_score,
            perceived_source: PerceivedSource::Model,
            final_score,
        }
    }

    fn funny(overall: u8) -> FunninessVerdict {
        FunninessVerdict::Scored(FunninessScore {
            originality: 5,
            coherence: 5,
            setup_effectiveness: 5,
            punchline_impact: 5,
            brevity: 5,
            overall_funniness: overall,
            rationale: String::new(),
        })
    }

    fn top(n: usize) -> NonZeroUsize {
        NonZeroUsize::new(n).unwrap()
    }

    #[test]
    fn top_three_of_five_sorted_with_stable_ties() {
        let candidates: Vec<_> = (0..5).map(candidate).collect();
        let novelty: HashMap<_, _> = [(0, 0.2), (1, 0.8), (2, 0.4), (3, 0.8), (4, 0.6)]
            .into_iter()
            .map(|(id, s)| (id, novelty(s)))
            .collect();
        let funniness: HashMap<_, _> = [(0, 2), (1, 6), (2, 4), (3, 6), (4, 6)]
            .into_iter()
            .map(|(id, s)| (id, funny(s)))
            .collect();

        let ranked = rank(&candidates, &novelty, &funniness, top(3), &WeightedAverage::default());

        let ids: Vec<usize> = ranked.iter().map(|r| r.candidate.id).collect();
        assert_eq!(ids, vec![1, 3, 4]);
        assert_eq!(ranked[0].rank, 1);
        assert!((ranked[0].combined_score - 0.7).abs() < 1e-9);
        assert!(ranked
            .windows(2)
            .all(|w| w[0].combined_score >= w[1].combined_score));
    }

    #[test]
    fn candidates_missing_a_record_are_excluded() {
        let candidates: Vec<_> = (0..3).map(candidate).collect();
        let novelty: HashMap<_, _> = [(0, novelty(0.9)), (1, novelty(0.9))].into_iter().collect();
        let funniness: HashMap<_, _> = [
            (0, FunninessVerdict::Absent(AbsentReason::Unavailable)),
            (1, funny(3)),
            (2, funny(10)),
        ]
        .into_iter()
        .collect();

        let ranked = rank(&candidates, &novelty, &funniness, top(5), &WeightedAverage::default());

        assert_eq!(ranked.len(), 1);
        assert_eq!(ranked[0].candidate.id, 1);
    }

    #[test]
    fn closures_combine_too() {
        let candidates: Vec<_> = (0..2).map(candidate).collect();
        let novelty: HashMap<_, _> = [(0, novelty(0.9)), (1, novelty(0.1))].into_iter().collect();
        let funniness: HashMap<_, _> = [(0, funny(1)), (1, funny(9))].into_iter().collect();
        let funniest_only = |_: &NoveltyScore, f: &FunninessScore| f.overall_funniness as f64;

        let ranked = rank(&candidates, &novelty, &funniness, top(2), &funniest_only);

        assert_eq!(ranked[0].candidate.id, 1);
    }

    #[test]
    fn non_finite_scores_are_dropped() {
        let candidates = vec![candidate(0)];
        let novelty: HashMap<_, _> = [(0, novelty(0.5))].into_iter().collect();
        let funniness: HashMap<_, _> = [(0, funny(5))].into_iter().collect();
        let nan = |_: &NoveltyScore, _: &FunninessScore| f64::NAN;

        assert!(rank(&candidates, &novelty, &funniness, top(1), &nan).is_empty());
    }
}
