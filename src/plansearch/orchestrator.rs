//! The plan search sweep: seed, deepen, plan, instantiate, refine.

use tracing::{debug, info, warn};

use super::combinations::combine;
use super::critique::critique;
use super::jokes::instantiate;
use super::observations::expand;
use super::plans::formulate;
use super::{
    CandidateJoke, Critique, Observation, ObservationCombination, Plan, PlanSearchConfig,
    PlanSearchModels, PlanSearchOutcome, SearchStatus,
};
use crate::context::RunContext;
use crate::trace::TraceEvent;

/// Run one bounded candidate-generation sweep over `topic`.
///
/// Every failed call drops only its own unit of work. The sweep stops early
/// when the seed expansion is empty (no further calls are made) or when
/// cancellation is observed between calls; candidates produced so far are
/// always returned.
pub async fn run_plansearch(
    ctx: &RunContext<'_>,
    topic: &str,
    models: &PlanSearchModels,
    config: &PlanSearchConfig,
) -> PlanSearchOutcome {
    let mut sweep = Sweep {
        observations: Vec::new(),
        plans: Vec::new(),
        candidates: Vec::new(),
    };

    let status = sweep.run(ctx, topic, models, config).await;
    info!(
        topic,
        status = ?status,
        observations = sweep.observations.len(),
        plans = sweep.plans.len(),
        candidates = sweep.candidates.len(),
        "plan search finished"
    );

    PlanSearchOutcome {
        status,
        observations: sweep.observations,
        plans: sweep.plans,
        candidates: sweep.candidates,
        completion_calls: ctx.completion_calls(),
    }
}

struct Sweep {
    observations: Vec<Observation>,
    plans: Vec<Plan>,
    candidates: Vec<CandidateJoke>,
}

impl Sweep {
    async fn run(
        &mut self,
        ctx: &RunContext<'_>,
        topic: &str,
        models: &PlanSearchModels,
        config: &PlanSearchConfig,
    ) -> SearchStatus {
        // Seed
        if ctx.is_cancelled() {
            return SearchStatus::Cancelled;
        }
        let mut seed = expand(ctx, topic, &models.observation, None).await;
        seed.truncate(config.num_first_order_obs);
        if seed.is_empty() {
            warn!(topic, "seed expansion produced no observations");
            return SearchStatus::NoSeedObservations;
        }
        self.observations.extend(seed.iter().cloned());

        // Deepen
        let seed_combinations = combine(&seed, config.max_combination_size);
        let deepening_cap = config.deepening_cap();
        let mut derived_sources: Vec<Vec<Observation>> = Vec::new();
        for combination in &seed_combinations {
            if derived_sources.len() as f64 >= deepening_cap {
                debug!(sources = derived_sources.len(), "deepening cap reached");
                break;
            }
            if ctx.is_cancelled() {
                return SearchStatus::Cancelled;
            }
            let mut derived = expand(ctx, topic, &models.observation, Some(combination)).await;
            derived.truncate(config.num_second_order_obs_per_combo);
            if !derived.is_empty() {
                self.observations.extend(derived.iter().cloned());
                derived_sources.push(derived);
            }
        }

        // Plan pool: seed combinations, then one per productive deepening source.
        let pool = seed_combinations
            .into_iter()
            .chain(derived_sources)
            .map(ObservationCombination::new);

        // Develop, instantiate, refine
        for combination in pool {
            if self.plans.len() >= config.max_plans_to_develop {
                break;
            }
            if combination.is_empty() {
                continue;
            }
            if ctx.is_cancelled() {
                return SearchStatus::Cancelled;
            }
            let Some(mut plan) = formulate(ctx, topic, &combination, &models.plan).await else {
                continue;
            };
            plan.id = self.plans.len();
            self.plans.push(plan.clone());

            if !self.develop(ctx, topic, &plan, models, config).await {
                return SearchStatus::Cancelled;
            }
        }

        SearchStatus::Completed
    }

    /// Instantiate `plan` and optionally refine it. Returns `false` if
    /// cancellation cut the work short.
    async fn develop(
        &mut self,
        ctx: &RunContext<'_>,
        topic: &str,
        plan: &Plan,
        models: &PlanSearchModels,
        config: &PlanSearchConfig,
    ) -> bool {
        if ctx.is_cancelled() {
            return false;
        }
        let Some(joke) = instantiate(ctx, topic, plan, &models.joke, None).await else {
            return true;
        };
        let original_id = self.push_candidate(joke.clone(), plan, None);

        let critique_model = match (&models.critique, config.use_critique_refinement) {
            (Some(model), true) => model,
            _ => return true,
        };

        if ctx.is_cancelled() {
            return false;
        }
        let Some(critique) = critique(ctx, &joke, plan, critique_model).await else {
            return true;
        };

        if ctx.is_cancelled() {
            return false;
        }
        let Some(refined) = instantiate(ctx, topic, plan, &models.joke, Some(&critique)).await
        else {
            return true;
        };

        if refined.trim() == joke.trim() {
            debug!(candidate_id = original_id, "refinement identical to original; dropped");
            ctx.record(TraceEvent::RefinementDiscarded {
                candidate_id: original_id,
            });
        } else {
            self.push_candidate(refined, plan, Some(critique));
        }
        true
    }

    fn push_candidate(&mut self, text: String, plan: &Plan, critique: Option<Critique>) -> usize {
        let id = self.candidates.len();
        self.candidates.push(CandidateJoke {
            id,
            text,
            plan: plan.clone(),
            refined: critique.is_some(),
            critique,
        });
        id
    }
}
