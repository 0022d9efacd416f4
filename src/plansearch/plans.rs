//! Plan formulation.

use super::{callers, ObservationCombination, Plan};
use crate::context::{RunContext, Sampling};
use crate::prompts::{bullet_list, JOKE_PLAN};
use crate::trace::TraceEvent;

const SAMPLING: Sampling = Sampling::new(0.7, 150);

/// Ask for a comedic strategy anchored on every observation in
/// `combination`. `None` when the completion is unavailable; empty
/// combinations are never formulated.
///
/// The returned plan's `id` is 0; the orchestrator assigns ids as plans are
/// accepted.
pub async fn formulate(
    ctx: &RunContext<'_>,
    topic: &str,
    combination: &ObservationCombination,
    model: &str,
) -> Option<Plan> {
    if combination.is_empty() {
        return None;
    }

    let observations = combination.texts();
    let prompt = JOKE_PLAN.render(&[
        ("topic", topic),
        ("observations", &bullet_list(&observations)),
    ]);
    let completion = ctx.complete(callers::PLAN, model, &prompt, SAMPLING).await;

    ctx.record(TraceEvent::Plan {
        observations,
        plan: completion.text.clone(),
        call: completion.call,
    });

    completion.text.map(|text| Plan {
        id: 0,
        topic: topic.to_string(),
        text,
        combination: combination.clone(),
    })
}
