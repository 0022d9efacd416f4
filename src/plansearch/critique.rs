//! Critique generation.

use super::{callers, Critique, Plan};
use crate::context::{RunContext, Sampling};
use crate::prompts::JOKE_CRITIQUE;
use crate::trace::TraceEvent;

const SAMPLING: Sampling = Sampling::new(0.6, 150);

pub async fn critique(
    ctx: &RunContext<'_>,
    joke: &str,
    plan: &Plan,
    model: &str,
) -> Option<Critique> {
    let prompt = JOKE_CRITIQUE.render(&[("plan", &plan.text), ("joke", joke)]);
    let completion = ctx
        .complete(callers::CRITIQUE, model, &prompt, SAMPLING)
        .await;

    ctx.record(TraceEvent::Critique {
        plan: plan.text.clone(),
        joke: joke.to_string(),
        critique: completion.text.clone(),
        call: completion.call,
    });

    completion.text.map(|text| Critique { text })
}
