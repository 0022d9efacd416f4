//! Joke instantiation.

use super::{callers, Critique, Plan};
use crate::context::{RunContext, Sampling};
use crate::prompts::{JOKE, JOKE_REFINE};
use crate::trace::TraceEvent;

const SAMPLING: Sampling = Sampling::new(0.9, 200);

/// Write a joke from `plan`. With a critique, asks for a revision that
/// addresses it while keeping the plan's core idea.
pub async fn instantiate(
    ctx: &RunContext<'_>,
    topic: &str,
    plan: &Plan,
    model: &str,
    critique: Option<&Critique>,
) -> Option<String> {
    let (caller, prompt) = match critique {
        Some(critique) => (
            callers::REFINE,
            JOKE_REFINE.render(&[
                ("topic", topic),
                ("plan", &plan.text),
                ("critique", &critique.text),
            ]),
        ),
        None => (
            callers::JOKE,
            JOKE.render(&[("topic", topic), ("plan", &plan.text)]),
        ),
    };

    let completion = ctx.complete(caller, model, &prompt, SAMPLING).await;

    ctx.record(TraceEvent::Joke {
        plan: plan.text.clone(),
        critique: critique.map(|c| c.text.clone()),
        joke: completion.text.clone(),
        call: completion.call,
    });

    completion.text
}
