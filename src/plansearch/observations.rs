//! Observation expansion.

use tracing::debug;

use super::{callers, Observation, ObservationOrder};
use crate::context::{RunContext, Sampling};
use crate::prompts::{bullet_list, OBSERVATIONS_FIRST_ORDER, OBSERVATIONS_SECOND_ORDER};
use crate::trace::TraceEvent;

const SAMPLING: Sampling = Sampling::new(0.8, 300);

/// Brainstorm observations about `topic`.
///
/// With `existing` set, asks for derivative observations built on those and
/// tags the result second-order. An unavailable or empty completion yields an
/// empty list. Duplicates are kept.
pub async fn expand(
    ctx: &RunContext<'_>,
    topic: &str,
    model: &str,
    existing: Option<&[Observation]>,
) -> Vec<Observation> {
    let (prompt, order, context) = match existing {
        Some(existing) => {
            let context: Vec<String> = existing.iter().map(|o| o.text.clone()).collect();
            let prompt = OBSERVATIONS_SECOND_ORDER
                .render(&[("topic", topic), ("observations", &bullet_list(&context))]);
            (prompt, ObservationOrder::Second, context)
        }
        None => (
            OBSERVATIONS_FIRST_ORDER.render(&[("topic", topic)]),
            ObservationOrder::First,
            Vec::new(),
        ),
    };

    let completion = ctx
        .complete(callers::OBSERVATIONS, model, &prompt, SAMPLING)
        .await;

    let generated = completion
        .text
        .as_deref()
        .map(split_lines)
        .unwrap_or_default();
    debug!(topic, order = ?order, count = generated.len(), "observations expanded");

    ctx.record(TraceEvent::Observations {
        order,
        context,
        generated: generated.clone(),
        call: completion.call,
    });

    generated
        .into_iter()
        .map(|text| Observation::new(text, order))
        .collect()
}

fn split_lines(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_trims_and_drops_blank_lines() {
        assert_eq!(
            split_lines("  beans \n\n\tcrema\r\n   \nbeans"),
            vec!["beans", "crema", "beans"]
        );
        assert!(split_lines(" \n ").is_empty());
    }
}
