//! Human-readable rendering of a finished run.

use crate::pipeline::{PipelineSession, RunStatus};
use crate::plansearch::ObservationOrder;
use crate::scoring::{PerceivedSource, RankedResult, WebCheck};

pub fn render_session_markdown(session: &PipelineSession) -> String {
    let mut out = String::new();
    out.push_str(&format!("# Jokes about {}\n\n", session.topic));
    out.push_str(&format!("- Run: `{}`\n", session.id));
    out.push_str(&format!("- Created: {}\n", session.created_at));
    out.push_str(&format!("- Status: {}\n", status_label(session.status)));
    out.push_str(&format!(
        "- Observations/plans/candidates: {}/{}/{}\n",
        session.observations.len(),
        session.plans.len(),
        session.candidates.len()
    ));
    out.push_str(&format!(
        "- Completion calls (failed): {} ({})\n",
        session.usage.completion_calls, session.usage.failed_completion_calls
    ));
    out.push_str(&format!("- Search calls: {}\n", session.usage.search_calls));
    out.push_str(&format!(
        "- Tokens in/out: {}/{}\n",
        session.usage.input_tokens, session.usage.output_tokens
    ));
    out.push_str(&format!(
        "- Cost: ${:.6}\n",
        session.usage.cost_nanodollars as f64 / 1e9
    ));

    match session.status {
        RunStatus::NoObservations => {
            out.push_str("\nCould not generate any ideas for this topic.\n");
            return out;
        }
        _ if session.results.is_empty() => {
            out.push_str("\nNo candidate was fully scored.\n");
        }
        _ => {}
    }

    for result in &session.results {
        render_result(&mut out, result);
    }

    out.push_str("\n## Observations\n\n");
    for obs in &session.observations {
        let tag = match obs.order {
            ObservationOrder::First => "1st",
            ObservationOrder::Second => "2nd",
        };
        out.push_str(&format!("- [{tag}] {}\n", obs.text));
    }

    out
}

fn render_result(out: &mut String, result: &RankedResult) {
    let candidate = &result.candidate;
    out.push_str(&format!(
        "\n## {}. (combined {:.3})\n\n",
        result.rank, result.combined_score
    ));
    for line in candidate.text.lines() {
        out.push_str(&format!("> {line}\n"));
    }
    out.push('\n');
    out.push_str(&format!("- Plan: {}\n", candidate.plan.text));
    out.push_str(&format!(
        "- Built from: {}\n",
        candidate.plan.combination.texts().join(" | ")
    ));
    if let Some(critique) = &candidate.critique {
        out.push_str(&format!("- Refined after critique: {}\n", critique.text));
    }

    let novelty = &result.novelty;
    let web = match novelty.web_check {
        WebCheck::NoSearch => "not searched".to_string(),
        WebCheck::Unavailable => "search unavailable".to_string(),
        WebCheck::Failed => "search failed".to_string(),
        WebCheck::Searched { hits } => format!("{hits} hit(s)"),
    };
    let perceived_source = match novelty.perceived_source {
        PerceivedSource::Model => "model",
        PerceivedSource::Default => "default",
    };
    out.push_str(&format!(
        "- Novelty {:.3}: perceived {:.2} ({perceived_source}), web penalty {:.2} ({web})\n",
        novelty.final_score, novelty.perceived_novelty, novelty.web_found_penalty
    ));

    let f = &result.funniness;
    out.push_str(&format!(
        "- Funniness {}/10: originality {}, coherence {}, setup {}, punchline {}, brevity {}\n",
        f.overall_funniness,
        f.originality,
        f.coherence,
        f.setup_effectiveness,
        f.punchline_impact,
        f.brevity
    ));
    if !f.rationale.trim().is_empty() {
        out.push_str(&format!("- Judge: {}\n", f.rationale.trim()));
    }
}

fn status_label(status: RunStatus) -> &'static str {
    match status {
        RunStatus::Completed => "completed",
        RunStatus::Cancelled => "cancelled",
        RunStatus::NoObservations => "no observations",
    }
}
