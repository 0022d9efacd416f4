//! Minimal end-to-end example for `punchline`.
//!
//! Generates jokes about a topic, checks each against the web and a model's
//! sense of freshness, has a judge score it, and prints the top three.
//!
//! To run:
//! - Set `OPENROUTER_API_KEY` (and optionally `BRAVE_SEARCH_API_KEY`)
//! - `cargo run --example quickstart -- "airport security"`

use std::sync::Arc;

use punchline::gateway::StderrUsageSink;
use punchline::pipeline::{self, ModelChoices, PipelineRequest, RunOptions};
use punchline::search::SearchGateway;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let topic = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "coffee".to_string());

    // -- Capabilities --------------------------------------------------------

    // StderrUsageSink prints one JSON line per provider call with its cost.
    let (gateway, brave) = pipeline::connect_from_env(Arc::new(StderrUsageSink))?;
    let search = brave.as_ref().map(|b| b as &dyn SearchGateway);
    if search.is_none() {
        eprintln!("BRAVE_SEARCH_API_KEY not set; novelty uses the model signal only");
    }

    // -- The request ---------------------------------------------------------

    let mut req = PipelineRequest::new(topic, ModelChoices::uniform(pipeline::DEFAULT_MODEL));
    // A smaller sweep than the default keeps the example cheap.
    req.plansearch.max_plans_to_develop = 3;
    req.call_timeout_secs = Some(60);

    let session = pipeline::run_pipeline(&gateway, search, RunOptions::default(), req).await?;

    // -- Results -------------------------------------------------------------

    println!("status: {:?}", session.status);
    for result in &session.results {
        println!(
            "\n#{} (combined {:.2}, novelty {:.2}, funniness {}/10)\n{}",
            result.rank,
            result.combined_score,
            result.novelty.final_score,
            result.funniness.overall_funniness,
            result.candidate.text
        );
        println!("  plan: {}", result.candidate.plan.text);
    }
    println!(
        "\n{} completion calls, ${:.4}",
        session.usage.completion_calls,
        session.usage.cost_nanodollars as f64 / 1e9
    );

    Ok(())
}
