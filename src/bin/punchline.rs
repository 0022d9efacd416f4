#![forbid(unsafe_code)]

use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{info, warn};

use punchline::gateway::TallyUsageSink;
use punchline::pipeline::{
    self, ModelChoices, PipelineRequest, PipelineSession, RunOptions, RunStatus,
};
use punchline::report::render_session_markdown;
use punchline::search::SearchGateway;

#[derive(Parser)]
#[command(name = "punchline", version, about = "Plan-search joke generator")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate, score, and rank jokes about a topic (LLM + web search calls)
    Generate {
        /// Path to pipeline request JSON
        #[arg(long, group = "input")]
        request: Option<PathBuf>,

        /// Topic text (alternative to --request)
        #[arg(long, group = "input")]
        topic: Option<String>,

        /// OpenRouter model ID used for every role not set explicitly
        #[arg(long, default_value = pipeline::DEFAULT_MODEL)]
        model: String,

        #[arg(long)]
        observation_model: Option<String>,
        #[arg(long)]
        plan_model: Option<String>,
        #[arg(long)]
        joke_model: Option<String>,
        #[arg(long)]
        critique_model: Option<String>,
        #[arg(long)]
        novelty_model: Option<String>,
        #[arg(long)]
        judge_model: Option<String>,

        /// Number of jokes to return
        #[arg(long)]
        top: Option<usize>,

        /// Skip critique-driven refinement
        #[arg(long)]
        no_critique: bool,

        /// Skip the web check even if BRAVE_SEARCH_API_KEY is set
        #[arg(long)]
        no_search: bool,

        /// Per-call timeout in seconds
        #[arg(long)]
        timeout_secs: Option<u64>,

        /// Output session JSON
        #[arg(long)]
        out: PathBuf,

        /// JSONL trace output
        #[arg(long)]
        trace: Option<PathBuf>,

        /// Also write a markdown report
        #[arg(long)]
        report: Option<PathBuf>,
    },
    /// Render a markdown report from a session JSON
    Report {
        #[arg(long)]
        session: PathBuf,
        /// Defaults to stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Generate {
            request,
            topic,
            model,
            observation_model,
            plan_model,
            joke_model,
            critique_model,
            novelty_model,
            judge_model,
            top,
            no_critique,
            no_search,
            timeout_secs,
            out,
            trace,
            report,
        } => {
            let mut req: PipelineRequest = if let Some(path) = request {
                read_json(&path)?
            } else if let Some(topic) = topic {
                let base = ModelChoices::uniform(model);
                let models = ModelChoices {
                    observation: observation_model.unwrap_or(base.observation),
                    plan: plan_model.unwrap_or(base.plan),
                    joke: joke_model.unwrap_or(base.joke),
                    critique: critique_model.or(base.critique),
                    novelty: novelty_model.or(base.novelty),
                    judge: judge_model.unwrap_or(base.judge),
                };
                PipelineRequest::new(topic, models)
            } else {
                return Err("generate requires --request or --topic".into());
            };

            if let Some(top) = top {
                req.num_top_jokes = top;
            }
            if no_critique {
                req.plansearch.use_critique_refinement = false;
            }
            if timeout_secs.is_some() {
                req.call_timeout_secs = timeout_secs;
            }
            // Fail on bad input before touching credentials.
            req.validate()?;

            let usage = Arc::new(TallyUsageSink::new());
            let (gateway, brave) = pipeline::connect_from_env(usage.clone())?;
            let search: Option<&dyn SearchGateway> = if no_search {
                None
            } else {
                brave.as_ref().map(|b| b as &dyn SearchGateway)
            };

            let cancel = Arc::new(AtomicBool::new(false));
            {
                let cancel = cancel.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        warn!("interrupt received; finishing with partial results");
                        cancel.store(true, Ordering::SeqCst);
                    }
                });
            }

            let options = RunOptions {
                cancel: Some(cancel.as_ref()),
                ..RunOptions::default()
            };
            let session =
                pipeline::run_pipeline_with_trace_file(&gateway, search, options, trace, req)
                    .await?;

            write_json(&out, &session)?;
            info!(path = %out.display(), "session written");

            if let Some(path) = report {
                std::fs::write(&path, render_session_markdown(&session))?;
                info!(path = %path.display(), "report written");
            }

            print_results(&session);
            let totals = usage.totals();
            info!(
                calls = totals.calls,
                failed = totals.failed_calls,
                cost_usd = totals.cost_usd(),
                "provider usage"
            );
        }
        Commands::Report { session, out } => {
            let session: PipelineSession = read_json(&session)?;
            let markdown = render_session_markdown(&session);
            match out {
                Some(path) => std::fs::write(path, markdown)?,
                None => print!("{markdown}"),
            }
        }
    }

    Ok(())
}

fn print_results(session: &PipelineSession) {
    match session.status {
        RunStatus::NoObservations => {
            println!("{}", no_ideas_message(&session.topic));
            return;
        }
        _ if session.results.is_empty() => {
            println!("No jokes survived scoring ({:?}).", session.status);
            return;
        }
        _ => {}
    }
    for result in &session.results {
        println!(
            "{}. [{:.3}] {}",
            result.rank, result.combined_score, result.candidate.text
        );
    }
}

fn no_ideas_message(topic: &str) -> String {
    format!("Could not generate any ideas for \"{topic}\"; no jokes were written.")
}

fn read_json<T: serde::de::DeserializeOwned>(
    path: &PathBuf,
) -> Result<T, Box<dyn std::error::Error>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: serde::Serialize>(path: &PathBuf, value: &T) -> Result<(), io::Error> {
    let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
    std::fs::write(path, json)
}
