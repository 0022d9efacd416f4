#![forbid(unsafe_code)]

//! # punchline
//!
//! Generate jokes about a topic by searching over comedic plans, then keep the
//! ones that are both new and funny.
//!
//! A run expands the topic into observations, combines them into joke plans,
//! writes (and optionally critiques and rewrites) a joke per plan, checks each
//! joke against the web and a model's sense of freshness, has a judge score it
//! on a six-part rubric, and returns the top jokes by combined score. Every
//! model interaction is recorded in a per-run trace.

pub mod context;
pub mod gateway;
pub mod pipeline;
pub mod plansearch;
pub mod prompts;
pub mod report;
pub mod scoring;
pub mod search;
pub mod trace;

pub use context::{RunContext, RunUsage};
pub use gateway::{
    Attribution, ChatGateway, ProviderError, ProviderGateway, ScriptedChatGateway, UsageSink,
};
pub use pipeline::{
    connect_from_env, run, run_pipeline, run_pipeline_with_trace_file, ModelChoices,
    PipelineError, PipelineRequest, PipelineSession, RunOptions, RunStatus,
};
pub use plansearch::{CandidateJoke, Observation, Plan, PlanSearchConfig};
pub use report::render_session_markdown;
pub use scoring::{
    FunninessScore, FunninessVerdict, NoveltyConfig, NoveltyScore, RankedResult, ScoreCombiner,
    WeightedAverage,
};
pub use search::{BraveSearchAdapter, FixedSearchGateway, SearchGateway};
pub use trace::{JsonlTraceSink, RunTrace, TraceError, TraceSink, TraceWorker};
