//! Per-run transparency trace and JSONL streaming.
//!
//! Every stage of a run appends an entry describing what it asked the model,
//! what came back, and what was parsed from it. A trace belongs to exactly
//! one run; a new run starts a new trace.

use serde::{Deserialize, Serialize};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc;
use std::time::{SystemTime, UNIX_EPOCH};
use uuid::Uuid;

use crate::plansearch::ObservationOrder;
use crate::scoring::funniness::FunninessVerdict;
use crate::scoring::novelty::NoveltyScore;

/// One completion call as seen by the trace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallTrace {
    pub caller: String,
    pub model: String,
    pub template_slug: String,
    pub prompt_hash: String,
    /// Raw response text, kept even when it could not be parsed.
    pub response: Option<String>,
    pub error: Option<String>,
    pub input_tokens: u32,
    pub output_tokens: u32,
    pub latency_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "stage", rename_all = "snake_case")]
pub enum TraceEvent {
    Observations {
        order: ObservationOrder,
        context: Vec<String>,
        generated: Vec<String>,
        call: CallTrace,
    },
    Plan {
        observations: Vec<String>,
        plan: Option<String>,
        call: CallTrace,
    },
    Joke {
        plan: String,
        critique: Option<String>,
        joke: Option<String>,
        call: CallTrace,
    },
    Critique {
        plan: String,
        joke: String,
        critique: Option<String>,
        call: CallTrace,
    },
    /// A refinement identical to its original; the refined text is dropped.
    RefinementDiscarded { candidate_id: usize },
    NoveltyCheck {
        candidate_id: usize,
        score: NoveltyScore,
        perceived_call: Option<CallTrace>,
    },
    Evaluation {
        candidate_id: usize,
        verdict: FunninessVerdict,
        call: CallTrace,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEntry {
    pub run_id: Uuid,
    pub index: usize,
    pub timestamp_ms: i64,
    #[serde(flatten)]
    pub event: TraceEvent,
}

/// Per-stage counts for a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceSummary {
    pub observation_sets: usize,
    pub plans: usize,
    pub jokes_generated: usize,
    pub critiques: usize,
    pub novelty_checks: usize,
    pub evaluations: usize,
}

/// The trace of one run, in recording order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunTrace {
    pub run_id: Uuid,
    pub topic: String,
    pub entries: Vec<TraceEntry>,
}

impl RunTrace {
    pub fn new(run_id: Uuid, topic: impl Into<String>) -> Self {
        Self {
            run_id,
            topic: topic.into(),
            entries: Vec::new(),
        }
    }

    pub(crate) fn push(&mut self, event: TraceEvent) -> &TraceEntry {
        let index = self.entries.len();
        self.entries.push(TraceEntry {
            run_id: self.run_id,
            index,
            timestamp_ms: now_epoch_ms(),
            event,
        });
        &self.entries[index]
    }

    /// Count the stages that produced something.
    pub fn summary(&self) -> TraceSummary {
        let mut summary = TraceSummary::default();
        for entry in &self.entries {
            match &entry.event {
                TraceEvent::Observations { generated, .. } if !generated.is_empty() => {
                    summary.observation_sets += 1
                }
                TraceEvent::Plan { plan: Some(_), .. } => summary.plans += 1,
                TraceEvent::Joke { joke: Some(_), .. } => summary.jokes_generated += 1,
                TraceEvent::Critique {
                    critique: Some(_), ..
                } => summary.critiques += 1,
                TraceEvent::NoveltyCheck { .. } => summary.novelty_checks += 1,
                TraceEvent::Evaluation { verdict, .. } if verdict.is_scored() => {
                    summary.evaluations += 1
                }
                _ => {}
            }
        }
        summary
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("trace channel closed")]
    Closed,
    #[error("trace worker failed: {0}")]
    Join(String),
}

pub trait TraceSink: Send + Sync {
    fn record(&self, entry: TraceEntry) -> Result<(), TraceError>;
}

/// Streams trace entries to a JSONL file from a background thread.
#[derive(Clone)]
pub struct JsonlTraceSink {
    sender: mpsc::Sender<TraceEntry>,
}

pub struct TraceWorker {
    handle: Option<std::thread::JoinHandle<Result<(), TraceError>>>,
}

impl TraceWorker {
    /// Wait for the writer to drain. Drop every sink clone first.
    pub fn join(mut self) -> Result<(), TraceError> {
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => Err(TraceError::Join("trace worker panicked".to_string())),
            },
            None => Ok(()),
        }
    }
}

impl JsonlTraceSink {
    pub fn new(path: impl AsRef<Path>) -> Result<(Self, TraceWorker), TraceError> {
        let file = std::fs::File::create(path)?;
        let (sender, receiver) = mpsc::channel::<TraceEntry>();
        let handle = std::thread::spawn(move || write_trace_loop(file, receiver));
        Ok((
            Self { sender },
            TraceWorker {
                handle: Some(handle),
            },
        ))
    }
}

impl TraceSink for JsonlTraceSink {
    fn record(&self, entry: TraceEntry) -> Result<(), TraceError> {
        self.sender.send(entry).map_err(|_| TraceError::Closed)
    }
}

fn write_trace_loop(
    file: std::fs::File,
    receiver: mpsc::Receiver<TraceEntry>,
) -> Result<(), TraceError> {
    let mut writer = BufWriter::new(file);
    for entry in receiver {
        let line = serde_json::to_string(&entry).map_err(|e| TraceError::Serde(e.to_string()))?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
    }
    writer.flush()?;
    Ok(())
}

pub fn now_epoch_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
