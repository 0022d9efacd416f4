//! Usage tracking via the UsageSink trait.
//!
//! The gateway logs all calls through a UsageSink. This decouples the gateway
//! from any specific storage backend:
//! - The CLI uses TallyUsageSink to report run totals
//! - StderrUsageSink emits one JSON line per call
//! - Tests use NoopUsageSink

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

/// Status of a provider call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    Success,
    Error,
}

impl CallStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CallStatus::Success => "success",
            CallStatus::Error => "error",
        }
    }
}

/// Record of a provider API call for logging.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderCallRecord {
    /// Provider name: "openrouter", etc.
    pub provider: &'static str,
    /// Endpoint: "chat/completions".
    pub endpoint: &'static str,
    /// Model used.
    pub model: String,
    /// Input tokens consumed.
    pub input_tokens: u32,
    /// Output tokens generated.
    pub output_tokens: u32,
    /// Cost in nanodollars (1e-9 USD).
    pub cost_nanodollars: i64,
    /// Provider-reported upstream inference cost in nanodollars, if available.
    pub upstream_cost_nanodollars: Option<i64>,
    /// Pipeline run this call belongs to (if any).
    pub run_id: Option<Uuid>,
    /// Latency in milliseconds.
    pub latency_ms: u64,
    /// Call status.
    pub status: CallStatus,
    /// Error code if status is Error.
    pub error_code: Option<String>,
    /// Which code path made this call.
    pub caller: &'static str,
    /// When the call was made.
    pub timestamp: DateTime<Utc>,
}

impl ProviderCallRecord {
    /// Create a new record with required fields, defaulting others.
    pub fn new(
        provider: &'static str,
        endpoint: &'static str,
        model: impl Into<String>,
        caller: &'static str,
    ) -> Self {
        Self {
            provider,
            endpoint,
            model: model.into(),
            input_tokens: 0,
            output_tokens: 0,
            cost_nanodollars: 0,
            upstream_cost_nanodollars: None,
            run_id: None,
            latency_ms: 0,
            status: CallStatus::Success,
            error_code: None,
            caller,
            timestamp: Utc::now(),
        }
    }

    pub fn tokens(mut self, input: u32, output: u32) -> Self {
        self.input_tokens = input;
        self.output_tokens = output;
        self
    }

    pub fn cost(mut self, nanodollars: i64) -> Self {
        self.cost_nanodollars = nanodollars;
        self
    }

    pub fn upstream_cost(mut self, nanodollars: Option<i64>) -> Self {
        self.upstream_cost_nanodollars = nanodollars;
        self
    }

    pub fn run(mut self, run_id: Option<Uuid>) -> Self {
        self.run_id = run_id;
        self
    }

    pub fn latency(mut self, ms: u64) -> Self {
        self.latency_ms = ms;
        self
    }

    pub fn error(mut self, code: impl Into<String>) -> Self {
        self.status = CallStatus::Error;
        self.error_code = Some(code.into());
        self
    }
}

/// Trait for recording provider call usage.
///
/// Implement this trait to customize where usage data is stored.
#[async_trait]
pub trait UsageSink: Send + Sync {
    /// Record a provider call. This should be fire-and-forget:
    /// failures should be logged but not propagated.
    async fn record(&self, record: ProviderCallRecord);
}

/// No-op usage sink that discards all records.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopUsageSink;

#[async_trait]
impl UsageSink for NoopUsageSink {
    async fn record(&self, _record: ProviderCallRecord) {}
}

/// Usage sink that writes each record to stderr as a JSON line.
#[derive(Debug, Clone, Copy, Default)]
pub struct StderrUsageSink;

#[async_trait]
impl UsageSink for StderrUsageSink {
    async fn record(&self, record: ProviderCallRecord) {
        match serde_json::to_string(&record) {
            Ok(line) => eprintln!("{line}"),
            Err(err) => tracing::warn!(error = %err, "failed to serialize usage record"),
        }
    }
}

/// Snapshot of a [`TallyUsageSink`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct UsageTotals {
    pub calls: u64,
    pub failed_calls: u64,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost_nanodollars: i64,
}

impl UsageTotals {
    pub fn cost_usd(&self) -> f64 {
        self.cost_nanodollars as f64 / 1_000_000_000.0
    }
}

/// Usage sink that keeps running totals in memory.
#[derive(Debug, Default)]
pub struct TallyUsageSink {
    calls: AtomicU64,
    failed_calls: AtomicU64,
    input_tokens: AtomicU64,
    output_tokens: AtomicU64,
    cost_nanodollars: AtomicI64,
}

impl TallyUsageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn totals(&self) -> UsageTotals {
        UsageTotals {
            calls: self.calls.load(Ordering::Relaxed),
            failed_calls: self.failed_calls.load(Ordering::Relaxed),
            input_tokens: self.input_tokens.load(Ordering::Relaxed),
            output_tokens: self.output_tokens.load(Ordering::Relaxed),
            cost_nanodollars: self.cost_nanodollars.load(Ordering::Relaxed),
        }
    }
}

#[async_trait]
impl UsageSink for TallyUsageSink {
    async fn record(&self, record: ProviderCallRecord) {
        self.calls.fetch_add(1, Ordering::Relaxed);
        if record.status == CallStatus::Error {
            self.failed_calls.fetch_add(1, Ordering::Relaxed);
        }
        self.input_tokens
            .fetch_add(record.input_tokens as u64, Ordering::Relaxed);
        self.output_tokens
            .fetch_add(record.output_tokens as u64, Ordering::Relaxed);
        self.cost_nanodollars
            .fetch_add(record.cost_nanodollars, Ordering::Relaxed);
    }
}
