//! Per-call trace records and the sinks that receive them.
//!
//! A [`Trace`] is opened when a model call starts and finalized exactly once,
//! either as a success or as an error. The [`TraceRecorder`] hands finalized
//! traces to a [`TraceSink`]; submission is best-effort and never changes the
//! outcome of the call being traced.

use std::sync::{Arc, Mutex};

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Severity of a finalized trace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Level {
    Default,
    Error,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "DEFAULT",
            Self::Error => "ERROR",
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One model invocation's input, outcome and timing.
#[derive(Debug, Clone, Serialize)]
pub struct Trace {
    /// UUID v7 (time-sortable).
    pub id: String,
    pub name: String,
    pub input: String,
    pub output: Option<String>,
    pub tags: Vec<String>,
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub level: Level,
    /// Short reason attached to error-level traces.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status_message: Option<String>,
    /// Model identifier the call was addressed to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
}

impl Trace {
    /// Open a trace for a call named `name` with the raw `input`.
    pub fn start(name: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::now_v7().to_string(),
            name: name.into(),
            input: input.into(),
            output: None,
            tags: Vec::new(),
            metadata: serde_json::Map::new(),
            level: Level::Default,
            status_message: None,
            model: None,
            start_time: Utc::now(),
            end_time: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_tags(mut self, tags: &[&str]) -> Self {
        self.tags = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// Finalize as a success.
    pub fn succeed(&mut self, output: impl Into<String>, latency_secs: f64) {
        self.finish(output.into(), latency_secs, Level::Default, None);
    }

    /// Finalize at error level. `reason` ends up as the status message.
    pub fn fail(&mut self, output: impl Into<String>, latency_secs: f64, reason: &str) {
        self.finish(output.into(), latency_secs, Level::Error, Some(reason.to_string()));
    }

    fn finish(&mut self, output: String, latency_secs: f64, level: Level, reason: Option<String>) {
        self.output = Some(output);
        self.level = level;
        self.status_message = reason;
        self.metadata.insert(
            "latency".into(),
            serde_json::json!(latency_secs.max(0.0)),
        );
        self.end_time = Some(Utc::now());
    }

    pub fn is_finalized(&self) -> bool {
        self.end_time.is_some()
    }

    /// Recorded latency in seconds, if the trace has been finalized.
    pub fn latency(&self) -> Option<f64> {
        self.metadata.get("latency").and_then(|v| v.as_f64())
    }
}

/// Destination for finalized traces.
#[async_trait]
pub trait TraceSink: Send + Sync {
    /// Accept one finalized trace. Implementations may buffer.
    async fn record(&self, trace: Trace) -> Result<()>;

    /// Deliver anything buffered.
    async fn flush(&self) -> Result<()> {
        Ok(())
    }
}

/// Sink used when no observability backend is configured: the trace is
/// emitted as a structured log event and dropped.
pub struct LogSink;

#[async_trait]
impl TraceSink for LogSink {
    async fn record(&self, trace: Trace) -> Result<()> {
        match trace.level {
            Level::Default => tracing::debug!(
                trace_id = %trace.id,
                name = %trace.name,
                latency = trace.latency().unwrap_or_default(),
                tags = ?trace.tags,
                "trace recorded"
            ),
            Level::Error => tracing::warn!(
                trace_id = %trace.id,
                name = %trace.name,
                latency = trace.latency().unwrap_or_default(),
                status = trace.status_message.as_deref().unwrap_or(""),
                "error trace recorded"
            ),
        }
        Ok(())
    }
}

/// Keeps every trace in memory. Useful for inspection and tests.
#[derive(Default)]
pub struct MemorySink {
    traces: Mutex<Vec<Trace>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn traces(&self) -> Vec<Trace> {
        self.traces
            .lock()
            .map(|t| t.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl TraceSink for MemorySink {
    async fn record(&self, trace: Trace) -> Result<()> {
        self.traces
            .lock()
            .map_err(|e| anyhow::anyhow!("trace buffer lock poisoned: {e}"))?
            .push(trace);
        Ok(())
    }
}

/// Hands finalized traces to the configured sink.
#[derive(Clone)]
pub struct TraceRecorder {
    sink: Arc<dyn TraceSink>,
}

impl TraceRecorder {
    pub fn new(sink: Arc<dyn TraceSink>) -> Self {
        Self { sink }
    }

    /// Submit a finalized trace. Sink failures are logged and swallowed so
    /// they can never replace the traced call's own result.
    pub async fn submit(&self, trace: Trace) {
        debug_assert!(trace.is_finalized(), "trace submitted before finalization");
        let id = trace.id.clone();
        if let Err(e) = self.sink.record(trace).await {
            tracing::warn!(trace_id = %id, error = %e, "failed to record trace");
        }
    }

    /// Flush the sink, logging rather than propagating failures.
    pub async fn flush(&self) {
        if let Err(e) = self.sink.flush().await {
            tracing::warn!(error = %e, "failed to flush traces");
        }
    }
}
