//! Langfuse public API client: trace ingestion and labeled prompt templates.
//!
//! Traces are buffered as ingestion events and shipped in batches by
//! [`LangfuseClient::flush`]. The buffer is flushed automatically once it
//! reaches `flush_at` events, and explicitly on startup and shutdown.
//!
//! Delivery is best-effort. The buffer holds at most `max_buffered` events
//! (oldest dropped first). A batch the server refuses outright is dropped;
//! after a retryable failure automatic flushes pause for [`FLUSH_BACKOFF`].

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::config::ObservabilityConfig;
use crate::trace::{Trace, TraceSink};

/// One role-tagged message of a compiled chat prompt.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ChatMessage {
    /// Placeholder entries in Langfuse chat prompts carry no role.
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            content: content.into(),
        }
    }
}

/// Template body: Langfuse stores either a chat message list or a plain string.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum PromptBody {
    Chat(Vec<ChatMessage>),
    Text(String),
}

/// A versioned prompt template as returned by `GET /api/public/v2/prompts/{name}`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PromptTemplate {
    pub name: String,
    pub version: u32,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(rename = "prompt")]
    pub body: PromptBody,
}

impl PromptTemplate {
    /// Substitute `{{key}}` placeholders in every message. A text template
    /// compiles to a single user message.
    pub fn compile(&self, variables: &HashMap<String, String>) -> Vec<ChatMessage> {
        match &self.body {
            PromptBody::Chat(messages) => messages
                .iter()
                .map(|m| ChatMessage::new(m.role.clone(), render_template(&m.content, variables)))
                .collect(),
            PromptBody::Text(text) => vec![ChatMessage::new("user", render_template(text, variables))],
        }
    }
}

/// Replace `{{key}}` placeholders in one left-to-right pass. Substituted
/// values are not scanned again; unknown placeholders stay as written.
fn render_template(template: &str, variables: &HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let inner = &rest[open + 2..];
        let Some(close) = inner.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        let key = &inner[..close];
        match variables.get(key) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[open..open + close + 4]),
        }
        rest = &inner[close + 2..];
    }

    out.push_str(rest);
    out
}

/// Source of labeled prompt templates.
#[async_trait]
pub trait PromptSource: Send + Sync {
    /// `Ok(None)` when no template carries the label.
    async fn get_prompt(&self, name: &str, label: &str) -> Result<Option<PromptTemplate>>;
}

/// Stand-in used when no Langfuse keys are configured; every fetch fails.
pub struct NoPromptSource;

#[async_trait]
impl PromptSource for NoPromptSource {
    async fn get_prompt(&self, _name: &str, _label: &str) -> Result<Option<PromptTemplate>> {
        anyhow::bail!("LANGFUSE_PUBLIC_KEY / LANGFUSE_SECRET_KEY are not set")
    }
}

/// Pause between automatic flushes after a retryable ingestion failure.
pub const FLUSH_BACKOFF: Duration = Duration::from_secs(30);

/// Why a batch was not ingested.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("Langfuse ingestion request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Langfuse ingestion rejected batch with HTTP {0}")]
    Rejected(reqwest::StatusCode),
}

impl IngestError {
    /// Transport faults, timeouts, throttling and 5xx may succeed later.
    /// Any other 4xx will be refused again, so the batch is not kept.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Rejected(status) => {
                status.is_server_error()
                    || *status == reqwest::StatusCode::REQUEST_TIMEOUT
                    || *status == reqwest::StatusCode::TOO_MANY_REQUESTS
            }
        }
    }
}

/// Client for a Langfuse server.
pub struct LangfuseClient {
    http: reqwest::Client,
    host: String,
    public_key: String,
    secret_key: String,
    flush_at: usize,
    max_buffered: usize,
    pending: Mutex<Vec<Value>>,
    /// Automatic flushes are skipped until this instant.
    paused_until: Mutex<Option<Instant>>,
}

impl LangfuseClient {
    /// Returns `None` when the key pair is not configured.
    pub fn from_config(config: &ObservabilityConfig) -> Result<Option<Self>> {
        let (Some(public_key), Some(secret_key)) = (&config.public_key, &config.secret_key) else {
            return Ok(None);
        };
        if !config.has_credentials() {
            return Ok(None);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .context("failed to build Langfuse HTTP client")?;
        let flush_at = config.flush_at.max(1);
        Ok(Some(Self {
            http,
            host: config.host.trim_end_matches('/').to_string(),
            public_key: public_key.clone(),
            secret_key: secret_key.clone(),
            flush_at,
            max_buffered: config.max_buffered.max(flush_at),
            pending: Mutex::new(Vec::new()),
            paused_until: Mutex::new(None),
        }))
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Number of events waiting to be shipped.
    pub fn pending(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }

    fn lock_pending(&self) -> Result<std::sync::MutexGuard<'_, Vec<Value>>> {
        self.pending
            .lock()
            .map_err(|e| anyhow::anyhow!("event buffer lock poisoned: {e}"))
    }

    /// Append events, dropping the oldest beyond `max_buffered`. Returns the
    /// buffer length.
    fn enqueue(&self, events: Vec<Value>) -> Result<usize> {
        let mut pending = self.lock_pending()?;
        pending.extend(events);
        drop_oldest(&mut pending, self.max_buffered);
        Ok(pending.len())
    }

    fn take_pending(&self) -> Result<Vec<Value>> {
        Ok(std::mem::take(&mut *self.lock_pending()?))
    }

    /// Put a failed batch back ahead of events buffered since it was taken.
    fn requeue(&self, batch: Vec<Value>) -> Result<()> {
        let mut pending = self.lock_pending()?;
        let newer = std::mem::replace(&mut *pending, batch);
        pending.extend(newer);
        drop_oldest(&mut pending, self.max_buffered);
        Ok(())
    }

    fn auto_flush_paused(&self) -> bool {
        self.paused_until
            .lock()
            .map(|until| matches!(*until, Some(t) if Instant::now() < t))
            .unwrap_or(false)
    }

    fn pause_auto_flush(&self, until: Option<Instant>) {
        if let Ok(mut paused) = self.paused_until.lock() {
            *paused = until;
        }
    }

    async fn send_batch(&self, batch: &[Value]) -> Result<(), IngestError> {
        let response = self
            .http
            .post(format!("{}/api/public/ingestion", self.host))
            .basic_auth(&self.public_key, Some(&self.secret_key))
            .json(&json!({ "batch": batch }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(IngestError::Rejected(status));
        }

        // 207 lists per-event failures in the body.
        let body: Value = response.json().await.unwrap_or(Value::Null);
        let rejected = rejected_events(&body);
        if rejected.is_empty() {
            tracing::debug!(events = batch.len(), %status, "trace batch ingested");
        } else {
            tracing::warn!(
                events = batch.len(),
                rejected = rejected.len(),
                first_error = %rejected[0],
                "Langfuse rejected some trace events"
            );
        }
        Ok(())
    }
}

fn drop_oldest(pending: &mut Vec<Value>, cap: usize) {
    if pending.len() > cap {
        let excess = pending.len() - cap;
        pending.drain(..excess);
        tracing::warn!(dropped = excess, cap, "trace buffer full, dropped oldest events");
    }
}

/// The `errors` array of an ingestion response, empty if absent.
pub fn rejected_events(body: &Value) -> &[Value] {
    body.get("errors")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Translate a finalized trace into Langfuse ingestion events: a
/// `trace-create` for the trace itself and a `generation-create` carrying
/// level, timing and model.
pub fn ingestion_events(trace: &Trace) -> Vec<Value> {
    let now = chrono::Utc::now().to_rfc3339();
    let end_time = trace.end_time.map(|t| t.to_rfc3339());

    let trace_event = json!({
        "id": uuid::Uuid::now_v7().to_string(),
        "timestamp": now,
        "type": "trace-create",
        "body": {
            "id": trace.id,
            "timestamp": trace.start_time.to_rfc3339(),
            "name": trace.name,
            "input": trace.input,
            "output": trace.output,
            "tags": trace.tags,
            "metadata": trace.metadata,
        }
    });

    let generation_event = json!({
        "id": uuid::Uuid::now_v7().to_string(),
        "timestamp": now,
        "type": "generation-create",
        "body": {
            "id": uuid::Uuid::now_v7().to_string(),
            "traceId": trace.id,
            "name": trace.name,
            "model": trace.model,
            "input": trace.input,
            "output": trace.output,
            "startTime": trace.start_time.to_rfc3339(),
            "endTime": end_time,
            "level": trace.level.as_str(),
            "statusMessage": trace.status_message,
            "metadata": trace.metadata,
        }
    });

    vec![trace_event, generation_event]
}

#[async_trait]
impl TraceSink for LangfuseClient {
    async fn record(&self, trace: Trace) -> Result<()> {
        let buffered = self.enqueue(ingestion_events(&trace))?;
        if buffered >= self.flush_at && !self.auto_flush_paused() {
            self.flush().await?;
        }
        Ok(())
    }

    async fn flush(&self) -> Result<()> {
        let batch = self.take_pending()?;
        if batch.is_empty() {
            return Ok(());
        }
        match self.send_batch(&batch).await {
            Ok(()) => {
                self.pause_auto_flush(None);
                Ok(())
            }
            Err(e) if e.is_retryable() => {
                self.requeue(batch)?;
                self.pause_auto_flush(Some(Instant::now() + FLUSH_BACKOFF));
                Err(e.into())
            }
            Err(e) => {
                tracing::warn!(dropped = batch.len(), error = %e, "dropping trace batch");
                Err(e.into())
            }
        }
    }
}

#[async_trait]
impl PromptSource for LangfuseClient {
    async fn get_prompt(&self, name: &str, label: &str) -> Result<Option<PromptTemplate>> {
        let mut url = reqwest::Url::parse(&format!("{}/api/public/v2/prompts/", self.host))
            .context("invalid Langfuse host")?;
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Langfuse host cannot be a base URL"))?
            .pop_if_empty()
            .push(name);
        url.query_pairs_mut().append_pair("label", label);

        let response = self
            .http
            .get(url)
            .basic_auth(&self.public_key, Some(&self.secret_key))
            .send()
            .await
            .context("Langfuse prompt request failed")?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            tracing::warn!(name, label, "prompt template not found");
            return Ok(None);
        }
        anyhow::ensure!(status.is_success(), "Langfuse prompt fetch failed with HTTP {status}");

        let template: PromptTemplate = response
            .json()
            .await
            .context("failed to decode prompt template")?;
        tracing::info!(name, label, version = template.version, "prompt template fetched");
        Ok(Some(template))
    }
}
