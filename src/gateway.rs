//! Model gateway: one traced, non-streaming `POST /api/generate` per prompt.
//!
//! The response body is classified into a [`ModelReply`]. Application-level
//! failures reported by the model server come back as printable text; only
//! transport faults and undecodable bodies are returned as [`GatewayError`].

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

use crate::config::ModelConfig;
use crate::trace::{Trace, TraceRecorder};

/// Trace name used for every model call.
pub const TRACE_NAME: &str = "ollama_request";

/// Fatal gateway faults. Soft failures never appear here.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("model request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("model response was not valid JSON: {0}")]
    Decode(#[source] serde_json::Error),
}

/// Classified response payload.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelReply {
    /// `{"response": "..."}`
    Success(String),
    /// `{"error": ...}`
    SoftError(String),
    /// Anything else.
    UnexpectedShape(Value),
}

impl ModelReply {
    pub fn classify(payload: Value) -> Self {
        if let Some(text) = payload.get("response").and_then(Value::as_str) {
            return Self::Success(text.to_string());
        }
        match payload.get("error") {
            Some(Value::String(msg)) => Self::SoftError(msg.clone()),
            Some(other) => Self::SoftError(other.to_string()),
            None => Self::UnexpectedShape(payload),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Text handed back to the caller. Soft failures carry a prefix so they
    /// read as diagnostics when printed in place of a reply.
    pub fn into_text(self) -> String {
        match self {
            Self::Success(text) => text,
            Self::SoftError(msg) => format!("[Ollama API Error] {msg}"),
            Self::UnexpectedShape(raw) => format!("[Ollama API Unexpected Response] {raw}"),
        }
    }

    /// What goes into the trace output: the raw value, without the prefix.
    fn trace_output(&self) -> String {
        match self {
            Self::Success(text) | Self::SoftError(text) => text.clone(),
            Self::UnexpectedShape(raw) => raw.to_string(),
        }
    }
}

/// Anything that can turn a prompt into generated text.
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, prompt: &str, tags: &[&str]) -> Result<String, GatewayError>;
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// HTTP client for a local Ollama server, wrapped by a [`TraceRecorder`].
pub struct ModelGateway {
    http: reqwest::Client,
    url: String,
    model: String,
    recorder: TraceRecorder,
}

impl ModelGateway {
    pub fn new(config: &ModelConfig, recorder: TraceRecorder) -> Result<Self, GatewayError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            http: builder.build()?,
            url: format!("{}/api/generate", config.endpoint.trim_end_matches('/')),
            model: config.model.clone(),
            recorder,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn request(&self, prompt: &str) -> Result<ModelReply, GatewayError> {
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
        };
        let response = self.http.post(&self.url).json(&body).send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let payload: Value = serde_json::from_slice(&bytes).map_err(GatewayError::Decode)?;
        tracing::debug!(%status, "model response received");
        Ok(ModelReply::classify(payload))
    }
}

#[async_trait]
impl Generator for ModelGateway {
    async fn generate(&self, prompt: &str, tags: &[&str]) -> Result<String, GatewayError> {
        let mut trace = Trace::start(TRACE_NAME, prompt)
            .with_model(&self.model)
            .with_tags(tags);
        let started = Instant::now();
        let outcome = self.request(prompt).await;
        let latency = started.elapsed().as_secs_f64();

        match outcome {
            Ok(reply) => {
                match &reply {
                    ModelReply::Success(text) => trace.succeed(text.as_str(), latency),
                    ModelReply::SoftError(_) => {
                        trace.fail(reply.trace_output(), latency, "model api error")
                    }
                    ModelReply::UnexpectedShape(_) => {
                        trace.fail(reply.trace_output(), latency, "unexpected response shape")
                    }
                }
                if !reply.is_success() {
                    tracing::warn!(model = %self.model, latency, output = %reply.trace_output(), "model returned a soft failure");
                } else {
                    tracing::info!(model = %self.model, latency, "model call completed");
                }
                self.recorder.submit(trace).await;
                Ok(reply.into_text())
            }
            Err(e) => {
                trace.fail(e.to_string(), latency, "transport fault");
                tracing::error!(model = %self.model, latency, error = %e, "model call failed");
                self.recorder.submit(trace).await;
                Err(e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn classify_success_keeps_text_verbatim() {
        let reply = ModelReply::classify(json!({"response": "  spaced \n", "done": true}));
        assert_eq!(reply, ModelReply::Success("  spaced \n".into()));
        assert_eq!(reply.into_text(), "  spaced \n");
    }

    #[test]
    fn classify_error_field() {
        let reply = ModelReply::classify(json!({"error": "model 'x' not found"}));
        assert_eq!(reply, ModelReply::SoftError("model 'x' not found".into()));
        assert_eq!(reply.into_text(), "[Ollama API Error] model 'x' not found");
    }

    #[test]
    fn classify_non_string_error() {
        let reply = ModelReply::classify(json!({"error": {"code": 500}}));
        assert_eq!(reply.into_text(), r#"[Ollama API Error] {"code":500}"#);
    }

    #[test]
    fn classify_unknown_shape() {
        let reply = ModelReply::classify(json!({"status": "loading"}));
        assert!(matches!(reply, ModelReply::UnexpectedShape(_)));
        assert_eq!(
            reply.into_text(),
            r#"[Ollama API Unexpected Response] {"status":"loading"}"#
        );
    }

    #[test]
    fn non_string_response_is_unexpected() {
        let reply = ModelReply::classify(json!({"response": 42}));
        assert!(matches!(reply, ModelReply::UnexpectedShape(_)));
    }

    #[test]
    fn endpoint_trailing_slash_is_trimmed() {
        let config = ModelConfig {
            endpoint: "http://localhost:11434/".into(),
            model: "llama3.2".into(),
            timeout_secs: Some(5),
        };
        let recorder = TraceRecorder::new(std::sync::Arc::new(crate::trace::MemorySink::new()));
        let gateway = ModelGateway::new(&config, recorder).unwrap();
        assert_eq!(gateway.url, "http://localhost:11434/api/generate");
        assert_eq!(gateway.model(), "llama3.2");
    }
}
