#![allow(dead_code)]

use std::collections::VecDeque;
use std::io::Cursor;
use std::sync::Mutex;

use anyhow::Result;
use async_trait::async_trait;
use parley::config::ModelConfig;
use parley::embedding::{EmbeddingProvider, EMBEDDING_DIM};
use parley::gateway::{GatewayError, Generator};
use parley::session::Console;
use rusqlite::Connection;

/// Open a fresh in-memory index with schema and migrations applied.
pub fn test_db() -> Connection {
    parley::db::open_memory_index().unwrap()
}

/// Deterministic 384-dim embedding with a spike at position `seed`.
pub fn test_embedding(seed: usize) -> Vec<f32> {
    let mut v = vec![0.0f32; EMBEDDING_DIM];
    v[seed % EMBEDDING_DIM] = 1.0;
    v
}

/// Embeds text by its first keyword match: texts mentioning `keywords[i]`
/// land on spike `i`, anything else on the last dimension.
pub struct KeywordEmbedder {
    pub keywords: Vec<&'static str>,
}

impl EmbeddingProvider for KeywordEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lower = text.to_lowercase();
        let seed = self
            .keywords
            .iter()
            .position(|k| lower.contains(k))
            .unwrap_or(EMBEDDING_DIM - 1);
        Ok(test_embedding(seed))
    }
}

/// One scripted generator outcome.
pub enum Scripted {
    Reply(&'static str),
    Fatal,
}

/// Generator that replays scripted outcomes and records every call.
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Scripted>>,
    calls: Mutex<Vec<(String, Vec<String>)>>,
}

impl ScriptedGenerator {
    pub fn new(script: Vec<Scripted>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn replying(reply: &'static str) -> Self {
        Self::new((0..16).map(|_| Scripted::Reply(reply)).collect())
    }

    /// `(prompt, tags)` for every call, in order.
    pub fn calls(&self) -> Vec<(String, Vec<String>)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Generator for ScriptedGenerator {
    async fn generate(&self, prompt: &str, tags: &[&str]) -> Result<String, GatewayError> {
        self.calls.lock().unwrap().push((
            prompt.to_string(),
            tags.iter().map(|t| t.to_string()).collect(),
        ));
        match self.script.lock().unwrap().pop_front() {
            Some(Scripted::Reply(text)) => Ok(text.to_string()),
            Some(Scripted::Fatal) | None => Err(decode_error()),
        }
    }
}

/// A fatal gateway fault, as produced by an undecodable body.
pub fn decode_error() -> GatewayError {
    GatewayError::Decode(serde_json::from_str::<serde_json::Value>("<html>").unwrap_err())
}

/// Console fed from `input`, capturing output.
pub fn console(input: &str) -> Console<Cursor<String>, Vec<u8>> {
    Console::new(Cursor::new(input.to_string()), Vec::new())
}

pub fn output(console: Console<Cursor<String>, Vec<u8>>) -> String {
    String::from_utf8(console.into_output()).unwrap()
}

pub fn model_config(endpoint: &str) -> ModelConfig {
    ModelConfig {
        endpoint: endpoint.to_string(),
        model: "llama3.2".to_string(),
        timeout_secs: Some(5),
    }
}
