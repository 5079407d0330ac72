use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct ParleyConfig {
    pub general: GeneralConfig,
    pub model: ModelConfig,
    pub observability: ObservabilityConfig,
    pub storage: StorageConfig,
    pub embedding: EmbeddingConfig,
    pub retrieval: RetrievalConfig,
    pub memory: MemoryConfig,
    pub persona: PersonaConfig,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct GeneralConfig {
    pub log_level: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ModelConfig {
    /// Base URL of the Ollama server, without the `/api/generate` suffix.
    pub endpoint: String,
    pub model: String,
    /// Request timeout. `None` leaves the transport default in place.
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub secret_key: Option<String>,
    pub public_key: Option<String>,
    pub host: String,
    /// Number of buffered ingestion events that triggers an automatic flush.
    pub flush_at: usize,
    /// Upper bound on buffered events; the oldest are dropped beyond it.
    pub max_buffered: usize,
    /// Per-request timeout for ingestion and prompt fetches.
    pub timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StorageConfig {
    pub memory_dir: String,
    pub archive_dir: String,
    pub index_path: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: String,
    pub model: String,
    pub cache_dir: String,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RetrievalConfig {
    pub top_k: usize,
    pub separator: String,
    /// Paragraph chunks longer than this are split when ingesting documents.
    pub chunk_chars: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct MemoryConfig {
    pub persona: String,
    /// Upper bound on how much memory text goes into a prompt. 0 disables the bound.
    pub max_prompt_chars: usize,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PersonaConfig {
    pub name: String,
    pub label: String,
    pub variable: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://host.docker.internal:11434".into(),
            model: "llama3.2".into(),
            timeout_secs: None,
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            public_key: None,
            host: "http://host.docker.internal:3000".into(),
            flush_at: 15,
            max_buffered: 1_000,
            timeout_secs: 10,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            memory_dir: "memory".into(),
            archive_dir: "outputs".into(),
            index_path: "vector_store/index.db".into(),
        }
    }
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "local".into(),
            model: "all-MiniLM-L6-v2".into(),
            cache_dir: "models/all-MiniLM-L6-v2".into(),
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            top_k: 3,
            separator: "\n---\n".into(),
            chunk_chars: 1000,
        }
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            persona: "general".into(),
            max_prompt_chars: 16_000,
        }
    }
}

impl Default for PersonaConfig {
    fn default() -> Self {
        Self {
            name: "carl_jung".into(),
            label: "production".into(),
            variable: "user_input".into(),
        }
    }
}

/// Returns `~/.parley/`
pub fn default_parley_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".parley")
}

/// Returns the default config file path: `~/.parley/config.toml`
pub fn default_config_path() -> PathBuf {
    default_parley_dir().join("config.toml")
}

impl ParleyConfig {
    /// Load config from the default TOML file (if it exists) then apply env var overrides.
    pub fn load() -> Result<Self> {
        Self::load_from(default_config_path())
    }

    /// Load from a specific path, then apply env var overrides.
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents =
                std::fs::read_to_string(path).context("failed to read config file")?;
            toml::from_str(&contents).context("failed to parse config TOML")?
        } else {
            info!("no config file at {}, using defaults", path.display());
            ParleyConfig::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides. The Langfuse variables keep their
    /// upstream names so an existing Langfuse setup works unchanged.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("LANGFUSE_SECRET_KEY") {
            self.observability.secret_key = Some(val);
        }
        if let Ok(val) = std::env::var("LANGFUSE_PUBLIC_KEY") {
            self.observability.public_key = Some(val);
        }
        if let Ok(val) = std::env::var("LANGFUSE_HOST") {
            self.observability.host = val;
        }
        if let Ok(val) = std::env::var("PARLEY_MODEL") {
            self.model.model = val;
        }
        if let Ok(val) = std::env::var("PARLEY_MODEL_ENDPOINT") {
            self.model.endpoint = val;
        }
        if let Ok(val) = std::env::var("PARLEY_INDEX") {
            self.storage.index_path = val;
        }
        if let Ok(val) = std::env::var("PARLEY_LOG_LEVEL") {
            self.general.log_level = val;
        }
    }

    /// Resolve the vector index path, expanding `~` if needed.
    pub fn resolved_index_path(&self) -> PathBuf {
        expand_tilde(&self.storage.index_path)
    }

    pub fn resolved_memory_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.memory_dir)
    }

    pub fn resolved_archive_dir(&self) -> PathBuf {
        expand_tilde(&self.storage.archive_dir)
    }
}

impl ObservabilityConfig {
    /// Both keys present means traces can be shipped to Langfuse.
    pub fn has_credentials(&self) -> bool {
        matches!(
            (&self.public_key, &self.secret_key),
            (Some(p), Some(s)) if !p.is_empty() && !s.is_empty()
        )
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        match dirs::home_dir() {
            Some(home) => home.join(rest),
            None => PathBuf::from(path),
        }
    } else {
        PathBuf::from(path)
    }
}
