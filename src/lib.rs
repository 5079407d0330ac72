//! Terminal assistant for a locally hosted Ollama model.
//!
//! Parley routes text typed at a numbered menu to one language model. Each
//! menu option assembles the prompt differently:
//!
//! | Option | Mode | Context added to the prompt |
//! |--------|------|-----------------------------|
//! | 0 | Direct chat | none |
//! | 1 | Life assistant | the persona's memory file |
//! | 2 | Document assistant | top-k chunks from a sqlite-vec collection |
//! | 3 | Persona chat | a labeled Langfuse prompt template |
//!
//! Every model call is traced (Langfuse ingestion API when keys are set,
//! the log otherwise).
//!
//! # Modules
//!
//! - [`config`]: TOML configuration with environment overrides
//! - [`gateway`]: the Ollama `/api/generate` client and reply classification
//! - [`trace`], [`langfuse`]: trace records, sinks and the Langfuse client
//! - [`context`]: prompt assembly for each mode
//! - [`memory`], [`archive`]: plain-file persistence
//! - [`db`], [`embedding`], [`index`]: the document index and its build pipeline
//! - [`session`]: the interactive menu and assistant loops
//! - [`cli`]: non-interactive subcommands

pub mod archive;
pub mod cli;
pub mod config;
pub mod context;
pub mod db;
pub mod embedding;
pub mod gateway;
pub mod index;
pub mod langfuse;
pub mod memory;
pub mod session;
pub mod trace;
