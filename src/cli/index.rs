//! `parley index add` and `parley index list`.

use std::path::PathBuf;

use anyhow::{Context, Result};

use crate::config::ParleyConfig;
use crate::db;
use crate::embedding::create_provider;
use crate::index::ingest::{chunk_files, ingest_chunks};
use crate::index::store::list_collections;

/// Chunk, embed and store `files` into `collection`.
pub fn add(config: &ParleyConfig, collection: &str, files: &[PathBuf]) -> Result<()> {
    anyhow::ensure!(!files.is_empty(), "no input files given");

    let chunks = chunk_files(files, config.retrieval.chunk_chars)?;
    if chunks.is_empty() {
        println!("Nothing to index: the input files contain no text.");
        return Ok(());
    }

    let embedder = create_provider(&config.embedding)?;
    let index_path = config.resolved_index_path();
    let mut conn = db::open_index(&index_path)?;

    println!("Embedding {} chunks from {} file(s)...", chunks.len(), files.len());
    let result = ingest_chunks(
        &mut conn,
        embedder.as_ref(),
        &config.embedding.model,
        collection,
        &chunks,
    )
    .with_context(|| format!("failed to index into collection '{collection}'"))?;

    if result.created_collection {
        println!("Created collection '{}'", result.collection);
    }
    println!(
        "Added {} documents to '{}' in {}",
        result.added,
        result.collection,
        index_path.display()
    );
    Ok(())
}

/// Print every collection with its document count.
pub fn list(config: &ParleyConfig) -> Result<()> {
    let index_path = config.resolved_index_path();
    if !index_path.exists() {
        println!("No index at {}", index_path.display());
        return Ok(());
    }

    let conn = db::open_index_read_only(&index_path)?;
    let collections = list_collections(&conn)?;
    if collections.is_empty() {
        println!("Index at {} has no collections.", index_path.display());
        return Ok(());
    }

    println!("{:<24} {:>10}  CREATED", "COLLECTION", "DOCUMENTS");
    for c in &collections {
        println!("{:<24} {:>10}  {}", c.name, c.documents, c.created_at);
    }
    Ok(())
}
