//! Build collections from text files: chunk, embed in batches, store.

use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::Connection;

use super::store::{add_documents, split_into_chunks, AddDocumentsResult, Chunk};
use crate::db::migrations::{get_embedding_model, set_embedding_model};
use crate::embedding::EmbeddingProvider;

/// Chunks embedded per inference call.
const EMBED_BATCH: usize = 32;

/// Split `text` into chunks tagged with `source`.
pub fn chunk_text(text: &str, source: Option<&str>, max_chars: usize) -> Vec<Chunk> {
    split_into_chunks(text, max_chars)
        .into_iter()
        .map(|content| Chunk {
            source: source.map(str::to_string),
            content,
        })
        .collect()
}

/// Read each file and chunk it. Empty files contribute nothing.
pub fn chunk_files(paths: &[impl AsRef<Path>], max_chars: usize) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for path in paths {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let source = path.display().to_string();
        let before = chunks.len();
        chunks.extend(chunk_text(&text, Some(&source), max_chars));
        tracing::debug!(file = %source, chunks = chunks.len() - before, "file chunked");
    }
    Ok(chunks)
}

/// Embed `chunks` with `embedder` and add them to `collection`.
///
/// The index records which embedding model produced its vectors. Mixing
/// models in one index is refused.
pub fn ingest_chunks(
    conn: &mut Connection,
    embedder: &dyn EmbeddingProvider,
    embedding_model: &str,
    collection: &str,
    chunks: &[Chunk],
) -> Result<AddDocumentsResult> {
    if let Some(stored) = get_embedding_model(conn)? {
        anyhow::ensure!(
            stored == embedding_model,
            "index was built with embedding model '{stored}', configured model is '{embedding_model}'"
        );
    }

    let mut embeddings = Vec::with_capacity(chunks.len());
    for batch in chunks.chunks(EMBED_BATCH) {
        let texts: Vec<&str> = batch.iter().map(|c| c.content.as_str()).collect();
        embeddings.extend(embedder.embed_batch(&texts)?);
    }

    let result = add_documents(conn, collection, chunks, &embeddings)?;
    set_embedding_model(conn, embedding_model)?;
    Ok(result)
}
