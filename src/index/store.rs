//! Ingestion side of the document index: collections, chunking and inserts.
//!
//! [`add_documents`] is the single write entry point. It runs inside a
//! transaction: resolve (or create) the collection, then insert each chunk's
//! row and vector.

use anyhow::{bail, Result};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use serde::Serialize;

use super::embedding_to_bytes;
use crate::db::schema::{create_vec_table, vec_table_name};
use crate::embedding::EMBEDDING_DIM;

/// One piece of text to index.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    /// File the chunk came from, if any.
    pub source: Option<String>,
    pub content: String,
}

/// Result of an [`add_documents`] call.
#[derive(Debug, Serialize)]
pub struct AddDocumentsResult {
    pub collection: String,
    pub collection_id: i64,
    pub created_collection: bool,
    pub added: usize,
}

/// A collection and its size, for listings.
#[derive(Debug, Clone, Serialize)]
pub struct CollectionInfo {
    pub name: String,
    pub documents: u64,
    pub created_at: String,
}

/// Look up a collection id by name.
pub fn find_collection(conn: &Connection, name: &str) -> Result<Option<i64>> {
    Ok(conn
        .query_row(
            "SELECT id FROM collections WHERE name = ?1",
            params![name],
            |row| row.get(0),
        )
        .optional()?)
}

/// All collections with their document counts, by name.
pub fn list_collections(conn: &Connection) -> Result<Vec<CollectionInfo>> {
    let mut stmt = conn.prepare(
        "SELECT c.name, COUNT(d.id), c.created_at FROM collections c \
         LEFT JOIN documents d ON d.collection_id = c.id \
         GROUP BY c.id ORDER BY c.name",
    )?;
    let collections = stmt
        .query_map([], |row| {
            Ok(CollectionInfo {
                name: row.get(0)?,
                documents: row.get::<_, i64>(1)? as u64,
                created_at: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;
    Ok(collections)
}

/// Insert chunks and their embeddings into `collection`, creating it first if needed.
pub fn add_documents(
    conn: &mut Connection,
    collection: &str,
    chunks: &[Chunk],
    embeddings: &[Vec<f32>],
) -> Result<AddDocumentsResult> {
    if collection.trim().is_empty() {
        bail!("collection name must not be empty");
    }
    if chunks.len() != embeddings.len() {
        bail!(
            "got {} chunks but {} embeddings",
            chunks.len(),
            embeddings.len()
        );
    }
    if let Some(bad) = embeddings.iter().find(|e| e.len() != EMBEDDING_DIM) {
        bail!(
            "embedding has {} dimensions, expected {EMBEDDING_DIM}",
            bad.len()
        );
    }

    let tx = conn.transaction()?;

    let (collection_id, created_collection) = match find_collection(&tx, collection)? {
        Some(id) => (id, false),
        None => (create_collection(&tx, collection)?, true),
    };

    for (chunk, embedding) in chunks.iter().zip(embeddings) {
        insert_document(&tx, collection_id, chunk, embedding)?;
    }

    tx.commit()?;

    tracing::info!(
        collection,
        collection_id,
        created_collection,
        added = chunks.len(),
        "documents indexed"
    );

    Ok(AddDocumentsResult {
        collection: collection.to_string(),
        collection_id,
        created_collection,
        added: chunks.len(),
    })
}

fn create_collection(tx: &Transaction, name: &str) -> Result<i64> {
    let now = chrono::Utc::now().to_rfc3339();
    tx.execute(
        "INSERT INTO collections (name, created_at) VALUES (?1, ?2)",
        params![name, now],
    )?;
    let id = tx.last_insert_rowid();
    create_vec_table(tx, id)?;
    Ok(id)
}

fn insert_document(
    tx: &Transaction,
    collection_id: i64,
    chunk: &Chunk,
    embedding: &[f32],
) -> Result<String> {
    let id = uuid::Uuid::now_v7().to_string();
    let now = chrono::Utc::now().to_rfc3339();

    tx.execute(
        "INSERT INTO documents (id, collection_id, source, content, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![id, collection_id, chunk.source, chunk.content, now],
    )?;
    tx.execute(
        &format!(
            "INSERT INTO {} (id, embedding) VALUES (?1, ?2)",
            vec_table_name(collection_id)
        ),
        params![id, embedding_to_bytes(embedding)],
    )?;

    Ok(id)
}

/// Split text into chunks on blank lines, packing consecutive paragraphs
/// together while they fit in `max_chars`. A single paragraph longer than
/// `max_chars` is cut at character boundaries.
pub fn split_into_chunks(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();

    let paragraphs = text
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty());

    for paragraph in paragraphs {
        let para_len = paragraph.chars().count();
        let current_len = current.chars().count();

        if !current.is_empty() && current_len + 2 + para_len > max_chars {
            chunks.push(std::mem::take(&mut current));
        }

        if para_len > max_chars {
            let chars: Vec<char> = paragraph.chars().collect();
            for piece in chars.chunks(max_chars) {
                chunks.push(piece.iter().collect());
            }
            continue;
        }

        if !current.is_empty() {
            current.push_str("\n\n");
        }
        current.push_str(paragraph);
    }

    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}
