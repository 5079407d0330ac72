//! Nearest-neighbour queries over one collection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::Result;
use rusqlite::{params, Connection};
use serde::Serialize;

use super::store::find_collection;
use super::{embedding_to_bytes, DocumentIndex};
use crate::db::schema::vec_table_name;
use crate::embedding::EmbeddingProvider;

/// One retrieved document.
#[derive(Debug, Clone, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    pub distance: f64,
}

/// KNN over a collection's vectors, nearest first.
pub fn search_by_embedding(
    conn: &Connection,
    collection_id: i64,
    embedding: &[f32],
    limit: usize,
) -> Result<Vec<SearchHit>> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let embedding_bytes = embedding_to_bytes(embedding);
    let mut stmt = conn.prepare(&format!(
        "SELECT id, distance FROM {} WHERE embedding MATCH ?1 ORDER BY distance LIMIT ?2",
        vec_table_name(collection_id)
    ))?;
    let ranked: Vec<(String, f64)> = stmt
        .query_map(params![embedding_bytes, limit as i64], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?))
        })?
        .collect::<Result<Vec<_>, _>>()?;

    let mut rows = fetch_documents(conn, &ranked)?;

    // Hydrate in rank order; the IN query does not preserve it.
    Ok(ranked
        .into_iter()
        .filter_map(|(id, distance)| {
            rows.remove(&id).map(|(content, source)| SearchHit {
                id,
                content,
                source,
                distance,
            })
        })
        .collect())
}

fn fetch_documents(
    conn: &Connection,
    ranked: &[(String, f64)],
) -> Result<HashMap<String, (String, Option<String>)>> {
    if ranked.is_empty() {
        return Ok(HashMap::new());
    }

    let placeholders: Vec<String> = (1..=ranked.len()).map(|i| format!("?{i}")).collect();
    let sql = format!(
        "SELECT id, content, source FROM documents WHERE id IN ({})",
        placeholders.join(", ")
    );
    let mut stmt = conn.prepare(&sql)?;
    let params: Vec<&dyn rusqlite::types::ToSql> = ranked
        .iter()
        .map(|(id, _)| id as &dyn rusqlite::types::ToSql)
        .collect();

    let rows = stmt
        .query_map(params.as_slice(), |row| {
            Ok((
                row.get::<_, String>(0)?,
                (row.get::<_, String>(1)?, row.get::<_, Option<String>>(2)?),
            ))
        })?
        .collect::<Result<HashMap<_, _>, _>>()?;
    Ok(rows)
}

/// Read-only handle on one collection of a sqlite-vec index.
pub struct SqliteDocumentIndex {
    conn: Mutex<Connection>,
    collection: String,
    collection_id: i64,
    embedder: Arc<dyn EmbeddingProvider>,
}

impl SqliteDocumentIndex {
    /// Bind to `collection`. Fails if the collection does not exist.
    pub fn open(
        conn: Connection,
        collection: &str,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> Result<Self> {
        let Some(collection_id) = find_collection(&conn, collection)? else {
            anyhow::bail!("collection '{collection}' does not exist");
        };
        tracing::info!(collection, collection_id, "document collection selected");
        Ok(Self {
            conn: Mutex::new(conn),
            collection: collection.to_string(),
            collection_id,
            embedder,
        })
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }
}

impl DocumentIndex for SqliteDocumentIndex {
    fn query(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        let embedding = self.embedder.embed(query)?;
        let conn = self
            .conn
            .lock()
            .map_err(|e| anyhow::anyhow!("index lock poisoned: {e}"))?;
        let hits = search_by_embedding(&conn, self.collection_id, &embedding, limit)?;
        tracing::debug!(
            collection = %self.collection,
            hits = hits.len(),
            nearest = hits.first().map(|h| h.distance),
            "index queried"
        );
        Ok(hits.into_iter().map(|h| h.content).collect())
    }
}
