//! Document similarity index.
//!
//! [`DocumentIndex`] is the read-only query seam used by the document
//! assistant. [`store`] and [`ingest`] build collections and
//! [`search`] answers nearest-neighbour queries over them.

pub mod ingest;
pub mod search;
pub mod store;

use anyhow::Result;

/// A pre-built similarity index the session can query but never mutate.
pub trait DocumentIndex {
    /// Up to `limit` document texts nearest to `query`, best match first.
    fn query(&self, query: &str, limit: usize) -> Result<Vec<String>>;
}

/// Fixed list of documents, returned regardless of the query.
pub struct StaticIndex(pub Vec<String>);

impl DocumentIndex for StaticIndex {
    fn query(&self, _query: &str, limit: usize) -> Result<Vec<String>> {
        Ok(self.0.iter().take(limit).cloned().collect())
    }
}

/// Convert an f32 embedding slice to raw bytes for sqlite-vec.
pub fn embedding_to_bytes(embedding: &[f32]) -> &[u8] {
    unsafe {
        std::slice::from_raw_parts(
            embedding.as_ptr() as *const u8,
            embedding.len() * std::mem::size_of::<f32>(),
        )
    }
}

impl<T: DocumentIndex + ?Sized> DocumentIndex for Box<T> {
    fn query(&self, query: &str, limit: usize) -> Result<Vec<String>> {
        (**self).query(query, limit)
    }
}
