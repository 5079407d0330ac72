//! SQLite storage for the document index: connection setup, schema,
//! migrations and health reporting.

pub mod migrations;
pub mod schema;

use anyhow::{Context, Result};
use rusqlite::{Connection, OpenFlags};
use sqlite_vec::sqlite3_vec_init;
use std::path::Path;

use crate::index::store::{list_collections, CollectionInfo};
use std::sync::Once;

static SQLITE_VEC_INIT: Once = Once::new();

/// Register the sqlite-vec extension globally. Safe to call multiple times.
pub fn load_sqlite_vec() {
    SQLITE_VEC_INIT.call_once(|| unsafe {
        rusqlite::ffi::sqlite3_auto_extension(Some(std::mem::transmute(
            sqlite3_vec_init as *const (),
        )));
    });
}

/// Open (or create) the index database for writing, with the schema
/// initialized and migrations applied. Used by ingestion only.
pub fn open_index(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create directory {}", parent.display()))?;
        }
    }

    load_sqlite_vec();

    let conn = Connection::open(path)
        .with_context(|| format!("failed to open index at {}", path.display()))?;

    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_millis(5000))?;

    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;

    tracing::info!(path = %path.display(), "index opened for writing");
    Ok(conn)
}

/// Open an existing index read-only. Sessions never mutate the index.
pub fn open_index_read_only(path: impl AsRef<Path>) -> Result<Connection> {
    let path = path.as_ref();
    anyhow::ensure!(
        path.exists(),
        "no document index at {}. Build one with `parley index add`.",
        path.display()
    );

    load_sqlite_vec();

    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .with_context(|| format!("failed to open index at {}", path.display()))?;

    let version = migrations::get_schema_version(&conn)
        .context("index has no schema metadata (not a parley index?)")?;
    anyhow::ensure!(
        version >= migrations::CURRENT_SCHEMA_VERSION,
        "index schema v{version} is older than v{}; run `parley index add` once to migrate",
        migrations::CURRENT_SCHEMA_VERSION
    );

    tracing::info!(path = %path.display(), schema_version = version, "index opened read-only");
    Ok(conn)
}

/// Result of [`check_index_health`].
#[derive(Debug)]
pub struct IndexHealth {
    pub schema_version: u32,
    pub sqlite_vec_version: String,
    pub embedding_model: Option<String>,
    pub collections: Vec<CollectionInfo>,
    pub integrity_ok: bool,
    pub integrity_details: String,
}

/// Gather schema, extension and per-collection counts for `parley doctor`.
pub fn check_index_health(conn: &Connection) -> Result<IndexHealth> {
    let schema_version = migrations::get_schema_version(conn)?;
    let sqlite_vec_version: String = conn.query_row("SELECT vec_version()", [], |r| r.get(0))?;
    let embedding_model = migrations::get_embedding_model(conn)?;

    let collections = list_collections(conn)?;

    let integrity_details: String =
        conn.query_row("PRAGMA integrity_check", [], |r| r.get(0))?;

    Ok(IndexHealth {
        schema_version,
        sqlite_vec_version,
        embedding_model,
        collections,
        integrity_ok: integrity_details == "ok",
        integrity_details,
    })
}

/// Open an in-memory index with schema and migrations applied.
pub fn open_memory_index() -> Result<Connection> {
    load_sqlite_vec();
    let conn = Connection::open_in_memory().context("failed to open in-memory index")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    schema::init_schema(&conn).context("failed to initialize schema")?;
    migrations::run_migrations(&conn).context("failed to run migrations")?;
    Ok(conn)
}
