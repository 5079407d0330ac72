mod helpers;

use parley::db;
use parley::db::migrations::{
    get_embedding_model, get_schema_version, run_migrations, CURRENT_SCHEMA_VERSION,
};
use tempfile::TempDir;

/// Write a version-1 index (no `source` column, no embedding model) to disk.
fn write_v1_index(path: &std::path::Path) {
    db::load_sqlite_vec();
    let conn = rusqlite::Connection::open(path).unwrap();
    db::schema::init_schema(&conn).unwrap();
    conn.execute(
        "INSERT INTO collections (name, created_at) VALUES ('legacy', '2024-01-01T00:00:00Z')",
        [],
    )
    .unwrap();
    db::schema::create_vec_table(&conn, 1).unwrap();
    conn.execute(
        "INSERT INTO documents (id, collection_id, content, created_at) \
         VALUES ('d1', 1, 'old text', '2024-01-01T00:00:00Z')",
        [],
    )
    .unwrap();
}

#[test]
fn fresh_index_migrates_to_current_version() {
    let conn = helpers::test_db();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    assert_eq!(
        get_embedding_model(&conn).unwrap().as_deref(),
        Some("all-MiniLM-L6-v2")
    );
}

#[test]
fn migrations_are_idempotent() {
    let conn = helpers::test_db();
    run_migrations(&conn).unwrap();
    run_migrations(&conn).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
}

#[test]
fn read_only_open_refuses_outdated_index() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index.db");
    write_v1_index(&path);

    let err = db::open_index_read_only(&path).unwrap_err();
    assert!(err.to_string().contains("older than"));
}

#[test]
fn writable_open_upgrades_v1_and_keeps_documents() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("index.db");
    write_v1_index(&path);

    drop(db::open_index(&path).unwrap());

    let conn = db::open_index_read_only(&path).unwrap();
    assert_eq!(get_schema_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    let (content, source): (String, Option<String>) = conn
        .query_row(
            "SELECT content, source FROM documents WHERE id = 'd1'",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(content, "old text");
    assert!(source.is_none());
}
