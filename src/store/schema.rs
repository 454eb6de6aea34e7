//! Store schema and the version guard
//!
//! Every project store file starts with a `schema_version` marker row. On
//! open, the version is compared to the compiled-in expected value; any
//! mismatch (including a missing marker table) wipes and recreates all
//! tables. Tags are fully regenerable from source, so a wipe is simpler and
//! safer than an incremental migration.

use rusqlite::Connection;
use tracing::warn;

use crate::error::EngineError;

/// Bump whenever any table shape below changes.
pub const SCHEMA_VERSION: i32 = 4;

/// Every table the engine knows about, in drop order.
const ALL_TABLES: &[&str] = &[
    "tags",
    "file_items",
    "database_tags",
    "config_tags",
    "url_tags",
    "template_file_tags",
    "sources",
    "schema_version",
];

/// Tables holding regenerable artifact rows (everything but the marker).
pub const ARTIFACT_TABLES: &[&str] = &[
    "tags",
    "file_items",
    "database_tags",
    "config_tags",
    "url_tags",
    "template_file_tags",
    "sources",
];

const CREATE_SQL: &str = r#"
    CREATE TABLE IF NOT EXISTS schema_version (
        version INTEGER NOT NULL
    );

    CREATE TABLE IF NOT EXISTS sources (
        source_id INTEGER PRIMARY KEY AUTOINCREMENT,
        directory TEXT NOT NULL UNIQUE
    );

    CREATE TABLE IF NOT EXISTS file_items (
        file_item_id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_id INTEGER NOT NULL,
        full_path TEXT NOT NULL,
        name TEXT NOT NULL,
        last_modified INTEGER NOT NULL DEFAULT 0,
        is_parsed INTEGER NOT NULL DEFAULT 0,
        is_new INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_file_items_path ON file_items(full_path);
    CREATE INDEX IF NOT EXISTS idx_file_items_source ON file_items(source_id);
    CREATE INDEX IF NOT EXISTS idx_file_items_name ON file_items(name);

    CREATE TABLE IF NOT EXISTS tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        file_item_id INTEGER,
        source_id INTEGER NOT NULL DEFAULT 0,
        key TEXT NOT NULL,
        key_upper TEXT NOT NULL,
        identifier TEXT NOT NULL,
        kind TEXT NOT NULL,
        signature TEXT,
        comment TEXT,
        namespace_name TEXT,
        is_static INTEGER NOT NULL DEFAULT 0,
        line_number INTEGER NOT NULL DEFAULT 0,
        column_position INTEGER NOT NULL DEFAULT 0
    );

    CREATE INDEX IF NOT EXISTS idx_tags_key ON tags(key);
    CREATE INDEX IF NOT EXISTS idx_tags_key_upper ON tags(key_upper);
    CREATE INDEX IF NOT EXISTS idx_tags_file ON tags(file_item_id);
    CREATE INDEX IF NOT EXISTS idx_tags_source ON tags(source_id);

    -- Detected-artifact tables, written by the external detector process
    CREATE TABLE IF NOT EXISTS database_tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_id INTEGER NOT NULL,
        schema_name TEXT NOT NULL DEFAULT '',
        table_name TEXT NOT NULL,
        column_name TEXT NOT NULL DEFAULT ''
    );

    CREATE TABLE IF NOT EXISTS config_tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_id INTEGER NOT NULL,
        label TEXT NOT NULL,
        full_path TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS url_tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_id INTEGER NOT NULL,
        url TEXT NOT NULL,
        full_path TEXT NOT NULL,
        class_name TEXT,
        method_name TEXT
    );

    CREATE TABLE IF NOT EXISTS template_file_tags (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        source_id INTEGER NOT NULL,
        full_path TEXT NOT NULL,
        variables TEXT
    );
"#;

/// Read the stored schema version; `None` when the marker is absent.
fn stored_version(conn: &Connection) -> Option<i32> {
    conn.query_row("SELECT version FROM schema_version LIMIT 1", [], |row| {
        row.get(0)
    })
    .ok()
}

/// Version-guard a freshly opened connection.
///
/// Idempotent: a store already at `SCHEMA_VERSION` is left untouched, rows
/// and all. Anything else is dropped and recreated from scratch.
pub fn ensure_schema(conn: &Connection) -> Result<(), EngineError> {
    match stored_version(conn) {
        Some(version) if version == SCHEMA_VERSION => return Ok(()),
        Some(version) => {
            warn!(
                found = version,
                expected = SCHEMA_VERSION,
                "schema version mismatch, wiping store"
            );
        }
        None => {}
    }

    for table in ALL_TABLES {
        conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", table))?;
    }
    conn.execute_batch(CREATE_SQL)?;
    conn.execute(
        "INSERT INTO schema_version (version) VALUES (?1)",
        [SCHEMA_VERSION],
    )?;

    Ok(())
}
