//! Writer API over one persisted tag store
//!
//! A `TagStore` owns exactly one SQLite connection. Connections are never
//! shared across threads: each background action opens its own handle and
//! closes it (drops the store) on completion. Writes to the same store file
//! are serialized through the process-wide lock registry below.

use lazy_static::lazy_static;
use rusqlite::{params, Connection, OpenFlags};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::debug;

use super::finder::TagFinder;
use super::schema::{ensure_schema, ARTIFACT_TABLES};
use crate::error::EngineError;
use crate::tag::{FileRecord, SourceDirectory, Tag};

lazy_static! {
    static ref WRITE_LOCKS: Mutex<HashMap<PathBuf, Arc<Mutex<()>>>> = Mutex::new(HashMap::new());
}

/// Process-wide write lock for one store file.
///
/// Every writing action must hold this for the duration of its store work;
/// the scheduler's worker bound alone does not serialize per-store access.
pub fn store_write_lock(db_path: &Path) -> Arc<Mutex<()>> {
    let canonical = db_path
        .canonicalize()
        .unwrap_or_else(|_| db_path.to_path_buf());
    let mut locks = WRITE_LOCKS.lock().unwrap();
    locks
        .entry(canonical)
        .or_insert_with(|| Arc::new(Mutex::new(())))
        .clone()
}

/// Read-write handle to one project's persisted tag store
pub struct TagStore {
    conn: Connection,
    path: Option<PathBuf>,
}

impl TagStore {
    /// Open (or create) the store file, running the schema version guard.
    pub fn open(db_path: &Path) -> Result<Self, EngineError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path).map_err(EngineError::StoreConnection)?;
        // WAL keeps read-only finders usable while a scan is writing
        conn.execute_batch("PRAGMA journal_mode=WAL;")
            .map_err(EngineError::StoreConnection)?;
        ensure_schema(&conn)?;
        Ok(Self {
            conn,
            path: Some(db_path.to_path_buf()),
        })
    }

    /// In-memory store, used for working-buffer finders and tests.
    pub fn open_in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory().map_err(EngineError::StoreConnection)?;
        ensure_schema(&conn)?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Convert into a read-only query object over the same connection.
    ///
    /// This is how working-buffer finders are built: reopening an in-memory
    /// database would lose its rows.
    pub fn into_finder(self) -> TagFinder {
        TagFinder::from_connection(self.conn, self.path)
    }

    // === Sources ===

    /// Register a source directory, returning its id (existing or new).
    pub fn ensure_source(&self, directory: &Path) -> Result<i64, EngineError> {
        let dir = directory.to_string_lossy();
        self.conn.execute(
            "INSERT OR IGNORE INTO sources (directory) VALUES (?1)",
            params![dir],
        )?;
        let source_id = self.conn.query_row(
            "SELECT source_id FROM sources WHERE directory = ?1",
            params![dir],
            |row| row.get(0),
        )?;
        Ok(source_id)
    }

    pub fn find_source_id(&self, directory: &Path) -> Result<Option<i64>, EngineError> {
        use rusqlite::OptionalExtension;
        let id = self
            .conn
            .query_row(
                "SELECT source_id FROM sources WHERE directory = ?1",
                params![directory.to_string_lossy()],
                |row| row.get(0),
            )
            .optional()?;
        Ok(id)
    }

    pub fn sources(&self) -> Result<Vec<SourceDirectory>, EngineError> {
        let mut stmt = self
            .conn
            .prepare("SELECT source_id, directory FROM sources ORDER BY source_id")?;
        let rows = stmt.query_map([], |row| {
            Ok(SourceDirectory {
                source_id: row.get(0)?,
                directory: PathBuf::from(row.get::<_, String>(1)?),
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    // === File items ===

    /// Insert or refresh the record for one scanned file, returning its id.
    pub fn upsert_file_item(
        &self,
        source_id: i64,
        full_path: &str,
        last_modified: i64,
        is_new: bool,
    ) -> Result<i64, EngineError> {
        use rusqlite::OptionalExtension;
        let name = Path::new(full_path)
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| full_path.to_string());

        let existing: Option<i64> = self
            .conn
            .query_row(
                "SELECT file_item_id FROM file_items WHERE full_path = ?1 AND source_id = ?2",
                params![full_path, source_id],
                |row| row.get(0),
            )
            .optional()?;

        match existing {
            Some(id) => {
                self.conn.execute(
                    "UPDATE file_items SET last_modified = ?1, is_new = ?2 \
                     WHERE file_item_id = ?3",
                    params![last_modified, is_new, id],
                )?;
                Ok(id)
            }
            None => {
                self.conn.execute(
                    "INSERT INTO file_items (source_id, full_path, name, last_modified, is_parsed, is_new) \
                     VALUES (?1, ?2, ?3, ?4, 0, ?5)",
                    params![source_id, full_path, name, last_modified, is_new],
                )?;
                Ok(self.conn.last_insert_rowid())
            }
        }
    }

    pub fn set_file_parsed(&self, file_item_id: i64, is_parsed: bool) -> Result<(), EngineError> {
        self.conn.execute(
            "UPDATE file_items SET is_parsed = ?1 WHERE file_item_id = ?2",
            params![is_parsed, file_item_id],
        )?;
        Ok(())
    }

    pub fn file_records(&self) -> Result<Vec<FileRecord>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT file_item_id, source_id, full_path, name, last_modified, is_parsed, is_new \
             FROM file_items ORDER BY file_item_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(FileRecord {
                file_item_id: row.get(0)?,
                source_id: row.get(1)?,
                full_path: row.get(2)?,
                name: row.get(3)?,
                last_modified: row.get(4)?,
                is_parsed: row.get(5)?,
                is_new: row.get(6)?,
            })
        })?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// Remove the records and tags of files that no longer exist on disk.
    pub fn delete_file_items(&mut self, full_paths: &[PathBuf]) -> Result<(), EngineError> {
        let tx = self.conn.transaction()?;
        for path in full_paths {
            let path = path.to_string_lossy();
            tx.execute(
                "DELETE FROM tags WHERE file_item_id IN \
                 (SELECT file_item_id FROM file_items WHERE full_path = ?1)",
                params![path],
            )?;
            tx.execute("DELETE FROM file_items WHERE full_path = ?1", params![path])?;
        }
        tx.commit()?;
        Ok(())
    }

    // === Tags ===

    /// Atomically replace every tag owned by one file.
    pub fn replace_file_tags(
        &mut self,
        file_item_id: i64,
        source_id: i64,
        tags: &[Tag],
    ) -> Result<(), EngineError> {
        let tx = self.conn.transaction()?;
        tx.execute(
            "DELETE FROM tags WHERE file_item_id = ?1",
            params![file_item_id],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO tags (file_item_id, source_id, key, key_upper, identifier, kind, \
                 signature, comment, namespace_name, is_static, line_number, column_position) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
            )?;
            for tag in tags {
                stmt.execute(params![
                    file_item_id,
                    source_id,
                    tag.key,
                    tag.key.to_uppercase(),
                    tag.identifier,
                    tag.kind.to_string(),
                    tag.signature,
                    tag.comment,
                    tag.namespace_name,
                    tag.is_static,
                    tag.line_number,
                    tag.column_position,
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn tag_count(&self) -> Result<usize, EngineError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM tags", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn file_count(&self) -> Result<usize, EngineError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM file_items", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // === Detected artifacts ===
    //
    // The detector process usually writes these tables itself; the insert
    // helpers exist for engine-side detectors and tests.

    pub fn add_database_tag(
        &self,
        source_id: i64,
        schema_name: &str,
        table_name: &str,
        column_name: &str,
    ) -> Result<(), EngineError> {
        self.conn.execute(
            "INSERT INTO database_tags (source_id, schema_name, table_name, column_name) \
             VALUES (?1, ?2, ?3, ?4)",
            params![source_id, schema_name, table_name, column_name],
        )?;
        Ok(())
    }

    pub fn add_config_tag(
        &self,
        source_id: i64,
        label: &str,
        full_path: &str,
    ) -> Result<(), EngineError> {
        self.conn.execute(
            "INSERT INTO config_tags (source_id, label, full_path) VALUES (?1, ?2, ?3)",
            params![source_id, label, full_path],
        )?;
        Ok(())
    }

    pub fn add_url_tag(
        &self,
        source_id: i64,
        url: &str,
        full_path: &str,
        class_name: Option<&str>,
        method_name: Option<&str>,
    ) -> Result<(), EngineError> {
        self.conn.execute(
            "INSERT INTO url_tags (source_id, url, full_path, class_name, method_name) \
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![source_id, url, full_path, class_name, method_name],
        )?;
        Ok(())
    }

    pub fn add_template_file_tag(
        &self,
        source_id: i64,
        full_path: &str,
        variables: &[String],
    ) -> Result<(), EngineError> {
        self.conn.execute(
            "INSERT INTO template_file_tags (source_id, full_path, variables) \
             VALUES (?1, ?2, ?3)",
            params![
                source_id,
                full_path,
                serde_json::to_string(variables).unwrap_or_default()
            ],
        )?;
        Ok(())
    }

    pub fn artifact_count(&self, table: &str) -> Result<usize, EngineError> {
        debug_assert!(ARTIFACT_TABLES.contains(&table));
        let count: i64 =
            self.conn
                .query_row(&format!("SELECT COUNT(*) FROM {}", table), [], |row| {
                    row.get(0)
                })?;
        Ok(count as usize)
    }

    // === Cascading deletion ===

    /// Delete every row, across every artifact table, owned by one source
    /// directory. A no-op when the directory has never been registered.
    pub fn delete_source(&mut self, directory: &Path) -> Result<(), EngineError> {
        let source_id = match self.find_source_id(directory)? {
            Some(id) => id,
            None => return Ok(()),
        };
        debug!(?directory, source_id, "deleting source");

        let tx = self.conn.transaction()?;
        for table in [
            "tags",
            "file_items",
            "database_tags",
            "config_tags",
            "url_tags",
            "template_file_tags",
        ] {
            tx.execute(
                &format!("DELETE FROM {} WHERE source_id = ?1", table),
                params![source_id],
            )?;
        }
        tx.execute(
            "DELETE FROM sources WHERE source_id = ?1",
            params![source_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Delete all rows across all artifact tables, unconditionally.
    pub fn wipe(&mut self) -> Result<(), EngineError> {
        let tx = self.conn.transaction()?;
        for table in ARTIFACT_TABLES {
            tx.execute(&format!("DELETE FROM {}", table), [])?;
        }
        tx.commit()?;
        Ok(())
    }
}

/// Open a read-only finder on a store file without going through `TagStore`.
pub fn open_read_only(db_path: &Path) -> Result<Connection, EngineError> {
    Connection::open_with_flags(db_path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .map_err(EngineError::StoreConnection)
}
