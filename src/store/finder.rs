//! Read-only query layer over one store connection
//!
//! Two query families, each in two tiers: exact (case-sensitive key
//! equality) and near-match (case-insensitive prefix via the upper-cased
//! auxiliary key). Results are ordered by key ascending; ties break by row
//! id, which is stable within one result set but carries no meaning.

use rusqlite::{params, Connection, Row};
use std::path::{Path, PathBuf};

use super::store::open_read_only;
use crate::error::EngineError;
use crate::tag::{FileRecord, Tag, TagKind};

/// The query surface the multi-tier cache aggregates over.
///
/// Implemented by `TagFinder` for persisted and in-memory stores, by the
/// native-symbol finder, and by counting spies in tests.
pub trait Finder: Send {
    fn exact_tags(&self, key: &str) -> Result<Vec<Tag>, EngineError>;
    fn near_match_tags(&self, prefix: &str) -> Result<Vec<Tag>, EngineError>;
    fn exact_file_items(&self, name: &str) -> Result<Vec<FileRecord>, EngineError>;
    fn near_match_file_items(&self, prefix: &str) -> Result<Vec<FileRecord>, EngineError>;
}

/// Escape LIKE metacharacters so user input is matched literally.
fn escape_like(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for ch in input.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(ch);
    }
    out
}

const TAG_COLUMNS: &str = "t.key, t.identifier, t.kind, t.signature, t.comment, \
     t.namespace_name, t.is_static, t.file_item_id, t.source_id, f.full_path, \
     t.line_number, t.column_position";

fn row_to_tag(row: &Row) -> rusqlite::Result<Tag> {
    let kind: String = row.get(2)?;
    Ok(Tag {
        key: row.get(0)?,
        identifier: row.get(1)?,
        kind: kind.parse::<TagKind>().unwrap_or(TagKind::Variable),
        signature: row.get(3)?,
        comment: row.get(4)?,
        namespace_name: row.get(5)?,
        is_static: row.get(6)?,
        file_item_id: row.get(7)?,
        source_id: row.get(8)?,
        full_path: row.get(9)?,
        line_number: row.get::<_, i64>(10)? as u32,
        column_position: row.get::<_, i64>(11)? as u32,
    })
}

fn row_to_file_record(row: &Row) -> rusqlite::Result<FileRecord> {
    Ok(FileRecord {
        file_item_id: row.get(0)?,
        source_id: row.get(1)?,
        full_path: row.get(2)?,
        name: row.get(3)?,
        last_modified: row.get(4)?,
        is_parsed: row.get(5)?,
        is_new: row.get(6)?,
    })
}

/// Read-only query object bound to one store handle
pub struct TagFinder {
    conn: Connection,
    path: Option<PathBuf>,
}

impl std::fmt::Debug for TagFinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TagFinder").field("path", &self.path).finish()
    }
}

impl TagFinder {
    /// Open a read-only handle on a persisted store file.
    pub fn open(db_path: &Path) -> Result<Self, EngineError> {
        Ok(Self {
            conn: open_read_only(db_path)?,
            path: Some(db_path.to_path_buf()),
        })
    }

    pub(crate) fn from_connection(conn: Connection, path: Option<PathBuf>) -> Self {
        Self { conn, path }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn query_tags(&self, where_clause: &str, needle: &str) -> Result<Vec<Tag>, EngineError> {
        let sql = format!(
            "SELECT {} FROM tags t \
             LEFT JOIN file_items f ON t.file_item_id = f.file_item_id \
             WHERE {} ORDER BY t.key ASC, t.id ASC",
            TAG_COLUMNS, where_clause
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![needle], row_to_tag)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

impl Finder for TagFinder {
    fn exact_tags(&self, key: &str) -> Result<Vec<Tag>, EngineError> {
        self.query_tags("t.key = ?1", key)
    }

    fn near_match_tags(&self, prefix: &str) -> Result<Vec<Tag>, EngineError> {
        let pattern = format!("{}%", escape_like(&prefix.to_uppercase()));
        self.query_tags("t.key_upper LIKE ?1 ESCAPE '\\'", &pattern)
    }

    fn exact_file_items(&self, name: &str) -> Result<Vec<FileRecord>, EngineError> {
        let mut stmt = self.conn.prepare(
            "SELECT file_item_id, source_id, full_path, name, last_modified, is_parsed, is_new \
             FROM file_items WHERE name = ?1 ORDER BY name ASC, file_item_id ASC",
        )?;
        let rows = stmt.query_map(params![name], row_to_file_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    fn near_match_file_items(&self, prefix: &str) -> Result<Vec<FileRecord>, EngineError> {
        let pattern = format!("{}%", escape_like(&prefix.to_uppercase()));
        let mut stmt = self.conn.prepare(
            "SELECT file_item_id, source_id, full_path, name, last_modified, is_parsed, is_new \
             FROM file_items WHERE UPPER(name) LIKE ?1 ESCAPE '\\' \
             ORDER BY name ASC, file_item_id ASC",
        )?;
        let rows = stmt.query_map(params![pattern], row_to_file_record)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::store::TagStore;
    use crate::tag::TagKind;

    fn store_with(tags: &[(&str, &str, TagKind)]) -> TagFinder {
        let mut store = TagStore::open_in_memory().unwrap();
        let source_id = store.ensure_source(Path::new("/app")).unwrap();
        let file_id = store
            .upsert_file_item(source_id, "/app/User.php", 1, false)
            .unwrap();
        let tags: Vec<Tag> = tags
            .iter()
            .map(|(key, ident, kind)| Tag::new(*key, *ident, *kind))
            .collect();
        store.replace_file_tags(file_id, source_id, &tags).unwrap();
        store.into_finder()
    }

    #[test]
    fn test_exact_is_case_sensitive() {
        let finder = store_with(&[("User", "User", TagKind::Class)]);
        assert_eq!(finder.exact_tags("User").unwrap().len(), 1);
        assert!(finder.exact_tags("user").unwrap().is_empty());
    }

    #[test]
    fn test_near_match_is_case_insensitive_prefix() {
        let finder = store_with(&[
            ("User", "User", TagKind::Class),
            ("UserRepository", "UserRepository", TagKind::Class),
            ("Account", "Account", TagKind::Class),
        ]);
        let hits = finder.near_match_tags("use").unwrap();
        let keys: Vec<&str> = hits.iter().map(|t| t.key.as_str()).collect();
        assert_eq!(keys, vec!["User", "UserRepository"]);
    }

    #[test]
    fn test_near_match_orders_by_key() {
        let finder = store_with(&[
            ("userSave", "userSave", TagKind::Function),
            ("UserB", "UserB", TagKind::Class),
            ("UserA", "UserA", TagKind::Class),
        ]);
        let keys: Vec<String> = finder
            .near_match_tags("user")
            .unwrap()
            .into_iter()
            .map(|t| t.key)
            .collect();
        assert_eq!(keys, vec!["UserA", "UserB", "userSave"]);
    }

    #[test]
    fn test_like_metacharacters_are_literal() {
        let finder = store_with(&[
            ("do_run", "do_run", TagKind::Function),
            ("dorun", "dorun", TagKind::Function),
        ]);
        let hits = finder.near_match_tags("do_").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].key, "do_run");
    }

    #[test]
    fn test_tags_carry_owning_path() {
        let finder = store_with(&[("User", "User", TagKind::Class)]);
        let hits = finder.exact_tags("User").unwrap();
        assert_eq!(hits[0].full_path.as_deref(), Some("/app/User.php"));
    }

    #[test]
    fn test_file_item_queries() {
        let finder = store_with(&[("User", "User", TagKind::Class)]);

        assert_eq!(finder.exact_file_items("User.php").unwrap().len(), 1);
        assert!(finder.exact_file_items("user.php").unwrap().is_empty());

        let near = finder.near_match_file_items("use").unwrap();
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].name, "User.php");
    }
}
