//! Core value types: tags, file records, source directories
//!
//! A `Tag` is one named code artifact (class, function, member, constant)
//! extracted from source. Its `key` is the canonical lookup value, either a
//! plain identifier or a `Class.Member` composite, and is always populated.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Kinds of artifacts the tokenizer extracts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    Class,
    Interface,
    Trait,
    Function,
    Method,
    Property,
    Constant,
    Define,
    Variable,
    Namespace,
}

impl std::fmt::Display for TagKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TagKind::Class => "class",
            TagKind::Interface => "interface",
            TagKind::Trait => "trait",
            TagKind::Function => "function",
            TagKind::Method => "method",
            TagKind::Property => "property",
            TagKind::Constant => "constant",
            TagKind::Define => "define",
            TagKind::Variable => "variable",
            TagKind::Namespace => "namespace",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for TagKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "class" => Ok(TagKind::Class),
            "interface" => Ok(TagKind::Interface),
            "trait" => Ok(TagKind::Trait),
            "function" => Ok(TagKind::Function),
            "method" => Ok(TagKind::Method),
            "property" => Ok(TagKind::Property),
            "constant" => Ok(TagKind::Constant),
            "define" => Ok(TagKind::Define),
            "variable" => Ok(TagKind::Variable),
            "namespace" => Ok(TagKind::Namespace),
            _ => Err(format!("Unknown tag kind: {}", s)),
        }
    }
}

/// One named code artifact
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tag {
    /// Canonical lookup key: identifier, or `Class.Member` for members
    pub key: String,
    /// Display name (the member name alone for `Class.Member` keys)
    pub identifier: String,
    pub kind: TagKind,
    pub signature: Option<String>,
    pub comment: Option<String>,
    pub namespace_name: Option<String>,
    pub is_static: bool,
    /// Set once the tag is persisted; `None` for native built-ins
    pub file_item_id: Option<i64>,
    pub source_id: Option<i64>,
    /// Owning file path, denormalized for directory-restricted searches
    pub full_path: Option<String>,
    pub line_number: u32,
    pub column_position: u32,
}

impl Tag {
    pub fn new(key: impl Into<String>, identifier: impl Into<String>, kind: TagKind) -> Self {
        let key = key.into();
        debug_assert!(!key.is_empty(), "tag key must be populated");
        Self {
            key,
            identifier: identifier.into(),
            kind,
            signature: None,
            comment: None,
            namespace_name: None,
            is_static: false,
            file_item_id: None,
            source_id: None,
            full_path: None,
            line_number: 0,
            column_position: 0,
        }
    }

    pub fn at(mut self, line_number: u32, column_position: u32) -> Self {
        self.line_number = line_number;
        self.column_position = column_position;
        self
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }
}

/// One source file that has been scanned into a store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRecord {
    pub file_item_id: i64,
    pub source_id: i64,
    pub full_path: String,
    pub name: String,
    /// Disk mtime in unix seconds at the last scan; 0 for unsaved buffers
    pub last_modified: i64,
    pub is_parsed: bool,
    /// True when the file's content has not yet been written to disk
    pub is_new: bool,
}

/// A root directory enumerated for a project, the unit of cascading deletion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDirectory {
    pub source_id: i64,
    pub directory: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn test_tag_kind_round_trip() {
        for kind in [
            TagKind::Class,
            TagKind::Method,
            TagKind::Property,
            TagKind::Define,
        ] {
            assert_eq!(TagKind::from_str(&kind.to_string()).unwrap(), kind);
        }
    }

    #[test]
    fn test_tag_builder() {
        let tag = Tag::new("User.getName", "getName", TagKind::Method)
            .at(12, 4)
            .with_signature("getName()");
        assert_eq!(tag.key, "User.getName");
        assert_eq!(tag.identifier, "getName");
        assert_eq!(tag.line_number, 12);
        assert_eq!(tag.signature.as_deref(), Some("getName()"));
    }
}
