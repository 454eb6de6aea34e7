//! Tokenizer seam and the built-in script scanner
//!
//! The real language parser is an external collaborator: the engine only
//! depends on the `Tokenizer` trait, which turns raw source text into an
//! ordered sequence of in-memory `Tag` records or a parse failure. The
//! bundled `ScriptTokenizer` is a rudimentary line scanner good enough for
//! the CLI and tests; embedders plug in their own implementation.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::tag::{Tag, TagKind};

/// Language-version context handed to the tokenizer with every buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PhpVersion {
    Php5,
    Php7,
    #[default]
    Php8,
}

impl std::fmt::Display for PhpVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PhpVersion::Php5 => "php5",
            PhpVersion::Php7 => "php7",
            PhpVersion::Php8 => "php8",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for PhpVersion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "php5" | "5" => Ok(PhpVersion::Php5),
            "php7" | "7" => Ok(PhpVersion::Php7),
            "php8" | "8" => Ok(PhpVersion::Php8),
            _ => Err(format!("Unknown PHP version: {}", s)),
        }
    }
}

/// External-parser interface: raw text + version in, ordered tags out
pub trait Tokenizer: Send + Sync {
    /// `origin` is the buffer's identifier, used only for error messages.
    fn tokenize(
        &self,
        origin: &str,
        text: &str,
        version: PhpVersion,
    ) -> Result<Vec<Tag>, EngineError>;
}

lazy_static! {
    static ref NAMESPACE_RE: Regex =
        Regex::new(r"^\s*namespace\s+([A-Za-z_\\][A-Za-z0-9_\\]*)").unwrap();
    static ref TYPE_RE: Regex =
        Regex::new(r"^\s*(?:abstract\s+|final\s+)?(class|interface|trait)\s+(\w+)").unwrap();
    static ref FUNCTION_RE: Regex = Regex::new(
        r"^\s*(?:(public|protected|private)\s+)?(static\s+)?function\s+&?(\w+)\s*\(([^)]*)"
    )
    .unwrap();
    static ref CONST_RE: Regex = Regex::new(r"^\s*const\s+([A-Za-z_]\w*)").unwrap();
    static ref DEFINE_RE: Regex = Regex::new(r#"define\s*\(\s*['"](\w+)['"]"#).unwrap();
    static ref PROPERTY_RE: Regex = Regex::new(
        r"^\s*(public|protected|private|var)\s+(static\s+)?(?:\?\w+\s+)?\$(\w+)"
    )
    .unwrap();
}

/// Rudimentary regex-based PHP scanner
///
/// Tracks brace depth to attribute methods and properties to their owning
/// class (`Class.member` composite keys). It rejects buffers with no opening
/// `<?php` tag or with unbalanced braces, which is what exercises the
/// "keep the previous working finder on parse failure" path.
#[derive(Debug, Default)]
pub struct ScriptTokenizer;

impl ScriptTokenizer {
    pub fn new() -> Self {
        Self
    }
}

impl Tokenizer for ScriptTokenizer {
    fn tokenize(
        &self,
        origin: &str,
        text: &str,
        _version: PhpVersion,
    ) -> Result<Vec<Tag>, EngineError> {
        if !text.contains("<?php") && !text.contains("<?=") {
            return Err(EngineError::parse(origin, "missing <?php opening tag"));
        }

        let mut tags = Vec::new();
        let mut namespace: Option<String> = None;
        // (class name, brace depth the class body opened at)
        let mut enclosing: Option<(String, i32)> = None;
        let mut depth: i32 = 0;

        for (idx, line) in text.lines().enumerate() {
            let line_number = (idx + 1) as u32;

            if let Some(caps) = NAMESPACE_RE.captures(line) {
                let name = caps.get(1).unwrap().as_str().to_string();
                tags.push(
                    Tag::new(name.clone(), name.clone(), TagKind::Namespace)
                        .at(line_number, caps.get(1).unwrap().start() as u32),
                );
                namespace = Some(name);
            } else if let Some(caps) = TYPE_RE.captures(line) {
                let kind = match caps.get(1).unwrap().as_str() {
                    "interface" => TagKind::Interface,
                    "trait" => TagKind::Trait,
                    _ => TagKind::Class,
                };
                let name = caps.get(2).unwrap().as_str().to_string();
                let mut tag = Tag::new(name.clone(), name.clone(), kind)
                    .at(line_number, caps.get(2).unwrap().start() as u32);
                tag.namespace_name = namespace.clone();
                tags.push(tag);
                enclosing = Some((name, depth));
            } else if let Some(caps) = FUNCTION_RE.captures(line) {
                let is_static = caps.get(2).is_some();
                let name = caps.get(3).unwrap().as_str().to_string();
                let args = caps.get(4).map(|m| m.as_str().trim()).unwrap_or("");
                let column = caps.get(3).unwrap().start() as u32;
                let mut tag = match &enclosing {
                    Some((class, _)) if depth > 0 => {
                        Tag::new(format!("{}.{}", class, name), name.clone(), TagKind::Method)
                    }
                    _ => Tag::new(name.clone(), name.clone(), TagKind::Function),
                };
                tag.signature = Some(format!("{}({})", name, args));
                tag.is_static = is_static;
                tag.namespace_name = namespace.clone();
                tags.push(tag.at(line_number, column));
            } else if let Some(caps) = PROPERTY_RE.captures(line) {
                if let Some((class, _)) = &enclosing {
                    if depth > 0 {
                        let name = caps.get(3).unwrap().as_str().to_string();
                        let mut tag = Tag::new(
                            format!("{}.{}", class, name),
                            name,
                            TagKind::Property,
                        )
                        .at(line_number, caps.get(3).unwrap().start() as u32);
                        tag.is_static = caps.get(2).is_some();
                        tags.push(tag);
                    }
                }
            } else if let Some(caps) = CONST_RE.captures(line) {
                let name = caps.get(1).unwrap().as_str().to_string();
                let column = caps.get(1).unwrap().start() as u32;
                let tag = match &enclosing {
                    Some((class, _)) if depth > 0 => Tag::new(
                        format!("{}.{}", class, name),
                        name,
                        TagKind::Constant,
                    ),
                    _ => Tag::new(name.clone(), name, TagKind::Constant),
                };
                tags.push(tag.at(line_number, column));
            } else if let Some(caps) = DEFINE_RE.captures(line) {
                let name = caps.get(1).unwrap().as_str().to_string();
                tags.push(
                    Tag::new(name.clone(), name, TagKind::Define)
                        .at(line_number, caps.get(1).unwrap().start() as u32),
                );
            }

            for ch in line.chars() {
                match ch {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if let Some((_, opened_at)) = &enclosing {
                            if depth <= *opened_at {
                                enclosing = None;
                            }
                        }
                    }
                    _ => {}
                }
            }
        }

        if depth != 0 {
            return Err(EngineError::parse(origin, "unbalanced braces"));
        }

        Ok(tags)
    }
}
