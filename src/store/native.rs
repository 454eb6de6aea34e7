//! Native-symbol finder for PHP built-ins
//!
//! A read-only, in-memory finder over the language's own functions and
//! classes, registered last in the cache so project symbols shadow it.
//! The table here is a useful subset, not the full standard library.

use lazy_static::lazy_static;

use super::finder::Finder;
use crate::error::EngineError;
use crate::tag::{FileRecord, Tag, TagKind};

static NATIVE_FUNCTIONS: &[(&str, &str)] = &[
    ("array_filter", "array_filter(array $array, ?callable $callback)"),
    ("array_key_exists", "array_key_exists(string|int $key, array $array)"),
    ("array_keys", "array_keys(array $array)"),
    ("array_map", "array_map(?callable $callback, array $array)"),
    ("array_merge", "array_merge(array ...$arrays)"),
    ("array_push", "array_push(array &$array, mixed ...$values)"),
    ("array_search", "array_search(mixed $needle, array $haystack)"),
    ("array_slice", "array_slice(array $array, int $offset)"),
    ("count", "count(Countable|array $value)"),
    ("date", "date(string $format, ?int $timestamp)"),
    ("explode", "explode(string $separator, string $string)"),
    ("file_exists", "file_exists(string $filename)"),
    ("file_get_contents", "file_get_contents(string $filename)"),
    ("file_put_contents", "file_put_contents(string $filename, mixed $data)"),
    ("implode", "implode(string $separator, array $array)"),
    ("in_array", "in_array(mixed $needle, array $haystack)"),
    ("is_array", "is_array(mixed $value)"),
    ("is_numeric", "is_numeric(mixed $value)"),
    ("is_string", "is_string(mixed $value)"),
    ("json_decode", "json_decode(string $json, ?bool $associative)"),
    ("json_encode", "json_encode(mixed $value, int $flags)"),
    ("preg_match", "preg_match(string $pattern, string $subject)"),
    ("preg_replace", "preg_replace(string $pattern, string $replacement, string $subject)"),
    ("printf", "printf(string $format, mixed ...$values)"),
    ("sprintf", "sprintf(string $format, mixed ...$values)"),
    ("str_contains", "str_contains(string $haystack, string $needle)"),
    ("str_replace", "str_replace(mixed $search, mixed $replace, mixed $subject)"),
    ("strlen", "strlen(string $string)"),
    ("strpos", "strpos(string $haystack, string $needle)"),
    ("strtolower", "strtolower(string $string)"),
    ("strtoupper", "strtoupper(string $string)"),
    ("substr", "substr(string $string, int $offset)"),
    ("trim", "trim(string $string)"),
    ("usort", "usort(array &$array, callable $callback)"),
    ("var_dump", "var_dump(mixed ...$values)"),
];

static NATIVE_CLASSES: &[&str] = &[
    "ArrayAccess",
    "ArrayObject",
    "Closure",
    "Countable",
    "DateInterval",
    "DateTime",
    "DateTimeImmutable",
    "Exception",
    "Generator",
    "InvalidArgumentException",
    "Iterator",
    "IteratorAggregate",
    "PDO",
    "PDOStatement",
    "RuntimeException",
    "SplQueue",
    "SplStack",
    "Throwable",
    "Traversable",
];

lazy_static! {
    static ref NATIVE_TAGS: Vec<Tag> = {
        let mut tags: Vec<Tag> = NATIVE_FUNCTIONS
            .iter()
            .map(|(name, signature)| {
                Tag::new(*name, *name, TagKind::Function).with_signature(*signature)
            })
            .collect();
        tags.extend(
            NATIVE_CLASSES
                .iter()
                .map(|name| Tag::new(*name, *name, TagKind::Class)),
        );
        tags.sort_by(|a, b| a.key.cmp(&b.key));
        tags
    };
}

/// Finder over the static built-in symbol table. Has no files to offer.
#[derive(Debug, Default)]
pub struct NativeFinder;

impl NativeFinder {
    pub fn new() -> Self {
        Self
    }
}

impl Finder for NativeFinder {
    fn exact_tags(&self, key: &str) -> Result<Vec<Tag>, EngineError> {
        Ok(NATIVE_TAGS
            .iter()
            .filter(|t| t.key == key)
            .cloned()
            .collect())
    }

    fn near_match_tags(&self, prefix: &str) -> Result<Vec<Tag>, EngineError> {
        let upper = prefix.to_uppercase();
        Ok(NATIVE_TAGS
            .iter()
            .filter(|t| t.key.to_uppercase().starts_with(&upper))
            .cloned()
            .collect())
    }

    fn exact_file_items(&self, _name: &str) -> Result<Vec<FileRecord>, EngineError> {
        Ok(Vec::new())
    }

    fn near_match_file_items(&self, _prefix: &str) -> Result<Vec<FileRecord>, EngineError> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_builtin_lookup() {
        let finder = NativeFinder::new();
        let hits = finder.exact_tags("strlen").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].kind, TagKind::Function);
        assert!(hits[0].signature.as_deref().unwrap().starts_with("strlen("));
    }

    #[test]
    fn test_near_match_builtins_sorted() {
        let finder = NativeFinder::new();
        let keys: Vec<String> = finder
            .near_match_tags("str_")
            .unwrap()
            .into_iter()
            .map(|t| t.key)
            .collect();
        assert_eq!(keys, vec!["str_contains", "str_replace"]);
    }

    #[test]
    fn test_no_file_items() {
        let finder = NativeFinder::new();
        assert!(finder.near_match_file_items("str").unwrap().is_empty());
    }
}
