//! Multi-tier tag cache
//!
//! Aggregates the working finder (unsaved buffer), any number of global
//! finders (one per enabled source root), and an optional native-symbol
//! finder. A search walks four tiers (exact symbol, near-match symbol,
//! exact file, near-match file) and the first tier with any hit wins
//! outright; tiers are never merged. Within a tier, finders contribute in
//! registration order with the working finder first, so unsaved-buffer
//! symbols take precedence for equally-keyed matches.

use std::path::PathBuf;

use super::finder::Finder;
use crate::error::EngineError;
use crate::tag::{FileRecord, Tag};

/// Which tier produced a result set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchTier {
    ExactTag,
    NearMatchTag,
    ExactFile,
    NearMatchFile,
}

/// One tier's worth of results; `tags` and `files` are never both populated
#[derive(Debug, Default)]
pub struct CacheHits {
    pub tags: Vec<Tag>,
    pub files: Vec<FileRecord>,
    pub tier: Option<SearchTier>,
}

impl CacheHits {
    pub fn is_empty(&self) -> bool {
        self.tags.is_empty() && self.files.is_empty()
    }
}

/// Queries shorter than this skip the near-match tiers entirely: a one- or
/// two-character prefix against a wildcard index is prohibitively
/// unselective.
const NEAR_MATCH_MIN_LEN: usize = 3;

#[derive(Default)]
pub struct TagCache {
    working: Option<Box<dyn Finder>>,
    globals: Vec<Box<dyn Finder>>,
    native: Option<Box<dyn Finder>>,
}

impl TagCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically replace the working finder; the previous one is dropped.
    pub fn set_working_finder(&mut self, finder: Box<dyn Finder>) {
        self.working = Some(finder);
    }

    pub fn clear_working_finder(&mut self) {
        self.working = None;
    }

    /// Register a global finder; ownership transfers to the cache.
    pub fn register_global_finder(&mut self, finder: Box<dyn Finder>) {
        self.globals.push(finder);
    }

    pub fn set_native_finder(&mut self, finder: Box<dyn Finder>) {
        self.native = Some(finder);
    }

    pub fn finder_count(&self) -> usize {
        self.globals.len()
            + usize::from(self.working.is_some())
            + usize::from(self.native.is_some())
    }

    /// Working finder first, then globals in registration order, then native.
    fn finders(&self) -> impl Iterator<Item = &dyn Finder> {
        self.working
            .iter()
            .chain(self.globals.iter())
            .chain(self.native.iter())
            .map(|b| b.as_ref())
    }

    fn collect_tags<F>(&self, dirs: &[PathBuf], query: F) -> Result<Vec<Tag>, EngineError>
    where
        F: Fn(&dyn Finder) -> Result<Vec<Tag>, EngineError>,
    {
        let mut hits = Vec::new();
        for finder in self.finders() {
            hits.extend(query(finder)?);
        }
        if !dirs.is_empty() {
            hits.retain(|tag| {
                tag.full_path
                    .as_ref()
                    .map(|p| path_under_any(p, dirs))
                    .unwrap_or(false)
            });
        }
        Ok(hits)
    }

    fn collect_files<F>(&self, dirs: &[PathBuf], query: F) -> Result<Vec<FileRecord>, EngineError>
    where
        F: Fn(&dyn Finder) -> Result<Vec<FileRecord>, EngineError>,
    {
        let mut hits = Vec::new();
        for finder in self.finders() {
            hits.extend(query(finder)?);
        }
        if !dirs.is_empty() {
            hits.retain(|record| path_under_any(&record.full_path, dirs));
        }
        Ok(hits)
    }

    /// Tiered search. `dirs`, when non-empty, restricts candidates to those
    /// whose owning file path falls under one of the given directories.
    pub fn search(&self, query: &str, dirs: &[PathBuf]) -> Result<CacheHits, EngineError> {
        // Short queries get the exact tier only, found or not. Length is
        // counted in characters, not bytes.
        let exact = self.collect_tags(dirs, |f| f.exact_tags(query))?;
        if query.chars().count() < NEAR_MATCH_MIN_LEN {
            return Ok(CacheHits {
                tier: Some(SearchTier::ExactTag),
                tags: exact,
                ..Default::default()
            });
        }
        if !exact.is_empty() {
            return Ok(CacheHits {
                tier: Some(SearchTier::ExactTag),
                tags: exact,
                ..Default::default()
            });
        }

        let near = self.collect_tags(dirs, |f| f.near_match_tags(query))?;
        if !near.is_empty() {
            return Ok(CacheHits {
                tier: Some(SearchTier::NearMatchTag),
                tags: near,
                ..Default::default()
            });
        }

        let exact_files = self.collect_files(dirs, |f| f.exact_file_items(query))?;
        if !exact_files.is_empty() {
            return Ok(CacheHits {
                tier: Some(SearchTier::ExactFile),
                files: exact_files,
                ..Default::default()
            });
        }

        let near_files = self.collect_files(dirs, |f| f.near_match_file_items(query))?;
        Ok(CacheHits {
            tier: Some(SearchTier::NearMatchFile),
            files: near_files,
            ..Default::default()
        })
    }
}

fn path_under_any(path: &str, dirs: &[PathBuf]) -> bool {
    let path = std::path::Path::new(path);
    dirs.iter().any(|dir| path.starts_with(dir))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::TagKind;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Counts tier invocations and serves canned tags.
    struct SpyFinder {
        tags: Vec<Tag>,
        files: Vec<FileRecord>,
        exact_calls: Arc<AtomicUsize>,
        near_calls: Arc<AtomicUsize>,
    }

    impl SpyFinder {
        fn new(tags: Vec<Tag>) -> (Self, Arc<AtomicUsize>, Arc<AtomicUsize>) {
            let exact_calls = Arc::new(AtomicUsize::new(0));
            let near_calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    tags,
                    files: Vec::new(),
                    exact_calls: exact_calls.clone(),
                    near_calls: near_calls.clone(),
                },
                exact_calls,
                near_calls,
            )
        }
    }

    impl Finder for SpyFinder {
        fn exact_tags(&self, key: &str) -> Result<Vec<Tag>, EngineError> {
            self.exact_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.tags.iter().filter(|t| t.key == key).cloned().collect())
        }

        fn near_match_tags(&self, prefix: &str) -> Result<Vec<Tag>, EngineError> {
            self.near_calls.fetch_add(1, Ordering::SeqCst);
            let upper = prefix.to_uppercase();
            Ok(self
                .tags
                .iter()
                .filter(|t| t.key.to_uppercase().starts_with(&upper))
                .cloned()
                .collect())
        }

        fn exact_file_items(&self, name: &str) -> Result<Vec<FileRecord>, EngineError> {
            Ok(self
                .files
                .iter()
                .filter(|f| f.name == name)
                .cloned()
                .collect())
        }

        fn near_match_file_items(&self, prefix: &str) -> Result<Vec<FileRecord>, EngineError> {
            let upper = prefix.to_uppercase();
            Ok(self
                .files
                .iter()
                .filter(|f| f.name.to_uppercase().starts_with(&upper))
                .cloned()
                .collect())
        }
    }

    fn tag(key: &str) -> Tag {
        Tag::new(key, key, TagKind::Class)
    }

    fn tag_in(key: &str, path: &str) -> Tag {
        let mut t = tag(key);
        t.full_path = Some(path.to_string());
        t
    }

    #[test]
    fn test_short_query_runs_exact_tier_only() {
        let (spy, _exact, near) = SpyFinder::new(vec![tag("Fo")]);
        let mut cache = TagCache::new();
        cache.register_global_finder(Box::new(spy));

        let hits = cache.search("Fo", &[]).unwrap();
        assert_eq!(hits.tags.len(), 1);
        assert_eq!(hits.tier, Some(SearchTier::ExactTag));
        assert_eq!(near.load(Ordering::SeqCst), 0);

        // Even an empty exact result must not fall through to near-match
        let hits = cache.search("zz", &[]).unwrap();
        assert!(hits.is_empty());
        assert_eq!(near.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_short_query_length_is_counted_in_characters() {
        let (spy, _exact, near) = SpyFinder::new(vec![tag("Überweisung")]);
        let mut cache = TagCache::new();
        cache.register_global_finder(Box::new(spy));

        // Two characters but four bytes: still a short query.
        let hits = cache.search("Üb", &[]).unwrap();
        assert_eq!(hits.tier, Some(SearchTier::ExactTag));
        assert!(hits.tags.is_empty());
        assert_eq!(near.load(Ordering::SeqCst), 0);

        // Three characters crosses the threshold.
        let hits = cache.search("Übe", &[]).unwrap();
        assert_eq!(hits.tier, Some(SearchTier::NearMatchTag));
        assert_eq!(hits.tags.len(), 1);
        assert_eq!(near.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_exact_match_short_circuits_near_match() {
        let (spy, exact, near) = SpyFinder::new(vec![tag("Foo")]);
        let mut cache = TagCache::new();
        cache.register_global_finder(Box::new(spy));

        let hits = cache.search("Foo", &[]).unwrap();
        assert_eq!(hits.tags.len(), 1);
        assert_eq!(hits.tier, Some(SearchTier::ExactTag));
        assert_eq!(exact.load(Ordering::SeqCst), 1);
        assert_eq!(near.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_near_match_fallback_when_exact_misses() {
        let (spy, _exact, near) = SpyFinder::new(vec![tag("FooBar")]);
        let mut cache = TagCache::new();
        cache.register_global_finder(Box::new(spy));

        let hits = cache.search("Foo", &[]).unwrap();
        assert_eq!(hits.tier, Some(SearchTier::NearMatchTag));
        assert_eq!(hits.tags.len(), 1);
        assert_eq!(near.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_file_tiers_after_symbol_tiers_miss() {
        let (mut spy, _, _) = SpyFinder::new(vec![]);
        spy.files.push(FileRecord {
            file_item_id: 1,
            source_id: 1,
            full_path: "/app/UserController.php".to_string(),
            name: "UserController.php".to_string(),
            last_modified: 0,
            is_parsed: true,
            is_new: false,
        });
        let mut cache = TagCache::new();
        cache.register_global_finder(Box::new(spy));

        let hits = cache.search("UserController.php", &[]).unwrap();
        assert_eq!(hits.tier, Some(SearchTier::ExactFile));
        assert_eq!(hits.files.len(), 1);

        let hits = cache.search("UserCon", &[]).unwrap();
        assert_eq!(hits.tier, Some(SearchTier::NearMatchFile));
        assert_eq!(hits.files.len(), 1);
    }

    #[test]
    fn test_working_finder_results_come_first() {
        let (working, _, _) = SpyFinder::new(vec![tag_in("User", "/buffer/User.php")]);
        let (global, _, _) = SpyFinder::new(vec![tag_in("User", "/app/User.php")]);
        let mut cache = TagCache::new();
        cache.register_global_finder(Box::new(global));
        cache.set_working_finder(Box::new(working));

        let hits = cache.search("User", &[]).unwrap();
        assert_eq!(hits.tags.len(), 2);
        assert_eq!(hits.tags[0].full_path.as_deref(), Some("/buffer/User.php"));
    }

    #[test]
    fn test_directory_restriction_filters_within_tier() {
        let (global, _, _) = SpyFinder::new(vec![
            tag_in("UserOne", "/app/models/UserOne.php"),
            tag_in("UserTwo", "/app/vendor/UserTwo.php"),
        ]);
        let mut cache = TagCache::new();
        cache.register_global_finder(Box::new(global));

        let hits = cache
            .search("User", &[PathBuf::from("/app/models")])
            .unwrap();
        assert_eq!(hits.tags.len(), 1);
        assert_eq!(hits.tags[0].key, "UserOne");

        // Empty restriction means the whole cache
        let hits = cache.search("User", &[]).unwrap();
        assert_eq!(hits.tags.len(), 2);
    }

    #[test]
    fn test_tiers_are_never_merged() {
        let (mut spy, _, _) = SpyFinder::new(vec![tag("Foobar")]);
        spy.files.push(FileRecord {
            file_item_id: 1,
            source_id: 1,
            full_path: "/app/Foo.php".to_string(),
            name: "Foo.php".to_string(),
            last_modified: 0,
            is_parsed: true,
            is_new: false,
        });
        let mut cache = TagCache::new();
        cache.register_global_finder(Box::new(spy));

        let hits = cache.search("Foo", &[]).unwrap();
        assert_eq!(hits.tier, Some(SearchTier::NearMatchTag));
        assert!(hits.files.is_empty());
    }
}
