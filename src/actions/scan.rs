//! Source-root scan action
//!
//! Walks a source directory (or takes a fixed file list for rescans),
//! tokenizes each file, and persists file records plus tags. A parse error
//! skips only that file; cancellation is polled before every file, and rows
//! already committed stay committed; cancellation never rolls back.

use ignore::WalkBuilder;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info};

use super::events::ActionOutcome;
use super::file_check::mtime_of;
use super::{Action, CancelToken, EngineContext, Progress};
use crate::error::EngineError;
use crate::project::SourceDirConfig;
use crate::store::{store_write_lock, TagFinder, TagStore};
use crate::tokenizer::{PhpVersion, Tokenizer};

pub struct ProjectScanAction {
    db_path: PathBuf,
    source: SourceDirConfig,
    /// When set, scan exactly these files instead of walking the root.
    files: Option<Vec<PathBuf>>,
    tokenizer: Option<Arc<dyn Tokenizer>>,
    php_version: PhpVersion,
}

impl ProjectScanAction {
    pub fn walk(db_path: impl Into<PathBuf>, source: SourceDirConfig) -> Self {
        Self {
            db_path: db_path.into(),
            source,
            files: None,
            tokenizer: None,
            php_version: PhpVersion::default(),
        }
    }

    /// Rescan a fixed list, e.g. the modified paths from a file check.
    pub fn file_list(
        db_path: impl Into<PathBuf>,
        source: SourceDirConfig,
        files: Vec<PathBuf>,
    ) -> Self {
        Self {
            db_path: db_path.into(),
            source,
            files: Some(files),
            tokenizer: None,
            php_version: PhpVersion::default(),
        }
    }

    fn enumerate(&self) -> Vec<PathBuf> {
        let mut files = match &self.files {
            Some(list) => list.clone(),
            None => {
                let walker = WalkBuilder::new(&self.source.directory)
                    .hidden(false)
                    .git_ignore(true)
                    .build();
                walker
                    .filter_map(|entry| entry.ok())
                    .filter(|entry| {
                        entry.file_type().map(|ft| ft.is_file()).unwrap_or(false)
                    })
                    .map(|entry| entry.into_path())
                    .filter(|path| self.source.matches(path))
                    .collect()
            }
        };
        // Deterministic scan order; walk order varies by platform.
        files.sort();
        files
    }
}

impl Action for ProjectScanAction {
    fn label(&self) -> String {
        format!("Indexing {}", self.source.directory.display())
    }

    fn init(&mut self, ctx: &mut EngineContext) -> bool {
        if self.files.is_none() && !self.source.directory.is_dir() {
            return false;
        }
        // The context's configuration for this root wins over whatever the
        // submitter constructed, so saved wildcards always apply.
        if let Some(configured) = ctx
            .sources
            .iter()
            .find(|s| s.directory == self.source.directory)
        {
            self.source = configured.clone();
        }
        self.tokenizer = Some(ctx.tokenizer.clone());
        self.php_version = ctx.php_version;
        true
    }

    fn background_work(
        &mut self,
        progress: &Progress,
        cancel: &CancelToken,
    ) -> Result<ActionOutcome, EngineError> {
        let tokenizer = self
            .tokenizer
            .clone()
            .expect("init runs before background_work");

        let lock = store_write_lock(&self.db_path);
        let _guard = lock.lock().unwrap();

        let mut store = TagStore::open(&self.db_path)?;
        let source_id = store.ensure_source(&self.source.directory)?;

        let files = self.enumerate();
        let mut errors = Vec::new();
        let mut files_scanned = 0usize;

        for path in &files {
            cancel.checkpoint()?;
            progress.report(format!("Parsing {}", path.display()));

            let full_path = path.to_string_lossy().into_owned();
            let text = match std::fs::read_to_string(path) {
                Ok(text) => text,
                Err(err) => {
                    errors.push(format!("{}: {}", full_path, err));
                    continue;
                }
            };
            let mtime = mtime_of(path).unwrap_or(0);
            let file_id = store.upsert_file_item(source_id, &full_path, mtime, false)?;

            match tokenizer.tokenize(&full_path, &text, self.php_version) {
                Ok(tags) => {
                    store.replace_file_tags(file_id, source_id, &tags)?;
                    store.set_file_parsed(file_id, true)?;
                }
                Err(err) => {
                    // The file's tags are simply absent; the scan goes on.
                    debug!(%full_path, error = %err, "tokenizer rejected file");
                    errors.push(err.to_string());
                    store.set_file_parsed(file_id, false)?;
                }
            }
            files_scanned += 1;
        }

        drop(store);
        info!(
            source = %self.source.directory.display(),
            files_scanned,
            errors = errors.len(),
            "scan finished"
        );

        cancel.checkpoint()?;
        let finder = TagFinder::open(&self.db_path)?;
        Ok(ActionOutcome::ScanFinished {
            db_path: self.db_path.clone(),
            source_dir: self.source.directory.clone(),
            files_scanned,
            errors,
            finder,
        })
    }
}
