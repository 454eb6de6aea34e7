//! Working-copy cache builder
//!
//! Tokenizes the text of the file being edited, which may be unsaved, into
//! an in-memory store and hands back its finder. The owner swaps it in as
//! the working tier, so results from the live buffer always shadow the
//! persisted index. A parse failure fails the action and the previously
//! registered working finder stays untouched.

use std::sync::Arc;
use tracing::debug;

use super::events::ActionOutcome;
use super::{Action, CancelToken, EngineContext, Progress};
use crate::error::EngineError;
use crate::store::TagStore;
use crate::tokenizer::{PhpVersion, Tokenizer};

pub struct WorkingCacheAction {
    /// Path shown in results; the file may not exist on disk yet.
    file_identifier: String,
    text: String,
    tokenizer: Option<Arc<dyn Tokenizer>>,
    php_version: PhpVersion,
}

impl WorkingCacheAction {
    pub fn new(file_identifier: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            file_identifier: file_identifier.into(),
            text: text.into(),
            tokenizer: None,
            php_version: PhpVersion::default(),
        }
    }
}

impl Action for WorkingCacheAction {
    fn label(&self) -> String {
        format!("Caching {}", self.file_identifier)
    }

    fn init(&mut self, ctx: &mut EngineContext) -> bool {
        self.tokenizer = Some(ctx.tokenizer.clone());
        self.php_version = ctx.php_version;
        true
    }

    fn background_work(
        &mut self,
        _progress: &Progress,
        cancel: &CancelToken,
    ) -> Result<ActionOutcome, EngineError> {
        cancel.checkpoint()?;
        let tokenizer = self
            .tokenizer
            .clone()
            .expect("init runs before background_work");

        // Propagated on failure: the edit buffer is often mid-keystroke
        // invalid, and a broken buffer must not clobber the last good tier.
        let tags = tokenizer.tokenize(&self.file_identifier, &self.text, self.php_version)?;
        debug!(file = %self.file_identifier, tags = tags.len(), "working copy tokenized");

        cancel.checkpoint()?;
        let mut store = TagStore::open_in_memory()?;
        let source_id = store.ensure_source(std::path::Path::new(&self.file_identifier))?;
        let file_id = store.upsert_file_item(source_id, &self.file_identifier, 0, true)?;
        store.replace_file_tags(file_id, source_id, &tags)?;
        store.set_file_parsed(file_id, true)?;

        Ok(ActionOutcome::WorkingFinderReady {
            finder: store.into_finder(),
        })
    }
}
