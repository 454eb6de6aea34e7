//! Cancelable background work units and their scheduler
//!
//! An `Action` is one unit of long-running work. Its `init` runs
//! synchronously on the submitting thread against the shared engine
//! context and may reject the work; `background_work` runs on a worker
//! thread and must poll the cancel token at every natural checkpoint
//! (per file, per statement). Everything an action carries across the
//! thread boundary is owned data, moved in at submission and moved back
//! out through the completion event.

pub mod detector;
pub mod events;
pub mod file_check;
pub mod scan;
pub mod scheduler;
pub mod store_init;
pub mod working_cache;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::Arc;

use crate::error::EngineError;
use crate::project::SourceDirConfig;
use crate::tokenizer::{PhpVersion, ScriptTokenizer, Tokenizer};
use events::{ActionId, ActionOutcome, EngineEvent};

/// Cooperative cancellation flag shared between owner and worker
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    /// Checkpoint helper: turns an observed cancellation into the error
    /// that makes the scheduler suppress the completion event.
    pub fn checkpoint(&self) -> Result<(), EngineError> {
        if self.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }
}

/// Shared engine state handed to every action's `init`.
///
/// Actions may read everything; the only field they mutate is `sources`
/// (enable/disable of roots happens on the owning thread, before any
/// worker sees the action).
pub struct EngineContext {
    pub php_version: PhpVersion,
    pub tokenizer: Arc<dyn Tokenizer>,
    pub sources: Vec<SourceDirConfig>,
}

impl EngineContext {
    pub fn new() -> Self {
        Self {
            php_version: PhpVersion::default(),
            tokenizer: Arc::new(ScriptTokenizer::new()),
            sources: Vec::new(),
        }
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Heartbeat channel handed to `background_work` for progress events.
pub struct Progress {
    tx: Sender<EngineEvent>,
    action_id: ActionId,
}

impl Progress {
    pub(crate) fn new(tx: Sender<EngineEvent>, action_id: ActionId) -> Self {
        Self { tx, action_id }
    }

    pub fn report(&self, label: impl Into<String>) {
        // The owner may have hung up; progress is best-effort.
        let _ = self.tx.send(EngineEvent::Progress {
            action_id: self.action_id,
            label: label.into(),
        });
    }
}

/// A unit of cancelable, possibly-asynchronous background work
pub trait Action: Send {
    /// Status text shown while the action runs.
    fn label(&self) -> String;

    /// Whether this action needs a worker at all. Trivial state mutations
    /// return false: `init` runs synchronously and nothing is queued.
    fn do_async(&self) -> bool {
        true
    }

    /// Runs on the submitting thread. Returning false skips the action.
    fn init(&mut self, _ctx: &mut EngineContext) -> bool {
        true
    }

    /// Runs on a worker thread. Must poll `cancel` at each checkpoint and
    /// return `EngineError::Cancelled` promptly when it fires.
    fn background_work(
        &mut self,
        progress: &Progress,
        cancel: &CancelToken,
    ) -> Result<ActionOutcome, EngineError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cancel_token_checkpoint() {
        let token = CancelToken::new();
        assert!(token.checkpoint().is_ok());
        token.cancel();
        assert!(matches!(token.checkpoint(), Err(EngineError::Cancelled)));
        // Clones observe the same flag
        let clone = token.clone();
        assert!(clone.is_cancelled());
    }
}
