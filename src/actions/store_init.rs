//! Schema version guard, run as an action
//!
//! Opening a project's store checks its `schema_version` against the
//! compiled-in value and wipes/recreates on mismatch. That can mean
//! dropping and rebuilding every table, so it runs off-thread once per
//! enabled project at startup instead of blocking the owning context.

use std::path::PathBuf;
use tracing::debug;

use super::events::ActionOutcome;
use super::{Action, CancelToken, Progress};
use crate::error::EngineError;
use crate::store::{store_write_lock, TagFinder, TagStore};

pub struct StoreInitAction {
    db_path: PathBuf,
}

impl StoreInitAction {
    pub fn new(db_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
        }
    }
}

impl Action for StoreInitAction {
    fn label(&self) -> String {
        format!("Opening tag store {}", self.db_path.display())
    }

    fn background_work(
        &mut self,
        _progress: &Progress,
        cancel: &CancelToken,
    ) -> Result<ActionOutcome, EngineError> {
        cancel.checkpoint()?;
        let lock = store_write_lock(&self.db_path);
        let _guard = lock.lock().unwrap();

        // Opening runs the version guard; the handle is dropped right away
        // since this action only needed the side effect.
        let store = TagStore::open(&self.db_path)?;
        debug!(path = %self.db_path.display(), "tag store ready");
        drop(store);

        cancel.checkpoint()?;
        let finder = TagFinder::open(&self.db_path)?;
        Ok(ActionOutcome::StoreReady {
            db_path: self.db_path.clone(),
            finder,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::events::EngineEvent;
    use crate::actions::scheduler::ActionScheduler;
    use crate::actions::EngineContext;
    use crate::store::Finder;
    use std::sync::mpsc::channel;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_store_init_delivers_registerable_finder() {
        let temp = TempDir::new().unwrap();
        let db_path = temp.path().join("tags.db");

        let (event_tx, event_rx) = channel();
        let scheduler = ActionScheduler::new(1, event_tx);
        let mut ctx = EngineContext::new();
        scheduler
            .submit(Box::new(StoreInitAction::new(&db_path)), &mut ctx)
            .unwrap();

        let finder = loop {
            match event_rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                EngineEvent::Completed {
                    outcome: ActionOutcome::StoreReady { finder, .. },
                    ..
                } => break finder,
                EngineEvent::Failed { message, .. } => panic!("init failed: {}", message),
                _ => continue,
            }
        };

        assert!(finder.exact_tags("User").unwrap().is_empty());
        assert!(db_path.exists());
    }
}
