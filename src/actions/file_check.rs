//! File-modification detector
//!
//! Given (path, last-known-mtime) pairs, stats each path off-thread and
//! classifies it as unmodified, modified, or deleted. One event carries the
//! whole classification at the end; a cancelled run posts nothing, never a
//! partial list.

use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use super::events::ActionOutcome;
use super::{Action, CancelToken, Progress};
use crate::error::EngineError;

/// Disk mtime in unix seconds, `None` when the path no longer exists.
pub fn mtime_of(path: &std::path::Path) -> Option<i64> {
    let metadata = std::fs::metadata(path).ok()?;
    let modified = metadata.modified().ok()?;
    Some(
        modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or(0),
    )
}

pub struct FileCheckAction {
    /// Owned copies: the worker never borrows the caller's records.
    entries: Vec<(PathBuf, i64)>,
}

impl FileCheckAction {
    pub fn new(entries: Vec<(PathBuf, i64)>) -> Self {
        Self { entries }
    }
}

impl Action for FileCheckAction {
    fn label(&self) -> String {
        format!("Checking {} files for changes", self.entries.len())
    }

    fn background_work(
        &mut self,
        _progress: &Progress,
        cancel: &CancelToken,
    ) -> Result<ActionOutcome, EngineError> {
        let mut modified = Vec::new();
        let mut deleted = Vec::new();

        for (path, known_mtime) in &self.entries {
            cancel.checkpoint()?;
            match mtime_of(path) {
                Some(mtime) if mtime > *known_mtime => modified.push((path.clone(), mtime)),
                Some(_) => {} // unmodified
                None => deleted.push(path.clone()),
            }
        }

        Ok(ActionOutcome::FileCheck { modified, deleted })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::Progress;
    use std::fs;
    use std::sync::mpsc::channel;
    use tempfile::TempDir;

    fn run(action: &mut FileCheckAction) -> (Vec<(PathBuf, i64)>, Vec<PathBuf>) {
        let (tx, _rx) = channel();
        let progress = Progress::new(tx, 1);
        let cancel = CancelToken::new();
        match action.background_work(&progress, &cancel).unwrap() {
            ActionOutcome::FileCheck { modified, deleted } => (modified, deleted),
            other => panic!("unexpected outcome {:?}", other),
        }
    }

    #[test]
    fn test_classifies_modified_and_deleted() {
        let temp = TempDir::new().unwrap();
        let unchanged = temp.path().join("same.php");
        let touched = temp.path().join("touched.php");
        let gone = temp.path().join("gone.php");
        fs::write(&unchanged, "<?php\n").unwrap();
        fs::write(&touched, "<?php\n").unwrap();

        let unchanged_mtime = mtime_of(&unchanged).unwrap();
        // Known mtime older than disk marks the file modified.
        let entries = vec![
            (unchanged.clone(), unchanged_mtime),
            (touched.clone(), mtime_of(&touched).unwrap() - 10),
            (gone.clone(), 100),
        ];

        let (modified, deleted) = run(&mut FileCheckAction::new(entries));

        assert_eq!(modified.len(), 1);
        assert_eq!(modified[0].0, touched);
        assert!(modified[0].1 > 0);
        assert_eq!(deleted, vec![gone]);
    }

    #[test]
    fn test_cancelled_run_posts_nothing() {
        let temp = TempDir::new().unwrap();
        let file = temp.path().join("a.php");
        fs::write(&file, "<?php\n").unwrap();

        let mut action = FileCheckAction::new(vec![(file, 0)]);
        let (tx, _rx) = channel();
        let progress = Progress::new(tx, 1);
        let cancel = CancelToken::new();
        cancel.cancel();

        let result = action.background_work(&progress, &cancel);
        assert!(matches!(result, Err(EngineError::Cancelled)));
    }
}
