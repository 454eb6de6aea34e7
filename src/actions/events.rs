//! Event contract between the scheduler and the owning thread
//!
//! Events flow one direction, worker → owner, over a channel. For a given
//! action the order is always started → progress* → exactly one terminal
//! event (completed, failed, or cancelled). A cancelled action never
//! delivers a payload, so listeners cannot act on partial results.

use std::path::PathBuf;

use crate::store::TagFinder;

pub type ActionId = u64;

/// Payload of a successful action, moved to the owning thread.
///
/// Finders built on a worker transfer ownership here; the owner's job is to
/// register them with the multi-tier cache.
#[derive(Debug)]
pub enum ActionOutcome {
    /// Store file opened and version-guarded; finder ready to register.
    StoreReady {
        db_path: PathBuf,
        finder: TagFinder,
    },
    /// A source root was scanned into the store.
    ScanFinished {
        db_path: PathBuf,
        source_dir: PathBuf,
        files_scanned: usize,
        /// Per-file errors that did not abort the run
        errors: Vec<String>,
        finder: TagFinder,
    },
    /// In-memory finder for the unsaved buffer.
    WorkingFinderReady { finder: TagFinder },
    /// Classification produced by the file-modification detector.
    FileCheck {
        modified: Vec<(PathBuf, i64)>,
        deleted: Vec<PathBuf>,
    },
    /// The external detector process finished.
    DetectorFinished {
        exit_code: i32,
        errors: Vec<String>,
    },
}

#[derive(Debug)]
pub enum EngineEvent {
    Started { action_id: ActionId, label: String },
    Progress { action_id: ActionId, label: String },
    Completed { action_id: ActionId, outcome: ActionOutcome },
    Failed { action_id: ActionId, label: String, message: String },
    /// Distinguished no-op so listeners can clear progress state.
    Cancelled { action_id: ActionId },
}

impl EngineEvent {
    pub fn action_id(&self) -> ActionId {
        match self {
            EngineEvent::Started { action_id, .. }
            | EngineEvent::Progress { action_id, .. }
            | EngineEvent::Completed { action_id, .. }
            | EngineEvent::Failed { action_id, .. }
            | EngineEvent::Cancelled { action_id } => *action_id,
        }
    }

    /// Whether this is the last event the action will ever send.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineEvent::Completed { .. }
                | EngineEvent::Failed { .. }
                | EngineEvent::Cancelled { .. }
        )
    }
}
