//! Error types for the tag engine
//!
//! Failures local to one unit of work (a single file, a single detector
//! invocation) are accumulated as strings on the action outcome instead of
//! aborting the run; the variants here cover failures that end an action.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// The persisted tag store could not be opened or prepared at all.
    #[error("cannot open tag store: {0}")]
    StoreConnection(rusqlite::Error),

    /// A statement against an already-open store failed.
    #[error("tag store query failed: {0}")]
    StoreQuery(#[from] rusqlite::Error),

    /// The tokenizer rejected a file's content.
    #[error("parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// The external detector process could not be launched.
    #[error("detector process failed: {0}")]
    Detector(String),

    #[error("filesystem watch failed: {0}")]
    Watch(#[from] notify::Error),

    /// Cooperative cancellation was observed. Not a failure: the scheduler
    /// suppresses the completion event and emits a cancelled notification.
    #[error("cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn parse(path: impl Into<String>, message: impl Into<String>) -> Self {
        EngineError::Parse {
            path: path.into(),
            message: message.into(),
        }
    }
}
