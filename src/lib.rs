//! phplens: source-code intelligence for PHP projects.
//!
//! The engine tokenizes PHP sources into tags, persists them in per-project
//! SQLite stores, and answers completion-style lookups through a multi-tier
//! cache (working copy, then project stores, then native symbols). Long
//! operations run as cancelable actions on a worker pool and report back
//! over an event channel.

pub mod actions;
pub mod error;
pub mod project;
pub mod store;
pub mod tag;
pub mod tokenizer;
pub mod watcher;

pub use actions::events::{ActionOutcome, EngineEvent};
pub use actions::scheduler::ActionScheduler;
pub use actions::{Action, CancelToken, EngineContext};
pub use error::EngineError;
pub use store::{CacheHits, Finder, NativeFinder, SearchTier, TagCache, TagFinder, TagStore};
pub use tag::{Tag, TagKind};
pub use tokenizer::{PhpVersion, ScriptTokenizer, Tokenizer};
