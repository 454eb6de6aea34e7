//! Persisted tag store, query layer, and the multi-tier cache

pub mod cache;
pub mod finder;
pub mod native;
pub mod schema;
pub mod store;

pub use cache::{CacheHits, SearchTier, TagCache};
pub use finder::{Finder, TagFinder};
pub use native::NativeFinder;
pub use schema::SCHEMA_VERSION;
pub use store::{store_write_lock, TagStore};
