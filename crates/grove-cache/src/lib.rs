//! Persistent node cache with time-based staleness
//!
//! Two logical tables, node-by-id and children-by-parent, each record stamped with its
//! write time. A record older than the TTL is reported as absent and reclaimed lazily.

pub mod memory;
pub mod sqlite;
pub mod store;

pub use memory::MemoryCache;
pub use sqlite::SqliteCache;
pub use store::{CacheStore, DEFAULT_TTL};
