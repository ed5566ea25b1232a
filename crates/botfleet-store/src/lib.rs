// ABOUTME: Config store implementations for botfleet.
// ABOUTME: SqliteStore persists to disk; MemoryStore keeps configs in a map.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;
