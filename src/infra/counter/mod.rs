//! Counter store backends.

pub mod memory;
pub mod sqlite;

pub use memory::InMemoryCounterStore;
pub use sqlite::SqliteCounterStore;
