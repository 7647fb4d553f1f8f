//! Infrastructure adapters for counter stores and the send-attempt log.

pub mod attempts;
pub mod counter;

pub use attempts::{InMemoryAttemptStore, JsonlAttemptStore};
pub use counter::{InMemoryCounterStore, SqliteCounterStore};
