//! Send-attempt store backends.

pub mod jsonl;
pub mod memory;

pub use jsonl::JsonlAttemptStore;
pub use memory::InMemoryAttemptStore;
