//! Runtime adapters and API surface.

pub mod api;
pub mod sweeper;
pub mod tokio_spawner;

pub use api::{attempt_status, snapshot_resources, AttemptStatusResponse, ChannelUsage, ResourceSnapshot};
pub use sweeper::{Sweeper, SweeperHandle};
pub use tokio_spawner::TokioSpawner;
