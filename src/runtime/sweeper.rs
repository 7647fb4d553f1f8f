//! Periodic background sweeps.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::core::{OutreachEngine, Spawn};

/// Runs maintenance (health, stale connections, releases, counter pruning)
/// and optionally a dispatch pass on every tick.
pub struct Sweeper {
    interval: Duration,
    dispatch: bool,
}

/// Handle to a running sweeper.
pub struct SweeperHandle {
    shutdown: watch::Sender<bool>,
    ticks: Arc<AtomicU64>,
}

impl SweeperHandle {
    /// Ask the loop to exit after its current tick.
    pub fn stop(&self) {
        let _ = self.shutdown.send(true);
    }

    /// Completed ticks.
    #[must_use]
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }
}

impl Sweeper {
    /// Sweeper ticking every `interval`.
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self {
            interval,
            dispatch: false,
        }
    }

    /// Also dispatch due attempts on each tick.
    #[must_use]
    pub const fn with_dispatch(mut self, dispatch: bool) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Start the loop on `spawner`.
    pub fn start<S: Spawn>(self, engine: Arc<OutreachEngine>, spawner: &S) -> SweeperHandle {
        let (shutdown, mut stop) = watch::channel(false);
        let ticks = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&ticks);
        spawner.spawn(async move {
            let mut interval = tokio::time::interval(self.interval);
            loop {
                tokio::select! {
                    _ = interval.tick() => {}
                    changed = stop.changed() => {
                        if changed.is_err() || *stop.borrow() {
                            break;
                        }
                    }
                }
                let report = engine.run_maintenance();
                tracing::debug!(
                    "maintenance: {} health transitions, {} stale requests, {} releases",
                    report.health.transitions.len(),
                    report.stale_connections.len(),
                    report.released.len()
                );
                if self.dispatch {
                    if let Err(err) = engine.dispatch_due().await {
                        tracing::error!("dispatch pass failed: {}", err);
                    }
                }
                counter.fetch_add(1, Ordering::AcqRel);
            }
            tracing::info!("sweeper stopped");
        });
        SweeperHandle { shutdown, ticks }
    }
}
