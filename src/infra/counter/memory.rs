//! In-process counter store.
//!
//! Counters are sharded per resource; each shard sits behind its own
//! `parking_lot::Mutex`, so consumption is serialized per resource while
//! different resources never contend. Suitable for a single scheduler process.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::{Mutex, RwLock};

use crate::core::channel::Channel;
use crate::core::error::EngineError;
use crate::core::rate_limiter::{ConsumeOutcome, CounterStore, WindowKey, WindowLimit};
use crate::util::serde::{AttemptId, ResourceId};

#[derive(Default)]
struct ResourceCounters {
    counts: HashMap<(Channel, WindowKey), u32>,
    granted: HashSet<(AttemptId, Channel, WindowKey)>,
}

impl ResourceCounters {
    fn count(&self, channel: Channel, window: WindowKey) -> u32 {
        self.counts.get(&(channel, window)).copied().unwrap_or(0)
    }

    fn remaining(&self, channel: Channel, limits: &[WindowLimit]) -> u32 {
        limits
            .iter()
            .map(|l| l.cap.saturating_sub(self.count(channel, l.window)))
            .min()
            .unwrap_or(0)
    }
}

/// Counter store held in memory.
#[derive(Default)]
pub struct InMemoryCounterStore {
    shards: RwLock<HashMap<ResourceId, Arc<Mutex<ResourceCounters>>>>,
}

impl InMemoryCounterStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn shard(&self, resource_id: &ResourceId) -> Arc<Mutex<ResourceCounters>> {
        if let Some(shard) = self.shards.read().get(resource_id) {
            return Arc::clone(shard);
        }
        Arc::clone(self.shards.write().entry(resource_id.clone()).or_default())
    }
}

impl CounterStore for InMemoryCounterStore {
    fn try_increment(
        &self,
        resource_id: &ResourceId,
        channel: Channel,
        limits: &[WindowLimit],
        idempotency_key: Option<AttemptId>,
    ) -> Result<ConsumeOutcome, EngineError> {
        let shard = self.shard(resource_id);
        let mut counters = shard.lock();

        if let Some(key) = idempotency_key {
            let seen = !limits.is_empty()
                && limits
                    .iter()
                    .all(|l| counters.granted.contains(&(key, channel, l.window)));
            if seen {
                return Ok(ConsumeOutcome::Granted {
                    remaining: counters.remaining(channel, limits),
                });
            }
        }

        if let Some(full) = limits
            .iter()
            .find(|l| counters.count(channel, l.window) >= l.cap)
        {
            return Ok(ConsumeOutcome::exceeded(full.window));
        }

        for limit in limits {
            *counters.counts.entry((channel, limit.window)).or_insert(0) += 1;
            if let Some(key) = idempotency_key {
                counters.granted.insert((key, channel, limit.window));
            }
        }
        Ok(ConsumeOutcome::Granted {
            remaining: counters.remaining(channel, limits),
        })
    }

    fn count(
        &self,
        resource_id: &ResourceId,
        channel: Channel,
        window: WindowKey,
    ) -> Result<u32, EngineError> {
        Ok(self
            .shards
            .read()
            .get(resource_id)
            .map_or(0, |shard| shard.lock().count(channel, window)))
    }

    fn release(
        &self,
        resource_id: &ResourceId,
        channel: Channel,
        windows: &[WindowKey],
        key: AttemptId,
    ) -> Result<bool, EngineError> {
        let Some(shard) = self.shards.read().get(resource_id).cloned() else {
            return Ok(false);
        };
        let mut counters = shard.lock();
        let mut released = false;
        for window in windows {
            if counters.granted.remove(&(key, channel, *window)) {
                if let Some(count) = counters.counts.get_mut(&(channel, *window)) {
                    *count = count.saturating_sub(1);
                }
                released = true;
            }
        }
        Ok(released)
    }

    fn prune_before(&self, day: NaiveDate) -> Result<usize, EngineError> {
        let shards: Vec<_> = self.shards.read().values().cloned().collect();
        let mut removed = 0;
        for shard in shards {
            let mut counters = shard.lock();
            let before = counters.counts.len();
            counters.counts.retain(|(_, window), _| !window.ended_before(day));
            counters
                .granted
                .retain(|(_, _, window)| !window.ended_before(day));
            removed += before - counters.counts.len();
        }
        if removed > 0 {
            tracing::debug!("pruned {} expired rate windows", removed);
        }
        Ok(removed)
    }
}
