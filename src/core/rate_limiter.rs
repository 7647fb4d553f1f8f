//! Rate limiter: atomic per-resource, per-channel, per-window consumption.
//!
//! The check against the cap and the increment happen in one step inside the
//! [`CounterStore`]; callers never read-then-write. A resource carries a daily
//! and a weekly window and both must pass for a grant.

use std::sync::Arc;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::core::channel::Channel;
use crate::core::error::{EngineError, ReasonCode};
use crate::util::serde::{AttemptId, ResourceId};

/// Calendar window a counter belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKey {
    /// A calendar day.
    Day(NaiveDate),
    /// An ISO week.
    Week {
        /// ISO week-numbering year.
        year: i32,
        /// ISO week number.
        week: u32,
    },
}

impl WindowKey {
    /// ISO week containing `day`.
    #[must_use]
    pub fn week_of(day: NaiveDate) -> Self {
        let iso = day.iso_week();
        Self::Week {
            year: iso.year(),
            week: iso.week(),
        }
    }

    /// Whether the window ended before `day`.
    #[must_use]
    pub fn ended_before(&self, day: NaiveDate) -> bool {
        match *self {
            Self::Day(d) => d < day,
            Self::Week { .. } => *self < Self::week_of(day),
        }
    }
}

/// A window together with its cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowLimit {
    /// Window being consumed.
    pub window: WindowKey,
    /// Cap for the window.
    pub cap: u32,
}

/// Result of a consumption attempt. Rejection is an ordinary outcome, not an
/// error, so callers can defer the work.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsumeOutcome {
    /// Slot granted.
    Granted {
        /// Slots left in the tightest window after the grant.
        remaining: u32,
    },
    /// A window is full.
    CapacityExceeded {
        /// First window found full.
        window: WindowKey,
        /// Always zero.
        remaining: u32,
    },
}

impl ConsumeOutcome {
    /// Rejection for a full window.
    #[must_use]
    pub const fn exceeded(window: WindowKey) -> Self {
        Self::CapacityExceeded {
            window,
            remaining: 0,
        }
    }

    /// Whether a slot was granted.
    #[must_use]
    pub const fn is_granted(&self) -> bool {
        matches!(self, Self::Granted { .. })
    }

    /// Slots left after this outcome.
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        match *self {
            Self::Granted { remaining } | Self::CapacityExceeded { remaining, .. } => remaining,
        }
    }

    /// Reason code for a rejection.
    #[must_use]
    pub const fn reason(&self) -> Option<ReasonCode> {
        match self {
            Self::Granted { .. } => None,
            Self::CapacityExceeded { .. } => Some(ReasonCode::CapacityExceeded),
        }
    }
}

/// Externally visible, atomically updatable counter store.
///
/// Implementations must perform the cap check and the increment of every
/// window in one atomic step, and must not count the same idempotency key
/// twice for the same windows.
pub trait CounterStore: Send + Sync {
    /// Increment every window in `limits` if all are below their caps.
    fn try_increment(
        &self,
        resource_id: &ResourceId,
        channel: Channel,
        limits: &[WindowLimit],
        idempotency_key: Option<AttemptId>,
    ) -> Result<ConsumeOutcome, EngineError>;

    /// Current count of a window.
    fn count(
        &self,
        resource_id: &ResourceId,
        channel: Channel,
        window: WindowKey,
    ) -> Result<u32, EngineError>;

    /// Give back the slots `key` holds in `windows`. Returns false when the
    /// key holds none of them.
    fn release(
        &self,
        resource_id: &ResourceId,
        channel: Channel,
        windows: &[WindowKey],
        key: AttemptId,
    ) -> Result<bool, EngineError>;

    /// Drop counters for windows that ended before `day`. Returns the number removed.
    fn prune_before(&self, day: NaiveDate) -> Result<usize, EngineError>;
}

/// Daily plus weekly consumption request.
#[derive(Debug, Clone)]
pub struct ConsumeRequest {
    /// Resource to consume from.
    pub resource_id: ResourceId,
    /// Channel the slot is for.
    pub channel: Channel,
    /// Day of the send.
    pub day: NaiveDate,
    /// Effective daily cap.
    pub daily_cap: u32,
    /// Effective weekly cap.
    pub weekly_cap: u32,
    /// Attempt consuming the slot; retried dispatches reuse it.
    pub idempotency_key: Option<AttemptId>,
}

/// Front door to the counter store.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn CounterStore>,
}

impl RateLimiter {
    /// Wrap a counter store.
    #[must_use]
    pub fn new(store: Arc<dyn CounterStore>) -> Self {
        Self { store }
    }

    /// Consume one slot of a single window.
    pub fn try_consume(
        &self,
        resource_id: &ResourceId,
        channel: Channel,
        window: WindowKey,
        cap: u32,
    ) -> Result<ConsumeOutcome, EngineError> {
        self.store
            .try_increment(resource_id, channel, &[WindowLimit { window, cap }], None)
    }

    /// Consume one slot from both the daily and the weekly window.
    pub fn try_consume_daily_weekly(
        &self,
        request: &ConsumeRequest,
    ) -> Result<ConsumeOutcome, EngineError> {
        let limits = [
            WindowLimit {
                window: WindowKey::Day(request.day),
                cap: request.daily_cap,
            },
            WindowLimit {
                window: WindowKey::week_of(request.day),
                cap: request.weekly_cap,
            },
        ];
        let outcome = self.store.try_increment(
            &request.resource_id,
            request.channel,
            &limits,
            request.idempotency_key,
        )?;
        match outcome {
            ConsumeOutcome::Granted { remaining } => tracing::debug!(
                "granted {} slot on {} for {}, {} left",
                request.channel,
                request.resource_id,
                request.day,
                remaining
            ),
            ConsumeOutcome::CapacityExceeded { window, .. } => tracing::warn!(
                "capacity exceeded on {} ({}) for {:?}",
                request.resource_id,
                request.channel,
                window
            ),
        }
        Ok(outcome)
    }

    /// Return the daily and weekly slots granted to `key` for `day`, used when
    /// a granted touch is not going to be sent in that window.
    pub fn release_daily_weekly(
        &self,
        resource_id: &ResourceId,
        channel: Channel,
        day: NaiveDate,
        key: AttemptId,
    ) -> Result<bool, EngineError> {
        let released = self.store.release(
            resource_id,
            channel,
            &[WindowKey::Day(day), WindowKey::week_of(day)],
            key,
        )?;
        if released {
            tracing::debug!("released {} slot on {} for {}", channel, resource_id, day);
        }
        Ok(released)
    }

    /// Slots left today, considering both windows.
    pub fn remaining(
        &self,
        resource_id: &ResourceId,
        channel: Channel,
        day: NaiveDate,
        daily_cap: u32,
        weekly_cap: u32,
    ) -> Result<u32, EngineError> {
        let daily = self.store.count(resource_id, channel, WindowKey::Day(day))?;
        let weekly = self
            .store
            .count(resource_id, channel, WindowKey::week_of(day))?;
        Ok(daily_cap
            .saturating_sub(daily)
            .min(weekly_cap.saturating_sub(weekly)))
    }

    /// Sends counted for a day.
    pub fn sends_on(
        &self,
        resource_id: &ResourceId,
        channel: Channel,
        day: NaiveDate,
    ) -> Result<u32, EngineError> {
        self.store.count(resource_id, channel, WindowKey::Day(day))
    }

    /// Drop counters for windows that ended before `day`.
    pub fn prune_before(&self, day: NaiveDate) -> Result<usize, EngineError> {
        self.store.prune_before(day)
    }
}
