//! Allocator: picks a resource with capacity for a (lead, channel, client) touch.
//!
//! Candidate reads come from the pool's snapshot and may be slightly stale;
//! the final `try_consume` re-verifies atomically and a lost race falls
//! through to the next-ranked candidate.

use std::cmp::Ordering;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};

use crate::config::{ChannelProfiles, TierGates, WeekendPolicy};
use crate::core::channel::Channel;
use crate::core::error::{EngineError, ReasonCode};
use crate::core::model::{Lead, Resource};
use crate::core::rate_limiter::{ConsumeOutcome, ConsumeRequest, RateLimiter};
use crate::core::resource_pool::ResourcePoolManager;
use crate::util::serde::{AttemptId, ClientId, ResourceId};

/// Result of an allocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AllocationOutcome {
    /// A slot was consumed on this resource.
    Allocated {
        /// Resource carrying the touch.
        resource_id: ResourceId,
        /// Slots left on it for the window.
        remaining: u32,
    },
    /// Every candidate is full for the window; retry later.
    NoCapacity,
    /// The lead cannot be contacted on this channel until its data changes.
    Ineligible(ReasonCode),
}

impl AllocationOutcome {
    /// Reason code for a non-allocation.
    #[must_use]
    pub const fn reason(&self) -> Option<ReasonCode> {
        match self {
            Self::Allocated { .. } => None,
            Self::NoCapacity => Some(ReasonCode::NoCapacity),
            Self::Ineligible(reason) => Some(*reason),
        }
    }
}

/// One allocation request.
#[derive(Debug, Clone)]
pub struct AllocationRequest<'a> {
    /// Lead being contacted.
    pub lead: &'a Lead,
    /// Channel of the touch.
    pub channel: Channel,
    /// Client the touch is for.
    pub client_id: &'a ClientId,
    /// Rate window day the slot comes from.
    pub day: NaiveDate,
    /// The send falls on a recipient Saturday.
    pub saturday: bool,
    /// Attempt consuming the slot.
    pub attempt_id: AttemptId,
    /// Resources already tried for this touch and window.
    pub exclude: &'a [ResourceId],
}

#[derive(Debug)]
struct Ranked {
    resource: Resource,
    daily_cap: u32,
    weekly_cap: u32,
    sends_today: u32,
    health: f64,
    mutual: u32,
}

/// Generic allocator driven by channel profiles.
pub struct Allocator {
    pool: Arc<ResourcePoolManager>,
    limiter: RateLimiter,
    channels: ChannelProfiles,
    tier_gates: TierGates,
}

impl Allocator {
    /// Create an allocator.
    #[must_use]
    pub fn new(
        pool: Arc<ResourcePoolManager>,
        limiter: RateLimiter,
        channels: ChannelProfiles,
        tier_gates: TierGates,
    ) -> Self {
        Self {
            pool,
            limiter,
            channels,
            tier_gates,
        }
    }

    /// Permanent eligibility of a lead for a channel.
    pub fn check_eligibility(&self, lead: &Lead, channel: Channel) -> Result<(), ReasonCode> {
        if let Some(reason) = lead.status.block_reason() {
            return Err(reason);
        }
        if lead.contact_for(channel).is_none() {
            return Err(ReasonCode::MissingContact);
        }
        if !self.tier_gates.admits(channel, lead.tier) {
            return Err(ReasonCode::TierBelowGate);
        }
        if self.channels.get(channel).requires_compliance_check
            && lead.compliance.is_some_and(|c| c.blocked)
        {
            return Err(ReasonCode::ComplianceBlocked);
        }
        Ok(())
    }

    /// Daily cap for the channel, reduced on an allowed Saturday.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn daily_cap_for(
        &self,
        resource: &Resource,
        channel: Channel,
        saturday: bool,
        now: DateTime<Utc>,
    ) -> u32 {
        let cap = self.pool.effective_daily_cap(resource, channel, now);
        match self.channels.get(channel).weekend {
            // multiplier is validated to [0, 1]
            WeekendPolicy::ReducedSaturday { cap_multiplier, .. } if saturday => {
                (f64::from(cap) * cap_multiplier).floor() as u32
            }
            _ => cap,
        }
    }

    /// Allocate a resource for the touch.
    pub fn allocate(
        &self,
        request: &AllocationRequest<'_>,
        now: DateTime<Utc>,
    ) -> Result<AllocationOutcome, EngineError> {
        if let Err(reason) = self.check_eligibility(request.lead, request.channel) {
            tracing::info!(
                "lead {} ineligible for {}: {}",
                request.lead.id,
                request.channel,
                reason
            );
            return Ok(AllocationOutcome::Ineligible(reason));
        }

        let mut ranked = Vec::new();
        for resource in self
            .pool
            .candidates(request.client_id, request.channel.resource_type())
            .into_iter()
            .filter(|r| !request.exclude.contains(&r.id))
        {
            let daily_cap = self.daily_cap_for(&resource, request.channel, request.saturday, now);
            let weekly_cap = self.pool.effective_weekly_cap(&resource, request.channel);
            let remaining = self.limiter.remaining(
                &resource.id,
                request.channel,
                request.day,
                daily_cap,
                weekly_cap,
            )?;
            if remaining == 0 {
                continue;
            }
            ranked.push(Ranked {
                sends_today: self
                    .limiter
                    .sends_on(&resource.id, request.channel, request.day)?,
                health: resource.health.score(),
                mutual: if request.channel == Channel::Social {
                    request
                        .lead
                        .mutual_connections
                        .get(&resource.id)
                        .copied()
                        .unwrap_or(0)
                } else {
                    0
                },
                daily_cap,
                weekly_cap,
                resource,
            });
        }
        ranked.sort_by(rank);

        for candidate in ranked {
            let outcome = self.limiter.try_consume_daily_weekly(&ConsumeRequest {
                resource_id: candidate.resource.id.clone(),
                channel: request.channel,
                day: request.day,
                daily_cap: candidate.daily_cap,
                weekly_cap: candidate.weekly_cap,
                idempotency_key: Some(request.attempt_id),
            })?;
            match outcome {
                ConsumeOutcome::Granted { remaining } => {
                    self.pool.mark_allocated(&candidate.resource.id, now);
                    tracing::info!(
                        "allocated {} on {} to lead {} for {}",
                        request.channel,
                        candidate.resource.id,
                        request.lead.id,
                        request.client_id
                    );
                    return Ok(AllocationOutcome::Allocated {
                        resource_id: candidate.resource.id,
                        remaining,
                    });
                }
                ConsumeOutcome::CapacityExceeded { .. } => {
                    tracing::debug!(
                        "lost race on {}, trying next candidate",
                        candidate.resource.id
                    );
                }
            }
        }

        tracing::warn!(
            "no {} capacity for client {} on {}",
            request.channel,
            request.client_id,
            request.day
        );
        Ok(AllocationOutcome::NoCapacity)
    }
}

/// Fewer sends today, then healthier, then more mutual connections, then
/// least recently allocated, then id.
fn rank(a: &Ranked, b: &Ranked) -> Ordering {
    a.sends_today
        .cmp(&b.sends_today)
        .then_with(|| b.health.total_cmp(&a.health))
        .then_with(|| b.mutual.cmp(&a.mutual))
        .then_with(|| a.resource.last_allocated_at.cmp(&b.resource.last_allocated_at))
        .then_with(|| a.resource.id.cmp(&b.resource.id))
}
