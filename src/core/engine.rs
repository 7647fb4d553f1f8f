//! The outreach engine: wires the components into the two-phase
//! schedule-then-dispatch pipeline and exposes operator actions and sweeps.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;

use crate::config::EngineConfig;
use crate::core::alerts::{build_alert_event, AlertKind, AlertSink};
use crate::core::allocator::{AllocationOutcome, AllocationRequest, Allocator};
use crate::core::attempt_log::AttemptStore;
use crate::core::channel::Channel;
use crate::core::collaborators::{ChannelSenders, ContentProvider};
use crate::core::connections::ConnectionLedger;
use crate::core::error::{EngineError, ReasonCode};
use crate::core::health::{HealthMonitor, SweepReport};
use crate::core::model::{AttemptOutcome, Feedback, Lead, Resource, SendAttempt};
use crate::core::preflight::PreflightValidator;
use crate::core::rate_limiter::RateLimiter;
use crate::core::resource_pool::ResourcePoolManager;
use crate::core::scheduler::{
    is_recipient_saturday, next_utc_midnight, parse_timezone, TimingScheduler, HORIZON_DAYS,
};
use crate::core::scorer::{LeadAttributes, ScoreCard, ScoringPolicy};
use crate::util::clock::Clock;
use crate::util::serde::{AttemptId, CampaignId, ClientId, ResourceId};

/// A touch to schedule.
#[derive(Debug, Clone)]
pub struct TouchRequest {
    /// Lead to contact.
    pub lead: Lead,
    /// Channel of the touch.
    pub channel: Channel,
    /// Client the touch is for.
    pub client_id: ClientId,
    /// Campaign the touch belongs to.
    pub campaign_id: CampaignId,
    /// Position in the campaign sequence.
    pub sequence_position: u32,
}

/// Result of the scheduling phase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScheduleOutcome {
    /// An attempt was persisted for a future instant.
    Scheduled {
        /// New attempt.
        attempt_id: AttemptId,
        /// Resource carrying it.
        resource_id: ResourceId,
        /// Instant it is due.
        scheduled_for: DateTime<Utc>,
    },
    /// Capacity is missing right now; try again later.
    Deferred(ReasonCode),
    /// Permanently unsuitable for this lead and channel.
    Ineligible(ReasonCode),
}

impl ScheduleOutcome {
    /// Reason code for a non-scheduled outcome.
    #[must_use]
    pub const fn reason(&self) -> Option<ReasonCode> {
        match self {
            Self::Scheduled { .. } => None,
            Self::Deferred(reason) | Self::Ineligible(reason) => Some(*reason),
        }
    }
}

/// Summary of one maintenance run.
#[derive(Debug, Default)]
pub struct MaintenanceReport {
    /// Health sweep result.
    pub health: SweepReport,
    /// Connection requests marked ignored.
    pub stale_connections: Vec<AttemptId>,
    /// Resources returned to the platform pool.
    pub released: Vec<ResourceId>,
    /// Expired rate counters removed.
    pub pruned_windows: usize,
    /// Resolved connection requests dropped from the ledger.
    pub pruned_connections: usize,
}

/// Where a retry or first attempt goes through allocation and placement.
pub(crate) struct Placement<'a> {
    pub lead: &'a Lead,
    pub channel: Channel,
    pub client_id: &'a ClientId,
    pub campaign_id: &'a CampaignId,
    pub sequence_position: u32,
    pub attempt_number: u32,
    pub retry_of: Option<AttemptId>,
    pub tz: &'a Tz,
    pub candidate: DateTime<Utc>,
}

/// Outreach scheduling and resource allocation engine.
pub struct OutreachEngine {
    pub(crate) config: EngineConfig,
    pub(crate) pool: Arc<ResourcePoolManager>,
    pub(crate) limiter: RateLimiter,
    pub(crate) allocator: Allocator,
    pub(crate) scheduler: TimingScheduler,
    pub(crate) preflight: PreflightValidator,
    pub(crate) health: HealthMonitor,
    pub(crate) connections: ConnectionLedger,
    pub(crate) attempts: Arc<dyn AttemptStore>,
    pub(crate) alerts: Arc<dyn AlertSink>,
    pub(crate) content: Arc<dyn ContentProvider>,
    pub(crate) senders: ChannelSenders,
    pub(crate) scorer: Arc<dyn ScoringPolicy>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) permits: Arc<Semaphore>,
}

impl OutreachEngine {
    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Resource pool.
    #[must_use]
    pub fn pool(&self) -> &Arc<ResourcePoolManager> {
        &self.pool
    }

    /// Rate limiter.
    #[must_use]
    pub const fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// Attempt log.
    #[must_use]
    pub fn attempts(&self) -> &Arc<dyn AttemptStore> {
        &self.attempts
    }

    /// Timing scheduler.
    #[must_use]
    pub const fn scheduler(&self) -> &TimingScheduler {
        &self.scheduler
    }

    /// Connection request ledger.
    #[must_use]
    pub const fn connections(&self) -> &ConnectionLedger {
        &self.connections
    }

    /// Engine clock.
    #[must_use]
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Score lead attributes with the configured policy.
    #[must_use]
    pub fn score(&self, attributes: &LeadAttributes) -> ScoreCard {
        self.scorer.score(attributes)
    }

    /// Refresh a lead's score and tier in place.
    pub fn rescore(&self, lead: &mut Lead, attributes: &LeadAttributes) {
        let card = self.score(attributes);
        lead.score = card.score;
        lead.tier = card.tier;
    }

    /// Add a resource to the platform pool.
    pub fn register_resource(&self, resource: Resource) -> Result<(), EngineError> {
        self.pool.register(resource)
    }

    /// Bind a resource to a client.
    pub fn assign_resource(
        &self,
        resource_id: &ResourceId,
        client_id: &ClientId,
    ) -> Result<(), EngineError> {
        self.pool.assign(resource_id, client_id, self.clock.now())
    }

    /// Start the release hold for a churned client.
    pub fn client_churned(&self, client_id: &ClientId) -> usize {
        self.pool.begin_release(client_id, self.clock.now())
    }

    /// Apply an external restriction signal and alert.
    pub fn restrict_resource(&self, resource_id: &ResourceId) -> Result<(), EngineError> {
        self.pool.restrict(resource_id)?;
        self.emit(resource_id, AlertKind::Restricted, ReasonCode::ExternalRestriction);
        Ok(())
    }

    /// Operator lift of a restriction; the resource re-enters degraded.
    pub fn lift_restriction(&self, resource_id: &ResourceId) -> Result<(), EngineError> {
        self.pool.lift_restriction(resource_id)
    }

    /// Retire a resource and alert.
    pub fn retire_resource(
        &self,
        resource_id: &ResourceId,
        reason: ReasonCode,
    ) -> Result<(), EngineError> {
        self.pool.retire(resource_id, reason)?;
        self.emit(resource_id, AlertKind::Retired, reason);
        Ok(())
    }

    /// Set or clear the daily cap override of a resource.
    pub fn set_daily_cap_override(
        &self,
        resource_id: &ResourceId,
        cap: Option<u32>,
    ) -> Result<(), EngineError> {
        self.pool.set_daily_cap_override(resource_id, cap)
    }

    fn emit(&self, resource_id: &ResourceId, kind: AlertKind, reason: ReasonCode) {
        let Some(resource) = self.pool.get(resource_id) else {
            return;
        };
        self.alerts.emit(build_alert_event(
            resource_id,
            kind,
            reason,
            resource.status,
            resource.health.class,
            self.clock.now(),
            None,
        ));
    }

    /// Scheduling phase: allocate a resource and persist an attempt for the
    /// next valid instant.
    pub fn schedule_touch(&self, touch: &TouchRequest) -> Result<ScheduleOutcome, EngineError> {
        let now = self.clock.now();
        let tz = parse_timezone(&touch.lead.timezone)?;
        let candidate = self.scheduler.next_valid_in(touch.channel, &tz, now)?;
        self.place(
            &Placement {
                lead: &touch.lead,
                channel: touch.channel,
                client_id: &touch.client_id,
                campaign_id: &touch.campaign_id,
                sequence_position: touch.sequence_position,
                attempt_number: 1,
                retry_of: None,
                tz: &tz,
                candidate,
            },
            now,
        )
    }

    /// Schedule a batch. One touch failing never stops the others.
    pub fn schedule_batch(
        &self,
        touches: &[TouchRequest],
    ) -> Vec<Result<ScheduleOutcome, EngineError>> {
        touches
            .iter()
            .map(|touch| {
                self.schedule_touch(touch).inspect_err(|err| {
                    tracing::error!("scheduling lead {} failed: {}", touch.lead.id, err);
                })
            })
            .collect()
    }

    /// Allocate and place one touch. The rate window consumed is always the
    /// UTC day of the instant the attempt is scheduled for. When the hourly
    /// ceiling fills a resource's day, its slot is returned and the touch is
    /// offered to the next resource, then to the next open day.
    pub(crate) fn place(
        &self,
        placement: &Placement<'_>,
        now: DateTime<Utc>,
    ) -> Result<ScheduleOutcome, EngineError> {
        let attempt_id = AttemptId::new();
        let mut candidate = placement.candidate;
        let mut hour_full: Vec<ResourceId> = Vec::new();
        let mut days_moved = 0;
        loop {
            let day = candidate.date_naive();
            let request = AllocationRequest {
                lead: placement.lead,
                channel: placement.channel,
                client_id: placement.client_id,
                day,
                saturday: is_recipient_saturday(placement.tz, candidate),
                attempt_id,
                exclude: &hour_full,
            };
            let resource_id = match self.allocator.allocate(&request, now)? {
                AllocationOutcome::Allocated { resource_id, .. } => resource_id,
                AllocationOutcome::NoCapacity if hour_full.is_empty() => {
                    return Ok(ScheduleOutcome::Deferred(ReasonCode::NoCapacity))
                }
                AllocationOutcome::NoCapacity => {
                    days_moved += 1;
                    if days_moved > HORIZON_DAYS {
                        break;
                    }
                    hour_full.clear();
                    candidate = self.scheduler.next_valid_in(
                        placement.channel,
                        placement.tz,
                        next_utc_midnight(candidate),
                    )?;
                    continue;
                }
                AllocationOutcome::Ineligible(reason) => {
                    return Ok(ScheduleOutcome::Ineligible(reason))
                }
            };

            let Some(at) = self.scheduler.place_on_resource(
                &resource_id,
                placement.channel,
                placement.tz,
                candidate,
            )?
            else {
                self.limiter
                    .release_daily_weekly(&resource_id, placement.channel, day, attempt_id)?;
                hour_full.push(resource_id);
                continue;
            };

            let attempt = SendAttempt {
                id: attempt_id,
                lead_id: placement.lead.id.clone(),
                client_id: placement.client_id.clone(),
                campaign_id: placement.campaign_id.clone(),
                resource_id: resource_id.clone(),
                channel: placement.channel,
                sequence_position: placement.sequence_position,
                attempt_number: placement.attempt_number,
                retry_of: placement.retry_of,
                recipient_timezone: placement.lead.timezone.clone(),
                window_day: day,
                scheduled_for: at,
                created_at: now,
                claimed_at: None,
                dispatched_at: None,
                outcome: AttemptOutcome::Pending,
                reason_code: None,
                delivery: None,
                provider_reference: None,
                feedback: Vec::new(),
            };
            if let Err(err) = self.attempts.insert(attempt) {
                self.limiter
                    .release_daily_weekly(&resource_id, placement.channel, day, attempt_id)?;
                return Err(err);
            }
            tracing::info!(
                "scheduled {} attempt {} for lead {} on {} at {}",
                placement.channel,
                attempt_id,
                placement.lead.id,
                resource_id,
                at
            );
            return Ok(ScheduleOutcome::Scheduled {
                attempt_id,
                resource_id,
                scheduled_for: at,
            });
        }
        tracing::warn!(
            "hourly ceilings kept lead {} off {} for {} days",
            placement.lead.id,
            placement.channel,
            HORIZON_DAYS
        );
        Ok(ScheduleOutcome::Deferred(ReasonCode::CapacityExceeded))
    }

    /// Attach a post-delivery signal. Acceptance also resolves the pending
    /// connection request.
    pub fn record_feedback(
        &self,
        attempt_id: AttemptId,
        feedback: Feedback,
    ) -> Result<bool, EngineError> {
        let known = self.attempts.add_feedback(attempt_id, feedback)?;
        if known && feedback == Feedback::Accepted {
            self.connections.accept(attempt_id, self.clock.now());
        }
        Ok(known)
    }

    /// Run the health sweep.
    pub fn run_health_sweep(&self) -> SweepReport {
        self.health.sweep()
    }

    /// Mark stale connection requests ignored.
    pub fn sweep_stale_connections(&self) -> Vec<AttemptId> {
        self.connections.sweep_stale(self.clock.now())
    }

    /// Return resources whose release hold elapsed to the pool.
    pub fn sweep_releases(&self) -> Vec<ResourceId> {
        self.pool.sweep_releases(self.clock.now())
    }

    /// Every periodic sweep in one pass. Counter pruning keeps the current
    /// day and ISO week.
    pub fn run_maintenance(&self) -> MaintenanceReport {
        let now = self.clock.now();
        let pruned_windows = self
            .limiter
            .prune_before(now.date_naive())
            .unwrap_or_else(|err| {
                tracing::error!("pruning rate windows failed: {}", err);
                0
            });
        self.scheduler.hourly().prune_before(now - Duration::hours(1));
        let stale_connections = self.sweep_stale_connections();
        MaintenanceReport {
            health: self.run_health_sweep(),
            stale_connections,
            released: self.sweep_releases(),
            pruned_windows,
            pruned_connections: self.connections.prune_resolved(now),
        }
    }
}
