//! API-facing response models.

use serde::{Deserialize, Serialize};

use crate::core::{
    AttemptOutcome, Channel, EngineError, HealthClass, OutreachEngine, ReasonCode, ResourceStatus,
    ResourceType,
};
use crate::util::serde::{AttemptId, ClientId, ResourceId};

/// Capacity usage of one channel on a resource today.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelUsage {
    /// Channel.
    pub channel: Channel,
    /// Effective daily cap.
    pub daily_cap: u32,
    /// Effective weekly cap.
    pub weekly_cap: u32,
    /// Slots consumed today.
    pub sent_today: u32,
    /// Slots left considering both windows.
    pub remaining: u32,
}

/// Resource snapshot for dashboards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceSnapshot {
    /// Resource identifier.
    pub id: ResourceId,
    /// Resource type.
    pub resource_type: ResourceType,
    /// Lifecycle status.
    pub status: ResourceStatus,
    /// Dedicated client.
    pub assigned_client_id: Option<ClientId>,
    /// Days since activation.
    pub days_active: u32,
    /// Latest health classification.
    pub health: HealthClass,
    /// Ranking score in `[0, 1]`.
    pub health_score: f64,
    /// Per-channel usage.
    pub usage: Vec<ChannelUsage>,
}

/// Attempt status response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptStatusResponse {
    /// Attempt identifier.
    pub attempt_id: AttemptId,
    /// Current outcome.
    pub outcome: AttemptOutcome,
    /// Reason for a non-success outcome.
    pub reason: Option<ReasonCode>,
}

/// Snapshot every resource with today's usage.
pub fn snapshot_resources(engine: &OutreachEngine) -> Result<Vec<ResourceSnapshot>, EngineError> {
    let now = engine.now();
    let today = now.date_naive();
    let pool = engine.pool();
    let mut out = Vec::new();
    for resource in pool.snapshot() {
        let mut usage = Vec::new();
        for channel in resource.resource_type.channels() {
            let daily_cap = pool.effective_daily_cap(&resource, channel, now);
            let weekly_cap = pool.effective_weekly_cap(&resource, channel);
            usage.push(ChannelUsage {
                channel,
                daily_cap,
                weekly_cap,
                sent_today: engine.limiter().sends_on(&resource.id, channel, today)?,
                remaining: engine
                    .limiter()
                    .remaining(&resource.id, channel, today, daily_cap, weekly_cap)?,
            });
        }
        out.push(ResourceSnapshot {
            days_active: resource.days_active(now),
            health: resource.health.class,
            health_score: resource.health.score(),
            id: resource.id,
            resource_type: resource.resource_type,
            status: resource.status,
            assigned_client_id: resource.assigned_client_id,
            usage,
        });
    }
    Ok(out)
}

/// Current status of one attempt.
pub fn attempt_status(
    engine: &OutreachEngine,
    attempt_id: AttemptId,
) -> Result<Option<AttemptStatusResponse>, EngineError> {
    Ok(engine.attempts().get(attempt_id)?.map(|a| AttemptStatusResponse {
        attempt_id: a.id,
        outcome: a.outcome,
        reason: a.reason_code,
    }))
}
