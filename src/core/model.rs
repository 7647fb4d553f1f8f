//! Records shared by the engine components: leads, resources, assignments,
//! and send attempts.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::core::channel::{Channel, ResourceType};
use crate::core::error::ReasonCode;
use crate::core::scorer::Tier;
use crate::util::serde::{AttemptId, CampaignId, ClientId, LeadId, ResourceId};

/// Lifecycle status of a lead, maintained outside the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum LeadStatus {
    /// Eligible for outreach.
    #[default]
    Active,
    /// Asked not to be contacted.
    Unsubscribed,
    /// Contact address hard-bounced.
    Bounced,
    /// Suppressed by the client.
    Suppressed,
    /// Became a customer.
    Converted,
}

impl LeadStatus {
    /// Reason code blocking outreach, if any.
    #[must_use]
    pub const fn block_reason(self) -> Option<ReasonCode> {
        match self {
            Self::Active => None,
            Self::Unsubscribed => Some(ReasonCode::LeadUnsubscribed),
            Self::Bounced => Some(ReasonCode::LeadBounced),
            Self::Suppressed => Some(ReasonCode::LeadSuppressed),
            Self::Converted => Some(ReasonCode::LeadConverted),
        }
    }
}

/// Cached do-not-contact result for a contact identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComplianceCheck {
    /// Identifier is on a do-not-contact registry.
    pub blocked: bool,
    /// When the registry was queried.
    pub checked_at: DateTime<Utc>,
}

/// Read-only view of a lead as the engine sees it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Lead {
    /// Lead identifier.
    pub id: LeadId,
    /// Email address.
    pub email: Option<String>,
    /// Phone number in E.164.
    pub phone: Option<String>,
    /// Social-profile handle.
    pub social_handle: Option<String>,
    /// IANA timezone of the recipient, e.g. `America/Chicago`.
    pub timezone: String,
    /// Score in `[0, 100]`.
    pub score: u8,
    /// Tier derived from the score.
    pub tier: Tier,
    /// Lifecycle status.
    #[serde(default)]
    pub status: LeadStatus,
    /// Cached compliance result for the phone number.
    #[serde(default)]
    pub compliance: Option<ComplianceCheck>,
    /// Mutual-connection counts between this lead and each social seat.
    #[serde(default)]
    pub mutual_connections: HashMap<ResourceId, u32>,
}

impl Lead {
    /// Contact field the channel needs, if present and non-empty.
    #[must_use]
    pub fn contact_for(&self, channel: Channel) -> Option<&str> {
        let field = match channel {
            Channel::Email => self.email.as_deref(),
            Channel::Sms | Channel::Voice => self.phone.as_deref(),
            Channel::Social => self.social_handle.as_deref(),
        };
        field.filter(|v| !v.trim().is_empty())
    }
}

/// Lifecycle status of a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    /// Provisioned, never assigned.
    Pending,
    /// Ramping up its daily cap.
    Warming,
    /// Mature and healthy.
    Active,
    /// Metrics past warning; capacity reduced.
    Degraded,
    /// Hard restriction; capacity zero until an operator lifts it.
    Restricted,
    /// Permanently out of rotation.
    Retired,
}

impl ResourceStatus {
    /// Whether the lifecycle state machine permits `self -> to`.
    #[must_use]
    pub const fn can_transition_to(self, to: Self) -> bool {
        use ResourceStatus::{Active, Degraded, Pending, Restricted, Retired, Warming};
        matches!(
            (self, to),
            (Pending, Warming | Retired)
                | (Warming, Active | Degraded | Restricted | Retired)
                | (Active, Degraded | Restricted | Retired)
                | (Degraded, Active | Restricted | Retired)
                | (Restricted, Degraded | Retired)
        )
    }

    /// Whether the allocator may pick resources in this status.
    #[must_use]
    pub const fn is_allocatable(self) -> bool {
        matches!(self, Self::Warming | Self::Active | Self::Degraded)
    }
}

/// Classification produced by a health sweep.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum HealthClass {
    /// Below all warning thresholds, or not enough samples to judge.
    #[default]
    Good,
    /// Past a warning threshold.
    Warning,
    /// Past a critical threshold.
    Critical,
}

/// Rolling health metrics, recomputed by the health monitor.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResourceHealth {
    /// Share of delivered attempts that bounced.
    pub bounce_rate: f64,
    /// Share of delivered attempts that drew a complaint.
    pub complaint_rate: f64,
    /// Share of social requests accepted; `None` for non-seat resources.
    pub accept_rate: Option<f64>,
    /// Delivered attempts in the widest window with samples.
    pub sample_size: u32,
    /// Latest classification.
    pub class: HealthClass,
    /// When the last sweep ran over this resource.
    pub last_swept_at: Option<DateTime<Utc>>,
    /// Start of the current uninterrupted good streak while degraded.
    pub recovering_since: Option<DateTime<Utc>>,
    /// Any warning or worse was ever observed.
    pub degradation_observed: bool,
}

impl ResourceHealth {
    /// Health score in `[0, 1]` for allocator ranking. Resources without
    /// samples rank neutral.
    #[must_use]
    pub fn score(&self) -> f64 {
        if self.sample_size == 0 {
            return 1.0;
        }
        let mut score = 1.0 - self.bounce_rate.mul_add(4.0, self.complaint_rate * 100.0);
        if let Some(accept) = self.accept_rate {
            score = score.min(accept.mul_add(2.0, 0.2));
        }
        score.clamp(0.0, 1.0)
    }
}

/// A finite shared sending asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Resource {
    /// Resource identifier.
    pub id: ResourceId,
    /// Domain, phone number, or seat.
    pub resource_type: ResourceType,
    /// Lifecycle status.
    pub status: ResourceStatus,
    /// When warmup started (first assignment).
    pub activated_at: Option<DateTime<Utc>>,
    /// Dedicated client; `None` while in the platform pool or when shareable.
    pub assigned_client_id: Option<ClientId>,
    /// May serve several clients at once.
    #[serde(default)]
    pub shareable: bool,
    /// Sharing ceiling when `shareable`.
    #[serde(default = "default_max_clients")]
    pub max_clients: u32,
    /// Operator-supplied daily cap replacing the warmup ramp.
    pub daily_cap_override: Option<u32>,
    /// Rolling health metrics.
    #[serde(default)]
    pub health: ResourceHealth,
    /// Last allocation, used for oldest-first fairness.
    pub last_allocated_at: Option<DateTime<Utc>>,
}

const fn default_max_clients() -> u32 {
    1
}

impl Resource {
    /// New pending resource sitting unassigned in the platform pool.
    #[must_use]
    pub fn pending(id: impl Into<ResourceId>, resource_type: ResourceType) -> Self {
        Self {
            id: id.into(),
            resource_type,
            status: ResourceStatus::Pending,
            activated_at: None,
            assigned_client_id: None,
            shareable: false,
            max_clients: 1,
            daily_cap_override: None,
            health: ResourceHealth::default(),
            last_allocated_at: None,
        }
    }

    /// Mark the resource shareable across up to `max_clients` clients.
    #[must_use]
    pub const fn shared(mut self, max_clients: u32) -> Self {
        self.shareable = true;
        self.max_clients = max_clients;
        self
    }

    /// Whole days elapsed since activation; zero when never activated.
    #[must_use]
    pub fn days_active(&self, now: DateTime<Utc>) -> u32 {
        self.activated_at
            .map_or(0, |at| u32::try_from((now - at).num_days().max(0)).unwrap_or(u32::MAX))
    }
}

/// Binding of a resource to a client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientResourceAssignment {
    /// Bound resource.
    pub resource_id: ResourceId,
    /// Owning client.
    pub client_id: ClientId,
    /// When the binding was created.
    pub assigned_at: DateTime<Utc>,
    /// Release deadline after churn; the binding holds until then.
    pub release_after: Option<DateTime<Utc>>,
    /// When the binding was finally released.
    pub released_at: Option<DateTime<Utc>>,
}

impl ClientResourceAssignment {
    /// Binding still in force.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.released_at.is_none()
    }
}

/// Final state of a send attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Scheduled, not yet dispatched.
    Pending,
    /// Provider accepted the send.
    Sent,
    /// Dispatched but failed.
    Failed,
    /// Pushed to a later window.
    Deferred,
    /// Stopped before dispatch.
    Blocked,
}

/// Result reported by a channel dispatch collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    /// Delivered to the provider.
    Sent,
    /// Provider or transport failure.
    Failed,
    /// Hard bounce.
    Bounced,
    /// Call not answered.
    NoAnswer,
    /// Line busy.
    Busy,
}

impl DeliveryStatus {
    /// Reached the recipient's provider, so it counts toward health samples.
    #[must_use]
    pub const fn is_delivery_sample(self) -> bool {
        !matches!(self, Self::Failed)
    }
}

/// Post-delivery signals attached to an attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feedback {
    /// Recipient marked the message as spam or complained.
    Complaint,
    /// Social connection request accepted.
    Accepted,
    /// Recipient replied.
    Replied,
}

/// One scheduling decision and its eventual dispatch result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendAttempt {
    /// Attempt identifier and rate-limiter idempotency key.
    pub id: AttemptId,
    /// Target lead.
    pub lead_id: LeadId,
    /// Client on whose behalf the touch is sent.
    pub client_id: ClientId,
    /// Campaign the touch belongs to.
    pub campaign_id: CampaignId,
    /// Resource carrying the touch.
    pub resource_id: ResourceId,
    /// Channel of the touch.
    pub channel: Channel,
    /// Position in the campaign sequence.
    pub sequence_position: u32,
    /// 1 for the first try, incremented on each retry.
    pub attempt_number: u32,
    /// Attempt this one retries.
    pub retry_of: Option<AttemptId>,
    /// IANA timezone of the recipient.
    pub recipient_timezone: String,
    /// Day of the rate window the slot was consumed from.
    pub window_day: NaiveDate,
    /// Instant the send is due.
    pub scheduled_for: DateTime<Utc>,
    /// When the attempt was created.
    pub created_at: DateTime<Utc>,
    /// When a dispatch pass claimed the attempt.
    #[serde(default)]
    pub claimed_at: Option<DateTime<Utc>>,
    /// When the attempt was handed to the channel collaborator.
    pub dispatched_at: Option<DateTime<Utc>>,
    /// Current outcome.
    pub outcome: AttemptOutcome,
    /// Reason for a non-success outcome.
    pub reason_code: Option<ReasonCode>,
    /// Provider-reported status.
    pub delivery: Option<DeliveryStatus>,
    /// Provider reference for reconciliation.
    pub provider_reference: Option<String>,
    /// Post-delivery signals.
    #[serde(default)]
    pub feedback: Vec<Feedback>,
}

impl SendAttempt {
    /// Whether this attempt has a given feedback signal.
    #[must_use]
    pub fn has_feedback(&self, feedback: Feedback) -> bool {
        self.feedback.contains(&feedback)
    }
}
