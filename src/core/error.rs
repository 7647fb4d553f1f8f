//! Error types and structured reason codes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::model::ResourceStatus;
use crate::util::serde::ResourceId;

/// Infrastructure and contract-violation errors.
///
/// Domain decisions (no capacity, ineligible lead, preflight abort) are not
/// errors; they are returned as typed outcomes carrying a [`ReasonCode`].
#[derive(Debug, Error)]
pub enum EngineError {
    /// Resource id not known to the pool.
    #[error("unknown resource: {0}")]
    UnknownResource(ResourceId),
    /// Resource id registered twice.
    #[error("duplicate resource: {0}")]
    DuplicateResource(ResourceId),
    /// Lifecycle transition not permitted by the resource state machine.
    #[error("invalid transition for {resource}: {from:?} -> {to:?}")]
    InvalidTransition {
        /// Resource being transitioned.
        resource: ResourceId,
        /// Current status.
        from: ResourceStatus,
        /// Requested status.
        to: ResourceStatus,
    },
    /// Resource is dedicated to another client or its sharing ceiling is reached.
    #[error("assignment conflict: {0}")]
    AssignmentConflict(String),
    /// Recipient timezone could not be parsed.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),
    /// Configuration failed validation.
    #[error("config error: {0}")]
    Config(String),
    /// Backend-specific failure with context.
    #[error("backend error: {0}")]
    Backend(String),
    /// IO failure from a file-backed store.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON encode/decode failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// SQLite failure from the shared counter store.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;

/// Machine-readable reason attached to every non-success outcome, so
/// dashboards and alerts can classify without parsing free text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasonCode {
    /// Lead lacks the contact field the channel needs.
    MissingContact,
    /// Lead tier is below the channel's gate.
    TierBelowGate,
    /// Contact identifier is on a do-not-contact list.
    ComplianceBlocked,
    /// A rate window on the resource is full.
    CapacityExceeded,
    /// No candidate resource had capacity.
    NoCapacity,
    /// Resource is under hard restriction.
    ResourceRestricted,
    /// Resource retired, pending, or otherwise not sendable.
    ResourceUnavailable,
    /// Client churned or stopped paying.
    ClientInactive,
    /// Campaign paused or ended.
    CampaignInactive,
    /// Lead unsubscribed.
    LeadUnsubscribed,
    /// Lead hard-bounced earlier.
    LeadBounced,
    /// Lead suppressed by the client.
    LeadSuppressed,
    /// Lead converted; outreach ends.
    LeadConverted,
    /// Lead no longer exists.
    LeadNotFound,
    /// Channel collaborator failed transiently.
    TransientDispatchError,
    /// Retry policy exhausted.
    RetriesExhausted,
    /// Provider reported a hard bounce.
    HardBounce,
    /// Health metrics crossed the warning threshold.
    HealthWarning,
    /// Health metrics crossed the critical threshold.
    HealthCritical,
    /// External platform restriction signal.
    ExternalRestriction,
    /// Social connection request aged out without acceptance.
    StaleRequest,
}

impl ReasonCode {
    /// Whether the condition can clear on its own so the work may be deferred.
    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded | Self::NoCapacity | Self::TransientDispatchError
        )
    }

    /// Stable string form used in logs and persisted records.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::MissingContact => "missing_contact",
            Self::TierBelowGate => "tier_below_gate",
            Self::ComplianceBlocked => "compliance_blocked",
            Self::CapacityExceeded => "capacity_exceeded",
            Self::NoCapacity => "no_capacity",
            Self::ResourceRestricted => "resource_restricted",
            Self::ResourceUnavailable => "resource_unavailable",
            Self::ClientInactive => "client_inactive",
            Self::CampaignInactive => "campaign_inactive",
            Self::LeadUnsubscribed => "lead_unsubscribed",
            Self::LeadBounced => "lead_bounced",
            Self::LeadSuppressed => "lead_suppressed",
            Self::LeadConverted => "lead_converted",
            Self::LeadNotFound => "lead_not_found",
            Self::TransientDispatchError => "transient_dispatch_error",
            Self::RetriesExhausted => "retries_exhausted",
            Self::HardBounce => "hard_bounce",
            Self::HealthWarning => "health_warning",
            Self::HealthCritical => "health_critical",
            Self::ExternalRestriction => "external_restriction",
            Self::StaleRequest => "stale_request",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
