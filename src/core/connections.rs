//! Social connection requests awaiting acceptance.
//!
//! A request older than the stale cutoff is marked ignored by the periodic
//! sweep. Resolved requests are dropped once they have been resolved for a
//! further cutoff period. Neither step touches the rate limiter.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use crate::core::model::SendAttempt;
use crate::util::serde::{AttemptId, LeadId, ResourceId};

/// State of a connection request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionStatus {
    /// Sent, no answer yet.
    Pending,
    /// Recipient accepted.
    Accepted,
    /// Aged out without acceptance.
    Ignored,
}

/// One connection request sent from a seat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionRequest {
    /// Attempt that sent the request.
    pub attempt_id: AttemptId,
    /// Recipient.
    pub lead_id: LeadId,
    /// Seat that sent it.
    pub resource_id: ResourceId,
    /// When it was sent.
    pub sent_at: DateTime<Utc>,
    /// Current state.
    pub status: ConnectionStatus,
    /// When it left `Pending`.
    pub resolved_at: Option<DateTime<Utc>>,
}

/// Ledger of connection requests.
pub struct ConnectionLedger {
    requests: RwLock<HashMap<AttemptId, ConnectionRequest>>,
    stale_after: Duration,
}

impl ConnectionLedger {
    /// Ledger marking requests ignored after `stale_request_days`.
    #[must_use]
    pub fn new(stale_request_days: i64) -> Self {
        Self {
            requests: RwLock::new(HashMap::new()),
            stale_after: Duration::days(stale_request_days),
        }
    }

    /// Record a sent request.
    pub fn record_sent(&self, attempt: &SendAttempt, sent_at: DateTime<Utc>) {
        self.requests.write().insert(
            attempt.id,
            ConnectionRequest {
                attempt_id: attempt.id,
                lead_id: attempt.lead_id.clone(),
                resource_id: attempt.resource_id.clone(),
                sent_at,
                status: ConnectionStatus::Pending,
                resolved_at: None,
            },
        );
    }

    /// Mark a pending request accepted. Returns false when unknown or no
    /// longer pending.
    pub fn accept(&self, attempt_id: AttemptId, at: DateTime<Utc>) -> bool {
        let mut requests = self.requests.write();
        match requests.get_mut(&attempt_id) {
            Some(request) if request.status == ConnectionStatus::Pending => {
                request.status = ConnectionStatus::Accepted;
                request.resolved_at = Some(at);
                true
            }
            _ => false,
        }
    }

    /// Mark every pending request older than the cutoff as ignored.
    pub fn sweep_stale(&self, now: DateTime<Utc>) -> Vec<AttemptId> {
        let cutoff = now - self.stale_after;
        let mut ignored = Vec::new();
        for request in self
            .requests
            .write()
            .values_mut()
            .filter(|r| r.status == ConnectionStatus::Pending && r.sent_at <= cutoff)
        {
            request.status = ConnectionStatus::Ignored;
            request.resolved_at = Some(now);
            ignored.push(request.attempt_id);
        }
        if !ignored.is_empty() {
            tracing::info!("marked {} stale connection requests ignored", ignored.len());
        }
        ignored
    }

    /// Drop accepted or ignored requests resolved at or before `now` minus
    /// the stale cutoff. Returns the number removed.
    pub fn prune_resolved(&self, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.stale_after;
        let mut requests = self.requests.write();
        let before = requests.len();
        requests.retain(|_, r| {
            r.status == ConnectionStatus::Pending || r.resolved_at.is_none_or(|at| at > cutoff)
        });
        let removed = before - requests.len();
        if removed > 0 {
            tracing::debug!("pruned {} resolved connection requests", removed);
        }
        removed
    }

    /// Requests held, in any state.
    #[must_use]
    pub fn len(&self) -> usize {
        self.requests.read().len()
    }

    /// Whether the ledger holds no requests.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.requests.read().is_empty()
    }

    /// Look up one request.
    #[must_use]
    pub fn get(&self, attempt_id: AttemptId) -> Option<ConnectionRequest> {
        self.requests.read().get(&attempt_id).cloned()
    }

    /// Pending requests sent from a seat.
    #[must_use]
    pub fn pending_for(&self, resource_id: &ResourceId) -> usize {
        self.requests
            .read()
            .values()
            .filter(|r| &r.resource_id == resource_id && r.status == ConnectionStatus::Pending)
            .count()
    }
}
