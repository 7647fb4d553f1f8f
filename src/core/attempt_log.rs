//! Persisted send attempts, queryable by due time and by resource.

use chrono::{DateTime, Duration, Utc};

use crate::core::error::EngineError;
use crate::core::model::{AttemptOutcome, Feedback, SendAttempt};
use crate::util::serde::{AttemptId, ResourceId};

/// Durable log of scheduling decisions and their outcomes.
pub trait AttemptStore: Send + Sync {
    /// Persist a new attempt.
    fn insert(&self, attempt: SendAttempt) -> Result<(), EngineError>;

    /// Replace a stored attempt by id. Feedback already stored is kept, so
    /// a stale copy never drops signals recorded in the meantime.
    fn update(&self, attempt: SendAttempt) -> Result<(), EngineError>;

    /// Fetch one attempt.
    fn get(&self, id: AttemptId) -> Result<Option<SendAttempt>, EngineError>;

    /// Claim up to `limit` pending attempts due at or before `now`, earliest
    /// first. A claim is not returned again until `lease` has elapsed without
    /// the attempt being dispatched or finished.
    fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<SendAttempt>, EngineError>;

    /// Attempts on a resource dispatched at or after `since`.
    fn dispatched_since(
        &self,
        resource_id: &ResourceId,
        since: DateTime<Utc>,
    ) -> Result<Vec<SendAttempt>, EngineError>;

    /// Attach a post-delivery signal. Returns false when the attempt is unknown.
    fn add_feedback(&self, id: AttemptId, feedback: Feedback) -> Result<bool, EngineError>;
}

/// Shared filter for `claim_due` implementations. An attempt marked
/// dispatched may already be with the provider and is never claimed again.
pub(crate) fn is_claimable(attempt: &SendAttempt, now: DateTime<Utc>, lease: Duration) -> bool {
    attempt.outcome == AttemptOutcome::Pending
        && attempt.dispatched_at.is_none()
        && attempt.scheduled_for <= now
        && attempt.claimed_at.is_none_or(|at| at <= now - lease)
}

/// Carry stored feedback into an incoming replacement record.
pub(crate) fn merge_feedback(incoming: &mut SendAttempt, stored: &SendAttempt) {
    for feedback in &stored.feedback {
        if !incoming.feedback.contains(feedback) {
            incoming.feedback.push(*feedback);
        }
    }
}
