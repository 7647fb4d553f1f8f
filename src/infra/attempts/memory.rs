//! In-memory attempt store for development and tests.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::core::attempt_log::{is_claimable, merge_feedback, AttemptStore};
use crate::core::error::EngineError;
use crate::core::model::{Feedback, SendAttempt};
use crate::util::serde::{AttemptId, ResourceId};

/// Attempt store held in a map.
#[derive(Default)]
pub struct InMemoryAttemptStore {
    attempts: RwLock<HashMap<AttemptId, SendAttempt>>,
}

impl InMemoryAttemptStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every stored attempt, oldest first.
    #[must_use]
    pub fn all(&self) -> Vec<SendAttempt> {
        let mut all: Vec<SendAttempt> = self.attempts.read().values().cloned().collect();
        all.sort_by_key(|a| (a.created_at, a.id));
        all
    }
}

impl AttemptStore for InMemoryAttemptStore {
    fn insert(&self, attempt: SendAttempt) -> Result<(), EngineError> {
        self.attempts.write().insert(attempt.id, attempt);
        Ok(())
    }

    fn update(&self, mut attempt: SendAttempt) -> Result<(), EngineError> {
        let mut attempts = self.attempts.write();
        let Some(stored) = attempts.get(&attempt.id) else {
            return Err(EngineError::Backend(format!("unknown attempt {}", attempt.id)));
        };
        merge_feedback(&mut attempt, stored);
        attempts.insert(attempt.id, attempt);
        Ok(())
    }

    fn get(&self, id: AttemptId) -> Result<Option<SendAttempt>, EngineError> {
        Ok(self.attempts.read().get(&id).cloned())
    }

    fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<SendAttempt>, EngineError> {
        let mut attempts = self.attempts.write();
        let mut due: Vec<&mut SendAttempt> = attempts
            .values_mut()
            .filter(|a| is_claimable(a, now, lease))
            .collect();
        due.sort_by_key(|a| (a.scheduled_for, a.id));
        Ok(due
            .into_iter()
            .take(limit)
            .map(|a| {
                a.claimed_at = Some(now);
                a.clone()
            })
            .collect())
    }

    fn dispatched_since(
        &self,
        resource_id: &ResourceId,
        since: DateTime<Utc>,
    ) -> Result<Vec<SendAttempt>, EngineError> {
        Ok(self
            .attempts
            .read()
            .values()
            .filter(|a| &a.resource_id == resource_id && a.dispatched_at.is_some_and(|at| at >= since))
            .cloned()
            .collect())
    }

    fn add_feedback(&self, id: AttemptId, feedback: Feedback) -> Result<bool, EngineError> {
        let mut attempts = self.attempts.write();
        let Some(attempt) = attempts.get_mut(&id) else {
            return Ok(false);
        };
        if !attempt.feedback.contains(&feedback) {
            attempt.feedback.push(feedback);
        }
        Ok(true)
    }
}
