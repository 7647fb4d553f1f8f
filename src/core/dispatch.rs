//! Dispatch phase: claim due attempts and run each as an independent task
//! bounded by the global concurrency ceiling.
//!
//! Each task re-validates, re-verifies its rate slot with the attempt id as
//! the idempotency key, hands the send to the channel collaborator and
//! applies the channel's retry policy. A failing attempt never affects its
//! siblings.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tokio::task::JoinSet;

use crate::core::channel::Channel;
use crate::core::collaborators::{DispatchRequest, DispatchResult};
use crate::core::engine::{OutreachEngine, Placement, ScheduleOutcome};
use crate::core::error::{EngineError, ReasonCode};
use crate::core::model::{AttemptOutcome, DeliveryStatus, Lead, SendAttempt};
use crate::core::preflight::PreflightDecision;
use crate::core::rate_limiter::{ConsumeOutcome, ConsumeRequest};
use crate::core::scheduler::{next_utc_midnight, parse_timezone};
use crate::util::serde::AttemptId;

/// Runtime abstraction for detached background work.
pub trait Spawn {
    /// Spawn an async task that returns a future.
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static;
}

/// Result of dispatching one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DispatchItem {
    /// Attempt processed.
    pub attempt_id: AttemptId,
    /// Final outcome recorded for it.
    pub outcome: AttemptOutcome,
    /// Reason for a non-sent outcome.
    pub reason: Option<ReasonCode>,
    /// Follow-up attempt scheduled by the retry policy.
    pub retry: Option<AttemptId>,
}

/// Summary of one dispatch pass.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Attempts claimed in this pass.
    pub claimed: usize,
    /// Per-attempt results.
    pub items: Vec<DispatchItem>,
}

impl DispatchReport {
    /// Number of items with an outcome.
    #[must_use]
    pub fn count(&self, outcome: AttemptOutcome) -> usize {
        self.items.iter().filter(|i| i.outcome == outcome).count()
    }
}

/// What to do after a delivery result.
enum RetryPlan {
    SameDay(Duration),
    NextDayOtherHalf,
    Terminal(ReasonCode),
}

impl OutreachEngine {
    /// Dispatch every attempt due now, up to the batch limit.
    pub async fn dispatch_due(self: &Arc<Self>) -> Result<DispatchReport, EngineError> {
        let now = self.clock.now();
        let lease = Duration::seconds(self.config.dispatch.claim_lease_secs);
        let due = self
            .attempts
            .claim_due(now, self.config.dispatch.batch_limit, lease)?;
        let mut report = DispatchReport {
            claimed: due.len(),
            items: Vec::with_capacity(due.len()),
        };
        if due.is_empty() {
            return Ok(report);
        }
        self.prefetch_compliance(&due, now).await;

        let mut tasks = JoinSet::new();
        for attempt in due {
            let engine = Arc::clone(self);
            let permits = Arc::clone(&self.permits);
            tasks.spawn(async move {
                match permits.acquire_owned().await {
                    Ok(_permit) => engine.dispatch_one(attempt).await,
                    Err(_) => engine.release_claim(attempt, "dispatch permits closed"),
                }
            });
        }
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(item) => report.items.push(item),
                Err(err) => tracing::error!("dispatch task panicked: {}", err),
            }
        }
        tracing::info!(
            "dispatch pass: {} claimed, {} sent, {} blocked, {} failed",
            report.claimed,
            report.count(AttemptOutcome::Sent),
            report.count(AttemptOutcome::Blocked),
            report.count(AttemptOutcome::Failed)
        );
        Ok(report)
    }

    /// Stop handing out dispatch permits. Sends already holding one finish;
    /// every attempt waiting for one gives its claim back.
    pub fn close_dispatch(&self) {
        self.permits.close();
        tracing::info!("dispatch closed");
    }

    /// Refresh the compliance cache for the whole batch in one registry call.
    async fn prefetch_compliance(&self, due: &[SendAttempt], now: DateTime<Utc>) {
        let leads: HashSet<_> = due
            .iter()
            .filter(|a| self.config.channels.get(a.channel).requires_compliance_check)
            .map(|a| (a.lead_id.clone(), a.channel))
            .collect();
        let mut contacts = Vec::new();
        for (lead_id, channel) in leads {
            if let Ok(Some(lead)) = self.preflight.crm().lead(&lead_id).await {
                if let Some(contact) = lead.contact_for(channel) {
                    contacts.push(contact.to_string());
                }
            }
        }
        if let Err(err) = self.preflight.prefetch_compliance(&contacts, now).await {
            tracing::warn!("compliance prefetch failed, checking per attempt: {}", err);
        }
    }

    async fn dispatch_one(&self, mut attempt: SendAttempt) -> DispatchItem {
        let now = self.clock.now();
        let item = match self.try_dispatch(&mut attempt, now).await {
            Ok(item) => item,
            Err(err) if attempt.dispatched_at.is_some() => {
                // the provider may already have it, so it is never claimed again
                tracing::error!("dispatch of {} failed after send: {}", attempt.id, err);
                finish(
                    &mut attempt,
                    AttemptOutcome::Failed,
                    Some(ReasonCode::TransientDispatchError),
                    None,
                )
            }
            Err(err) => return self.release_claim(attempt, &err.to_string()),
        };
        if let Err(err) = self.attempts.update(attempt) {
            tracing::error!("persisting attempt {} failed: {}", item.attempt_id, err);
        }
        item
    }

    /// Hand an unsent attempt back so a later pass picks it up again.
    fn release_claim(&self, mut attempt: SendAttempt, cause: &str) -> DispatchItem {
        tracing::error!("dispatch of {} failed: {}", attempt.id, cause);
        attempt.claimed_at = None;
        let attempt_id = attempt.id;
        if let Err(err) = self.attempts.update(attempt) {
            tracing::error!("releasing claim on {} failed: {}", attempt_id, err);
        }
        DispatchItem {
            attempt_id,
            outcome: AttemptOutcome::Pending,
            reason: Some(ReasonCode::TransientDispatchError),
            retry: None,
        }
    }

    async fn try_dispatch(
        &self,
        attempt: &mut SendAttempt,
        now: DateTime<Utc>,
    ) -> Result<DispatchItem, EngineError> {
        let lead = match self.preflight.validate(attempt, now).await? {
            PreflightDecision::Proceed(lead) => lead,
            PreflightDecision::Abort(reason) => {
                return Ok(finish(attempt, AttemptOutcome::Blocked, Some(reason), None));
            }
        };

        if let Some(reason) = self.reverify_slot(attempt, now)? {
            let retry = self.reschedule(attempt, &lead, attempt.attempt_number, now, None)?;
            return Ok(finish(attempt, AttemptOutcome::Deferred, Some(reason), retry));
        }

        let Some(sender) = self.senders.get(attempt.channel) else {
            return Ok(finish(
                attempt,
                AttemptOutcome::Blocked,
                Some(ReasonCode::ResourceUnavailable),
                None,
            ));
        };
        let contact = lead.contact_for(attempt.channel).unwrap_or_default().to_string();

        // marked in flight before the provider sees it
        attempt.dispatched_at = Some(now);
        if let Err(err) = self.attempts.update(attempt.clone()) {
            attempt.dispatched_at = None;
            return Err(err);
        }
        let result = match self
            .content
            .payload(&lead, attempt.channel, attempt.sequence_position)
            .await
        {
            Ok(payload) => {
                sender
                    .send(DispatchRequest {
                        attempt_id: attempt.id,
                        resource_id: attempt.resource_id.clone(),
                        channel: attempt.channel,
                        recipient_contact: contact,
                        payload,
                        scheduled_for: attempt.scheduled_for,
                        attempt_number: attempt.attempt_number,
                    })
                    .await
            }
            Err(err) => Err(err),
        };
        let result = result.unwrap_or_else(|err| {
            tracing::warn!("channel send for {} failed: {}", attempt.id, err);
            DispatchResult {
                status: DeliveryStatus::Failed,
                provider_reference: None,
            }
        });
        attempt.delivery = Some(result.status);
        attempt.provider_reference = result.provider_reference;

        if result.status == DeliveryStatus::Sent {
            if attempt.channel == Channel::Social {
                self.connections.record_sent(attempt, now);
            }
            tracing::info!("sent attempt {} via {}", attempt.id, attempt.resource_id);
            return Ok(finish(attempt, AttemptOutcome::Sent, None, None));
        }

        match self.retry_plan(attempt.channel, result.status, attempt.attempt_number) {
            RetryPlan::Terminal(reason) => {
                Ok(finish(attempt, AttemptOutcome::Failed, Some(reason), None))
            }
            plan => {
                let retry = self.follow_up(attempt, &lead, now, plan);
                Ok(finish(
                    attempt,
                    AttemptOutcome::Failed,
                    Some(ReasonCode::TransientDispatchError),
                    retry,
                ))
            }
        }
    }

    /// Confirm the slot reserved at scheduling time. The same key never
    /// counts twice, so this only consumes when the reservation is gone.
    fn reverify_slot(
        &self,
        attempt: &SendAttempt,
        now: DateTime<Utc>,
    ) -> Result<Option<ReasonCode>, EngineError> {
        let Some(resource) = self.pool.get(&attempt.resource_id) else {
            return Ok(Some(ReasonCode::ResourceUnavailable));
        };
        let outcome = self.limiter.try_consume_daily_weekly(&ConsumeRequest {
            resource_id: attempt.resource_id.clone(),
            channel: attempt.channel,
            day: attempt.window_day,
            daily_cap: self.pool.effective_daily_cap(&resource, attempt.channel, now),
            weekly_cap: self.pool.effective_weekly_cap(&resource, attempt.channel),
            idempotency_key: Some(attempt.id),
        })?;
        Ok(match outcome {
            ConsumeOutcome::Granted { .. } => None,
            ConsumeOutcome::CapacityExceeded { .. } => Some(ReasonCode::CapacityExceeded),
        })
    }

    fn retry_plan(&self, channel: Channel, status: DeliveryStatus, attempt_number: u32) -> RetryPlan {
        let policy = self.config.channels.get(channel).retry;
        match status {
            DeliveryStatus::Sent => RetryPlan::Terminal(ReasonCode::TransientDispatchError),
            DeliveryStatus::Bounced => RetryPlan::Terminal(ReasonCode::HardBounce),
            DeliveryStatus::Busy => match policy.busy {
                Some(rule) if attempt_number < rule.max_attempts => {
                    RetryPlan::SameDay(Duration::minutes(rule.delay_minutes))
                }
                _ => RetryPlan::Terminal(ReasonCode::RetriesExhausted),
            },
            DeliveryStatus::NoAnswer => match policy.no_answer {
                Some(max) if attempt_number < max => RetryPlan::NextDayOtherHalf,
                _ => RetryPlan::Terminal(ReasonCode::RetriesExhausted),
            },
            DeliveryStatus::Failed => match policy.failed {
                Some(rule) if attempt_number < rule.max_attempts => {
                    RetryPlan::SameDay(Duration::minutes(rule.delay_minutes))
                }
                _ => RetryPlan::Terminal(ReasonCode::RetriesExhausted),
            },
        }
    }

    /// Schedule the retry of an attempt the provider already handled. Errors
    /// are logged and dropped; the handled attempt itself is never resent.
    fn follow_up(
        &self,
        attempt: &SendAttempt,
        lead: &Lead,
        now: DateTime<Utc>,
        plan: RetryPlan,
    ) -> Option<AttemptId> {
        self.reschedule(attempt, lead, attempt.attempt_number + 1, now, Some(plan))
            .unwrap_or_else(|err| {
                tracing::error!("follow-up for {} not scheduled: {}", attempt.id, err);
                None
            })
    }

    /// Feed a follow-up through the normal allocate and place pipeline.
    /// Without a plan the attempt is moved to the next valid window.
    fn reschedule(
        &self,
        attempt: &SendAttempt,
        lead: &Lead,
        attempt_number: u32,
        now: DateTime<Utc>,
        plan: Option<RetryPlan>,
    ) -> Result<Option<AttemptId>, EngineError> {
        let tz = parse_timezone(&attempt.recipient_timezone)?;
        let candidate = match plan {
            Some(RetryPlan::SameDay(delay)) => {
                self.scheduler.retry_after(attempt.channel, &tz, now, delay)?
            }
            Some(RetryPlan::NextDayOtherHalf) => {
                self.scheduler
                    .next_day_other_half(attempt.channel, &tz, attempt.scheduled_for)?
            }
            Some(RetryPlan::Terminal(_)) => return Ok(None),
            None => self
                .scheduler
                .next_valid_in(attempt.channel, &tz, next_utc_midnight(now))?,
        };
        let outcome = self.place(
            &Placement {
                lead,
                channel: attempt.channel,
                client_id: &attempt.client_id,
                campaign_id: &attempt.campaign_id,
                sequence_position: attempt.sequence_position,
                attempt_number,
                retry_of: Some(attempt.id),
                tz: &tz,
                candidate,
            },
            now,
        )?;
        match outcome {
            ScheduleOutcome::Scheduled { attempt_id, .. } => Ok(Some(attempt_id)),
            other => {
                tracing::warn!(
                    "follow-up for {} not scheduled: {:?}",
                    attempt.id,
                    other.reason()
                );
                Ok(None)
            }
        }
    }
}

fn finish(
    attempt: &mut SendAttempt,
    outcome: AttemptOutcome,
    reason: Option<ReasonCode>,
    retry: Option<AttemptId>,
) -> DispatchItem {
    attempt.outcome = outcome;
    attempt.reason_code = reason;
    DispatchItem {
        attempt_id: attempt.id,
        outcome,
        reason,
        retry,
    }
}
