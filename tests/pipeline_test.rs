//! End-to-end schedule then dispatch tests against fake collaborators.

mod common;

use chrono::{Duration, NaiveTime, Timelike};
use common::{lead, monday_at, Harness};
use outreach_engine::core::{
    AttemptOutcome, Channel, ConnectionStatus, DeliveryStatus, Feedback, LeadStatus, ReasonCode,
    Resource, ResourceStatus, ResourceType, ScheduleOutcome, Tier, TouchRequest,
};
use outreach_engine::runtime::{attempt_status, snapshot_resources};
use outreach_engine::util::AttemptId;

fn touch(lead_id: &str, tier: Tier, channel: Channel) -> TouchRequest {
    TouchRequest {
        lead: lead(lead_id, tier),
        channel,
        client_id: "acme".into(),
        campaign_id: "spring".into(),
        sequence_position: 0,
    }
}

fn provision(h: &Harness, id: &str, resource_type: ResourceType) {
    h.engine
        .register_resource(Resource::pending(id, resource_type))
        .unwrap();
    h.engine.assign_resource(&id.into(), &"acme".into()).unwrap();
}

fn scheduled(outcome: &ScheduleOutcome) -> (AttemptId, chrono::DateTime<chrono::Utc>) {
    match outcome {
        ScheduleOutcome::Scheduled {
            attempt_id,
            scheduled_for,
            ..
        } => (*attempt_id, *scheduled_for),
        other => panic!("expected scheduled, got {other:?}"),
    }
}

#[tokio::test]
async fn test_schedule_then_dispatch_email() {
    let h = Harness::new(monday_at(10));
    provision(&h, "d1", ResourceType::Domain);
    let request = touch("lead-1", Tier::Warm, Channel::Email);
    h.crm.put(request.lead.clone());

    let outcome = h.engine.schedule_touch(&request).unwrap();
    let (id, at) = scheduled(&outcome);
    assert!(at >= monday_at(10));
    assert!(h
        .engine
        .scheduler()
        .is_within_window(Channel::Email, &chrono_tz::UTC, at));

    // nothing is due before the scheduled instant
    if at > monday_at(10) {
        let early = h.engine.dispatch_due().await.unwrap();
        assert_eq!(early.claimed, 0);
    }

    h.clock.set(at);
    let report = h.engine.dispatch_due().await.unwrap();
    let item = report.items.iter().find(|i| i.attempt_id == id).unwrap();
    assert_eq!(item.outcome, AttemptOutcome::Sent);

    let stored = h.attempt(id);
    assert_eq!(stored.delivery, Some(DeliveryStatus::Sent));
    assert!(stored.provider_reference.is_some());
    assert_eq!(h.sender.sent.lock().len(), 1);

    // a second pass finds nothing left to claim
    let again = h.engine.dispatch_due().await.unwrap();
    assert_eq!(again.claimed, 0);

    let status = attempt_status(&h.engine, id).unwrap().unwrap();
    assert_eq!(status.outcome, AttemptOutcome::Sent);
}

#[tokio::test]
async fn test_unsubscribe_before_dispatch_blocks() {
    let h = Harness::new(monday_at(10));
    provision(&h, "d1", ResourceType::Domain);
    let request = touch("lead-2", Tier::Warm, Channel::Email);
    h.crm.put(request.lead.clone());

    let (id, at) = scheduled(&h.engine.schedule_touch(&request).unwrap());
    h.crm.set_status("lead-2", LeadStatus::Unsubscribed);

    h.clock.set(at);
    let report = h.engine.dispatch_due().await.unwrap();
    assert_eq!(report.count(AttemptOutcome::Blocked), 1);
    let stored = h.attempt(id);
    assert_eq!(stored.outcome, AttemptOutcome::Blocked);
    assert_eq!(stored.reason_code, Some(ReasonCode::LeadUnsubscribed));
    assert!(h.sender.sent.lock().is_empty());
}

#[tokio::test]
async fn test_compliance_block_at_dispatch() {
    let h = Harness::new(monday_at(10));
    provision(&h, "p1", ResourceType::PhoneNumber);
    let request = touch("lead-3", Tier::Hot, Channel::Sms);
    h.crm.put(request.lead.clone());
    h.registry.block("+15550100");

    let (id, at) = scheduled(&h.engine.schedule_touch(&request).unwrap());
    h.clock.set(at);
    h.engine.dispatch_due().await.unwrap();

    let stored = h.attempt(id);
    assert_eq!(stored.outcome, AttemptOutcome::Blocked);
    assert_eq!(stored.reason_code, Some(ReasonCode::ComplianceBlocked));
}

#[tokio::test]
async fn test_busy_voice_call_retries_same_day() {
    let h = Harness::new(monday_at(10));
    provision(&h, "p1", ResourceType::PhoneNumber);
    let request = touch("lead-4", Tier::Hot, Channel::Voice);
    h.crm.put(request.lead.clone());
    h.sender.script(DeliveryStatus::Busy);

    let (id, at) = scheduled(&h.engine.schedule_touch(&request).unwrap());
    h.clock.set(at);
    let report = h.engine.dispatch_due().await.unwrap();
    let item = report.items.iter().find(|i| i.attempt_id == id).unwrap();
    assert_eq!(item.outcome, AttemptOutcome::Failed);
    let retry_id = item.retry.expect("busy call should be retried");

    let retry = h.attempt(retry_id);
    assert_eq!(retry.retry_of, Some(id));
    assert_eq!(retry.attempt_number, 2);
    assert_eq!(retry.outcome, AttemptOutcome::Pending);
    assert!(retry.scheduled_for >= at + Duration::minutes(30));

    // the second busy signal exhausts the rule
    h.clock.set(retry.scheduled_for);
    let report = h.engine.dispatch_due().await.unwrap();
    let item = report
        .items
        .iter()
        .find(|i| i.attempt_id == retry_id)
        .unwrap();
    assert_eq!(item.reason, Some(ReasonCode::RetriesExhausted));
    assert!(item.retry.is_none());
}

#[tokio::test]
async fn test_hard_bounce_is_terminal() {
    let h = Harness::new(monday_at(10));
    provision(&h, "d1", ResourceType::Domain);
    let request = touch("lead-5", Tier::Cool, Channel::Email);
    h.crm.put(request.lead.clone());
    h.sender.script(DeliveryStatus::Bounced);

    let (id, at) = scheduled(&h.engine.schedule_touch(&request).unwrap());
    h.clock.set(at);
    let report = h.engine.dispatch_due().await.unwrap();
    let item = &report.items[0];
    assert_eq!(item.attempt_id, id);
    assert_eq!(item.reason, Some(ReasonCode::HardBounce));
    assert!(item.retry.is_none());
}

#[test]
fn test_hot_lead_without_phone_is_ineligible_for_phone_channels() {
    let h = Harness::new(monday_at(10));
    provision(&h, "d1", ResourceType::Domain);
    provision(&h, "p1", ResourceType::PhoneNumber);

    let mut sms = touch("lead-6", Tier::Hot, Channel::Sms);
    sms.lead.phone = None;
    let mut voice = sms.clone();
    voice.channel = Channel::Voice;
    let mut email = sms.clone();
    email.channel = Channel::Email;

    assert_eq!(
        h.engine.schedule_touch(&sms).unwrap(),
        ScheduleOutcome::Ineligible(ReasonCode::MissingContact)
    );
    assert_eq!(
        h.engine.schedule_touch(&voice).unwrap(),
        ScheduleOutcome::Ineligible(ReasonCode::MissingContact)
    );
    assert!(matches!(
        h.engine.schedule_touch(&email).unwrap(),
        ScheduleOutcome::Scheduled { .. }
    ));
}

#[test]
fn test_tier_gate_blocks_cold_sms() {
    let h = Harness::new(monday_at(10));
    provision(&h, "p1", ResourceType::PhoneNumber);
    let request = touch("lead-7", Tier::Cold, Channel::Sms);
    assert_eq!(
        h.engine.schedule_touch(&request).unwrap(),
        ScheduleOutcome::Ineligible(ReasonCode::TierBelowGate)
    );
}

#[test]
fn test_daily_cap_defers_once_full() {
    let h = Harness::new(monday_at(10));
    provision(&h, "d1", ResourceType::Domain);
    // first warmup step allows 10 sends a day
    let touches: Vec<_> = (0..11)
        .map(|i| touch(&format!("lead-{i}"), Tier::Warm, Channel::Email))
        .collect();
    let outcomes = h.engine.schedule_batch(&touches);
    let scheduled = outcomes
        .iter()
        .filter(|o| matches!(o, Ok(ScheduleOutcome::Scheduled { .. })))
        .count();
    assert_eq!(scheduled, 10);
    assert_eq!(
        outcomes[10].as_ref().unwrap(),
        &ScheduleOutcome::Deferred(ReasonCode::NoCapacity)
    );
}

#[test]
fn test_restricted_resource_is_not_allocated() {
    let h = Harness::new(monday_at(10));
    provision(&h, "d1", ResourceType::Domain);
    h.engine.restrict_resource(&"d1".into()).unwrap();
    assert_eq!(h.alerts.events().len(), 1);

    let request = touch("lead-8", Tier::Warm, Channel::Email);
    assert_eq!(
        h.engine.schedule_touch(&request).unwrap(),
        ScheduleOutcome::Deferred(ReasonCode::NoCapacity)
    );

    h.engine.lift_restriction(&"d1".into()).unwrap();
    let resource = h.engine.pool().get(&"d1".into()).unwrap();
    assert_eq!(resource.status, ResourceStatus::Degraded);
}

#[tokio::test]
async fn test_stale_connection_requests_are_ignored() {
    let h = Harness::new(monday_at(10));
    provision(&h, "s1", ResourceType::Seat);
    let first = touch("lead-9", Tier::Cool, Channel::Social);
    let second = touch("lead-10", Tier::Cool, Channel::Social);
    h.crm.put(first.lead.clone());
    h.crm.put(second.lead.clone());

    let (stale_id, at1) = scheduled(&h.engine.schedule_touch(&first).unwrap());
    let (accepted_id, at2) = scheduled(&h.engine.schedule_touch(&second).unwrap());
    h.clock.set(at1.max(at2));
    let report = h.engine.dispatch_due().await.unwrap();
    assert_eq!(report.count(AttemptOutcome::Sent), 2);
    assert_eq!(h.engine.connections().pending_for(&"s1".into()), 2);

    h.clock.advance(Duration::days(3));
    assert!(h
        .engine
        .record_feedback(accepted_id, Feedback::Accepted)
        .unwrap());

    h.clock.advance(Duration::days(10));
    assert!(h.engine.sweep_stale_connections().is_empty());

    h.clock.advance(Duration::days(2));
    let swept = h.engine.sweep_stale_connections();
    assert_eq!(swept, vec![stale_id]);
    assert_eq!(
        h.engine.connections().get(stale_id).unwrap().status,
        ConnectionStatus::Ignored
    );
    assert_eq!(
        h.engine.connections().get(accepted_id).unwrap().status,
        ConnectionStatus::Accepted
    );

    // sweeping never touches the rate counters
    let usage = h
        .engine
        .limiter()
        .sends_on(&"s1".into(), Channel::Social, at1.date_naive())
        .unwrap();
    assert_eq!(usage, 2);

    // resolved requests leave the ledger one cutoff period later
    h.clock.advance(Duration::days(15));
    let report = h.engine.run_maintenance();
    assert_eq!(report.pruned_connections, 2);
    assert!(h.engine.connections().is_empty());
}

#[test]
fn test_snapshot_reports_usage() {
    let h = Harness::new(monday_at(10));
    provision(&h, "d1", ResourceType::Domain);
    h.engine
        .register_resource(Resource::pending("d2", ResourceType::Domain))
        .unwrap();
    let request = touch("lead-11", Tier::Warm, Channel::Email);
    h.engine.schedule_touch(&request).unwrap();

    let snapshot = snapshot_resources(&h.engine).unwrap();
    let d1 = snapshot.iter().find(|s| s.id.as_str() == "d1").unwrap();
    assert_eq!(d1.status, ResourceStatus::Warming);
    assert_eq!(d1.usage[0].channel, Channel::Email);
    assert_eq!(d1.usage[0].daily_cap, 10);
    assert_eq!(d1.usage[0].sent_today, 1);
    assert_eq!(d1.usage[0].remaining, 9);

    let d2 = snapshot.iter().find(|s| s.id.as_str() == "d2").unwrap();
    assert_eq!(d2.status, ResourceStatus::Pending);
    assert_eq!(d2.usage[0].daily_cap, 0);
}

#[tokio::test]
async fn test_inactive_client_blocks_dispatch() {
    let h = Harness::new(monday_at(10));
    provision(&h, "d1", ResourceType::Domain);
    let request = touch("lead-12", Tier::Warm, Channel::Email);
    h.crm.put(request.lead.clone());
    let (id, at) = scheduled(&h.engine.schedule_touch(&request).unwrap());

    h.crm.deactivate("acme");
    h.clock.set(at);
    h.engine.dispatch_due().await.unwrap();
    assert_eq!(h.attempt(id).reason_code, Some(ReasonCode::ClientInactive));
}

#[tokio::test]
async fn test_unscheduled_follow_up_never_resends() {
    let h = Harness::new(monday_at(10));
    provision(&h, "d1", ResourceType::Domain);
    let request = touch("lead-13", Tier::Warm, Channel::Email);
    h.crm.put(request.lead.clone());
    h.sender.script(DeliveryStatus::Failed);

    let (id, at) = scheduled(&h.engine.schedule_touch(&request).unwrap());
    h.attempts.fail_inserts(true);
    h.clock.set(at);
    let report = h.engine.dispatch_due().await.unwrap();
    let item = report.items.iter().find(|i| i.attempt_id == id).unwrap();
    assert_eq!(item.outcome, AttemptOutcome::Failed);
    assert!(item.retry.is_none());

    for _ in 0..2 {
        h.clock.advance(Duration::hours(1));
        assert_eq!(h.engine.dispatch_due().await.unwrap().claimed, 0);
    }
    assert_eq!(h.sender.sent.lock().len(), 1);
    assert_eq!(h.attempt(id).outcome, AttemptOutcome::Failed);
    // the follow-up that could not be stored gave its slot back
    assert_eq!(
        h.engine
            .limiter()
            .sends_on(&"d1".into(), Channel::Email, at.date_naive())
            .unwrap(),
        1
    );
}

#[tokio::test]
async fn test_no_answer_retries_next_day_other_half() {
    let h = Harness::new(monday_at(10));
    provision(&h, "p1", ResourceType::PhoneNumber);
    let request = touch("lead-14", Tier::Hot, Channel::Voice);
    h.crm.put(request.lead.clone());
    h.sender.script(DeliveryStatus::NoAnswer);

    let (id, at) = scheduled(&h.engine.schedule_touch(&request).unwrap());
    assert!(at.time() < NaiveTime::from_hms_opt(12, 0, 0).unwrap());
    h.clock.set(at);
    let report = h.engine.dispatch_due().await.unwrap();
    let item = report.items.iter().find(|i| i.attempt_id == id).unwrap();
    assert_eq!(item.outcome, AttemptOutcome::Failed);
    let retry_id = item.retry.expect("unanswered call should be retried");

    let retry = h.attempt(retry_id);
    assert_eq!(retry.retry_of, Some(id));
    assert_eq!(retry.attempt_number, 2);
    assert_eq!(retry.scheduled_for.date_naive(), at.date_naive() + Duration::days(1));
    assert!(retry.scheduled_for.hour() >= 13);
    assert_eq!(retry.window_day, retry.scheduled_for.date_naive());

    h.clock.set(retry.scheduled_for);
    let report = h.engine.dispatch_due().await.unwrap();
    let item = report
        .items
        .iter()
        .find(|i| i.attempt_id == retry_id)
        .unwrap();
    assert_eq!(item.reason, Some(ReasonCode::RetriesExhausted));
    assert!(item.retry.is_none());
    assert_eq!(h.sender.sent.lock().len(), 2);
}

#[test]
fn test_hour_overflow_is_counted_on_the_send_day() {
    let h = Harness::new(monday_at(16));
    provision(&h, "d1", ResourceType::Domain);
    h.engine.set_daily_cap_override(&"d1".into(), Some(50)).unwrap();
    let monday = monday_at(16).date_naive();
    let tuesday = monday + Duration::days(1);
    let sends_on = |day| {
        h.engine
            .limiter()
            .sends_on(&"d1".into(), Channel::Email, day)
            .unwrap()
    };

    // one open hour left today at 12 per hour
    let late: Vec<_> = (0..30)
        .map(|i| touch(&format!("late-{i}"), Tier::Warm, Channel::Email))
        .collect();
    assert!(h
        .engine
        .schedule_batch(&late)
        .iter()
        .all(|o| matches!(o, Ok(ScheduleOutcome::Scheduled { .. }))));
    assert_eq!(sends_on(monday), 12);
    assert_eq!(sends_on(tuesday), 18);

    h.clock.set(monday_at(8) + Duration::days(1));
    let early: Vec<_> = (0..50)
        .map(|i| touch(&format!("early-{i}"), Tier::Warm, Channel::Email))
        .collect();
    let outcomes = h.engine.schedule_batch(&early);
    let placed = outcomes
        .iter()
        .filter(|o| matches!(o, Ok(ScheduleOutcome::Scheduled { .. })))
        .count();
    assert_eq!(placed, 32);
    assert!(outcomes[32..]
        .iter()
        .all(|o| matches!(o, Ok(ScheduleOutcome::Deferred(ReasonCode::NoCapacity)))));

    let attempts = h.attempts.all();
    assert!(attempts
        .iter()
        .all(|a| a.window_day == a.scheduled_for.date_naive()));
    let on_tuesday = attempts
        .iter()
        .filter(|a| a.scheduled_for.date_naive() == tuesday)
        .count();
    assert_eq!(on_tuesday, 50);
    assert_eq!(sends_on(tuesday), 50);
}

#[tokio::test]
async fn test_closed_dispatch_returns_claims() {
    let h = Harness::new(monday_at(10));
    provision(&h, "d1", ResourceType::Domain);
    let request = touch("lead-15", Tier::Warm, Channel::Email);
    h.crm.put(request.lead.clone());
    let (id, at) = scheduled(&h.engine.schedule_touch(&request).unwrap());

    h.engine.close_dispatch();
    h.clock.set(at);
    let report = h.engine.dispatch_due().await.unwrap();
    assert_eq!(report.claimed, 1);
    assert_eq!(report.items[0].outcome, AttemptOutcome::Pending);
    assert_eq!(report.items[0].reason, Some(ReasonCode::TransientDispatchError));
    assert!(h.sender.sent.lock().is_empty());

    let stored = h.attempt(id);
    assert_eq!(stored.outcome, AttemptOutcome::Pending);
    assert!(stored.claimed_at.is_none());
    assert!(stored.dispatched_at.is_none());
}
