//! Tests for utility types

use chrono::{Duration, TimeZone, Utc};
use outreach_engine::util::{AttemptId, Clock, LeadId, ManualClock, ResourceId};

#[test]
fn test_string_ids_serialize_transparently() {
    let id = ResourceId::from("domain-7");
    assert_eq!(serde_json::to_string(&id).unwrap(), "\"domain-7\"");
    let back: ResourceId = serde_json::from_str("\"domain-7\"").unwrap();
    assert_eq!(back, id);
}

#[test]
fn test_ids_display() {
    assert_eq!(LeadId::from("lead-1").to_string(), "lead-1");
    let attempt = AttemptId::new();
    assert_eq!(attempt.to_string(), attempt.0.to_string());
}

#[test]
fn test_attempt_ids_are_unique() {
    assert_ne!(AttemptId::new(), AttemptId::new());
}

#[test]
fn test_manual_clock() {
    let start = Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap();
    let clock = ManualClock::new(start);
    assert_eq!(clock.now(), start);

    clock.advance(Duration::hours(3));
    assert_eq!(clock.now(), start + Duration::hours(3));

    let shared = clock.clone();
    shared.set(start);
    assert_eq!(clock.now(), start);
}

#[test]
fn test_init_tracing_is_idempotent() {
    outreach_engine::util::init_tracing();
    outreach_engine::util::init_tracing();
}
