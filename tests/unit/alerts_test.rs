//! Tests for alert sinks

use chrono::{TimeZone, Utc};
use outreach_engine::core::alerts::build_alert_event;
use outreach_engine::core::{
    AlertKind, AlertSink, HealthClass, InMemoryAlertSink, ReasonCode, ResourceStatus,
};
use outreach_engine::util::ResourceId;

fn event(id: &str, kind: AlertKind) -> outreach_engine::core::AlertEvent {
    build_alert_event(
        &ResourceId::from(id),
        kind,
        ReasonCode::HealthCritical,
        ResourceStatus::Restricted,
        HealthClass::Critical,
        Utc.with_ymd_and_hms(2026, 3, 2, 9, 0, 0).unwrap(),
        Some("bounce 0.120".to_string()),
    )
}

#[test]
fn test_in_memory_alert_sink() {
    let sink = InMemoryAlertSink::new(10);
    sink.emit(event("d1", AlertKind::Restricted));

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].resource_id.as_str(), "d1");
    assert_eq!(events[0].kind, AlertKind::Restricted);
    assert_eq!(events[0].detail.as_deref(), Some("bounce 0.120"));
}

#[test]
fn test_alert_sink_overflow() {
    let sink = InMemoryAlertSink::new(2);
    sink.emit(event("d1", AlertKind::HealthCritical));
    sink.emit(event("d2", AlertKind::Restricted));
    sink.emit(event("d3", AlertKind::Retired));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].resource_id.as_str(), "d2"); // First one popped
    assert_eq!(events[1].resource_id.as_str(), "d3");
}

#[test]
fn test_alert_event_ids_are_unique() {
    let a = event("d1", AlertKind::Restricted);
    let b = event("d1", AlertKind::Restricted);
    assert_ne!(a.event_id, b.event_id);
}

#[test]
fn test_alert_serializes_snake_case() {
    let json = serde_json::to_value(event("d1", AlertKind::HealthCritical)).unwrap();
    assert_eq!(json["kind"], "health_critical");
    assert_eq!(json["reason"], "health_critical");
    assert_eq!(json["status"], "restricted");
}
