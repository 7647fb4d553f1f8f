//! Tests for counter and attempt stores

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use outreach_engine::core::{
    AttemptOutcome, AttemptStore, Channel, CounterStore, DeliveryStatus, Feedback, SendAttempt,
    WindowKey, WindowLimit,
};
use outreach_engine::infra::{InMemoryAttemptStore, InMemoryCounterStore, SqliteCounterStore};
use outreach_engine::util::{AttemptId, ResourceId};

fn attempt(resource: &str, dispatched: Option<chrono::DateTime<Utc>>) -> SendAttempt {
    let at = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();
    SendAttempt {
        id: AttemptId::new(),
        lead_id: "lead-1".into(),
        client_id: "acme".into(),
        campaign_id: "spring".into(),
        resource_id: resource.into(),
        channel: Channel::Email,
        sequence_position: 0,
        attempt_number: 1,
        retry_of: None,
        recipient_timezone: "UTC".into(),
        window_day: NaiveDate::from_ymd_opt(2026, 3, 2).unwrap(),
        scheduled_for: at,
        created_at: at,
        claimed_at: None,
        dispatched_at: dispatched,
        outcome: if dispatched.is_some() {
            AttemptOutcome::Sent
        } else {
            AttemptOutcome::Pending
        },
        reason_code: None,
        delivery: dispatched.map(|_| DeliveryStatus::Sent),
        provider_reference: None,
        feedback: Vec::new(),
    }
}

#[test]
fn test_counter_store_checks_every_window() {
    let store = InMemoryCounterStore::new();
    let resource = ResourceId::from("d1");
    let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
    let limits = [
        WindowLimit {
            window: WindowKey::Day(day),
            cap: 5,
        },
        WindowLimit {
            window: WindowKey::week_of(day),
            cap: 2,
        },
    ];
    assert!(store
        .try_increment(&resource, Channel::Email, &limits, None)
        .unwrap()
        .is_granted());
    assert!(store
        .try_increment(&resource, Channel::Email, &limits, None)
        .unwrap()
        .is_granted());
    let third = store
        .try_increment(&resource, Channel::Email, &limits, None)
        .unwrap();
    assert!(!third.is_granted());
    assert_eq!(third.remaining(), 0);
    // the rejected call incremented nothing
    assert_eq!(
        store
            .count(&resource, Channel::Email, WindowKey::Day(day))
            .unwrap(),
        2
    );
}

#[test]
fn test_attempt_store_dispatched_since() {
    let store = InMemoryAttemptStore::new();
    let at = Utc.with_ymd_and_hms(2026, 3, 2, 15, 0, 0).unwrap();
    store.insert(attempt("d1", Some(at))).unwrap();
    store
        .insert(attempt("d1", Some(at - Duration::days(40))))
        .unwrap();
    store.insert(attempt("d2", Some(at))).unwrap();
    store.insert(attempt("d1", None)).unwrap();

    let recent = store
        .dispatched_since(&"d1".into(), at - Duration::days(30))
        .unwrap();
    assert_eq!(recent.len(), 1);
    assert_eq!(store.all().len(), 4);
}

#[test]
fn test_feedback_is_not_duplicated() {
    let store = InMemoryAttemptStore::new();
    let a = attempt("d1", None);
    let id = a.id;
    store.insert(a).unwrap();
    assert!(store.add_feedback(id, Feedback::Complaint).unwrap());
    assert!(store.add_feedback(id, Feedback::Complaint).unwrap());
    assert_eq!(store.get(id).unwrap().unwrap().feedback.len(), 1);
    assert!(!store.add_feedback(AttemptId::new(), Feedback::Replied).unwrap());
}

#[test]
fn test_update_unknown_attempt_fails() {
    let store = InMemoryAttemptStore::new();
    assert!(store.update(attempt("d1", None)).is_err());
}

#[test]
fn test_update_keeps_feedback_recorded_meanwhile() {
    let store = InMemoryAttemptStore::new();
    let a = attempt("d1", None);
    let id = a.id;
    store.insert(a).unwrap();

    let mut in_flight = store.get(id).unwrap().unwrap();
    store.add_feedback(id, Feedback::Complaint).unwrap();
    in_flight.outcome = AttemptOutcome::Sent;
    store.update(in_flight).unwrap();

    let stored = store.get(id).unwrap().unwrap();
    assert_eq!(stored.outcome, AttemptOutcome::Sent);
    assert!(stored.has_feedback(Feedback::Complaint));
}

#[test]
fn test_memory_release_unknown_key_is_noop() {
    let store = InMemoryCounterStore::new();
    let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
    let limits = [WindowLimit {
        window: WindowKey::Day(day),
        cap: 3,
    }];
    let key = AttemptId::new();
    store
        .try_increment(&"d1".into(), Channel::Email, &limits, Some(key))
        .unwrap();

    assert!(!store
        .release(&"d1".into(), Channel::Email, &[WindowKey::Day(day)], AttemptId::new())
        .unwrap());
    assert!(!store
        .release(&"d9".into(), Channel::Email, &[WindowKey::Day(day)], key)
        .unwrap());
    assert!(store
        .release(&"d1".into(), Channel::Email, &[WindowKey::Day(day)], key)
        .unwrap());
    assert_eq!(
        store
            .count(&"d1".into(), Channel::Email, WindowKey::Day(day))
            .unwrap(),
        0
    );
}

#[test]
fn test_sqlite_stores_on_one_file_share_the_cap() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("counters.db");
    // one connection per store, as separate scheduler processes would hold
    let stores: Vec<std::sync::Arc<SqliteCounterStore>> = (0..4)
        .map(|_| std::sync::Arc::new(SqliteCounterStore::open(&path).unwrap()))
        .collect();
    let day = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
    let resource = ResourceId::from("d1");

    let handles: Vec<_> = stores
        .iter()
        .cloned()
        .map(|store| {
            let resource = resource.clone();
            std::thread::spawn(move || {
                let limits = [
                    WindowLimit {
                        window: WindowKey::Day(day),
                        cap: 25,
                    },
                    WindowLimit {
                        window: WindowKey::week_of(day),
                        cap: 100,
                    },
                ];
                (0..20)
                    .filter(|_| {
                        store
                            .try_increment(&resource, Channel::Email, &limits, Some(AttemptId::new()))
                            .unwrap()
                            .is_granted()
                    })
                    .count()
            })
        })
        .collect();
    let granted: usize = handles.into_iter().map(|h| h.join().unwrap()).sum();

    assert_eq!(granted, 25);
    for store in &stores {
        assert_eq!(
            store
                .count(&resource, Channel::Email, WindowKey::Day(day))
                .unwrap(),
            25
        );
        assert_eq!(
            store
                .count(&resource, Channel::Email, WindowKey::week_of(day))
                .unwrap(),
            25
        );
    }
}
