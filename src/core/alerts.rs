//! Alert sink implementations.
//!
//! Alerts go to an external notification collaborator. The in-memory sink
//! keeps a bounded buffer for tests and dashboards.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::core::error::ReasonCode;
use crate::core::model::{HealthClass, ResourceStatus};
use crate::util::serde::ResourceId;

/// What happened to the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    /// Health classification crossed into critical.
    HealthCritical,
    /// Resource entered the restricted state.
    Restricted,
    /// Resource was retired.
    Retired,
}

/// Alert event structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertEvent {
    /// Event identifier.
    pub event_id: String,
    /// Affected resource.
    pub resource_id: ResourceId,
    /// Alert kind.
    pub kind: AlertKind,
    /// Machine-readable cause.
    pub reason: ReasonCode,
    /// Status after the change.
    pub status: ResourceStatus,
    /// Health classification at the time.
    pub class: HealthClass,
    /// When the alert was raised.
    pub at: DateTime<Utc>,
    /// Additional context.
    pub detail: Option<String>,
}

/// Alert sink abstraction.
pub trait AlertSink: Send + Sync {
    /// Record an alert event.
    fn emit(&self, event: AlertEvent);
}

/// In-memory alert sink for testing and dev.
pub struct InMemoryAlertSink {
    events: Mutex<VecDeque<AlertEvent>>,
    max_events: usize,
}

impl InMemoryAlertSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::with_capacity(max_events)),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AlertEvent> {
        self.events.lock().iter().cloned().collect()
    }
}

impl Default for InMemoryAlertSink {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl AlertSink for InMemoryAlertSink {
    fn emit(&self, event: AlertEvent) {
        let mut events = self.events.lock();
        if self.max_events == 0 {
            return;
        }
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Sink that only logs.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn emit(&self, event: AlertEvent) {
        tracing::warn!(
            "alert {:?} on {} ({}), status {:?}",
            event.kind,
            event.resource_id,
            event.reason,
            event.status
        );
    }
}

/// Helper to build an alert event from context.
#[must_use]
pub fn build_alert_event(
    resource_id: &ResourceId,
    kind: AlertKind,
    reason: ReasonCode,
    status: ResourceStatus,
    class: HealthClass,
    at: DateTime<Utc>,
    detail: Option<String>,
) -> AlertEvent {
    AlertEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        resource_id: resource_id.clone(),
        kind,
        reason,
        status,
        class,
        at,
        detail,
    }
}
