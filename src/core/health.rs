//! Health monitor: periodic sweep over every resource that recomputes rolling
//! metrics from the attempt log and drives lifecycle transitions.
//!
//! A window with fewer delivered samples than `min_sample_size` is not
//! classified. The resource class is the worse of the short and long windows.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};

use crate::config::{HealthConfig, ResourceThresholds};
use crate::core::alerts::{build_alert_event, AlertKind, AlertSink};
use crate::core::attempt_log::AttemptStore;
use crate::core::error::{EngineError, ReasonCode};
use crate::core::model::{
    DeliveryStatus, Feedback, HealthClass, Resource, ResourceHealth, ResourceStatus, SendAttempt,
};
use crate::core::resource_pool::ResourcePoolManager;
use crate::util::clock::Clock;
use crate::util::serde::ResourceId;

/// Raw counts over one rolling window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowMetrics {
    /// Attempts that reached the recipient's provider.
    pub delivered: u32,
    /// Hard bounces.
    pub bounced: u32,
    /// Attempts that drew a complaint.
    pub complaints: u32,
    /// Attempts whose connection request was accepted.
    pub accepted: u32,
}

impl WindowMetrics {
    /// Count delivery samples in `attempts`.
    #[must_use]
    pub fn from_attempts<'a>(attempts: impl IntoIterator<Item = &'a SendAttempt>) -> Self {
        let mut metrics = Self::default();
        for attempt in attempts {
            let Some(delivery) = attempt.delivery else {
                continue;
            };
            if !delivery.is_delivery_sample() {
                continue;
            }
            metrics.delivered += 1;
            if delivery == DeliveryStatus::Bounced {
                metrics.bounced += 1;
            }
            if attempt.has_feedback(Feedback::Complaint) {
                metrics.complaints += 1;
            }
            if attempt.has_feedback(Feedback::Accepted) {
                metrics.accepted += 1;
            }
        }
        metrics
    }

    fn rate(part: u32, delivered: u32) -> f64 {
        if delivered == 0 {
            0.0
        } else {
            f64::from(part) / f64::from(delivered)
        }
    }

    /// Share of delivered attempts that bounced.
    #[must_use]
    pub fn bounce_rate(&self) -> f64 {
        Self::rate(self.bounced, self.delivered)
    }

    /// Share of delivered attempts that drew a complaint.
    #[must_use]
    pub fn complaint_rate(&self) -> f64 {
        Self::rate(self.complaints, self.delivered)
    }

    /// Share of delivered attempts that were accepted.
    #[must_use]
    pub fn accept_rate(&self) -> f64 {
        Self::rate(self.accepted, self.delivered)
    }
}

/// Classify one window against a threshold set. Thresholds are crossed when
/// a rate is strictly past them.
#[must_use]
pub fn classify(
    metrics: &WindowMetrics,
    thresholds: &ResourceThresholds,
    min_sample_size: u32,
) -> HealthClass {
    if metrics.delivered == 0 || metrics.delivered < min_sample_size {
        return HealthClass::Good;
    }
    let bounce = metrics.bounce_rate();
    let complaint = metrics.complaint_rate();
    let accept = metrics.accept_rate();

    let accept_below = |limit: Option<f64>| limit.is_some_and(|l| accept < l);

    if bounce > thresholds.bounce_critical
        || complaint > thresholds.complaint_critical
        || accept_below(thresholds.accept_critical)
    {
        HealthClass::Critical
    } else if bounce > thresholds.bounce_warning
        || complaint > thresholds.complaint_warning
        || accept_below(thresholds.accept_warning)
    {
        HealthClass::Warning
    } else {
        HealthClass::Good
    }
}

/// A lifecycle change made by a sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthTransition {
    /// Resource that moved.
    pub resource_id: ResourceId,
    /// Status before the sweep.
    pub from: ResourceStatus,
    /// Status after the sweep.
    pub to: ResourceStatus,
    /// Classification that drove the change.
    pub class: HealthClass,
}

/// Per-sweep summary.
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    /// Resources evaluated.
    pub examined: usize,
    /// Lifecycle changes applied.
    pub transitions: Vec<HealthTransition>,
    /// Resources skipped because of a backend or transition error.
    pub failures: Vec<(ResourceId, String)>,
}

/// Periodic health sweep.
pub struct HealthMonitor {
    pool: Arc<ResourcePoolManager>,
    attempts: Arc<dyn AttemptStore>,
    alerts: Arc<dyn AlertSink>,
    config: HealthConfig,
    clock: Arc<dyn Clock>,
}

impl HealthMonitor {
    /// Create a monitor.
    #[must_use]
    pub fn new(
        pool: Arc<ResourcePoolManager>,
        attempts: Arc<dyn AttemptStore>,
        alerts: Arc<dyn AlertSink>,
        config: HealthConfig,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            pool,
            attempts,
            alerts,
            config,
            clock,
        }
    }

    /// Sweep every resource. A failure on one resource is recorded in the
    /// report and does not stop the sweep.
    pub fn sweep(&self) -> SweepReport {
        let now = self.clock.now();
        let mut report = SweepReport::default();
        for resource in self.pool.snapshot() {
            if matches!(
                resource.status,
                ResourceStatus::Pending | ResourceStatus::Retired
            ) {
                continue;
            }
            report.examined += 1;
            match self.evaluate(&resource, now) {
                Ok(Some(transition)) => report.transitions.push(transition),
                Ok(None) => {}
                Err(err) => {
                    tracing::error!("health sweep failed for {}: {}", resource.id, err);
                    report.failures.push((resource.id.clone(), err.to_string()));
                }
            }
        }
        tracing::info!(
            "health sweep examined {} resources, {} transitions",
            report.examined,
            report.transitions.len()
        );
        report
    }

    /// Recompute metrics for one resource and apply the resulting transition.
    pub fn evaluate(
        &self,
        resource: &Resource,
        now: DateTime<Utc>,
    ) -> Result<Option<HealthTransition>, EngineError> {
        let long_start = now - Duration::days(self.config.long_window_days);
        let short_start = now - Duration::days(self.config.short_window_days);
        let recent = self.attempts.dispatched_since(&resource.id, long_start)?;

        let long = WindowMetrics::from_attempts(&recent);
        let short = WindowMetrics::from_attempts(
            recent
                .iter()
                .filter(|a| a.dispatched_at.is_some_and(|at| at >= short_start)),
        );
        let thresholds = self.config.thresholds.get(resource.resource_type);
        let from = resource.status;
        let class = classify(&short, thresholds, self.config.min_sample_size).max(classify(
            &long,
            thresholds,
            self.config.min_sample_size,
        ));

        let mut health = ResourceHealth {
            bounce_rate: long.bounce_rate(),
            complaint_rate: long.complaint_rate(),
            accept_rate: thresholds
                .accept_warning
                .or(thresholds.accept_critical)
                .map(|_| long.accept_rate()),
            sample_size: long.delivered,
            class,
            last_swept_at: Some(now),
            recovering_since: resource
                .health
                .recovering_since
                .filter(|_| from == ResourceStatus::Degraded),
            degradation_observed: resource.health.degradation_observed
                || class >= HealthClass::Warning,
        };

        let target = match (from, class) {
            (ResourceStatus::Warming | ResourceStatus::Active, HealthClass::Critical) => {
                Some((ResourceStatus::Restricted, Some(ReasonCode::HealthCritical)))
            }
            (ResourceStatus::Degraded, HealthClass::Critical) => {
                Some((ResourceStatus::Retired, Some(ReasonCode::HealthCritical)))
            }
            (ResourceStatus::Warming | ResourceStatus::Active, HealthClass::Warning) => {
                health.recovering_since = None;
                Some((ResourceStatus::Degraded, Some(ReasonCode::HealthWarning)))
            }
            (ResourceStatus::Degraded, HealthClass::Warning) => {
                health.recovering_since = None;
                None
            }
            (ResourceStatus::Degraded, HealthClass::Good) => {
                let since = *health.recovering_since.get_or_insert(now);
                (now - since >= Duration::hours(self.config.cooldown_hours))
                    .then_some((ResourceStatus::Active, None))
            }
            (ResourceStatus::Warming, HealthClass::Good) => {
                let ramp_done = resource.days_active(now)
                    > self.pool.warmup().get(resource.resource_type).final_step_day();
                (ramp_done && !health.degradation_observed)
                    .then_some((ResourceStatus::Active, None))
            }
            _ => None,
        };

        if target.is_some_and(|(to, _)| to == ResourceStatus::Active) {
            health.recovering_since = None;
        }
        let detail = format!(
            "bounce {:.3}, complaint {:.4}, samples {}",
            health.bounce_rate, health.complaint_rate, health.sample_size
        );
        self.pool.update_health(&resource.id, health)?;

        let Some((to, reason)) = target else {
            if class == HealthClass::Critical && resource.health.class != HealthClass::Critical {
                self.alert(&resource.id, AlertKind::HealthCritical, from, class, now, detail);
            }
            return Ok(None);
        };
        self.pool.transition(&resource.id, to, reason)?;

        if class == HealthClass::Critical {
            self.alert(&resource.id, AlertKind::HealthCritical, to, class, now, detail.clone());
        }
        match to {
            ResourceStatus::Restricted => {
                self.alert(&resource.id, AlertKind::Restricted, to, class, now, detail);
            }
            ResourceStatus::Retired => {
                self.alert(&resource.id, AlertKind::Retired, to, class, now, detail);
            }
            _ => {}
        }
        Ok(Some(HealthTransition {
            resource_id: resource.id.clone(),
            from,
            to,
            class,
        }))
    }

    fn alert(
        &self,
        resource_id: &ResourceId,
        kind: AlertKind,
        status: ResourceStatus,
        class: HealthClass,
        now: DateTime<Utc>,
        detail: String,
    ) {
        let reason = match kind {
            AlertKind::HealthCritical | AlertKind::Retired => ReasonCode::HealthCritical,
            AlertKind::Restricted => ReasonCode::ResourceRestricted,
        };
        self.alerts.emit(build_alert_event(
            resource_id,
            kind,
            reason,
            status,
            class,
            now,
            Some(detail),
        ));
    }
}
