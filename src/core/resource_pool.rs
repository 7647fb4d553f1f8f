//! Resource pool manager: resource records, lifecycle state machine, client
//! assignment, and effective capacity.
//!
//! Records live behind a `parking_lot::RwLock`. Readers take short read locks
//! and accept brief staleness; the rate limiter is the hard backstop against
//! overuse, so allocation decisions never need to hold these locks while
//! consuming capacity.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::config::{ChannelProfiles, EngineConfig, WarmupRamps};
use crate::core::channel::{Channel, ResourceType};
use crate::core::error::{EngineError, ReasonCode};
use crate::core::model::{ClientResourceAssignment, Resource, ResourceHealth, ResourceStatus};
use crate::util::serde::{ClientId, ResourceId};

/// Owns resource records and their assignment to clients.
pub struct ResourcePoolManager {
    resources: RwLock<HashMap<ResourceId, Resource>>,
    assignments: RwLock<Vec<ClientResourceAssignment>>,
    warmup: WarmupRamps,
    channels: ChannelProfiles,
    degraded_cap_factor: f64,
    release_hold: Duration,
}

impl ResourcePoolManager {
    /// Create an empty pool from engine configuration.
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            resources: RwLock::new(HashMap::new()),
            assignments: RwLock::new(Vec::new()),
            warmup: config.warmup.clone(),
            channels: config.channels.clone(),
            degraded_cap_factor: config.health.degraded_cap_factor,
            release_hold: Duration::days(config.assignment.release_hold_days),
        }
    }

    /// Add a resource to the platform pool.
    pub fn register(&self, resource: Resource) -> Result<(), EngineError> {
        let mut resources = self.resources.write();
        if resources.contains_key(&resource.id) {
            return Err(EngineError::DuplicateResource(resource.id));
        }
        tracing::info!(
            "registered {:?} resource {} ({:?})",
            resource.resource_type,
            resource.id,
            resource.status
        );
        resources.insert(resource.id.clone(), resource);
        Ok(())
    }

    /// Snapshot of one resource.
    #[must_use]
    pub fn get(&self, id: &ResourceId) -> Option<Resource> {
        self.resources.read().get(id).cloned()
    }

    /// Snapshot of every resource, ordered by id.
    #[must_use]
    pub fn snapshot(&self) -> Vec<Resource> {
        let mut all: Vec<Resource> = self.resources.read().values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    /// Snapshot of every assignment, released ones included.
    #[must_use]
    pub fn assignments(&self) -> Vec<ClientResourceAssignment> {
        self.assignments.read().clone()
    }

    /// Bind a resource to a client. The first assignment starts warmup.
    ///
    /// Dedicated resources serve one client at a time; shareable resources
    /// serve up to `max_clients`.
    pub fn assign(
        &self,
        resource_id: &ResourceId,
        client_id: &ClientId,
        now: DateTime<Utc>,
    ) -> Result<(), EngineError> {
        let mut resources = self.resources.write();
        let mut assignments = self.assignments.write();
        let resource = resources
            .get_mut(resource_id)
            .ok_or_else(|| EngineError::UnknownResource(resource_id.clone()))?;

        if matches!(
            resource.status,
            ResourceStatus::Restricted | ResourceStatus::Retired
        ) {
            return Err(EngineError::AssignmentConflict(format!(
                "resource {resource_id} is {:?}",
                resource.status
            )));
        }

        let active: Vec<&ClientResourceAssignment> = assignments
            .iter()
            .filter(|a| &a.resource_id == resource_id && a.is_active())
            .collect();
        if active.iter().any(|a| &a.client_id == client_id) {
            return Ok(());
        }
        if resource.shareable {
            let ceiling = usize::try_from(resource.max_clients).unwrap_or(usize::MAX);
            if active.len() >= ceiling {
                return Err(EngineError::AssignmentConflict(format!(
                    "resource {resource_id} already shared by {} clients",
                    active.len()
                )));
            }
        } else if let Some(owner) = active.first() {
            return Err(EngineError::AssignmentConflict(format!(
                "resource {resource_id} is dedicated to {}",
                owner.client_id
            )));
        } else {
            resource.assigned_client_id = Some(client_id.clone());
        }

        if resource.status == ResourceStatus::Pending {
            resource.status = ResourceStatus::Warming;
            resource.activated_at = Some(now);
            tracing::info!("resource {} started warming", resource_id);
        }

        assignments.push(ClientResourceAssignment {
            resource_id: resource_id.clone(),
            client_id: client_id.clone(),
            assigned_at: now,
            release_after: None,
            released_at: None,
        });
        tracing::info!("assigned resource {} to client {}", resource_id, client_id);
        Ok(())
    }

    /// Allocatable resources of `resource_type` currently serving `client_id`.
    /// Assignments in their release hold no longer serve the client.
    #[must_use]
    pub fn candidates(&self, client_id: &ClientId, resource_type: ResourceType) -> Vec<Resource> {
        // lock order: resources before assignments, everywhere
        let resources = self.resources.read();
        let assignments = self.assignments.read();
        assignments
            .iter()
            .filter(|a| {
                &a.client_id == client_id && a.is_active() && a.release_after.is_none()
            })
            .filter_map(|a| resources.get(&a.resource_id))
            .filter(|r| r.resource_type == resource_type && r.status.is_allocatable())
            .cloned()
            .collect()
    }

    /// Start the release hold for every resource of a churned client.
    /// Returns the number of assignments entering the hold.
    pub fn begin_release(&self, client_id: &ClientId, now: DateTime<Utc>) -> usize {
        let mut assignments = self.assignments.write();
        let release_after = now + self.release_hold;
        let mut count = 0;
        for assignment in assignments
            .iter_mut()
            .filter(|a| &a.client_id == client_id && a.is_active() && a.release_after.is_none())
        {
            assignment.release_after = Some(release_after);
            count += 1;
        }
        if count > 0 {
            tracing::info!(
                "client {} churned, {} assignments held until {}",
                client_id,
                count,
                release_after
            );
        }
        count
    }

    /// Finalize assignments whose hold has elapsed and return their resources
    /// to the platform pool.
    pub fn sweep_releases(&self, now: DateTime<Utc>) -> Vec<ResourceId> {
        let mut resources = self.resources.write();
        let mut assignments = self.assignments.write();
        let mut released = Vec::new();
        for assignment in assignments.iter_mut().filter(|a| {
            a.is_active() && a.release_after.is_some_and(|deadline| deadline <= now)
        }) {
            assignment.released_at = Some(now);
            if let Some(resource) = resources.get_mut(&assignment.resource_id) {
                if resource.assigned_client_id.as_ref() == Some(&assignment.client_id) {
                    resource.assigned_client_id = None;
                }
            }
            tracing::info!(
                "released resource {} from client {}",
                assignment.resource_id,
                assignment.client_id
            );
            released.push(assignment.resource_id.clone());
        }
        released
    }

    /// Move a resource through the lifecycle state machine, returning the
    /// previous status.
    pub fn transition(
        &self,
        resource_id: &ResourceId,
        to: ResourceStatus,
        reason: Option<ReasonCode>,
    ) -> Result<ResourceStatus, EngineError> {
        let mut resources = self.resources.write();
        let resource = resources
            .get_mut(resource_id)
            .ok_or_else(|| EngineError::UnknownResource(resource_id.clone()))?;
        let from = resource.status;
        if from == to {
            return Ok(from);
        }
        if !from.can_transition_to(to) {
            return Err(EngineError::InvalidTransition {
                resource: resource_id.clone(),
                from,
                to,
            });
        }
        resource.status = to;
        // a cooldown never carries across a restriction or a fresh degradation
        if matches!(
            to,
            ResourceStatus::Active | ResourceStatus::Degraded | ResourceStatus::Restricted
        ) {
            resource.health.recovering_since = None;
        }
        let reason = reason.map_or("operator", ReasonCode::as_str);
        if matches!(to, ResourceStatus::Restricted | ResourceStatus::Retired) {
            tracing::warn!("resource {} {:?} -> {:?} ({})", resource_id, from, to, reason);
        } else {
            tracing::info!("resource {} {:?} -> {:?} ({})", resource_id, from, to, reason);
        }
        Ok(from)
    }

    /// Apply an external hard restriction signal.
    pub fn restrict(&self, resource_id: &ResourceId) -> Result<ResourceStatus, EngineError> {
        self.transition(
            resource_id,
            ResourceStatus::Restricted,
            Some(ReasonCode::ExternalRestriction),
        )
    }

    /// Operator action lifting a restriction. The resource re-enters as
    /// degraded and recovers through the normal cooldown.
    pub fn lift_restriction(&self, resource_id: &ResourceId) -> Result<(), EngineError> {
        let current = self
            .get(resource_id)
            .ok_or_else(|| EngineError::UnknownResource(resource_id.clone()))?;
        if current.status != ResourceStatus::Restricted {
            return Err(EngineError::InvalidTransition {
                resource: resource_id.clone(),
                from: current.status,
                to: ResourceStatus::Degraded,
            });
        }
        self.transition(
            resource_id,
            ResourceStatus::Degraded,
            None,
        )?;
        Ok(())
    }

    /// Take a resource permanently out of rotation.
    pub fn retire(&self, resource_id: &ResourceId, reason: ReasonCode) -> Result<(), EngineError> {
        self.transition(resource_id, ResourceStatus::Retired, Some(reason))?;
        Ok(())
    }

    /// Set or clear the operator daily cap override.
    pub fn set_daily_cap_override(
        &self,
        resource_id: &ResourceId,
        cap: Option<u32>,
    ) -> Result<(), EngineError> {
        let mut resources = self.resources.write();
        let resource = resources
            .get_mut(resource_id)
            .ok_or_else(|| EngineError::UnknownResource(resource_id.clone()))?;
        resource.daily_cap_override = cap;
        Ok(())
    }

    /// Replace the rolling health metrics of a resource.
    pub fn update_health(
        &self,
        resource_id: &ResourceId,
        health: ResourceHealth,
    ) -> Result<(), EngineError> {
        let mut resources = self.resources.write();
        let resource = resources
            .get_mut(resource_id)
            .ok_or_else(|| EngineError::UnknownResource(resource_id.clone()))?;
        resource.health = health;
        Ok(())
    }

    /// Record that the allocator just picked this resource.
    pub fn mark_allocated(&self, resource_id: &ResourceId, now: DateTime<Utc>) {
        if let Some(resource) = self.resources.write().get_mut(resource_id) {
            resource.last_allocated_at = Some(now);
        }
    }

    /// Cap implied by lifecycle status, applied to the channel's mature cap.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn health_adjusted_cap(&self, status: ResourceStatus, mature_cap: u32) -> u32 {
        match status {
            ResourceStatus::Warming | ResourceStatus::Active => mature_cap,
            // factor is validated to [0, 1], so the product fits in u32
            ResourceStatus::Degraded => {
                (f64::from(mature_cap) * self.degraded_cap_factor).floor() as u32
            }
            ResourceStatus::Pending | ResourceStatus::Restricted | ResourceStatus::Retired => 0,
        }
    }

    /// `min(override ?? warmup_ramp(days_active), health_adjusted_cap(status))`
    /// for the channel. Zero when the resource cannot carry the channel.
    #[must_use]
    pub fn effective_daily_cap(
        &self,
        resource: &Resource,
        channel: Channel,
        now: DateTime<Utc>,
    ) -> u32 {
        if channel.resource_type() != resource.resource_type {
            return 0;
        }
        let profile = self.channels.get(channel);
        let ramped = resource.daily_cap_override.unwrap_or_else(|| {
            self.warmup
                .get(resource.resource_type)
                .cap_for_day(resource.days_active(now))
        });
        ramped.min(self.health_adjusted_cap(resource.status, profile.daily_cap))
    }

    /// Weekly ceiling for the channel after health adjustment.
    #[must_use]
    pub fn effective_weekly_cap(&self, resource: &Resource, channel: Channel) -> u32 {
        if channel.resource_type() != resource.resource_type {
            return 0;
        }
        self.health_adjusted_cap(resource.status, self.channels.get(channel).weekly_cap)
    }

    /// Ramp for a resource type.
    #[must_use]
    pub const fn warmup(&self) -> &WarmupRamps {
        &self.warmup
    }
}
