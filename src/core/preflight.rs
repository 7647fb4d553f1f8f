//! Just-in-time validation run immediately before dispatch.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;

use crate::config::ChannelProfiles;
use crate::core::collaborators::{ComplianceRegistry, CrmDirectory};
use crate::core::error::{EngineError, ReasonCode};
use crate::core::model::{ComplianceCheck, Lead, ResourceStatus, SendAttempt};
use crate::core::resource_pool::ResourcePoolManager;

/// Outcome of preflight for one attempt.
#[derive(Debug, Clone)]
pub enum PreflightDecision {
    /// Every gate passed; carries the lead as read just now.
    Proceed(Box<Lead>),
    /// A gate failed; only this attempt is stopped.
    Abort(ReasonCode),
}

/// Timestamped do-not-contact results.
pub struct ComplianceCache {
    entries: RwLock<HashMap<String, ComplianceCheck>>,
    freshness: Duration,
}

impl ComplianceCache {
    /// Cache whose entries go stale after `freshness_days`.
    #[must_use]
    pub fn new(freshness_days: i64) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            freshness: Duration::days(freshness_days),
        }
    }

    fn is_fresh(&self, check: &ComplianceCheck, now: DateTime<Utc>) -> bool {
        now - check.checked_at < self.freshness
    }

    /// Fresh cached result for an identifier.
    #[must_use]
    pub fn lookup(&self, identifier: &str, now: DateTime<Utc>) -> Option<bool> {
        self.entries
            .read()
            .get(identifier)
            .filter(|check| self.is_fresh(check, now))
            .map(|check| check.blocked)
    }

    /// Seed the cache, keeping the newest result per identifier.
    pub fn seed(&self, identifier: &str, check: ComplianceCheck) {
        let mut entries = self.entries.write();
        let keep = entries
            .get(identifier)
            .is_none_or(|existing| existing.checked_at < check.checked_at);
        if keep {
            entries.insert(identifier.to_string(), check);
        }
    }

    /// Re-query the registry in one batch for every identifier without a
    /// fresh entry. Returns how many were queried.
    pub async fn refresh(
        &self,
        registry: &dyn ComplianceRegistry,
        identifiers: &[String],
        now: DateTime<Utc>,
    ) -> Result<usize, EngineError> {
        let stale: Vec<String> = identifiers
            .iter()
            .filter(|id| self.lookup(id, now).is_none())
            .cloned()
            .collect::<HashSet<_>>()
            .into_iter()
            .collect();
        if stale.is_empty() {
            return Ok(0);
        }
        let answers = registry.check(&stale).await?;
        let mut entries = self.entries.write();
        for id in &stale {
            entries.insert(
                id.clone(),
                ComplianceCheck {
                    blocked: answers.get(id).copied().unwrap_or(false),
                    checked_at: now,
                },
            );
        }
        tracing::debug!("refreshed {} compliance entries", stale.len());
        Ok(stale.len())
    }
}

/// Re-checks every gate at the scheduled instant.
pub struct PreflightValidator {
    crm: Arc<dyn CrmDirectory>,
    registry: Arc<dyn ComplianceRegistry>,
    cache: Arc<ComplianceCache>,
    pool: Arc<ResourcePoolManager>,
    channels: ChannelProfiles,
}

impl PreflightValidator {
    /// Create a validator.
    #[must_use]
    pub fn new(
        crm: Arc<dyn CrmDirectory>,
        registry: Arc<dyn ComplianceRegistry>,
        cache: Arc<ComplianceCache>,
        pool: Arc<ResourcePoolManager>,
        channels: ChannelProfiles,
    ) -> Self {
        Self {
            crm,
            registry,
            cache,
            pool,
            channels,
        }
    }

    /// Directory used for client, campaign and lead lookups.
    #[must_use]
    pub fn crm(&self) -> &Arc<dyn CrmDirectory> {
        &self.crm
    }

    /// Shared compliance cache.
    #[must_use]
    pub fn cache(&self) -> &Arc<ComplianceCache> {
        &self.cache
    }

    /// Refresh compliance entries for a batch of attempts in one registry call.
    pub async fn prefetch_compliance(
        &self,
        contacts: &[String],
        now: DateTime<Utc>,
    ) -> Result<usize, EngineError> {
        self.cache
            .refresh(self.registry.as_ref(), contacts, now)
            .await
    }

    /// Validate one attempt.
    pub async fn validate(
        &self,
        attempt: &SendAttempt,
        now: DateTime<Utc>,
    ) -> Result<PreflightDecision, EngineError> {
        let decision = self.check(attempt, now).await?;
        if let PreflightDecision::Abort(reason) = &decision {
            tracing::warn!(
                "preflight aborted attempt {} for lead {}: {}",
                attempt.id,
                attempt.lead_id,
                reason
            );
        }
        Ok(decision)
    }

    async fn check(
        &self,
        attempt: &SendAttempt,
        now: DateTime<Utc>,
    ) -> Result<PreflightDecision, EngineError> {
        use PreflightDecision::Abort;

        if !self.crm.client_active(&attempt.client_id).await? {
            return Ok(Abort(ReasonCode::ClientInactive));
        }
        if !self.crm.campaign_active(&attempt.campaign_id).await? {
            return Ok(Abort(ReasonCode::CampaignInactive));
        }
        let Some(lead) = self.crm.lead(&attempt.lead_id).await? else {
            return Ok(Abort(ReasonCode::LeadNotFound));
        };
        if let Some(reason) = lead.status.block_reason() {
            return Ok(Abort(reason));
        }
        let Some(contact) = lead.contact_for(attempt.channel) else {
            return Ok(Abort(ReasonCode::MissingContact));
        };

        if self.channels.get(attempt.channel).requires_compliance_check {
            if let Some(check) = lead.compliance {
                self.cache.seed(contact, check);
            }
            let blocked = match self.cache.lookup(contact, now) {
                Some(blocked) => blocked,
                None => {
                    self.cache
                        .refresh(self.registry.as_ref(), &[contact.to_string()], now)
                        .await?;
                    self.cache.lookup(contact, now).unwrap_or(false)
                }
            };
            if blocked {
                return Ok(Abort(ReasonCode::ComplianceBlocked));
            }
        }

        match self.pool.get(&attempt.resource_id).map(|r| r.status) {
            Some(ResourceStatus::Restricted) => Ok(Abort(ReasonCode::ResourceRestricted)),
            Some(status) if status.is_allocatable() => {
                Ok(PreflightDecision::Proceed(Box::new(lead)))
            }
            _ => Ok(Abort(ReasonCode::ResourceUnavailable)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::TimeZone;
    use parking_lot::Mutex;

    #[derive(Default)]
    struct CountingRegistry {
        calls: Mutex<Vec<Vec<String>>>,
        blocked: HashSet<String>,
    }

    #[async_trait]
    impl ComplianceRegistry for CountingRegistry {
        async fn check(&self, ids: &[String]) -> Result<HashMap<String, bool>, EngineError> {
            self.calls.lock().push(ids.to_vec());
            Ok(ids
                .iter()
                .map(|id| (id.clone(), self.blocked.contains(id)))
                .collect())
        }
    }

    #[tokio::test]
    async fn test_cache_requeries_only_when_stale() {
        let registry = CountingRegistry {
            blocked: HashSet::from(["+15550001".to_string()]),
            ..CountingRegistry::default()
        };
        let cache = ComplianceCache::new(90);
        let t0 = Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap();
        let ids = vec!["+15550001".to_string(), "+15550002".to_string()];

        assert_eq!(cache.refresh(&registry, &ids, t0).await.unwrap(), 2);
        assert_eq!(cache.lookup("+15550001", t0), Some(true));
        assert_eq!(cache.lookup("+15550002", t0), Some(false));

        let day_89 = t0 + Duration::days(89);
        assert_eq!(cache.refresh(&registry, &ids, day_89).await.unwrap(), 0);

        let day_90 = t0 + Duration::days(90);
        assert_eq!(cache.lookup("+15550001", day_90), None);
        assert_eq!(cache.refresh(&registry, &ids, day_90).await.unwrap(), 2);
        assert_eq!(registry.calls.lock().len(), 2);
    }
}
