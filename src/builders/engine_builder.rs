//! Builder constructing an engine from configuration and collaborators.

use std::sync::Arc;

use tokio::sync::Semaphore;

use crate::config::EngineConfig;
use crate::core::alerts::{AlertSink, TracingAlertSink};
use crate::core::allocator::Allocator;
use crate::core::attempt_log::AttemptStore;
use crate::core::channel::Channel;
use crate::core::collaborators::{
    ChannelSender, ChannelSenders, ComplianceRegistry, ContentProvider, CrmDirectory,
};
use crate::core::connections::ConnectionLedger;
use crate::core::engine::OutreachEngine;
use crate::core::error::EngineError;
use crate::core::health::HealthMonitor;
use crate::core::preflight::{ComplianceCache, PreflightValidator};
use crate::core::rate_limiter::{CounterStore, RateLimiter};
use crate::core::resource_pool::ResourcePoolManager;
use crate::core::scheduler::TimingScheduler;
use crate::core::scorer::{DefaultScoringPolicy, ScoringPolicy};
use crate::infra::{InMemoryAttemptStore, InMemoryCounterStore};
use crate::util::clock::{system_clock, Clock};

/// Assembles an [`OutreachEngine`]. Stores, alerts, scoring and the clock
/// default to in-process implementations; the CRM, compliance and content
/// collaborators are required.
#[derive(Default)]
pub struct EngineBuilder {
    config: EngineConfig,
    counters: Option<Arc<dyn CounterStore>>,
    attempts: Option<Arc<dyn AttemptStore>>,
    alerts: Option<Arc<dyn AlertSink>>,
    content: Option<Arc<dyn ContentProvider>>,
    crm: Option<Arc<dyn CrmDirectory>>,
    compliance: Option<Arc<dyn ComplianceRegistry>>,
    senders: ChannelSenders,
    scorer: Option<Arc<dyn ScoringPolicy>>,
    clock: Option<Arc<dyn Clock>>,
    seed: Option<u64>,
}

impl EngineBuilder {
    /// Start from a configuration.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Shared counter store.
    #[must_use]
    pub fn counter_store(mut self, store: Arc<dyn CounterStore>) -> Self {
        self.counters = Some(store);
        self
    }

    /// Attempt log.
    #[must_use]
    pub fn attempt_store(mut self, store: Arc<dyn AttemptStore>) -> Self {
        self.attempts = Some(store);
        self
    }

    /// Alert destination.
    #[must_use]
    pub fn alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alerts = Some(sink);
        self
    }

    /// Content collaborator.
    #[must_use]
    pub fn content(mut self, content: Arc<dyn ContentProvider>) -> Self {
        self.content = Some(content);
        self
    }

    /// CRM directory.
    #[must_use]
    pub fn crm(mut self, crm: Arc<dyn CrmDirectory>) -> Self {
        self.crm = Some(crm);
        self
    }

    /// Do-not-contact registry.
    #[must_use]
    pub fn compliance(mut self, registry: Arc<dyn ComplianceRegistry>) -> Self {
        self.compliance = Some(registry);
        self
    }

    /// Sender for one channel.
    #[must_use]
    pub fn sender(mut self, channel: Channel, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders = self.senders.with(channel, sender);
        self
    }

    /// Scoring policy.
    #[must_use]
    pub fn scorer(mut self, scorer: Arc<dyn ScoringPolicy>) -> Self {
        self.scorer = Some(scorer);
        self
    }

    /// Clock.
    #[must_use]
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Seed the scheduler's randomness.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Validate configuration and assemble the engine.
    pub fn build(self) -> Result<Arc<OutreachEngine>, EngineError> {
        self.config
            .validate()
            .map_err(|e| EngineError::Config(format!("config invalid: {e}")))?;
        let content = self
            .content
            .ok_or_else(|| EngineError::Config("content provider is required".into()))?;
        let crm = self
            .crm
            .ok_or_else(|| EngineError::Config("crm directory is required".into()))?;
        let compliance = self
            .compliance
            .ok_or_else(|| EngineError::Config("compliance registry is required".into()))?;

        let config = self.config;
        let clock = self.clock.unwrap_or_else(system_clock);
        let counters = self
            .counters
            .unwrap_or_else(|| Arc::new(InMemoryCounterStore::new()));
        let attempts = self
            .attempts
            .unwrap_or_else(|| Arc::new(InMemoryAttemptStore::new()));
        let alerts = self.alerts.unwrap_or_else(|| Arc::new(TracingAlertSink));
        let scorer = self
            .scorer
            .unwrap_or_else(|| Arc::new(DefaultScoringPolicy));

        let pool = Arc::new(ResourcePoolManager::new(&config));
        let limiter = RateLimiter::new(counters);
        let scheduler = match self.seed {
            Some(seed) => TimingScheduler::with_seed(config.channels.clone(), seed),
            None => TimingScheduler::new(config.channels.clone()),
        };
        let allocator = Allocator::new(
            Arc::clone(&pool),
            limiter.clone(),
            config.channels.clone(),
            config.tier_gates,
        );
        let preflight = PreflightValidator::new(
            crm,
            compliance,
            Arc::new(ComplianceCache::new(config.compliance.freshness_days)),
            Arc::clone(&pool),
            config.channels.clone(),
        );
        let health = HealthMonitor::new(
            Arc::clone(&pool),
            Arc::clone(&attempts),
            Arc::clone(&alerts),
            config.health,
            Arc::clone(&clock),
        );

        tracing::info!(
            "built outreach engine v{} with {} dispatch permits",
            config.version,
            config.dispatch.max_concurrent
        );
        Ok(Arc::new(OutreachEngine {
            connections: ConnectionLedger::new(config.connections.stale_request_days),
            permits: Arc::new(Semaphore::new(config.dispatch.max_concurrent)),
            pool,
            limiter,
            allocator,
            scheduler,
            preflight,
            health,
            attempts,
            alerts,
            content,
            senders: self.senders,
            scorer,
            clock,
            config,
        }))
    }
}
