//! Fake collaborators shared by the integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use parking_lot::Mutex;

use outreach_engine::builders::EngineBuilder;
use outreach_engine::config::EngineConfig;
use outreach_engine::core::{
    AttemptStore, Channel, ChannelSender, ComplianceRegistry, ContentProvider, CrmDirectory,
    DeliveryStatus, DispatchRequest, DispatchResult, EngineError, Feedback, InMemoryAlertSink,
    Lead, LeadStatus, MessagePayload, OutreachEngine, SendAttempt, Tier,
};
use outreach_engine::infra::InMemoryAttemptStore;
use outreach_engine::util::{AttemptId, CampaignId, ClientId, LeadId, ManualClock, ResourceId};

/// Monday 2026-03-02 at `hour`:00 UTC.
pub fn monday_at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, hour, 0, 0).unwrap()
}

pub fn lead(id: &str, tier: Tier) -> Lead {
    Lead {
        id: id.into(),
        email: Some(format!("{id}@example.com")),
        phone: Some("+15550100".into()),
        social_handle: Some(format!("in/{id}")),
        timezone: "UTC".into(),
        score: match tier {
            Tier::Hot => 90,
            Tier::Warm => 70,
            Tier::Cool => 45,
            Tier::Cold => 25,
            Tier::Dead => 5,
        },
        tier,
        status: LeadStatus::Active,
        compliance: None,
        mutual_connections: HashMap::new(),
    }
}

#[derive(Default)]
pub struct FakeCrm {
    leads: Mutex<HashMap<LeadId, Lead>>,
    inactive_clients: Mutex<Vec<ClientId>>,
}

impl FakeCrm {
    pub fn put(&self, lead: Lead) {
        self.leads.lock().insert(lead.id.clone(), lead);
    }

    pub fn set_status(&self, id: &str, status: LeadStatus) {
        if let Some(lead) = self.leads.lock().get_mut(&LeadId::from(id)) {
            lead.status = status;
        }
    }

    pub fn deactivate(&self, client: &str) {
        self.inactive_clients.lock().push(client.into());
    }
}

#[async_trait]
impl CrmDirectory for FakeCrm {
    async fn client_active(&self, client_id: &ClientId) -> Result<bool, EngineError> {
        Ok(!self.inactive_clients.lock().contains(client_id))
    }

    async fn campaign_active(&self, _campaign_id: &CampaignId) -> Result<bool, EngineError> {
        Ok(true)
    }

    async fn lead(&self, lead_id: &LeadId) -> Result<Option<Lead>, EngineError> {
        Ok(self.leads.lock().get(lead_id).cloned())
    }
}

#[derive(Default)]
pub struct FakeRegistry {
    blocked: Mutex<Vec<String>>,
    pub calls: Mutex<usize>,
}

impl FakeRegistry {
    pub fn block(&self, identifier: &str) {
        self.blocked.lock().push(identifier.to_string());
    }
}

#[async_trait]
impl ComplianceRegistry for FakeRegistry {
    async fn check(&self, identifiers: &[String]) -> Result<HashMap<String, bool>, EngineError> {
        *self.calls.lock() += 1;
        let blocked = self.blocked.lock();
        Ok(identifiers
            .iter()
            .map(|id| (id.clone(), blocked.contains(id)))
            .collect())
    }
}

pub struct FakeContent;

#[async_trait]
impl ContentProvider for FakeContent {
    async fn payload(
        &self,
        lead: &Lead,
        channel: Channel,
        sequence_position: u32,
    ) -> Result<MessagePayload, EngineError> {
        Ok(MessagePayload {
            subject: (channel == Channel::Email).then(|| format!("Hello {}", lead.id)),
            body: format!("touch {sequence_position}"),
        })
    }
}

/// Sender answering every request with a scripted status.
pub struct FakeSender {
    status: Mutex<DeliveryStatus>,
    pub sent: Mutex<Vec<DispatchRequest>>,
}

impl FakeSender {
    pub fn new(status: DeliveryStatus) -> Self {
        Self {
            status: Mutex::new(status),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn script(&self, status: DeliveryStatus) {
        *self.status.lock() = status;
    }
}

#[async_trait]
impl ChannelSender for FakeSender {
    async fn send(&self, request: DispatchRequest) -> Result<DispatchResult, EngineError> {
        let status = *self.status.lock();
        let reference = format!("prov-{}", request.attempt_id);
        self.sent.lock().push(request);
        Ok(DispatchResult {
            status,
            provider_reference: Some(reference),
        })
    }
}

/// In-memory attempt store whose inserts can be switched to fail.
#[derive(Default)]
pub struct FlakyAttempts {
    inner: InMemoryAttemptStore,
    pub fail_inserts: AtomicBool,
}

impl FlakyAttempts {
    pub fn fail_inserts(&self, fail: bool) {
        self.fail_inserts.store(fail, Ordering::SeqCst);
    }

    pub fn all(&self) -> Vec<SendAttempt> {
        self.inner.all()
    }
}

impl AttemptStore for FlakyAttempts {
    fn insert(&self, attempt: SendAttempt) -> Result<(), EngineError> {
        if self.fail_inserts.load(Ordering::SeqCst) {
            return Err(EngineError::Backend("attempt log unavailable".into()));
        }
        self.inner.insert(attempt)
    }

    fn update(&self, attempt: SendAttempt) -> Result<(), EngineError> {
        self.inner.update(attempt)
    }

    fn get(&self, id: AttemptId) -> Result<Option<SendAttempt>, EngineError> {
        self.inner.get(id)
    }

    fn claim_due(
        &self,
        now: DateTime<Utc>,
        limit: usize,
        lease: Duration,
    ) -> Result<Vec<SendAttempt>, EngineError> {
        self.inner.claim_due(now, limit, lease)
    }

    fn dispatched_since(
        &self,
        resource_id: &ResourceId,
        since: DateTime<Utc>,
    ) -> Result<Vec<SendAttempt>, EngineError> {
        self.inner.dispatched_since(resource_id, since)
    }

    fn add_feedback(&self, id: AttemptId, feedback: Feedback) -> Result<bool, EngineError> {
        self.inner.add_feedback(id, feedback)
    }
}

/// Engine wired to fakes, a manual clock and in-memory stores.
pub struct Harness {
    pub engine: Arc<OutreachEngine>,
    pub clock: ManualClock,
    pub crm: Arc<FakeCrm>,
    pub registry: Arc<FakeRegistry>,
    pub sender: Arc<FakeSender>,
    pub attempts: Arc<FlakyAttempts>,
    pub alerts: Arc<InMemoryAlertSink>,
}

impl Harness {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self::with_config(EngineConfig::default(), start)
    }

    pub fn with_config(config: EngineConfig, start: DateTime<Utc>) -> Self {
        let clock = ManualClock::new(start);
        let crm = Arc::new(FakeCrm::default());
        let registry = Arc::new(FakeRegistry::default());
        let sender = Arc::new(FakeSender::new(DeliveryStatus::Sent));
        let attempts = Arc::new(FlakyAttempts::default());
        let alerts = Arc::new(InMemoryAlertSink::default());
        let mut builder = EngineBuilder::new(config)
            .content(Arc::new(FakeContent))
            .crm(crm.clone())
            .compliance(registry.clone())
            .attempt_store(attempts.clone())
            .alert_sink(alerts.clone())
            .clock(Arc::new(clock.clone()))
            .seed(7);
        for channel in Channel::ALL {
            builder = builder.sender(channel, sender.clone());
        }
        Self {
            engine: builder.build().unwrap(),
            clock,
            crm,
            registry,
            sender,
            attempts,
            alerts,
        }
    }

    pub fn attempt(&self, id: AttemptId) -> SendAttempt {
        self.attempts.get(id).unwrap().unwrap()
    }
}
