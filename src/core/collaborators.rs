//! Interfaces of the external collaborators the engine drives.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::channel::Channel;
use crate::core::error::EngineError;
use crate::core::model::{DeliveryStatus, Lead};
use crate::util::serde::{AttemptId, CampaignId, ClientId, LeadId, ResourceId};

/// Message payload produced by the content collaborator. Passed through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagePayload {
    /// Subject line where the channel has one.
    pub subject: Option<String>,
    /// Body text or call script.
    pub body: String,
}

/// Produces payloads for a touch.
#[async_trait]
pub trait ContentProvider: Send + Sync {
    /// Payload for a lead at a sequence position.
    async fn payload(
        &self,
        lead: &Lead,
        channel: Channel,
        sequence_position: u32,
    ) -> Result<MessagePayload, EngineError>;
}

/// What a channel sender receives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchRequest {
    /// Attempt being dispatched.
    pub attempt_id: AttemptId,
    /// Resource carrying the send.
    pub resource_id: ResourceId,
    /// Channel.
    pub channel: Channel,
    /// Address, number, or handle of the recipient.
    pub recipient_contact: String,
    /// Payload to deliver.
    pub payload: MessagePayload,
    /// Instant the send was scheduled for.
    pub scheduled_for: DateTime<Utc>,
    /// 1 for the first try.
    pub attempt_number: u32,
}

/// What a channel sender reports back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchResult {
    /// Provider status.
    pub status: DeliveryStatus,
    /// Provider reference for reconciliation.
    pub provider_reference: Option<String>,
}

/// Sends through one channel's provider. An `Err` is a transient failure.
#[async_trait]
pub trait ChannelSender: Send + Sync {
    /// Hand one send to the provider.
    async fn send(&self, request: DispatchRequest) -> Result<DispatchResult, EngineError>;
}

/// Do-not-contact registry.
#[async_trait]
pub trait ComplianceRegistry: Send + Sync {
    /// Batch lookup; `true` means the identifier is blocked. Identifiers
    /// missing from the answer are treated as not blocked.
    async fn check(&self, identifiers: &[String]) -> Result<HashMap<String, bool>, EngineError>;
}

/// Read access to client, campaign and lead state owned elsewhere.
#[async_trait]
pub trait CrmDirectory: Send + Sync {
    /// Client is active and paying.
    async fn client_active(&self, client_id: &ClientId) -> Result<bool, EngineError>;
    /// Campaign is running.
    async fn campaign_active(&self, campaign_id: &CampaignId) -> Result<bool, EngineError>;
    /// Current lead record.
    async fn lead(&self, lead_id: &LeadId) -> Result<Option<Lead>, EngineError>;
}

/// One sender per channel.
#[derive(Clone, Default)]
pub struct ChannelSenders {
    senders: HashMap<Channel, Arc<dyn ChannelSender>>,
}

impl ChannelSenders {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the sender for a channel.
    #[must_use]
    pub fn with(mut self, channel: Channel, sender: Arc<dyn ChannelSender>) -> Self {
        self.senders.insert(channel, sender);
        self
    }

    /// Sender for a channel.
    #[must_use]
    pub fn get(&self, channel: Channel) -> Option<Arc<dyn ChannelSender>> {
        self.senders.get(&channel).cloned()
    }
}
