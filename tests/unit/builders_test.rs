//! Tests for the engine builder

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use outreach_engine::builders::EngineBuilder;
use outreach_engine::config::EngineConfig;
use outreach_engine::core::{
    Channel, ComplianceRegistry, ContentProvider, CrmDirectory, EngineError, Lead, MessagePayload,
};
use outreach_engine::util::{CampaignId, ClientId, LeadId};

struct Nothing;

#[async_trait]
impl ContentProvider for Nothing {
    async fn payload(&self, _: &Lead, _: Channel, _: u32) -> Result<MessagePayload, EngineError> {
        Ok(MessagePayload {
            subject: None,
            body: String::new(),
        })
    }
}

#[async_trait]
impl CrmDirectory for Nothing {
    async fn client_active(&self, _: &ClientId) -> Result<bool, EngineError> {
        Ok(true)
    }
    async fn campaign_active(&self, _: &CampaignId) -> Result<bool, EngineError> {
        Ok(true)
    }
    async fn lead(&self, _: &LeadId) -> Result<Option<Lead>, EngineError> {
        Ok(None)
    }
}

#[async_trait]
impl ComplianceRegistry for Nothing {
    async fn check(&self, _: &[String]) -> Result<HashMap<String, bool>, EngineError> {
        Ok(HashMap::new())
    }
}

#[test]
fn test_builder_requires_collaborators() {
    let err = EngineBuilder::new(EngineConfig::default()).build();
    assert!(matches!(err, Err(EngineError::Config(_))));
}

#[test]
fn test_builder_rejects_invalid_config() {
    let mut cfg = EngineConfig::default();
    cfg.dispatch.batch_limit = 0;
    let err = EngineBuilder::new(cfg)
        .content(Arc::new(Nothing))
        .crm(Arc::new(Nothing))
        .compliance(Arc::new(Nothing))
        .build();
    assert!(matches!(err, Err(EngineError::Config(msg)) if msg.contains("config invalid")));
}

#[test]
fn test_builder_with_defaults() {
    let engine = EngineBuilder::new(EngineConfig::default())
        .content(Arc::new(Nothing))
        .crm(Arc::new(Nothing))
        .compliance(Arc::new(Nothing))
        .seed(1)
        .build()
        .unwrap();
    assert_eq!(engine.config().version, 1);
    assert!(engine.pool().snapshot().is_empty());
}
