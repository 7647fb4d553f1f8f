//! Engine components and the records they share.

pub mod alerts;
pub mod allocator;
pub mod attempt_log;
pub mod channel;
pub mod collaborators;
pub mod connections;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod health;
pub mod model;
pub mod preflight;
pub mod rate_limiter;
pub mod resource_pool;
pub mod scheduler;
pub mod scorer;

pub use alerts::{AlertEvent, AlertKind, AlertSink, InMemoryAlertSink, TracingAlertSink};
pub use allocator::{AllocationOutcome, AllocationRequest, Allocator};
pub use attempt_log::AttemptStore;
pub use channel::{Channel, ResourceType};
pub use collaborators::{
    ChannelSender, ChannelSenders, ComplianceRegistry, ContentProvider, CrmDirectory,
    DispatchRequest, DispatchResult, MessagePayload,
};
pub use connections::{ConnectionLedger, ConnectionRequest, ConnectionStatus};
pub use dispatch::{DispatchItem, DispatchReport, Spawn};
pub use engine::{MaintenanceReport, OutreachEngine, ScheduleOutcome, TouchRequest};
pub use error::{AppResult, EngineError, ReasonCode};
pub use health::{HealthMonitor, HealthTransition, SweepReport, WindowMetrics};
pub use model::{
    AttemptOutcome, ClientResourceAssignment, ComplianceCheck, DeliveryStatus, Feedback,
    HealthClass, Lead, LeadStatus, Resource, ResourceHealth, ResourceStatus, SendAttempt,
};
pub use preflight::{ComplianceCache, PreflightDecision, PreflightValidator};
pub use rate_limiter::{ConsumeOutcome, ConsumeRequest, CounterStore, RateLimiter, WindowKey, WindowLimit};
pub use resource_pool::ResourcePoolManager;
pub use scheduler::{HourlyLedger, TimingScheduler};
pub use scorer::{DefaultScoringPolicy, LeadAttributes, ScoreCard, ScoringPolicy, Seniority, Tier};
