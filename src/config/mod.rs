//! Configuration models: channel profiles, warmup ramps, health thresholds,
//! tier gates, and dispatch limits.

pub mod channel;
pub mod engine;
pub mod warmup;

pub use channel::{
    BusinessHours, ChannelProfile, ChannelProfiles, RetryPolicy, RetryRule, TimeRange,
    WeekendPolicy,
};
pub use engine::{
    AssignmentConfig, ComplianceConfig, ConnectionConfig, DispatchConfig, EngineConfig,
    CONFIG_PATH_ENV,
    HealthConfig, HealthThresholds, ResourceThresholds, TierGates,
};
pub use warmup::{RampStep, WarmupRamp, WarmupRamps};
