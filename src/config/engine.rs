//! Root engine configuration.

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::config::channel::ChannelProfiles;
use crate::config::warmup::WarmupRamps;
use crate::core::channel::{Channel, ResourceType};
use crate::core::error::AppResult;
use crate::core::scorer::Tier;

/// Environment variable naming a JSON config file.
pub const CONFIG_PATH_ENV: &str = "OUTREACH_CONFIG";

/// Warning and critical thresholds for one resource type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResourceThresholds {
    /// Bounce rate above which the resource is in warning.
    pub bounce_warning: f64,
    /// Bounce rate above which the resource is critical.
    pub bounce_critical: f64,
    /// Complaint rate above which the resource is in warning.
    pub complaint_warning: f64,
    /// Complaint rate above which the resource is critical.
    pub complaint_critical: f64,
    /// Accept rate below which a seat is in warning.
    #[serde(default)]
    pub accept_warning: Option<f64>,
    /// Accept rate below which a seat is critical.
    #[serde(default)]
    pub accept_critical: Option<f64>,
}

impl ResourceThresholds {
    fn validate(&self) -> Result<(), String> {
        if self.bounce_warning > self.bounce_critical {
            return Err("bounce_warning must not exceed bounce_critical".into());
        }
        if self.complaint_warning > self.complaint_critical {
            return Err("complaint_warning must not exceed complaint_critical".into());
        }
        if let (Some(warn), Some(crit)) = (self.accept_warning, self.accept_critical) {
            if crit > warn {
                return Err("accept_critical must not exceed accept_warning".into());
            }
        }
        Ok(())
    }
}

/// Thresholds per resource type.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HealthThresholds {
    /// Sending domains.
    pub domain: ResourceThresholds,
    /// Phone numbers.
    pub phone_number: ResourceThresholds,
    /// Social seats.
    pub seat: ResourceThresholds,
}

impl HealthThresholds {
    /// Thresholds for a resource type.
    #[must_use]
    pub const fn get(&self, resource_type: ResourceType) -> &ResourceThresholds {
        match resource_type {
            ResourceType::Domain => &self.domain,
            ResourceType::PhoneNumber => &self.phone_number,
            ResourceType::Seat => &self.seat,
        }
    }
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            domain: ResourceThresholds {
                bounce_warning: 0.05,
                bounce_critical: 0.10,
                complaint_warning: 0.001,
                complaint_critical: 0.003,
                accept_warning: None,
                accept_critical: None,
            },
            phone_number: ResourceThresholds {
                bounce_warning: 0.10,
                bounce_critical: 0.20,
                complaint_warning: 0.01,
                complaint_critical: 0.03,
                accept_warning: None,
                accept_critical: None,
            },
            seat: ResourceThresholds {
                bounce_warning: 0.10,
                bounce_critical: 0.25,
                complaint_warning: 0.01,
                complaint_critical: 0.03,
                accept_warning: Some(0.20),
                accept_critical: Some(0.10),
            },
        }
    }
}

/// Health monitor settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Thresholds per resource type.
    pub thresholds: HealthThresholds,
    /// Fewer delivered samples than this leave a window unclassified.
    pub min_sample_size: u32,
    /// Short rolling window.
    pub short_window_days: i64,
    /// Long rolling window.
    pub long_window_days: i64,
    /// Share of the mature cap a degraded resource keeps.
    pub degraded_cap_factor: f64,
    /// Metrics must stay good this long before a degraded resource recovers.
    pub cooldown_hours: i64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            thresholds: HealthThresholds::default(),
            min_sample_size: 20,
            short_window_days: 7,
            long_window_days: 30,
            degraded_cap_factor: 0.5,
            cooldown_hours: 72,
        }
    }
}

/// Minimum tier per channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierGates {
    /// Email gate.
    pub email: Tier,
    /// SMS gate.
    pub sms: Tier,
    /// Voice gate.
    pub voice: Tier,
    /// Social gate.
    pub social: Tier,
}

impl TierGates {
    /// Minimum tier for a channel.
    #[must_use]
    pub const fn get(&self, channel: Channel) -> Tier {
        match channel {
            Channel::Email => self.email,
            Channel::Sms => self.sms,
            Channel::Voice => self.voice,
            Channel::Social => self.social,
        }
    }

    /// Whether a tier passes the channel's gate.
    #[must_use]
    pub fn admits(&self, channel: Channel, tier: Tier) -> bool {
        tier >= self.get(channel)
    }
}

impl Default for TierGates {
    fn default() -> Self {
        Self {
            email: Tier::Cold,
            sms: Tier::Hot,
            voice: Tier::Warm,
            social: Tier::Cool,
        }
    }
}

/// Compliance cache settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComplianceConfig {
    /// Cached registry results older than this are re-queried.
    pub freshness_days: i64,
}

impl Default for ComplianceConfig {
    fn default() -> Self {
        Self { freshness_days: 90 }
    }
}

/// Social connection request settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Pending requests older than this are marked ignored.
    pub stale_request_days: i64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            stale_request_days: 14,
        }
    }
}

/// Client assignment settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AssignmentConfig {
    /// Hold period between churn and returning resources to the pool.
    pub release_hold_days: i64,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            release_hold_days: 30,
        }
    }
}

/// Dispatch concurrency settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Global ceiling on concurrent dispatch tasks.
    pub max_concurrent: usize,
    /// Maximum due attempts pulled per dispatch pass.
    pub batch_limit: usize,
    /// Seconds after which an unfinished claim may be taken by another pass.
    pub claim_lease_secs: i64,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_concurrent: num_cpus::get() * 8,
            batch_limit: 500,
            claim_lease_secs: 600,
        }
    }
}

/// Root configuration, versioned and externally supplied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Configuration schema version.
    pub version: u32,
    /// Per-channel capability descriptors.
    #[serde(default)]
    pub channels: ChannelProfiles,
    /// Warmup ramps per resource type.
    #[serde(default)]
    pub warmup: WarmupRamps,
    /// Health monitor settings.
    #[serde(default)]
    pub health: HealthConfig,
    /// Channel to minimum-tier table.
    #[serde(default)]
    pub tier_gates: TierGates,
    /// Compliance cache settings.
    #[serde(default)]
    pub compliance: ComplianceConfig,
    /// Connection request settings.
    #[serde(default)]
    pub connections: ConnectionConfig,
    /// Assignment settings.
    #[serde(default)]
    pub assignment: AssignmentConfig,
    /// Dispatch settings.
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: 1,
            channels: ChannelProfiles::default(),
            warmup: WarmupRamps::default(),
            health: HealthConfig::default(),
            tier_gates: TierGates::default(),
            compliance: ComplianceConfig::default(),
            connections: ConnectionConfig::default(),
            assignment: AssignmentConfig::default(),
            dispatch: DispatchConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Validate every section.
    pub fn validate(&self) -> Result<(), String> {
        if self.version == 0 {
            return Err("version must be greater than 0".into());
        }
        self.channels.validate()?;
        self.warmup.validate()?;
        for resource_type in [ResourceType::Domain, ResourceType::PhoneNumber, ResourceType::Seat] {
            self.health
                .thresholds
                .get(resource_type)
                .validate()
                .map_err(|e| format!("health thresholds for {resource_type:?} invalid: {e}"))?;
        }
        if self.health.min_sample_size == 0 {
            return Err("health.min_sample_size must be greater than 0".into());
        }
        if self.health.short_window_days <= 0
            || self.health.long_window_days < self.health.short_window_days
        {
            return Err("health windows must be positive and short <= long".into());
        }
        if !(0.0..=1.0).contains(&self.health.degraded_cap_factor) {
            return Err("health.degraded_cap_factor must be within [0, 1]".into());
        }
        if self.health.cooldown_hours <= 0 {
            return Err("health.cooldown_hours must be greater than 0".into());
        }
        if self.compliance.freshness_days <= 0 {
            return Err("compliance.freshness_days must be greater than 0".into());
        }
        if self.connections.stale_request_days <= 0 {
            return Err("connections.stale_request_days must be greater than 0".into());
        }
        if self.assignment.release_hold_days < 0 {
            return Err("assignment.release_hold_days must not be negative".into());
        }
        if self.dispatch.max_concurrent == 0 || self.dispatch.batch_limit == 0 {
            return Err("dispatch limits must be greater than 0".into());
        }
        if self.dispatch.claim_lease_secs <= 0 {
            return Err("dispatch.claim_lease_secs must be greater than 0".into());
        }
        Ok(())
    }

    /// Parse configuration from a JSON string and validate.
    pub fn from_json_str(input: &str) -> Result<Self, String> {
        let cfg: Self = serde_json::from_str(input).map_err(|e| format!("parse error: {e}"))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Load from the file named by `OUTREACH_CONFIG` (a `.env` file is read
    /// first), or fall back to defaults when unset.
    pub fn load() -> AppResult<Self> {
        let _ = dotenvy::dotenv();
        let Ok(path) = std::env::var(CONFIG_PATH_ENV) else {
            tracing::info!("{CONFIG_PATH_ENV} unset, using default engine config");
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("reading engine config from {path}"))?;
        let cfg = Self::from_json_str(&raw).map_err(anyhow::Error::msg)?;
        tracing::info!("loaded engine config v{} from {}", cfg.version, path);
        Ok(cfg)
    }
}
