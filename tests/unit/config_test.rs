//! Tests for configuration validation

use std::io::Write;

use outreach_engine::config::{EngineConfig, WarmupRamp, WeekendPolicy, CONFIG_PATH_ENV};
use outreach_engine::core::{Channel, ResourceType, Tier};

#[test]
fn test_default_config_is_valid() {
    assert!(EngineConfig::default().validate().is_ok());
}

#[test]
fn test_minimal_json_fills_defaults() {
    let cfg = EngineConfig::from_json_str(r#"{"version": 3}"#).unwrap();
    assert_eq!(cfg.version, 3);
    assert_eq!(cfg.channels.get(Channel::Email).daily_cap, 50);
    assert_eq!(cfg.compliance.freshness_days, 90);
    assert_eq!(cfg.connections.stale_request_days, 14);
    assert_eq!(cfg.tier_gates.get(Channel::Sms), Tier::Hot);
}

#[test]
fn test_tier_gates_are_configurable() {
    let cfg = EngineConfig::from_json_str(
        r#"{"version": 1,
            "tier_gates": {"email": "cold", "sms": "warm", "voice": "warm", "social": "cool"}}"#,
    )
    .unwrap();
    assert!(cfg.tier_gates.admits(Channel::Sms, Tier::Warm));
    assert!(!cfg.tier_gates.admits(Channel::Voice, Tier::Cool));
}

#[test]
fn test_invalid_version() {
    assert!(EngineConfig::from_json_str(r#"{"version": 0}"#).is_err());
}

#[test]
fn test_invalid_degraded_factor() {
    let err = EngineConfig::from_json_str(r#"{"version": 1, "health": {"degraded_cap_factor": 2.0}}"#)
        .unwrap_err();
    assert!(err.contains("degraded_cap_factor"));
}

#[test]
fn test_decreasing_ramp_rejected() {
    let mut cfg = EngineConfig::default();
    cfg.warmup.domain = WarmupRamp::from_pairs(&[(0, 20), (7, 10)]);
    assert!(cfg.validate().is_err());
}

#[test]
fn test_weekly_cap_below_daily_rejected() {
    let mut cfg = EngineConfig::default();
    cfg.channels.sms.weekly_cap = cfg.channels.sms.daily_cap - 1;
    assert!(cfg.validate().is_err());
}

#[test]
fn test_saturday_probability_bounds() {
    let mut cfg = EngineConfig::default();
    cfg.channels.social.weekend = WeekendPolicy::ReducedSaturday {
        probability: 1.5,
        cap_multiplier: 0.5,
    };
    assert!(cfg.validate().is_err());
}

#[test]
fn test_warmup_is_monotonic() {
    let cfg = EngineConfig::default();
    for resource_type in [ResourceType::Domain, ResourceType::PhoneNumber, ResourceType::Seat] {
        let ramp = cfg.warmup.get(resource_type);
        let caps: Vec<u32> = (0..60).map(|day| ramp.cap_for_day(day)).collect();
        assert!(caps.windows(2).all(|w| w[0] <= w[1]), "{resource_type:?}");
    }
}

#[test]
fn test_load_from_env_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("engine.json");
    let mut file = std::fs::File::create(&path).unwrap();
    write!(file, r#"{{"version": 7}}"#).unwrap();

    std::env::set_var(CONFIG_PATH_ENV, &path);
    let cfg = EngineConfig::load();
    std::env::remove_var(CONFIG_PATH_ENV);
    assert_eq!(cfg.unwrap().version, 7);
}

#[test]
fn test_round_trip_json() {
    let cfg = EngineConfig::default();
    let json = serde_json::to_string(&cfg).unwrap();
    assert_eq!(EngineConfig::from_json_str(&json).unwrap(), cfg);
}

#[test]
fn test_claim_lease_defaults_and_validates() {
    let cfg = EngineConfig::from_json_str(r#"{"version": 1, "dispatch": {"batch_limit": 20}}"#)
        .unwrap();
    assert_eq!(cfg.dispatch.batch_limit, 20);
    assert_eq!(cfg.dispatch.claim_lease_secs, 600);
    assert!(EngineConfig::from_json_str(
        r#"{"version": 1, "dispatch": {"claim_lease_secs": 0}}"#
    )
    .is_err());
}
