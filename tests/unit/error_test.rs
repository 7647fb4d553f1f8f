//! Tests for error types and reason codes

use outreach_engine::core::{EngineError, ReasonCode, ResourceStatus};

#[test]
fn test_unknown_resource_error() {
    let err = EngineError::UnknownResource("d1".into());
    assert_eq!(format!("{}", err), "unknown resource: d1");
}

#[test]
fn test_invalid_transition_error() {
    let err = EngineError::InvalidTransition {
        resource: "p1".into(),
        from: ResourceStatus::Restricted,
        to: ResourceStatus::Active,
    };
    assert_eq!(
        format!("{}", err),
        "invalid transition for p1: Restricted -> Active"
    );
}

#[test]
fn test_backend_error() {
    let err = EngineError::Backend("connection failed".to_string());
    assert_eq!(format!("{}", err), "backend error: connection failed");
}

#[test]
fn test_io_error_converts() {
    let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
    let err: EngineError = io.into();
    assert!(matches!(err, EngineError::Io(_)));
}

#[test]
fn test_reason_code_retryable() {
    assert!(ReasonCode::CapacityExceeded.is_retryable());
    assert!(ReasonCode::NoCapacity.is_retryable());
    assert!(ReasonCode::TransientDispatchError.is_retryable());
    assert!(!ReasonCode::ComplianceBlocked.is_retryable());
    assert!(!ReasonCode::ResourceRestricted.is_retryable());
    assert!(!ReasonCode::TierBelowGate.is_retryable());
}

#[test]
fn test_reason_code_string_matches_serde() {
    for code in [
        ReasonCode::MissingContact,
        ReasonCode::LeadUnsubscribed,
        ReasonCode::RetriesExhausted,
        ReasonCode::StaleRequest,
    ] {
        let json = serde_json::to_string(&code).unwrap();
        assert_eq!(json, format!("\"{}\"", code.as_str()));
    }
}
