//! Tests for error types

use std::time::Duration;

use prometheus_credit_queue::core::{GenerationError, LedgerError, QueueError, StoreError};

#[test]
fn test_insufficient_credits_message() {
    let err = QueueError::InsufficientCredits {
        required: 3,
        available: 1,
    };
    assert_eq!(format!("{}", err), "insufficient credits: required 3, available 1");
}

#[test]
fn test_ledger_shortfall_becomes_insufficient_credits() {
    let err: QueueError = LedgerError::InsufficientFunds {
        required: 10,
        available: 4,
    }
    .into();
    assert_eq!(
        err,
        QueueError::InsufficientCredits {
            required: 10,
            available: 4
        }
    );
}

#[test]
fn test_store_errors_pass_through() {
    let err: QueueError = LedgerError::Store(StoreError::Unavailable("db down".into())).into();
    assert_eq!(format!("{}", err), "store unavailable: db down");
    assert!(!err.is_rejection());
}

#[test]
fn test_rejection_classification() {
    assert!(QueueError::InvalidGenerationType("gif".into()).is_rejection());
    assert!(QueueError::UnknownUser("ghost".into()).is_rejection());
    assert!(!QueueError::InvalidConfig("x".into()).is_rejection());
    assert!(!QueueError::InvalidAmount(0).is_rejection());
}

#[test]
fn test_generation_timeout_message() {
    let err = GenerationError::Timeout(Duration::from_secs(120));
    assert_eq!(format!("{}", err), "generation timed out after 120s");
}

#[test]
fn test_backend_error_message() {
    let err = GenerationError::Backend("connection failed".to_string());
    assert_eq!(format!("{}", err), "generation failed: connection failed");
}

#[test]
fn test_refund_mismatches_become_refund_rejected() {
    let err: QueueError = LedgerError::RefundExceedsDebit {
        requested: 5,
        debited: 3,
    }
    .into();
    assert_eq!(
        err,
        QueueError::RefundRejected("refund of 5 exceeds debit of 3".into())
    );
    assert!(!err.is_rejection());
}
