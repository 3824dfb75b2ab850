//! Integration tests for admission control
//!
//! Covers:
//! - Balance checks and the exact debit per accepted submission
//! - Rejections leaving no job and no ledger entry
//! - Tier resolution from the account store
//! - Queue position and ETA at submission and on later status reads
//! - Store failures abandoning the submission as a unit

mod support;

use std::sync::Barrier;
use std::thread;

use prometheus_credit_queue::core::{AuditAction, JobStatus, QueueError, StoreError};
use prometheus_credit_queue::infra::InMemoryAccountStore;
use prometheus_credit_queue::util::Tier;

use support::{harness, request, request_as, test_config};

// ============================================================================
// BALANCE
// ============================================================================

#[test]
fn test_fourth_submission_rejected_when_balance_runs_out() {
    let h = harness(
        test_config(),
        InMemoryAccountStore::new().with_account("alice", Tier::PaidLow, 10),
    );

    let mut balances = Vec::new();
    for n in 0..3 {
        h.service
            .submit(request("alice", "image", &format!("poster {n}")))
            .unwrap();
        balances.push(h.service.balance("alice").unwrap());
    }
    assert_eq!(balances, vec![7, 4, 1]);

    let err = h
        .service
        .submit(request("alice", "image", "poster 3"))
        .unwrap_err();
    assert_eq!(
        err,
        QueueError::InsufficientCredits {
            required: 3,
            available: 1
        }
    );
    assert_eq!(h.service.balance("alice").unwrap(), 1);
    assert_eq!(h.store.job_count(), 3);
    assert_eq!(h.service.ledger_history("alice").unwrap().len(), 3);
}

#[test]
fn test_exact_balance_is_enough() {
    let h = harness(
        test_config(),
        InMemoryAccountStore::new().with_account("bob", Tier::Free, 10),
    );
    h.service.submit(request("bob", "video", "trailer")).unwrap();
    assert_eq!(h.service.balance("bob").unwrap(), 0);
}

#[test]
fn test_debit_references_the_job() {
    let h = harness(
        test_config(),
        InMemoryAccountStore::new().with_account("alice", Tier::PaidMid, 20),
    );
    let admitted = h.service.submit(request("alice", "text", "haiku")).unwrap();
    let history = h.service.ledger_history("alice").unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].reference_id, admitted.queue_id);
    assert_eq!(history[0].amount, -1);
    assert_eq!(history[0].balance_after, 19);
}

// ============================================================================
// REJECTIONS
// ============================================================================

#[test]
fn test_unknown_generation_type_has_no_side_effects() {
    let h = harness(
        test_config(),
        InMemoryAccountStore::new().with_account("alice", Tier::PaidHigh, 10),
    );
    let err = h
        .service
        .submit(request("alice", "hologram", "a cube"))
        .unwrap_err();
    assert_eq!(err, QueueError::InvalidGenerationType("hologram".into()));
    assert!(err.is_rejection());
    assert_eq!(h.store.job_count(), 0);
    assert!(h.service.ledger_history("alice").unwrap().is_empty());
    assert_eq!(h.service.balance("alice").unwrap(), 10);
}

#[test]
fn test_generation_type_without_cost_is_rejected() {
    let mut config = test_config();
    config.costs.remove(&prometheus_credit_queue::util::GenerationType::Video);
    let h = harness(
        config,
        InMemoryAccountStore::new().with_account("alice", Tier::PaidHigh, 50),
    );
    let err = h.service.submit(request("alice", "video", "clip")).unwrap_err();
    assert_eq!(err, QueueError::InvalidGenerationType("video".into()));
    assert_eq!(h.store.job_count(), 0);
}

#[test]
fn test_unknown_user_without_tier_is_rejected() {
    let h = harness(test_config(), InMemoryAccountStore::new());
    let err = h.service.submit(request("ghost", "text", "hi")).unwrap_err();
    assert_eq!(err, QueueError::UnknownUser("ghost".into()));
    assert_eq!(h.store.job_count(), 0);
}

#[test]
fn test_explicit_tier_uses_default_balance() {
    let mut config = test_config();
    config.default_balance = 4;
    let h = harness(config, InMemoryAccountStore::new());
    h.service
        .submit(request_as("walk-in", Tier::Free, "image", "sketch"))
        .unwrap();
    assert_eq!(h.service.balance("walk-in").unwrap(), 1);
}

#[test]
fn test_rejections_and_admissions_are_audited() {
    let h = harness(
        test_config(),
        InMemoryAccountStore::new().with_account("alice", Tier::PaidLow, 3),
    );
    h.service.submit(request("alice", "image", "one")).unwrap();
    h.service.submit(request("alice", "image", "two")).unwrap_err();
    assert_eq!(
        h.audit_actions(),
        vec![AuditAction::Submitted, AuditAction::Rejected]
    );
}

// ============================================================================
// POSITION AND ETA
// ============================================================================

#[test]
fn test_position_respects_tier_and_fifo() {
    let accounts = InMemoryAccountStore::new()
        .with_account("free-user", Tier::Free, 100)
        .with_account("vip", Tier::PaidHigh, 100);
    let h = harness(test_config(), accounts);

    let first = h.service.submit(request("free-user", "text", "a")).unwrap();
    assert_eq!((first.position, first.total_in_queue), (1, 1));
    assert_eq!(first.estimated_wait_seconds, 60);

    h.clock.advance_ms(10);
    let second = h.service.submit(request("free-user", "text", "b")).unwrap();
    assert_eq!((second.position, second.total_in_queue), (2, 2));
    assert_eq!(second.estimated_wait_seconds, 120);

    h.clock.advance_ms(10);
    let paid = h.service.submit(request("vip", "text", "c")).unwrap();
    assert_eq!((paid.position, paid.total_in_queue), (1, 3));
    assert_eq!(paid.estimated_wait_seconds, 20);

    let status = h.service.get_status(first.queue_id).unwrap();
    assert_eq!(status.status, JobStatus::Pending);
    assert_eq!(status.position, Some(2));
    assert_eq!(status.estimated_wait_seconds, Some(120));
}

#[test]
fn test_same_instant_submissions_keep_arrival_order() {
    let h = harness(
        test_config(),
        InMemoryAccountStore::new().with_account("alice", Tier::PaidMid, 100),
    );
    let positions: Vec<usize> = (0..4)
        .map(|n| {
            h.service
                .submit(request("alice", "text", &format!("line {n}")))
                .unwrap()
                .position
        })
        .collect();
    assert_eq!(positions, vec![1, 2, 3, 4]);
}

#[test]
fn test_concurrent_submissions_never_overdraw() {
    let h = harness(
        test_config(),
        InMemoryAccountStore::new().with_account("alice", Tier::PaidLow, 10),
    );
    let barrier = Barrier::new(16);
    let admitted = thread::scope(|scope| {
        let handles: Vec<_> = (0..16)
            .map(|n| {
                let service = &h.service;
                let barrier = &barrier;
                scope.spawn(move || {
                    barrier.wait();
                    service.submit(request("alice", "image", &format!("race {n}")))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .filter(|result| match result {
                Ok(_) => true,
                Err(err) => {
                    assert!(matches!(err, QueueError::InsufficientCredits { .. }));
                    false
                }
            })
            .count()
    });

    assert_eq!(admitted, 3);
    assert_eq!(h.service.balance("alice").unwrap(), 1);
    assert_eq!(h.store.job_count(), 3);
    let report = h.service.reconcile("alice").unwrap();
    assert!(report.is_consistent());
    assert_eq!(report.entry_count, 3);
}

// ============================================================================
// INFRASTRUCTURE FAILURES
// ============================================================================

#[test]
fn test_store_failure_leaves_neither_job_nor_debit() {
    let h = harness(
        test_config(),
        InMemoryAccountStore::new().with_account("alice", Tier::PaidLow, 10),
    );
    h.store.fail_next_ledger_writes(1);
    let err = h.service.submit(request("alice", "image", "poster")).unwrap_err();
    assert!(matches!(err, QueueError::Store(StoreError::Unavailable(_))));
    assert!(!err.is_rejection());
    assert_eq!(h.store.job_count(), 0);
    assert_eq!(h.service.balance("alice").unwrap(), 10);

    h.service.submit(request("alice", "image", "poster")).unwrap();
    assert_eq!(h.store.job_count(), 1);
    assert_eq!(h.service.balance("alice").unwrap(), 7);
}
