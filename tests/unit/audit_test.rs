//! Tests for audit sink

use std::sync::Arc;

use parking_lot::Mutex;
use prometheus_credit_queue::core::{
    build_audit_event, AuditAction, AuditSink, AuditTrail, InMemoryAuditSink,
};
use prometheus_credit_queue::util::{JobId, ManualClock};

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);
    let job = JobId::new_v4();

    sink.record(build_audit_event(
        Some(job),
        "alice",
        AuditAction::Submitted,
        Some("image cost=3".to_string()),
        1_000,
    ));

    let events = sink.events();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].job_id, Some(job));
    assert_eq!(events[0].user_id, "alice");
    assert_eq!(events[0].action, AuditAction::Submitted);
    assert_eq!(events[0].detail.as_deref(), Some("image cost=3"));
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);

    sink.record(build_audit_event(None, "a", AuditAction::Rejected, None, 1));
    sink.record(build_audit_event(None, "b", AuditAction::Rejected, None, 1));
    sink.record(build_audit_event(None, "c", AuditAction::Rejected, None, 1));

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].user_id, "b"); // First one popped
    assert_eq!(events[1].user_id, "c");
}

#[test]
fn test_zero_capacity_sink_drops_everything() {
    let mut sink = InMemoryAuditSink::new(0);
    sink.record(build_audit_event(None, "a", AuditAction::Claimed, None, 1));
    assert!(sink.events().is_empty());
}

#[test]
fn test_build_audit_event_has_unique_ids() {
    let first = build_audit_event(None, "a", AuditAction::Completed, None, 5);
    let second = build_audit_event(None, "a", AuditAction::Completed, None, 5);
    assert_ne!(first.event_id, second.event_id);
    assert_eq!(first.created_at_ms, 5);
}

#[test]
fn test_trail_writes_through_shared_handle() {
    let sink = Arc::new(Mutex::new(InMemoryAuditSink::new(10)));
    let trail = AuditTrail::new(Box::new(Arc::clone(&sink)));
    let copy = trail.clone();

    trail.record(None, "alice", AuditAction::Reaped, None);
    copy.record(None, "alice", AuditAction::Refunded, Some("3".into()));

    let actions: Vec<_> = sink.lock().events().iter().map(|e| e.action).collect();
    assert_eq!(actions, vec![AuditAction::Reaped, AuditAction::Refunded]);
}

#[test]
fn test_trail_stamps_events_from_its_clock() {
    let sink = Arc::new(Mutex::new(InMemoryAuditSink::new(10)));
    let clock = ManualClock::new(42_000);
    let trail = AuditTrail::new(Box::new(Arc::clone(&sink))).with_clock(Arc::new(clock.clone()));

    trail.record(None, "alice", AuditAction::Submitted, None);
    clock.advance_secs(3);
    trail.record(None, "alice", AuditAction::Claimed, None);

    let stamps: Vec<_> = sink.lock().events().iter().map(|e| e.created_at_ms).collect();
    assert_eq!(stamps, vec![42_000, 45_000]);
}

#[test]
fn test_disabled_trail_is_a_no_op() {
    let trail = AuditTrail::disabled();
    trail.record(None, "alice", AuditAction::Submitted, None);
    assert_eq!(format!("{trail:?}"), "AuditTrail { enabled: false }");
}

#[test]
fn test_action_names() {
    assert_eq!(AuditAction::Requeued.to_string(), "requeued");
    assert_eq!(
        serde_json::to_string(&AuditAction::Refunded).unwrap(),
        "\"refunded\""
    );
}
