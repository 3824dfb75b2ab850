//! Audit sink implementations.
//!
//! Every admission decision and job transition is recorded as an
//! [`AuditEvent`]. The in-memory sink keeps a bounded window for tests and
//! dashboards; durable sinks implement [`AuditSink`] against their store.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::util::clock::{Clock, SystemClock};
use crate::util::serde::JobId;

/// Action recorded by an audit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    /// Job admitted and debited.
    Submitted,
    /// Submission refused.
    Rejected,
    /// Job claimed by a worker pass.
    Claimed,
    /// Generation succeeded.
    Completed,
    /// Job failed.
    Failed,
    /// Cost credited back.
    Refunded,
    /// Stale job failed by the reaper.
    Reaped,
    /// Stale job returned to the queue by the reaper.
    Requeued,
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Submitted => "submitted",
            Self::Rejected => "rejected",
            Self::Claimed => "claimed",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Refunded => "refunded",
            Self::Reaped => "reaped",
            Self::Requeued => "requeued",
        };
        f.write_str(name)
    }
}

/// Audit event structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    /// Event identifier.
    pub event_id: String,
    /// Related job, absent for rejected submissions.
    pub job_id: Option<JobId>,
    /// User the event concerns.
    pub user_id: String,
    /// Action taken.
    pub action: AuditAction,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context.
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// In-memory audit sink for testing and dev.
pub struct InMemoryAuditSink {
    events: VecDeque<AuditEvent>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    pub fn new(max_events: usize) -> Self {
        Self {
            events: VecDeque::with_capacity(max_events.min(1024)),
            max_events,
        }
    }

    /// Retrieve a snapshot of stored events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        if self.max_events == 0 {
            return;
        }
        if self.events.len() >= self.max_events {
            self.events.pop_front();
        }
        self.events.push_back(event);
    }
}

/// Lets a caller keep a handle on a sink it hands to an [`AuditTrail`].
impl<T: AuditSink> AuditSink for Arc<Mutex<T>> {
    fn record(&mut self, event: AuditEvent) {
        self.lock().record(event);
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    job_id: Option<JobId>,
    user_id: impl Into<String>,
    action: AuditAction,
    detail: Option<String>,
    created_at_ms: u128,
) -> AuditEvent {
    AuditEvent {
        event_id: uuid::Uuid::new_v4().to_string(),
        job_id,
        user_id: user_id.into(),
        action,
        created_at_ms,
        detail,
    }
}

/// Shared handle to an optional sink; recording is a no-op without one.
///
/// Events are stamped from the trail's clock, the system clock unless
/// [`AuditTrail::with_clock`] installs another.
#[derive(Clone)]
pub struct AuditTrail {
    sink: Option<Arc<Mutex<Box<dyn AuditSink>>>>,
    clock: Arc<dyn Clock>,
}

impl Default for AuditTrail {
    fn default() -> Self {
        Self::disabled()
    }
}

impl AuditTrail {
    /// Trail that discards events.
    pub fn disabled() -> Self {
        Self {
            sink: None,
            clock: Arc::new(SystemClock),
        }
    }

    /// Trail writing to `sink`.
    pub fn new(sink: Box<dyn AuditSink>) -> Self {
        Self::shared(Arc::new(Mutex::new(sink)))
    }

    /// Trail writing to an already shared sink.
    pub fn shared(sink: Arc<Mutex<Box<dyn AuditSink>>>) -> Self {
        Self {
            sink: Some(sink),
            clock: Arc::new(SystemClock),
        }
    }

    /// Stamp events from `clock`.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Record one event.
    pub fn record(
        &self,
        job_id: Option<JobId>,
        user_id: &str,
        action: AuditAction,
        detail: Option<String>,
    ) {
        if let Some(sink) = self.sink.as_ref() {
            let event = build_audit_event(job_id, user_id, action, detail, self.clock.now_ms());
            sink.lock().record(event);
        }
    }
}

impl fmt::Debug for AuditTrail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditTrail")
            .field("enabled", &self.sink.is_some())
            .finish()
    }
}
