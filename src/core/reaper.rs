//! Stale job reaper.
//!
//! A worker that crashes mid-job leaves its claim behind in `processing`.
//! The reaper finds claims older than the staleness horizon and settles them:
//! refund and fail by default, or put them back in the queue under the
//! requeue policy while attempts remain. Every settlement is conditional on
//! the stale claim still being held, so a job is reaped at most once.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::ReclaimPolicy;
use crate::core::audit::{AuditAction, AuditTrail};
use crate::core::error::QueueError;
use crate::core::job::Job;
use crate::core::ledger::CreditLedger;
use crate::core::store::QueueStore;
use crate::util::clock::Clock;

/// Outcome of one reaper pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReapReport {
    /// Stale jobs refunded and failed.
    pub failed: usize,
    /// Stale jobs returned to `pending`.
    pub requeued: usize,
    /// Stale jobs left for the next pass after a store error.
    pub deferred: usize,
}

impl ReapReport {
    /// Jobs this pass took out of `processing`.
    pub const fn reclaimed(&self) -> usize {
        self.failed + self.requeued
    }
}

enum Reclaim {
    Failed,
    Requeued,
    /// Someone else settled the job between the scan and the write.
    Lost,
}

/// Reclaims jobs stuck in `processing`.
pub struct StaleJobReaper<S: ?Sized> {
    store: Arc<S>,
    ledger: CreditLedger<S>,
    policy: ReclaimPolicy,
    max_attempts: u32,
    clock: Arc<dyn Clock>,
    audit: AuditTrail,
}

impl<S: ?Sized> Clone for StaleJobReaper<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            ledger: self.ledger.clone(),
            policy: self.policy,
            max_attempts: self.max_attempts,
            clock: Arc::clone(&self.clock),
            audit: self.audit.clone(),
        }
    }
}

impl<S> StaleJobReaper<S>
where
    S: QueueStore + ?Sized,
{
    /// Create a reaper.
    pub fn new(
        store: Arc<S>,
        ledger: CreditLedger<S>,
        policy: ReclaimPolicy,
        max_attempts: u32,
        clock: Arc<dyn Clock>,
        audit: AuditTrail,
    ) -> Self {
        Self {
            store,
            ledger,
            policy,
            max_attempts,
            clock,
            audit,
        }
    }

    /// Settle every job whose claim is older than `max_age`.
    pub fn cleanup_stale(&self, max_age: Duration) -> Result<ReapReport, QueueError> {
        let now_ms = self.clock.now_ms();
        let cutoff_ms = now_ms.saturating_sub(max_age.as_millis());
        let stale = self.store.processing_started_before(cutoff_ms)?;
        let mut report = ReapReport::default();
        for job in stale {
            let Some(worker_id) = job.claimed_by.clone() else {
                continue;
            };
            match self.reclaim(&job, &worker_id, max_age) {
                Ok(Reclaim::Failed) => report.failed += 1,
                Ok(Reclaim::Requeued) => report.requeued += 1,
                Ok(Reclaim::Lost) => {
                    debug!(job_id = %job.id, "stale job settled elsewhere");
                }
                Err(err) => {
                    warn!(job_id = %job.id, error = %err, "could not reclaim stale job, retrying next pass");
                    report.deferred += 1;
                }
            }
        }
        if report.reclaimed() > 0 || report.deferred > 0 {
            info!(
                failed = report.failed,
                requeued = report.requeued,
                deferred = report.deferred,
                "stale jobs reclaimed"
            );
        }
        Ok(report)
    }

    fn reclaim(&self, job: &Job, worker_id: &str, max_age: Duration) -> Result<Reclaim, QueueError> {
        if self.policy == ReclaimPolicy::Requeue && job.attempts < self.max_attempts {
            if !self.store.requeue(job.id, worker_id)? {
                return Ok(Reclaim::Lost);
            }
            self.audit.record(
                Some(job.id),
                &job.user_id,
                AuditAction::Requeued,
                Some(format!("attempt {} of {}", job.attempts, self.max_attempts)),
            );
            return Ok(Reclaim::Requeued);
        }

        let reason = format!(
            "job timed out: no result after {}s in processing",
            max_age.as_secs()
        );
        match self.ledger.settle_failure(job, worker_id, &reason)? {
            Some(_) => {
                self.audit
                    .record(Some(job.id), &job.user_id, AuditAction::Reaped, Some(reason));
                self.audit.record(
                    Some(job.id),
                    &job.user_id,
                    AuditAction::Refunded,
                    Some(job.credit_cost.to_string()),
                );
                Ok(Reclaim::Failed)
            }
            None => Ok(Reclaim::Lost),
        }
    }
}
