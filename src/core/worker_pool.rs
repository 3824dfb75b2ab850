//! Batch job processor.
//!
//! One processing pass reclaims stale claims, picks the next batch in
//! scheduling order and runs every job of the batch concurrently. Each job is
//! claimed with a compare-and-swap before the backend is called, so any
//! number of passes may run at the same time without executing a job twice.
//!
//! # Failure handling
//!
//! - Backend error or timeout: the job is failed and its cost refunded in one
//!   store write, retried with linear backoff.
//! - Refund retries exhausted: the job stays in `processing` and the reaper
//!   settles it once the claim goes stale.
//! - Lost claim (reaped while running): the result is dropped.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::config::ServiceConfig;
use crate::core::audit::{AuditAction, AuditTrail};
use crate::core::error::{GenerationError, QueueError};
use crate::core::executor::{GenerationOutput, GenerationRequest, GenerationService};
use crate::core::job::Job;
use crate::core::ledger::CreditLedger;
use crate::core::reaper::StaleJobReaper;
use crate::core::scheduler::PriorityScheduler;
use crate::core::store::QueueStore;
use crate::util::clock::Clock;

/// Tunables of a processing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerSettings {
    /// Deadline for one generation call.
    pub generation_timeout: Duration,
    /// Attempts at writing the failure and refund.
    pub refund_retry_attempts: u32,
    /// Backoff unit between refund attempts.
    pub refund_retry_backoff: Duration,
    /// Claim age after which the reaper reclaims a job.
    pub stale_after: Duration,
}

impl WorkerSettings {
    /// Settings taken from a service config.
    pub const fn from_config(config: &ServiceConfig) -> Self {
        Self {
            generation_timeout: config.generation_timeout(),
            refund_retry_attempts: config.worker.refund_retry_attempts,
            refund_retry_backoff: Duration::from_millis(config.worker.refund_retry_backoff_ms),
            stale_after: config.stale_after(),
        }
    }
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self::from_config(&ServiceConfig::default())
    }
}

/// Counters of one processing pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReport {
    /// Jobs this pass claimed.
    pub processed: usize,
    /// Jobs completed.
    pub successful: usize,
    /// Jobs failed and refunded.
    pub failed: usize,
    /// Candidates another pass claimed first.
    pub skipped: usize,
    /// Claimed jobs left in `processing` for the reaper.
    pub abandoned: usize,
    /// Stale jobs reclaimed before the batch was picked.
    pub reclaimed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    Failed,
    Skipped,
    Abandoned,
}

struct Inner<S: ?Sized, G: ?Sized> {
    store: Arc<S>,
    ledger: CreditLedger<S>,
    scheduler: PriorityScheduler<S>,
    reaper: StaleJobReaper<S>,
    generator: Arc<G>,
    settings: WorkerSettings,
    clock: Arc<dyn Clock>,
    audit: AuditTrail,
}

/// Claims pending jobs and drives them through the generation backend.
pub struct JobProcessor<S: ?Sized, G: ?Sized> {
    inner: Arc<Inner<S, G>>,
}

impl<S: ?Sized, G: ?Sized> Clone for JobProcessor<S, G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, G> JobProcessor<S, G>
where
    S: QueueStore + ?Sized + 'static,
    G: GenerationService + ?Sized,
{
    /// Create a processor.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<S>,
        ledger: CreditLedger<S>,
        scheduler: PriorityScheduler<S>,
        reaper: StaleJobReaper<S>,
        generator: Arc<G>,
        settings: WorkerSettings,
        clock: Arc<dyn Clock>,
        audit: AuditTrail,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                store,
                ledger,
                scheduler,
                reaper,
                generator,
                settings,
                clock,
                audit,
            }),
        }
    }

    /// Settings in use.
    pub fn settings(&self) -> WorkerSettings {
        self.inner.settings
    }

    /// Reaper run at the start of every pass.
    pub fn reaper(&self) -> &StaleJobReaper<S> {
        &self.inner.reaper
    }

    /// Run one pass over at most `batch_size` pending jobs.
    pub async fn process_batch(&self, batch_size: usize) -> Result<BatchReport, QueueError> {
        let mut report = BatchReport::default();
        match self.inner.reaper.cleanup_stale(self.inner.settings.stale_after) {
            Ok(reaped) => report.reclaimed = reaped.reclaimed(),
            Err(err) => warn!(error = %err, "stale job scan failed"),
        }

        let candidates = self.inner.scheduler.next_batch(batch_size)?;
        if candidates.is_empty() {
            return Ok(report);
        }

        let worker_id = format!("worker-{}", uuid::Uuid::new_v4());
        let span = info_span!("process_batch", worker_id = %worker_id, candidates = candidates.len());
        let mut tasks = JoinSet::new();
        for job in candidates {
            let this = self.clone();
            let worker_id = worker_id.clone();
            tasks.spawn(async move { this.run_job(job, &worker_id).await }.instrument(span.clone()));
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Outcome::Completed) => {
                    report.processed += 1;
                    report.successful += 1;
                }
                Ok(Outcome::Failed) => {
                    report.processed += 1;
                    report.failed += 1;
                }
                Ok(Outcome::Skipped) => report.skipped += 1,
                Ok(Outcome::Abandoned) => {
                    report.processed += 1;
                    report.abandoned += 1;
                }
                Err(err) => {
                    error!(worker_id = %worker_id, error = %err, "job task aborted");
                    report.processed += 1;
                    report.abandoned += 1;
                }
            }
        }

        info!(
            worker_id = %worker_id,
            processed = report.processed,
            successful = report.successful,
            failed = report.failed,
            skipped = report.skipped,
            abandoned = report.abandoned,
            "batch processed"
        );
        Ok(report)
    }

    async fn run_job(&self, job: Job, worker_id: &str) -> Outcome {
        let inner = &self.inner;
        let job = match inner.store.claim(job.id, worker_id, inner.clock.now_ms()) {
            Ok(Some(claimed)) => claimed,
            Ok(None) => {
                debug!(job_id = %job.id, "job already claimed");
                return Outcome::Skipped;
            }
            Err(err) => {
                warn!(job_id = %job.id, error = %err, "claim failed");
                return Outcome::Skipped;
            }
        };
        debug!(job_id = %job.id, tier = %job.user_tier, attempt = job.attempts, "job claimed");
        inner.audit.record(
            Some(job.id),
            &job.user_id,
            AuditAction::Claimed,
            Some(worker_id.to_string()),
        );

        let timeout = inner.settings.generation_timeout;
        let generated = tokio::time::timeout(timeout, inner.generator.generate(GenerationRequest::from(&job)))
            .await
            .unwrap_or(Err(GenerationError::Timeout(timeout)));

        match generated {
            Ok(output) => self.complete(&job, worker_id, output),
            Err(err) => self.fail(&job, worker_id, &err.to_string()).await,
        }
    }

    fn complete(&self, job: &Job, worker_id: &str, output: GenerationOutput) -> Outcome {
        let inner = &self.inner;
        let result_ref = output.result_ref;
        match inner
            .store
            .complete(job.id, worker_id, result_ref.clone(), inner.clock.now_ms())
        {
            Ok(true) => {
                info!(job_id = %job.id, user_id = %job.user_id, result_ref = %result_ref, "job completed");
                inner
                    .audit
                    .record(Some(job.id), &job.user_id, AuditAction::Completed, Some(result_ref));
                Outcome::Completed
            }
            Ok(false) => {
                warn!(job_id = %job.id, "claim lost before completion, result dropped");
                Outcome::Abandoned
            }
            Err(err) => {
                error!(job_id = %job.id, error = %err, "completion write failed, leaving job for the reaper");
                Outcome::Abandoned
            }
        }
    }

    async fn fail(&self, job: &Job, worker_id: &str, reason: &str) -> Outcome {
        let inner = &self.inner;
        warn!(job_id = %job.id, user_id = %job.user_id, reason, "generation failed");
        let attempts = inner.settings.refund_retry_attempts.max(1);
        for attempt in 1..=attempts {
            match inner.ledger.settle_failure(job, worker_id, reason) {
                Ok(Some(_)) => {
                    inner.audit.record(
                        Some(job.id),
                        &job.user_id,
                        AuditAction::Failed,
                        Some(reason.to_string()),
                    );
                    inner.audit.record(
                        Some(job.id),
                        &job.user_id,
                        AuditAction::Refunded,
                        Some(job.credit_cost.to_string()),
                    );
                    return Outcome::Failed;
                }
                Ok(None) => {
                    warn!(job_id = %job.id, "claim lost before failure was recorded");
                    return Outcome::Abandoned;
                }
                Err(err) => {
                    warn!(job_id = %job.id, attempt, error = %err, "refund write failed");
                    if attempt < attempts {
                        tokio::time::sleep(inner.settings.refund_retry_backoff * attempt).await;
                    }
                }
            }
        }
        error!(job_id = %job.id, attempts, "refund retries exhausted, leaving job for the reaper");
        Outcome::Abandoned
    }
}
