//! Service facade and the API-facing request/response models.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::ServiceConfig;
use crate::core::accounts::AccountStore;
use crate::core::admission::{AdmissionController, SubmitRequest};
use crate::core::audit::{AuditAction, AuditTrail};
use crate::core::error::QueueError;
use crate::core::executor::GenerationService;
use crate::core::job::{Job, JobStatus, TierCounts};
use crate::core::ledger::{CreditLedger, LedgerEntry, Reconciliation};
use crate::core::reaper::{ReapReport, StaleJobReaper};
use crate::core::scheduler::PriorityScheduler;
use crate::core::store::QueueStore;
use crate::core::worker_pool::{BatchReport, JobProcessor, WorkerSettings};
use crate::runtime::tokio_spawner::TokioSpawner;
use crate::util::clock::Clock;
use crate::util::serde::{Credits, JobId, Tier, UserId};

/// Submission payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRequest {
    /// Requesting user.
    pub user_id: UserId,
    /// Tier of the user; looked up in the account store when absent.
    #[serde(default)]
    pub user_tier: Option<Tier>,
    /// Generation type tag (`text`, `image`, `video`).
    pub generation_type: String,
    /// Prompt text.
    pub prompt: String,
    /// Backend parameters.
    #[serde(default)]
    pub input_params: serde_json::Value,
    /// Optional project context.
    #[serde(default)]
    pub project_context: Option<serde_json::Value>,
}

/// Accepted submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitResponse {
    /// Id of the queued job.
    pub queue_id: JobId,
    /// 1-based queue position.
    pub position: usize,
    /// Pending jobs at submission.
    pub total_in_queue: usize,
    /// `position * average processing time` of the tier.
    pub estimated_wait_seconds: u64,
}

/// Job status response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusResponse {
    /// Job identifier.
    pub job_id: JobId,
    /// Current status.
    pub status: JobStatus,
    /// Live position while pending.
    pub position: Option<usize>,
    /// Live ETA while pending.
    pub estimated_wait_seconds: Option<u64>,
    /// Result reference once completed.
    pub result_ref: Option<String>,
    /// Failure reason once failed.
    pub error_message: Option<String>,
}

/// Queue counters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Pending jobs over all tiers.
    pub total_pending: usize,
    /// Processing jobs over all tiers.
    pub total_processing: usize,
    /// Counts per tier, every tier present.
    pub per_tier: BTreeMap<Tier, TierCounts>,
}

struct ServiceInner<S: ?Sized, G: ?Sized> {
    config: ServiceConfig,
    store: Arc<S>,
    accounts: Arc<dyn AccountStore>,
    ledger: CreditLedger<S>,
    scheduler: PriorityScheduler<S>,
    admission: AdmissionController<S>,
    processor: JobProcessor<S, G>,
    spawner: Option<TokioSpawner>,
    audit: AuditTrail,
}

/// Entry point of the queue: admission, status, stats and processing.
///
/// Cheap to clone; clones share all state.
pub struct QueueService<S: ?Sized, G: ?Sized> {
    inner: Arc<ServiceInner<S, G>>,
}

impl<S: ?Sized, G: ?Sized> Clone for QueueService<S, G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, G> QueueService<S, G>
where
    S: QueueStore + ?Sized + 'static,
    G: GenerationService + ?Sized,
{
    /// Wire the components. The config is expected to be validated.
    pub(crate) fn assemble(
        config: ServiceConfig,
        store: Arc<S>,
        accounts: Arc<dyn AccountStore>,
        generator: Arc<G>,
        clock: Arc<dyn Clock>,
        audit: AuditTrail,
        spawner: Option<TokioSpawner>,
    ) -> Self {
        let audit = audit.with_clock(Arc::clone(&clock));
        let ledger = CreditLedger::new(
            Arc::clone(&store),
            Arc::clone(&accounts),
            config.default_balance,
            Arc::clone(&clock),
        );
        let scheduler = PriorityScheduler::new(
            Arc::clone(&store),
            config.scheduler.order(),
            config.tiers.clone(),
            Arc::clone(&clock),
        );
        let admission = AdmissionController::new(
            Arc::clone(&store),
            ledger.clone(),
            scheduler.clone(),
            config.tiers.clone(),
            config.costs.clone(),
            Arc::clone(&clock),
            audit.clone(),
        );
        let reaper = StaleJobReaper::new(
            Arc::clone(&store),
            ledger.clone(),
            config.reaper.policy,
            config.reaper.max_attempts,
            Arc::clone(&clock),
            audit.clone(),
        );
        let processor = JobProcessor::new(
            Arc::clone(&store),
            ledger.clone(),
            scheduler.clone(),
            reaper,
            generator,
            WorkerSettings::from_config(&config),
            clock,
            audit.clone(),
        );
        Self {
            inner: Arc::new(ServiceInner {
                config,
                store,
                accounts,
                ledger,
                scheduler,
                admission,
                processor,
                spawner,
                audit,
            }),
        }
    }

    /// Active configuration.
    pub fn config(&self) -> &ServiceConfig {
        &self.inner.config
    }

    /// Ledger used for debits and refunds.
    pub fn ledger(&self) -> &CreditLedger<S> {
        &self.inner.ledger
    }

    /// Batch processor behind [`Self::trigger_processing`].
    pub fn processor(&self) -> &JobProcessor<S, G> {
        &self.inner.processor
    }

    /// Admit a generation request.
    ///
    /// Rejections (`InsufficientCredits`, `InvalidGenerationType`,
    /// `UnknownUser`) leave no job and no ledger entry behind.
    pub fn submit(&self, request: SubmissionRequest) -> Result<SubmitResponse, QueueError> {
        let inner = &self.inner;
        let tier = request
            .user_tier
            .or_else(|| inner.accounts.account(&request.user_id).map(|a| a.tier));
        let Some(user_tier) = tier else {
            info!(user_id = %request.user_id, "submission rejected: unknown user");
            inner.audit.record(
                None,
                &request.user_id,
                AuditAction::Rejected,
                Some("unknown user".into()),
            );
            return Err(QueueError::UnknownUser(request.user_id));
        };

        let admission = inner.admission.submit(SubmitRequest {
            user_id: request.user_id,
            user_tier,
            generation_type: request.generation_type,
            prompt: request.prompt,
            input_params: request.input_params,
            project_context: request.project_context,
        })?;

        if inner.config.worker.kick_on_submit {
            self.kick();
        }
        Ok(SubmitResponse {
            queue_id: admission.queue_id,
            position: admission.position,
            total_in_queue: admission.total_in_queue,
            estimated_wait_seconds: admission.estimated_wait_seconds,
        })
    }

    /// Current status of a job, with live position while it is pending.
    pub fn get_status(&self, job_id: JobId) -> Result<JobStatusResponse, QueueError> {
        let job = self
            .inner
            .store
            .get(job_id)?
            .ok_or(QueueError::JobNotFound(job_id))?;
        let placement = self.inner.scheduler.position(&job)?;
        Ok(JobStatusResponse {
            job_id,
            status: job.status,
            position: placement.map(|p| p.position),
            estimated_wait_seconds: placement.map(|p| p.estimated_wait_seconds),
            result_ref: job.result_ref,
            error_message: job.error_message,
        })
    }

    /// Pending and processing counts, overall and per tier.
    pub fn get_stats(&self) -> Result<QueueStats, QueueError> {
        let counts = self.inner.store.active_counts()?;
        let per_tier: BTreeMap<Tier, TierCounts> = Tier::ALL
            .iter()
            .map(|tier| (*tier, counts.get(tier).copied().unwrap_or_default()))
            .collect();
        Ok(QueueStats {
            total_pending: per_tier.values().map(|c| c.pending).sum(),
            total_processing: per_tier.values().map(|c| c.processing).sum(),
            per_tier,
        })
    }

    /// Run one processing pass; `None` uses the configured batch size.
    ///
    /// Safe to call repeatedly and concurrently.
    pub async fn trigger_processing(&self, batch_size: Option<usize>) -> Result<BatchReport, QueueError> {
        let batch_size = batch_size.unwrap_or(self.inner.config.worker.batch_size);
        self.inner.processor.process_batch(batch_size).await
    }

    /// Reclaim stale `processing` jobs using the configured horizon.
    pub fn cleanup_stale(&self) -> Result<ReapReport, QueueError> {
        self.inner
            .processor
            .reaper()
            .cleanup_stale(self.inner.config.stale_after())
    }

    /// Current balance of a user.
    pub fn balance(&self, user_id: &str) -> Result<Credits, QueueError> {
        Ok(self.inner.ledger.get_balance(user_id)?)
    }

    /// A user's ledger entries, oldest first.
    pub fn ledger_history(&self, user_id: &str) -> Result<Vec<LedgerEntry>, QueueError> {
        Ok(self.inner.ledger.history(user_id)?)
    }

    /// Replay a user's ledger chain.
    pub fn reconcile(&self, user_id: &str) -> Result<Reconciliation, QueueError> {
        Ok(self.inner.ledger.reconcile(user_id)?)
    }

    /// A user's jobs, newest first.
    pub fn jobs_for_user(&self, user_id: &str) -> Result<Vec<Job>, QueueError> {
        Ok(self.inner.store.jobs_for_user(user_id)?)
    }

    fn kick(&self) {
        let Some(spawner) = self.inner.spawner.as_ref() else {
            return;
        };
        let processor = self.inner.processor.clone();
        let batch_size = self.inner.config.worker.batch_size;
        spawner.spawn(async move {
            if let Err(err) = processor.process_batch(batch_size).await {
                warn!(error = %err, "opportunistic processing pass failed");
            }
        });
    }
}
