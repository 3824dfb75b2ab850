//! Admission control: price a request, debit it and enqueue it as one unit.
//!
//! Admission never waits on the generation backend. It only decides whether
//! the request may enter the queue and reports where it landed.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{CostTable, TierTable};
use crate::core::audit::{AuditAction, AuditTrail};
use crate::core::error::QueueError;
use crate::core::job::{Job, NewJob};
use crate::core::ledger::{CreditLedger, ReferenceKind};
use crate::core::scheduler::{PriorityScheduler, QueuePosition};
use crate::core::store::QueueStore;
use crate::util::clock::Clock;
use crate::util::serde::{Credits, GenerationType, JobId, Tier, UserId};

/// A generation request as received from the application.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmitRequest {
    /// Requesting user.
    pub user_id: UserId,
    /// Tier of the requesting user.
    pub user_tier: Tier,
    /// Generation type tag, validated against the cost table.
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
pub struct Admission {
    /// Id of the queued job.
    pub queue_id: JobId,
    /// 1-based queue position at admission, 0 if a worker already took it.
    pub position: usize,
    /// Pending jobs at admission.
    pub total_in_queue: usize,
    /// Estimated wait before the job starts.
    pub estimated_wait_seconds: u64,
    /// Credits debited.
    pub credit_cost: Credits,
    /// Balance after the debit.
    pub balance_after: Credits,
}

/// Validates and admits submissions.
pub struct AdmissionController<S: ?Sized> {
    store: Arc<S>,
    ledger: CreditLedger<S>,
    scheduler: PriorityScheduler<S>,
    tiers: TierTable,
    costs: CostTable,
    clock: Arc<dyn Clock>,
    audit: AuditTrail,
}

impl<S> AdmissionController<S>
where
    S: QueueStore + ?Sized,
{
    /// Create a controller.
    pub fn new(
        store: Arc<S>,
        ledger: CreditLedger<S>,
        scheduler: PriorityScheduler<S>,
        tiers: TierTable,
        costs: CostTable,
        clock: Arc<dyn Clock>,
        audit: AuditTrail,
    ) -> Self {
        Self {
            store,
            ledger,
            scheduler,
            tiers,
            costs,
            clock,
            audit,
        }
    }

    /// Parse a generation type tag and look up its cost.
    pub fn resolve_cost(&self, generation_type: &str) -> Result<(GenerationType, Credits), QueueError> {
        let kind: GenerationType = generation_type
            .parse()
            .map_err(|_| QueueError::InvalidGenerationType(generation_type.to_string()))?;
        let cost = self
            .costs
            .get(&kind)
            .copied()
            .ok_or_else(|| QueueError::InvalidGenerationType(generation_type.to_string()))?;
        Ok((kind, cost))
    }

    /// Admit a request or reject it without side effects.
    pub fn submit(&self, request: SubmitRequest) -> Result<Admission, QueueError> {
        let user_id = request.user_id.clone();
        let tier = request.user_tier;
        let tag = request.generation_type.clone();
        let result = self.try_submit(request);
        match &result {
            Ok(admission) => {
                info!(
                    job_id = %admission.queue_id,
                    user_id = %user_id,
                    tier = %tier,
                    cost = admission.credit_cost,
                    position = admission.position,
                    "job admitted"
                );
                self.audit.record(
                    Some(admission.queue_id),
                    &user_id,
                    AuditAction::Submitted,
                    Some(format!("{tag} cost={}", admission.credit_cost)),
                );
            }
            Err(err) if err.is_rejection() => {
                info!(user_id = %user_id, error = %err, "submission rejected");
                self.audit.record(
                    None,
                    &user_id,
                    AuditAction::Rejected,
                    Some(err.to_string()),
                );
            }
            Err(err) => {
                warn!(user_id = %user_id, error = %err, "submission abandoned");
            }
        }
        result
    }

    fn try_submit(&self, request: SubmitRequest) -> Result<Admission, QueueError> {
        let (generation_type, cost) = self.resolve_cost(&request.generation_type)?;
        let priority = self
            .tiers
            .get(&request.user_tier)
            .map(|p| p.priority)
            .ok_or_else(|| QueueError::InvalidConfig(format!("no policy for tier `{}`", request.user_tier)))?;

        let user_id = request.user_id;
        let job = Job::pending(
            NewJob {
                user_id: user_id.clone(),
                user_tier: request.user_tier,
                generation_type,
                prompt: request.prompt,
                input_params: request.input_params,
                project_context: request.project_context,
            },
            priority,
            cost,
            self.clock.now_ms(),
        );
        let debit = self.ledger.debit_entry(
            &user_id,
            cost,
            ReferenceKind::Job,
            job.id,
            format!("{generation_type} generation"),
        )?;

        // The store debits and inserts under one lock; an error leaves neither.
        let (job, entry) = self
            .store
            .admit(job, debit, self.ledger.opening_balance(&user_id))?;

        let placement = self.scheduler.position(&job)?.unwrap_or(QueuePosition {
            position: 0,
            total_in_queue: 0,
            estimated_wait_seconds: 0,
        });
        Ok(Admission {
            queue_id: job.id,
            position: placement.position,
            total_in_queue: placement.total_in_queue,
            estimated_wait_seconds: placement.estimated_wait_seconds,
            credit_cost: cost,
            balance_after: entry.balance_after,
        })
    }
}
