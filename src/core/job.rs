//! Generation jobs and their lifecycle states.

use serde::{Deserialize, Serialize};

use crate::util::serde::{Credits, GenerationType, JobId, Tier, UserId};

/// Lifecycle state of a job.
///
/// `pending -> processing -> completed | failed`. The reaper may move a
/// `processing` job back to `pending` under the requeue policy; terminal
/// states never change again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Admitted and waiting for a worker.
    Pending,
    /// Claimed by a worker.
    Processing,
    /// Generation succeeded.
    Completed,
    /// Generation failed, timed out or was reaped; the cost was refunded.
    Failed,
}

impl JobStatus {
    /// `completed` and `failed` are terminal.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Stable lowercase name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// One generation request and its bookkeeping.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    /// Job identifier, also the ledger reference for its debit and refund.
    pub id: JobId,
    /// Owner of the job.
    pub user_id: UserId,
    /// Tier of the owner at admission time.
    pub user_tier: Tier,
    /// Requested content kind.
    pub generation_type: GenerationType,
    /// Prompt forwarded to the generation backend.
    pub prompt: String,
    /// Backend-specific parameters.
    pub input_params: serde_json::Value,
    /// Opaque project context forwarded to the backend.
    pub project_context: Option<serde_json::Value>,
    /// Current lifecycle state.
    pub status: JobStatus,
    /// Tier priority weight; lower is served first.
    pub priority: u8,
    /// Credits debited at admission.
    pub credit_cost: Credits,
    /// Admission time (ms since epoch).
    pub created_at_ms: u128,
    /// Time of the most recent claim.
    pub started_at_ms: Option<u128>,
    /// Time the job reached a terminal state.
    pub completed_at_ms: Option<u128>,
    /// Backend reference to the generated artifact.
    pub result_ref: Option<String>,
    /// Failure reason for failed jobs.
    pub error_message: Option<String>,
    /// Identity of the worker pass holding the current claim.
    pub claimed_by: Option<String>,
    /// Number of times the job has been claimed.
    pub attempts: u32,
    /// Store-assigned insertion sequence, breaks `created_at` ties.
    pub seq: u64,
}

/// Fields the admission controller supplies for a new job.
#[derive(Debug, Clone)]
pub struct NewJob {
    /// Owner of the job.
    pub user_id: UserId,
    /// Owner tier.
    pub user_tier: Tier,
    /// Requested content kind.
    pub generation_type: GenerationType,
    /// Prompt text.
    pub prompt: String,
    /// Backend parameters.
    pub input_params: serde_json::Value,
    /// Optional project context.
    pub project_context: Option<serde_json::Value>,
}

impl Job {
    /// Build a `pending` job. The store assigns `seq` on insert.
    pub fn pending(new: NewJob, priority: u8, credit_cost: Credits, created_at_ms: u128) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            user_id: new.user_id,
            user_tier: new.user_tier,
            generation_type: new.generation_type,
            prompt: new.prompt,
            input_params: new.input_params,
            project_context: new.project_context,
            status: JobStatus::Pending,
            priority,
            credit_cost,
            created_at_ms,
            started_at_ms: None,
            completed_at_ms: None,
            result_ref: None,
            error_message: None,
            claimed_by: None,
            attempts: 0,
            seq: 0,
        }
    }

    /// True while the job is waiting for a worker.
    pub fn is_pending(&self) -> bool {
        self.status == JobStatus::Pending
    }
}

/// Active job counts for one tier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TierCounts {
    /// Jobs waiting for a worker.
    pub pending: usize,
    /// Jobs currently claimed.
    pub processing: usize,
}
