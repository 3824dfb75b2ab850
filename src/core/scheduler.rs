//! Priority ordering and queue position estimates.
//!
//! Jobs are served by tier priority weight (smaller first) and FIFO within a
//! weight. With aging enabled, every full `aging_step` a job has waited
//! lowers its effective weight by one, so low tiers cannot starve forever.

use std::cmp::Ordering;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::TierTable;
use crate::core::error::{QueueError, StoreError};
use crate::core::job::Job;
use crate::core::store::JobStore;
use crate::util::clock::Clock;
use crate::util::serde::JobId;

/// Sort key of a pending job. Smaller keys are dequeued first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct QueueKey {
    /// Priority weight after aging.
    pub effective_priority: u8,
    /// Admission time.
    pub created_at_ms: u128,
    /// Insertion sequence.
    pub seq: u64,
    /// Job id, only reached for identical keys.
    pub id: JobId,
}

/// Ordering policy handed to the job store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriorityOrder {
    aging_step_ms: Option<u128>,
}

impl PriorityOrder {
    /// Strict priority, FIFO within a tier.
    pub const fn strict() -> Self {
        Self {
            aging_step_ms: None,
        }
    }

    /// Priority with one level of boost per `step` waited.
    pub fn with_aging(step: Duration) -> Self {
        Self {
            aging_step_ms: Some(step.as_millis().max(1)),
        }
    }

    /// True when the key of a job does not depend on the current time.
    pub const fn is_strict(&self) -> bool {
        self.aging_step_ms.is_none()
    }

    /// Priority weight after aging at `now_ms`.
    pub fn effective_priority(&self, job: &Job, now_ms: u128) -> u8 {
        let Some(step) = self.aging_step_ms else {
            return job.priority;
        };
        let waited = now_ms.saturating_sub(job.created_at_ms);
        let boost = u8::try_from(waited / step).unwrap_or(u8::MAX);
        job.priority.saturating_sub(boost)
    }

    /// Sort key at `now_ms`.
    pub fn key(&self, job: &Job, now_ms: u128) -> QueueKey {
        QueueKey {
            effective_priority: self.effective_priority(job, now_ms),
            created_at_ms: job.created_at_ms,
            seq: job.seq,
            id: job.id,
        }
    }

    /// Compare two jobs at `now_ms`.
    pub fn compare(&self, a: &Job, b: &Job, now_ms: u128) -> Ordering {
        self.key(a, now_ms).cmp(&self.key(b, now_ms))
    }
}

/// Point-in-time place of a job in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuePosition {
    /// 1-based position among pending jobs.
    pub position: usize,
    /// Pending jobs in total.
    pub total_in_queue: usize,
    /// `position * average processing time` of the job's tier.
    pub estimated_wait_seconds: u64,
}

/// Computes dequeue order and user-visible positions.
pub struct PriorityScheduler<S: ?Sized> {
    store: Arc<S>,
    order: PriorityOrder,
    tiers: TierTable,
    clock: Arc<dyn Clock>,
}

impl<S: ?Sized> Clone for PriorityScheduler<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            order: self.order,
            tiers: self.tiers.clone(),
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S> PriorityScheduler<S>
where
    S: JobStore + ?Sized,
{
    /// Create a scheduler over `store`.
    pub fn new(store: Arc<S>, order: PriorityOrder, tiers: TierTable, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            order,
            tiers,
            clock,
        }
    }

    /// Ordering policy in use.
    pub const fn order(&self) -> &PriorityOrder {
        &self.order
    }

    /// Next `limit` jobs to dequeue.
    pub fn next_batch(&self, limit: usize) -> Result<Vec<Job>, StoreError> {
        self.store.find_pending(limit, &self.order, self.clock.now_ms())
    }

    /// Position of a pending job, `None` once it left the queue.
    pub fn position(&self, job: &Job) -> Result<Option<QueuePosition>, QueueError> {
        if !job.is_pending() {
            return Ok(None);
        }
        let now_ms = self.clock.now_ms();
        let ahead = self.store.count_pending_before(job, &self.order, now_ms)?;
        let total_in_queue = self
            .store
            .active_counts()?
            .values()
            .map(|c| c.pending)
            .sum::<usize>()
            .max(ahead + 1);
        let position = ahead + 1;
        let per_job = self
            .tiers
            .get(&job.user_tier)
            .map_or(0, |p| p.avg_processing_secs);
        Ok(Some(QueuePosition {
            position,
            total_in_queue,
            estimated_wait_seconds: u64::try_from(position)
                .unwrap_or(u64::MAX)
                .saturating_mul(per_job),
        }))
    }
}
