//! In-memory store backing both the ledger and the job table.
//!
//! A single `parking_lot::Mutex` guards all state, which is what makes
//! [`QueueStore::admit`] and every compare-and-swap transition atomic.
//! Pending jobs are additionally indexed by `(priority, created_at, seq, id)`,
//! mirroring the `(status, priority, created_at)` index of the SQL layout.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use crate::core::error::{LedgerError, StoreError};
use crate::core::job::{Job, JobStatus, TierCounts};
use crate::core::ledger::{EntryKind, LedgerEntry, NewLedgerEntry, ReferenceKind};
use crate::core::scheduler::PriorityOrder;
use crate::core::store::{CreditOutcome, JobStore, LedgerStore, QueueStore};
use crate::util::serde::{Credits, JobId, Tier, UserId};

type PendingKey = (u8, u128, u64, JobId);

fn pending_key(job: &Job) -> PendingKey {
    (job.priority, job.created_at_ms, job.seq, job.id)
}

#[derive(Default)]
struct StoreState {
    jobs: HashMap<JobId, Job>,
    pending: BTreeSet<PendingKey>,
    ledger: HashMap<UserId, Vec<LedgerEntry>>,
    /// `(kind, reference) -> (user, index)` of credit entries, for idempotency.
    credits: HashMap<(ReferenceKind, uuid::Uuid), (UserId, usize)>,
    next_seq: u64,
}

impl StoreState {
    fn balance(&self, user_id: &str, opening_balance: Credits) -> Credits {
        self.ledger
            .get(user_id)
            .and_then(|entries| entries.last())
            .map_or(opening_balance, |e| e.balance_after)
    }

    fn push_entry(&mut self, entry: NewLedgerEntry, opening_balance: Credits) -> (LedgerEntry, usize) {
        let previous = self.balance(&entry.user_id, opening_balance);
        let entry = entry.into_entry(previous);
        let entries = self.ledger.entry(entry.user_id.clone()).or_default();
        entries.push(entry.clone());
        (entry, entries.len() - 1)
    }

    fn checked_debit(
        &mut self,
        debit: NewLedgerEntry,
        opening_balance: Credits,
    ) -> Result<LedgerEntry, LedgerError> {
        if debit.kind != EntryKind::Debit || debit.amount >= 0 {
            return Err(LedgerError::InvalidAmount(debit.amount));
        }
        let required = -debit.amount;
        let available = self.balance(&debit.user_id, opening_balance);
        if available < required {
            return Err(LedgerError::InsufficientFunds {
                required,
                available,
            });
        }
        Ok(self.push_entry(debit, opening_balance).0)
    }

    fn credit_once(
        &mut self,
        credit: NewLedgerEntry,
        opening_balance: Credits,
    ) -> Result<CreditOutcome, LedgerError> {
        if credit.kind != EntryKind::Credit || credit.amount <= 0 {
            return Err(LedgerError::InvalidAmount(credit.amount));
        }
        let key = (credit.reference_kind, credit.reference_id);
        if let Some((user, index)) = self.credits.get(&key) {
            let existing = self
                .ledger
                .get(user)
                .and_then(|entries| entries.get(*index))
                .cloned()
                .ok_or_else(|| StoreError::NotFound(format!("credit entry for {}", key.1)))?;
            return Ok(CreditOutcome::AlreadyApplied(existing));
        }
        self.check_refundable(&credit)?;
        let (entry, index) = self.push_entry(credit, opening_balance);
        self.credits.insert(key, (entry.user_id.clone(), index));
        Ok(CreditOutcome::Applied(entry))
    }

    /// A refund must undo a recorded job debit of the same user, for no more
    /// than was charged, and never for a job that completed.
    fn check_refundable(&self, credit: &NewLedgerEntry) -> Result<(), LedgerError> {
        let reference = credit.reference_id;
        let debited = self
            .ledger
            .get(&credit.user_id)
            .and_then(|entries| {
                entries.iter().find(|e| {
                    e.kind == EntryKind::Debit
                        && e.reference_kind == ReferenceKind::Job
                        && e.reference_id == reference
                })
            })
            .map(|e| -e.amount)
            .ok_or(LedgerError::NoMatchingDebit(reference))?;
        if credit.amount > debited {
            return Err(LedgerError::RefundExceedsDebit {
                requested: credit.amount,
                debited,
            });
        }
        if self
            .jobs
            .get(&reference)
            .is_some_and(|job| job.status == JobStatus::Completed)
        {
            return Err(LedgerError::JobCompleted(reference));
        }
        Ok(())
    }

    fn insert_job(&mut self, mut job: Job) -> Result<Job, StoreError> {
        if self.jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(format!("job {} already exists", job.id)));
        }
        self.next_seq += 1;
        job.seq = self.next_seq;
        if job.is_pending() {
            self.pending.insert(pending_key(&job));
        }
        self.jobs.insert(job.id, job.clone());
        Ok(job)
    }

    /// Job in `processing` still claimed by `worker_id`.
    fn held_claim(&mut self, id: JobId, worker_id: &str) -> Option<&mut Job> {
        self.jobs.get_mut(&id).filter(|job| {
            job.status == JobStatus::Processing && job.claimed_by.as_deref() == Some(worker_id)
        })
    }
}

/// Store keeping jobs and ledger entries in process memory.
#[derive(Default)]
pub struct InMemoryStore {
    state: Mutex<StoreState>,
    ledger_faults: AtomicU32,
}

impl InMemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` ledger writes fail with `StoreError::Unavailable`.
    pub fn fail_next_ledger_writes(&self, count: u32) {
        self.ledger_faults.store(count, Ordering::Release);
    }

    /// Number of job rows, terminal ones included.
    pub fn job_count(&self) -> usize {
        self.state.lock().jobs.len()
    }

    fn take_ledger_fault(&self) -> Result<(), StoreError> {
        let taken = self
            .ledger_faults
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
        if taken.is_ok() {
            return Err(StoreError::Unavailable("ledger write failed".into()));
        }
        Ok(())
    }
}

impl LedgerStore for InMemoryStore {
    fn latest_entry(&self, user_id: &str) -> Result<Option<LedgerEntry>, StoreError> {
        Ok(self
            .state
            .lock()
            .ledger
            .get(user_id)
            .and_then(|entries| entries.last().cloned()))
    }

    fn entries(&self, user_id: &str) -> Result<Vec<LedgerEntry>, StoreError> {
        Ok(self
            .state
            .lock()
            .ledger
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    fn append_debit(
        &self,
        debit: NewLedgerEntry,
        opening_balance: Credits,
    ) -> Result<LedgerEntry, LedgerError> {
        self.take_ledger_fault()?;
        self.state.lock().checked_debit(debit, opening_balance)
    }

    fn append_credit_once(
        &self,
        credit: NewLedgerEntry,
        opening_balance: Credits,
    ) -> Result<CreditOutcome, LedgerError> {
        self.take_ledger_fault()?;
        self.state.lock().credit_once(credit, opening_balance)
    }
}

impl JobStore for InMemoryStore {
    fn insert(&self, job: Job) -> Result<Job, StoreError> {
        self.state.lock().insert_job(job)
    }

    fn get(&self, id: JobId) -> Result<Option<Job>, StoreError> {
        Ok(self.state.lock().jobs.get(&id).cloned())
    }

    fn find_pending(
        &self,
        limit: usize,
        order: &PriorityOrder,
        now_ms: u128,
    ) -> Result<Vec<Job>, StoreError> {
        let state = self.state.lock();
        if order.is_strict() {
            return Ok(state
                .pending
                .iter()
                .take(limit)
                .filter_map(|key| state.jobs.get(&key.3).cloned())
                .collect());
        }
        let mut jobs: Vec<&Job> = state
            .pending
            .iter()
            .filter_map(|key| state.jobs.get(&key.3))
            .collect();
        jobs.sort_by_key(|job| order.key(job, now_ms));
        Ok(jobs.into_iter().take(limit).cloned().collect())
    }

    fn count_pending_before(
        &self,
        job: &Job,
        order: &PriorityOrder,
        now_ms: u128,
    ) -> Result<usize, StoreError> {
        let state = self.state.lock();
        if order.is_strict() {
            return Ok(state.pending.range(..pending_key(job)).count());
        }
        let target = order.key(job, now_ms);
        Ok(state
            .pending
            .iter()
            .filter_map(|key| state.jobs.get(&key.3))
            .filter(|other| order.key(other, now_ms) < target)
            .count())
    }

    fn active_counts(&self) -> Result<BTreeMap<Tier, TierCounts>, StoreError> {
        let state = self.state.lock();
        let mut counts: BTreeMap<Tier, TierCounts> =
            Tier::ALL.iter().map(|t| (*t, TierCounts::default())).collect();
        for job in state.jobs.values() {
            let slot = counts.entry(job.user_tier).or_default();
            match job.status {
                JobStatus::Pending => slot.pending += 1,
                JobStatus::Processing => slot.processing += 1,
                JobStatus::Completed | JobStatus::Failed => {}
            }
        }
        Ok(counts)
    }

    fn claim(&self, id: JobId, worker_id: &str, now_ms: u128) -> Result<Option<Job>, StoreError> {
        let mut state = self.state.lock();
        let Some(job) = state.jobs.get_mut(&id).filter(|job| job.is_pending()) else {
            return Ok(None);
        };
        job.status = JobStatus::Processing;
        job.started_at_ms = Some(now_ms);
        job.claimed_by = Some(worker_id.to_string());
        job.attempts += 1;
        let claimed = job.clone();
        state.pending.remove(&pending_key(&claimed));
        Ok(Some(claimed))
    }

    fn complete(
        &self,
        id: JobId,
        worker_id: &str,
        result_ref: String,
        now_ms: u128,
    ) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        let Some(job) = state.held_claim(id, worker_id) else {
            return Ok(false);
        };
        job.status = JobStatus::Completed;
        job.result_ref = Some(result_ref);
        job.completed_at_ms = Some(now_ms);
        Ok(true)
    }

    fn requeue(&self, id: JobId, worker_id: &str) -> Result<bool, StoreError> {
        let mut state = self.state.lock();
        let Some(job) = state.held_claim(id, worker_id) else {
            return Ok(false);
        };
        job.status = JobStatus::Pending;
        job.started_at_ms = None;
        job.claimed_by = None;
        let key = pending_key(job);
        state.pending.insert(key);
        Ok(true)
    }

    fn processing_started_before(&self, cutoff_ms: u128) -> Result<Vec<Job>, StoreError> {
        let state = self.state.lock();
        let mut stale: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| {
                job.status == JobStatus::Processing
                    && job.started_at_ms.is_some_and(|started| started < cutoff_ms)
            })
            .cloned()
            .collect();
        stale.sort_by_key(|job| (job.started_at_ms, job.seq));
        Ok(stale)
    }

    fn jobs_for_user(&self, user_id: &str) -> Result<Vec<Job>, StoreError> {
        let state = self.state.lock();
        let mut jobs: Vec<Job> = state
            .jobs
            .values()
            .filter(|job| job.user_id == user_id)
            .cloned()
            .collect();
        jobs.sort_by(|a, b| (b.created_at_ms, b.seq).cmp(&(a.created_at_ms, a.seq)));
        Ok(jobs)
    }
}

impl QueueStore for InMemoryStore {
    fn admit(
        &self,
        job: Job,
        debit: NewLedgerEntry,
        opening_balance: Credits,
    ) -> Result<(Job, LedgerEntry), LedgerError> {
        self.take_ledger_fault()?;
        let mut state = self.state.lock();
        if state.jobs.contains_key(&job.id) {
            return Err(StoreError::Conflict(format!("job {} already exists", job.id)).into());
        }
        let entry = state.checked_debit(debit, opening_balance)?;
        let job = state.insert_job(job)?;
        Ok((job, entry))
    }

    fn fail_and_refund(
        &self,
        id: JobId,
        worker_id: &str,
        error_message: String,
        now_ms: u128,
        credit: NewLedgerEntry,
        opening_balance: Credits,
    ) -> Result<Option<CreditOutcome>, LedgerError> {
        self.take_ledger_fault()?;
        let mut state = self.state.lock();
        if state.held_claim(id, worker_id).is_none() {
            return Ok(None);
        }
        let outcome = state.credit_once(credit, opening_balance)?;
        if let Some(job) = state.held_claim(id, worker_id) {
            job.status = JobStatus::Failed;
            job.error_message = Some(error_message);
            job.completed_at_ms = Some(now_ms);
        }
        Ok(Some(outcome))
    }
}
