//! Persistence contracts for the ledger and the job table.
//!
//! Implementations hold no business rules beyond the conditional writes
//! spelled out on each method. Every state transition is compare-and-swap:
//! it applies only when the row is still in the expected state and returns
//! `false` (or `None`) when another caller got there first.

use std::collections::BTreeMap;

use crate::core::error::{LedgerError, StoreError};
use crate::core::job::{Job, TierCounts};
use crate::core::ledger::{LedgerEntry, NewLedgerEntry};
use crate::core::scheduler::PriorityOrder;
use crate::util::serde::{Credits, JobId, Tier};

/// Outcome of an idempotent credit append.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreditOutcome {
    /// A new credit entry was written.
    Applied(LedgerEntry),
    /// A credit for the same reference already existed; nothing was written.
    AlreadyApplied(LedgerEntry),
}

impl CreditOutcome {
    /// The entry carrying the credit, new or pre-existing.
    pub const fn entry(&self) -> &LedgerEntry {
        match self {
            Self::Applied(e) | Self::AlreadyApplied(e) => e,
        }
    }

    /// True when this call wrote the entry.
    pub const fn was_applied(&self) -> bool {
        matches!(self, Self::Applied(_))
    }
}

/// Append-only ledger storage.
pub trait LedgerStore: Send + Sync {
    /// Most recent entry for a user.
    fn latest_entry(&self, user_id: &str) -> Result<Option<LedgerEntry>, StoreError>;

    /// All entries for a user, oldest first.
    fn entries(&self, user_id: &str) -> Result<Vec<LedgerEntry>, StoreError>;

    /// Append a debit if the user's balance covers it.
    ///
    /// `opening_balance` is the balance used when the user has no entries.
    /// The balance check and the append are a single atomic unit.
    fn append_debit(
        &self,
        debit: NewLedgerEntry,
        opening_balance: Credits,
    ) -> Result<LedgerEntry, LedgerError>;

    /// Append a credit unless one already exists for the same
    /// `(reference_kind, reference_id)`.
    ///
    /// A new credit must match a job debit of the same user, be no larger
    /// than it, and the job must not have completed. The checks and the
    /// append run under the same lock.
    fn append_credit_once(
        &self,
        credit: NewLedgerEntry,
        opening_balance: Credits,
    ) -> Result<CreditOutcome, LedgerError>;
}

/// Job table storage.
pub trait JobStore: Send + Sync {
    /// Insert a new job, assigning its sequence number.
    fn insert(&self, job: Job) -> Result<Job, StoreError>;

    /// Fetch a job by id.
    fn get(&self, id: JobId) -> Result<Option<Job>, StoreError>;

    /// Up to `limit` pending jobs in scheduling order.
    fn find_pending(
        &self,
        limit: usize,
        order: &PriorityOrder,
        now_ms: u128,
    ) -> Result<Vec<Job>, StoreError>;

    /// Number of pending jobs that sort ahead of `job`.
    fn count_pending_before(
        &self,
        job: &Job,
        order: &PriorityOrder,
        now_ms: u128,
    ) -> Result<usize, StoreError>;

    /// Pending and processing counts per tier.
    fn active_counts(&self) -> Result<BTreeMap<Tier, TierCounts>, StoreError>;

    /// `pending -> processing` for `worker_id`. Returns the claimed job, or
    /// `None` when the job is no longer pending.
    fn claim(&self, id: JobId, worker_id: &str, now_ms: u128) -> Result<Option<Job>, StoreError>;

    /// `processing -> completed`, only while `worker_id` holds the claim.
    fn complete(
        &self,
        id: JobId,
        worker_id: &str,
        result_ref: String,
        now_ms: u128,
    ) -> Result<bool, StoreError>;

    /// `processing -> pending`, only while `worker_id` holds the claim.
    fn requeue(&self, id: JobId, worker_id: &str) -> Result<bool, StoreError>;

    /// Processing jobs whose claim started strictly before `cutoff_ms`.
    fn processing_started_before(&self, cutoff_ms: u128) -> Result<Vec<Job>, StoreError>;

    /// A user's jobs, newest first.
    fn jobs_for_user(&self, user_id: &str) -> Result<Vec<Job>, StoreError>;
}

/// Store spanning both tables, for the writes that must touch both at once.
pub trait QueueStore: LedgerStore + JobStore {
    /// Conditionally debit `debit` and insert `job` atomically. On any error
    /// neither the entry nor the job exists afterwards.
    fn admit(
        &self,
        job: Job,
        debit: NewLedgerEntry,
        opening_balance: Credits,
    ) -> Result<(Job, LedgerEntry), LedgerError>;

    /// `processing -> failed` plus the compensating credit, atomically.
    ///
    /// Applies only while `worker_id` holds the claim; returns `None` and
    /// writes nothing otherwise. The credit is idempotent per reference.
    fn fail_and_refund(
        &self,
        id: JobId,
        worker_id: &str,
        error_message: String,
        now_ms: u128,
        credit: NewLedgerEntry,
        opening_balance: Credits,
    ) -> Result<Option<CreditOutcome>, LedgerError>;
}
