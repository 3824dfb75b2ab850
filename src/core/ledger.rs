//! Credit ledger: append-only balance history per user.
//!
//! The balance is never stored on its own. It is the `balance_after` of the
//! user's newest entry, or the opening balance when there is none, so the
//! ledger and the balance cannot drift apart.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::accounts::AccountStore;
use crate::core::error::LedgerError;
use crate::core::job::Job;
use crate::core::store::{CreditOutcome, LedgerStore, QueueStore};
use crate::util::clock::Clock;
use crate::util::serde::{Credits, EntryId, UserId};

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    /// Balance decreases.
    Debit,
    /// Balance increases.
    Credit,
}

/// What a ledger entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReferenceKind {
    /// Cost of a generation job.
    Job,
    /// Compensating credit for a job that did not complete.
    JobRefund,
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Job => f.write_str("job"),
            Self::JobRefund => f.write_str("job_refund"),
        }
    }
}

/// Immutable ledger record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Entry identifier.
    pub id: EntryId,
    /// Owner of the balance.
    pub user_id: UserId,
    /// Debit or credit.
    pub kind: EntryKind,
    /// Signed change, negative for debits.
    pub amount: Credits,
    /// Balance after applying `amount`.
    pub balance_after: Credits,
    /// Kind of the referenced object.
    pub reference_kind: ReferenceKind,
    /// Referenced object, the job id for job entries.
    pub reference_id: uuid::Uuid,
    /// Human readable reason.
    pub description: String,
    /// Append time (ms since epoch).
    pub created_at_ms: u128,
}

/// Entry as requested by the ledger; the store fills in id and balance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewLedgerEntry {
    /// Owner of the balance.
    pub user_id: UserId,
    /// Debit or credit.
    pub kind: EntryKind,
    /// Signed change, negative for debits.
    pub amount: Credits,
    /// Kind of the referenced object.
    pub reference_kind: ReferenceKind,
    /// Referenced object.
    pub reference_id: uuid::Uuid,
    /// Human readable reason.
    pub description: String,
    /// Append time (ms since epoch).
    pub created_at_ms: u128,
}

impl NewLedgerEntry {
    /// Materialize the entry on top of `previous_balance`.
    pub fn into_entry(self, previous_balance: Credits) -> LedgerEntry {
        LedgerEntry {
            id: uuid::Uuid::new_v4(),
            balance_after: previous_balance + self.amount,
            user_id: self.user_id,
            kind: self.kind,
            amount: self.amount,
            reference_kind: self.reference_kind,
            reference_id: self.reference_id,
            description: self.description,
            created_at_ms: self.created_at_ms,
        }
    }
}

/// Result of replaying a user's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reconciliation {
    /// User that was checked.
    pub user_id: UserId,
    /// Balance before the first entry.
    pub opening_balance: Credits,
    /// Number of entries replayed.
    pub entry_count: usize,
    /// Opening balance plus the sum of all amounts.
    pub replayed_balance: Credits,
    /// Balance reported by the ledger.
    pub recorded_balance: Credits,
    /// First entry whose `balance_after` does not follow from its predecessor.
    pub first_break: Option<EntryId>,
}

impl Reconciliation {
    /// Chain intact and replay agrees with the recorded balance.
    pub const fn is_consistent(&self) -> bool {
        self.first_break.is_none() && self.replayed_balance == self.recorded_balance
    }
}

/// Balance ledger over a [`LedgerStore`].
pub struct CreditLedger<S: ?Sized> {
    store: Arc<S>,
    accounts: Arc<dyn AccountStore>,
    default_balance: Credits,
    clock: Arc<dyn Clock>,
}

impl<S: ?Sized> Clone for CreditLedger<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            accounts: Arc::clone(&self.accounts),
            default_balance: self.default_balance,
            clock: Arc::clone(&self.clock),
        }
    }
}

impl<S> CreditLedger<S>
where
    S: LedgerStore + ?Sized,
{
    /// Create a ledger. `default_balance` applies to users the account store
    /// does not know.
    pub fn new(
        store: Arc<S>,
        accounts: Arc<dyn AccountStore>,
        default_balance: Credits,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            accounts,
            default_balance,
            clock,
        }
    }

    /// Balance a user starts from before any entry exists.
    pub fn opening_balance(&self, user_id: &str) -> Credits {
        self.accounts
            .account(user_id)
            .map_or(self.default_balance, |a| a.initial_balance)
    }

    /// Current balance: newest `balance_after`, or the opening balance.
    pub fn get_balance(&self, user_id: &str) -> Result<Credits, LedgerError> {
        Ok(self
            .store
            .latest_entry(user_id)?
            .map_or_else(|| self.opening_balance(user_id), |e| e.balance_after))
    }

    /// Build the debit entry for a charge without writing it.
    pub fn debit_entry(
        &self,
        user_id: &str,
        amount: Credits,
        reference_kind: ReferenceKind,
        reference_id: uuid::Uuid,
        description: impl Into<String>,
    ) -> Result<NewLedgerEntry, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        Ok(NewLedgerEntry {
            user_id: user_id.to_string(),
            kind: EntryKind::Debit,
            amount: -amount,
            reference_kind,
            reference_id,
            description: description.into(),
            created_at_ms: self.clock.now_ms(),
        })
    }

    /// Check the balance covers `amount` and append a debit, atomically.
    ///
    /// Returns the written entry; its `balance_after` is the new balance.
    pub fn reserve_and_debit(
        &self,
        user_id: &str,
        amount: Credits,
        reference_kind: ReferenceKind,
        reference_id: uuid::Uuid,
        description: impl Into<String>,
    ) -> Result<LedgerEntry, LedgerError> {
        let debit = self.debit_entry(user_id, amount, reference_kind, reference_id, description)?;
        match self.store.append_debit(debit, self.opening_balance(user_id)) {
            Ok(entry) => {
                debug!(
                    user_id,
                    amount,
                    balance = entry.balance_after,
                    reference = %reference_id,
                    "ledger debit"
                );
                Ok(entry)
            }
            Err(err) => {
                if let LedgerError::InsufficientFunds { available, .. } = err {
                    info!(user_id, amount, available, "ledger debit refused");
                }
                Err(err)
            }
        }
    }

    /// Build the compensating credit for `reference_id` without writing it.
    pub fn refund_entry(
        &self,
        user_id: &str,
        amount: Credits,
        reference_id: uuid::Uuid,
        description: impl Into<String>,
    ) -> Result<NewLedgerEntry, LedgerError> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        Ok(NewLedgerEntry {
            user_id: user_id.to_string(),
            kind: EntryKind::Credit,
            amount,
            reference_kind: ReferenceKind::JobRefund,
            reference_id,
            description: description.into(),
            created_at_ms: self.clock.now_ms(),
        })
    }

    /// Credit `amount` back for `reference_id`. Only the first call per
    /// reference changes the balance; later calls return the current balance.
    pub fn refund(
        &self,
        user_id: &str,
        amount: Credits,
        reference_id: uuid::Uuid,
        description: impl Into<String>,
    ) -> Result<Credits, LedgerError> {
        let credit = self.refund_entry(user_id, amount, reference_id, description)?;
        match self.store.append_credit_once(credit, self.opening_balance(user_id))? {
            CreditOutcome::Applied(entry) => {
                info!(
                    user_id,
                    amount,
                    balance = entry.balance_after,
                    reference = %reference_id,
                    "refund applied"
                );
                Ok(entry.balance_after)
            }
            CreditOutcome::AlreadyApplied(_) => {
                debug!(user_id, reference = %reference_id, "refund already applied");
                self.get_balance(user_id)
            }
        }
    }

    /// All entries for a user, oldest first.
    pub fn history(&self, user_id: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
        Ok(self.store.entries(user_id)?)
    }

    /// Replay a user's entries and check every link of the balance chain.
    pub fn reconcile(&self, user_id: &str) -> Result<Reconciliation, LedgerError> {
        let entries = self.store.entries(user_id)?;
        let opening_balance = self.opening_balance(user_id);
        let mut previous = opening_balance;
        let mut replayed_balance = opening_balance;
        let mut first_break = None;
        for entry in &entries {
            replayed_balance += entry.amount;
            if first_break.is_none() && entry.balance_after != previous + entry.amount {
                first_break = Some(entry.id);
            }
            previous = entry.balance_after;
        }
        let recorded_balance = entries.last().map_or(opening_balance, |e| e.balance_after);
        let report = Reconciliation {
            user_id: user_id.to_string(),
            opening_balance,
            entry_count: entries.len(),
            replayed_balance,
            recorded_balance,
            first_break,
        };
        if !report.is_consistent() {
            warn!(user_id, first_break = ?report.first_break, "ledger chain inconsistent");
        }
        Ok(report)
    }
}

impl<S> CreditLedger<S>
where
    S: QueueStore + ?Sized,
{
    /// Refund a job's cost and mark it failed in one unit.
    ///
    /// Returns the balance after the refund, or `None` when `worker_id` no
    /// longer holds the claim (another path already settled the job).
    pub fn settle_failure(
        &self,
        job: &Job,
        worker_id: &str,
        reason: &str,
    ) -> Result<Option<Credits>, LedgerError> {
        let credit = self.refund_entry(
            &job.user_id,
            job.credit_cost,
            job.id,
            format!("refund: {reason}"),
        )?;
        let outcome = self.store.fail_and_refund(
            job.id,
            worker_id,
            reason.to_string(),
            self.clock.now_ms(),
            credit,
            self.opening_balance(&job.user_id),
        )?;
        let Some(outcome) = outcome else {
            return Ok(None);
        };
        if outcome.was_applied() {
            info!(
                job_id = %job.id,
                user_id = %job.user_id,
                amount = job.credit_cost,
                balance = outcome.entry().balance_after,
                "job failed, cost refunded"
            );
            Ok(Some(outcome.entry().balance_after))
        } else {
            debug!(job_id = %job.id, "job failed, refund already on file");
            Ok(Some(self.get_balance(&job.user_id)?))
        }
    }
}
