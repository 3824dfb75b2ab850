//! Core admission, ledger, scheduling and processing logic.

pub mod accounts;
pub mod admission;
pub mod audit;
pub mod error;
pub mod executor;
pub mod job;
pub mod ledger;
pub mod reaper;
pub mod scheduler;
pub mod store;
pub mod worker_pool;

pub use accounts::{Account, AccountStore};
pub use admission::{Admission, AdmissionController, SubmitRequest};
pub use audit::{build_audit_event, AuditAction, AuditEvent, AuditSink, AuditTrail, InMemoryAuditSink};
pub use error::{AppResult, GenerationError, LedgerError, QueueError, StoreError};
pub use executor::{GenerationOutput, GenerationRequest, GenerationService};
pub use job::{Job, JobStatus, NewJob, TierCounts};
pub use ledger::{CreditLedger, EntryKind, LedgerEntry, NewLedgerEntry, Reconciliation, ReferenceKind};
pub use reaper::{ReapReport, StaleJobReaper};
pub use scheduler::{PriorityOrder, PriorityScheduler, QueueKey, QueuePosition};
pub use store::{CreditOutcome, JobStore, LedgerStore, QueueStore};
pub use worker_pool::{BatchReport, JobProcessor, WorkerSettings};
