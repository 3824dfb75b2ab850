//! Error types for ledger, store, admission and generation operations.

use std::time::Duration;

use thiserror::Error;

use crate::util::serde::{Credits, JobId};

/// Infrastructure failures raised by store adapters.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store could not be reached or refused the write.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A uniqueness or state constraint rejected the write.
    #[error("store conflict: {0}")]
    Conflict(String),
    /// The addressed row does not exist.
    #[error("not found: {0}")]
    NotFound(String),
}

/// Errors produced by the credit ledger.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LedgerError {
    /// Balance is below the requested debit.
    #[error("insufficient funds: required {required}, available {available}")]
    InsufficientFunds {
        /// Credits requested.
        required: Credits,
        /// Credits available at debit time.
        available: Credits,
    },
    /// Debits and refunds must be strictly positive.
    #[error("invalid amount: {0}")]
    InvalidAmount(Credits),
    /// No job debit exists for the reference being refunded.
    #[error("no debit on file for {0}")]
    NoMatchingDebit(uuid::Uuid),
    /// Refund is larger than the debit it compensates.
    #[error("refund of {requested} exceeds debit of {debited}")]
    RefundExceedsDebit {
        /// Credits asked back.
        requested: Credits,
        /// Credits originally charged.
        debited: Credits,
    },
    /// The referenced job completed, so its charge stands.
    #[error("job {0} completed and cannot be refunded")]
    JobCompleted(JobId),
    /// Ledger write or read failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Caller-facing errors for submission, status and processing.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    /// Balance is below the cost of the requested generation.
    #[error("insufficient credits: required {required}, available {available}")]
    InsufficientCredits {
        /// Cost of the generation type.
        required: Credits,
        /// Balance at submission time.
        available: Credits,
    },
    /// Generation type tag is unknown or has no configured cost.
    #[error("invalid generation type: {0}")]
    InvalidGenerationType(String),
    /// No tier was supplied and the account store does not know the user.
    #[error("unknown user: {0}")]
    UnknownUser(String),
    /// No job with this id exists.
    #[error("job not found: {0}")]
    JobNotFound(JobId),
    /// Configuration failed validation.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    /// Credit amount rejected by the ledger.
    #[error("invalid amount: {0}")]
    InvalidAmount(Credits),
    /// Refund does not match a chargeable job debit.
    #[error("refund rejected: {0}")]
    RefundRejected(String),
    /// Infrastructure failure; the operation had no effect.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueueError {
    /// Rejections are reported synchronously and carry no side effects.
    pub const fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::InsufficientCredits { .. } | Self::InvalidGenerationType(_) | Self::UnknownUser(_)
        )
    }
}

impl From<LedgerError> for QueueError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientFunds { required, available } => {
                Self::InsufficientCredits { required, available }
            }
            LedgerError::InvalidAmount(amount) => Self::InvalidAmount(amount),
            LedgerError::NoMatchingDebit(_)
            | LedgerError::RefundExceedsDebit { .. }
            | LedgerError::JobCompleted(_) => Self::RefundRejected(err.to_string()),
            LedgerError::Store(e) => Self::Store(e),
        }
    }
}

/// Failures reported by, or imposed on, the generation backend.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GenerationError {
    /// The backend reported a failure.
    #[error("generation failed: {0}")]
    Backend(String),
    /// The backend did not answer in time.
    #[error("generation timed out after {0:?}")]
    Timeout(Duration),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
