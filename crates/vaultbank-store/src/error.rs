//! Store error types

use thiserror::Error;
use vaultbank_types::Amount;

/// Account store operation errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("migration error: {0}")]
    Migration(String),

    #[error("query error: {0}")]
    Query(#[from] sqlx::Error),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate: {0}")]
    Duplicate(String),

    #[error("insufficient funds: have {available}, need {required}")]
    InsufficientFunds { available: Amount, required: Amount },

    /// Lock or transaction contention; the operation had no effect and the
    /// caller may retry the whole request.
    #[error("could not acquire consistency scope in time")]
    ConflictTimeout,

    #[error("account number allocation exhausted")]
    AllocationExhausted,

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;
