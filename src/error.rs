//! Error types for jobmutex.
//!
//! Uses thiserror for derive macros. Backend failures get their own type,
//! [`LockStrategyError`], so that "the medium is broken" can never be confused
//! with "another holder is present" (which is not an error at all).

use crate::exit_codes;
use thiserror::Error;

/// Failure of a lock backing medium during acquire or release.
#[derive(Error, Debug)]
pub enum LockStrategyError {
    /// Lock directory or lock file could not be read or written.
    #[error("file lock failure: {0}")]
    File(String),

    /// The locks table could not be queried or updated.
    #[error("database lock failure: {0}")]
    Database(String),

    /// The cache store rejected the operation.
    #[error("cache lock failure: {0}")]
    Cache(String),
}

/// Main error type for jobmutex operations.
#[derive(Error, Debug)]
pub enum MutexError {
    /// User provided invalid arguments or configuration.
    #[error("{0}")]
    UserError(String),

    /// The lock backend failed.
    #[error("Lock strategy failed: {0}")]
    Strategy(#[from] LockStrategyError),

    /// The guarded job could not be started or waited on.
    #[error("Job failed: {0}")]
    JobError(String),
}

impl MutexError {
    /// Returns the appropriate exit code for this error type.
    pub fn exit_code(&self) -> i32 {
        match self {
            MutexError::UserError(_) => exit_codes::USER_ERROR,
            MutexError::Strategy(_) => exit_codes::STRATEGY_FAILURE,
            MutexError::JobError(_) => exit_codes::JOB_FAILURE,
        }
    }
}

/// Result type alias for jobmutex operations.
pub type Result<T> = std::result::Result<T, MutexError>;
