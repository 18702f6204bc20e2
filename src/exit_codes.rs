//! Exit code constants for the jobmutex CLI.
//!
//! - 0: Success (also the default when another instance holds the lock)
//! - 1: User error (bad args, invalid config)
//! - 2: Job could not be started
//! - 3: Lock strategy failure (backing medium unreachable or corrupt)
//!
//! When the job runs, the child's own exit code is passed through instead.

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments or invalid configuration.
pub const USER_ERROR: i32 = 1;

/// The job command could not be spawned or waited on.
pub const JOB_FAILURE: i32 = 2;

/// The lock backend failed during acquire or release.
pub const STRATEGY_FAILURE: i32 = 3;

/// Default exit code when the lock is busy. Busy is not an error.
pub const BUSY_DEFAULT: i32 = SUCCESS;
