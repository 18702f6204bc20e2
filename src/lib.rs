//! Named, timed mutual exclusion for recurring jobs.
//!
//! A job run is identified by its name and parameters. [`lock_name`] turns
//! that identity into a deterministic lock name, a [`locks::LockStrategy`]
//! claims the name on a shared medium (lock files, a SQLite table or a
//! cache), and [`guard::JobExecutionGuard`] runs the job body only while the
//! claim is held.
//!
//! ```no_run
//! use jobmutex::guard::{Execution, JobExecutionGuard};
//! use jobmutex::job::JobIdentity;
//! use jobmutex::locks::{FileStrategy, LockCoordinator, LockTimeout};
//!
//! let guard = JobExecutionGuard::new(LockCoordinator::new(FileStrategy::new("/tmp/jobmutex")));
//! let job = JobIdentity::new("icm:generic").with_param("foo", "bar");
//!
//! match guard.run(&job, LockTimeout::Millis(3000), || "Done!")? {
//!     Execution::Executed(output) => println!("{}", output),
//!     Execution::Busy(_) => println!("{}", jobmutex::guard::BUSY_MESSAGE),
//! }
//! # Ok::<(), jobmutex::error::LockStrategyError>(())
//! ```

pub mod config;
pub mod error;
pub mod exit_codes;
pub mod guard;
pub mod job;
pub mod lock_name;
pub mod locks;
pub mod logging;

#[cfg(test)]
mod test_support;

pub use error::{LockStrategyError, MutexError, Result};
pub use guard::{Execution, JobExecutionGuard};
pub use job::{JobDefinition, JobIdentity, JobInvocation, Scalar};
pub use lock_name::{LockName, derive_lock_name};
pub use locks::{LockCoordinator, LockStrategy, LockTimeout, StrategyKind};
