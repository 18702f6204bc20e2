//! Running a job body under its lock.
//!
//! [`JobExecutionGuard::run`] derives the lock name, acquires it through the
//! coordinator and either runs the body or reports [`Execution::Busy`]. The
//! body never runs without the lock, and a granted lock is released exactly
//! once whether the body returns, returns an error, or panics.

use crate::error::LockStrategyError;
use crate::job::{JobIdentity, JobInvocation};
use crate::lock_name::{DEFAULT_PREFIX, LockName, derive_lock_name};
use crate::locks::{Acquisition, LockCoordinator, LockTimeout};
use tracing::{debug, info, warn};

/// Notice shown when another instance holds the lock.
pub const BUSY_MESSAGE: &str = "Command is running now!";

/// Outcome of a guarded run.
#[derive(Debug, Clone, PartialEq)]
pub enum Execution<R> {
    /// The body ran; its return value is passed through unchanged.
    Executed(R),
    /// Another instance holds the lock; the body did not run.
    Busy(LockName),
}

impl<R> Execution<R> {
    pub fn is_busy(&self) -> bool {
        matches!(self, Execution::Busy(_))
    }

    /// The body's return value, if it ran.
    pub fn into_output(self) -> Option<R> {
        match self {
            Execution::Executed(output) => Some(output),
            Execution::Busy(_) => None,
        }
    }
}

/// Wraps job bodies with acquire/release around a coordinator.
#[derive(Debug)]
pub struct JobExecutionGuard {
    coordinator: LockCoordinator,
    prefix: String,
}

impl JobExecutionGuard {
    pub fn new(coordinator: LockCoordinator) -> Self {
        Self {
            coordinator,
            prefix: DEFAULT_PREFIX.to_string(),
        }
    }

    /// Use `prefix` for lock names derived by [`JobExecutionGuard::run`].
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn coordinator(&self) -> &LockCoordinator {
        &self.coordinator
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The lock name `run` would use for `identity`.
    pub fn lock_name(&self, identity: &JobIdentity) -> LockName {
        derive_lock_name(&self.prefix, identity)
    }

    /// Run `body` if the job's lock can be acquired within `timeout`.
    pub fn run<R, F>(
        &self,
        identity: &JobIdentity,
        timeout: LockTimeout,
        body: F,
    ) -> Result<Execution<R>, LockStrategyError>
    where
        F: FnOnce() -> R,
    {
        let name = self.lock_name(identity);
        self.run_named(name, timeout, body)
    }

    /// Run one invocation of a registered job, using its prefix and its
    /// effective timeout (the run-time override if set).
    ///
    /// The backend is the one this guard's coordinator was built with; the
    /// invocation's `strategy` setting only matters when choosing that
    /// coordinator (see `Config::guard_for`). A mismatch is logged.
    pub fn run_invocation<R, F>(
        &self,
        invocation: &JobInvocation,
        body: F,
    ) -> Result<Execution<R>, LockStrategyError>
    where
        F: FnOnce() -> R,
    {
        let requested = invocation.settings().strategy;
        if requested != self.coordinator.kind() {
            warn!(
                job = %invocation.identity().name(),
                requested = %requested,
                backend = %self.coordinator.kind(),
                "job asks for a different lock backend than this guard uses"
            );
        }

        let name = derive_lock_name(&invocation.settings().prefix, invocation.identity());
        self.run_named(name, invocation.effective_timeout(), body)
    }

    fn run_named<R, F>(
        &self,
        name: LockName,
        timeout: LockTimeout,
        body: F,
    ) -> Result<Execution<R>, LockStrategyError>
    where
        F: FnOnce() -> R,
    {
        let handle = match self.coordinator.acquire(&name, timeout)? {
            Acquisition::Held(handle) => handle,
            Acquisition::Denied => {
                info!(lock = %name, "{}", BUSY_MESSAGE);
                return Ok(Execution::Busy(name));
            }
        };

        debug!(lock = %name, "running job body");
        // A panic in `body` unwinds through `handle`, whose Drop releases.
        let output = body();

        if let Err(e) = handle.release() {
            warn!(lock = %name, error = %e, "failed to release lock after job finished");
        }

        Ok(Execution::Executed(output))
    }
}
