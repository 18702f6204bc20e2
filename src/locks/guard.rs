//! RAII lock handle implementation.

use super::coordinator::LockState;
use super::strategy::LockStrategy;
use crate::error::LockStrategyError;
use crate::lock_name::LockName;
use tracing::{debug, warn};

/// Proof of a held lock, owned by exactly one execution.
///
/// Release happens exactly once: either through [`LockHandle::release`], or,
/// if the handle is dropped without it (early return, panic unwinding), in
/// `Drop`. A failed release in `Drop` is logged as a warning; it does not
/// panic.
pub struct LockHandle<'a> {
    strategy: &'a dyn LockStrategy,
    name: LockName,
    released: bool,
}

impl<'a> LockHandle<'a> {
    pub(super) fn new(strategy: &'a dyn LockStrategy, name: LockName) -> Self {
        Self {
            strategy,
            name,
            released: false,
        }
    }

    /// The name of the held lock.
    pub fn name(&self) -> &LockName {
        &self.name
    }

    /// Release the lock now and report backend failures to the caller.
    pub fn release(mut self) -> Result<(), LockStrategyError> {
        self.released = true;
        debug!(lock = %self.name, state = %LockState::Released, "releasing lock");
        self.strategy.release(&self.name)
    }
}

impl std::fmt::Debug for LockHandle<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockHandle")
            .field("name", &self.name)
            .field("strategy", &self.strategy.kind())
            .field("released", &self.released)
            .finish()
    }
}

impl Drop for LockHandle<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        debug!(lock = %self.name, state = %LockState::Released, "releasing lock on drop");
        if let Err(e) = self.strategy.release(&self.name) {
            warn!(lock = %self.name, error = %e, "failed to release lock");
        }
    }
}
