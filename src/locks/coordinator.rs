//! Acquire-with-timeout over an injected strategy.

use super::guard::LockHandle;
use super::strategy::{LockStrategy, StrategyKind};
use super::timeout::LockTimeout;
use crate::error::LockStrategyError;
use crate::lock_name::LockName;
use std::fmt;
use tracing::debug;

/// Lifecycle of one acquisition attempt.
///
/// `Idle → Attempting → {Held, Denied}`, then `Held → Released` once the
/// handle is released or dropped. `Denied` is terminal and owes no release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockState {
    Idle,
    Attempting,
    Held,
    Denied,
    Released,
}

impl fmt::Display for LockState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LockState::Idle => "idle",
            LockState::Attempting => "attempting",
            LockState::Held => "held",
            LockState::Denied => "denied",
            LockState::Released => "released",
        };
        f.write_str(s)
    }
}

/// Result of [`LockCoordinator::acquire`].
#[derive(Debug)]
pub enum Acquisition<'a> {
    /// The lock is ours until the handle is released or dropped.
    Held(LockHandle<'a>),
    /// Another holder is present and the wait budget ran out.
    Denied,
}

impl<'a> Acquisition<'a> {
    pub fn state(&self) -> LockState {
        match self {
            Acquisition::Held(_) => LockState::Held,
            Acquisition::Denied => LockState::Denied,
        }
    }

    pub fn is_held(&self) -> bool {
        matches!(self, Acquisition::Held(_))
    }

    pub fn into_handle(self) -> Option<LockHandle<'a>> {
        match self {
            Acquisition::Held(handle) => Some(handle),
            Acquisition::Denied => None,
        }
    }
}

/// Owns a lock strategy and hands out scoped lock handles.
///
/// The coordinator keeps no lock state of its own; every call goes to the
/// backing medium.
pub struct LockCoordinator {
    strategy: Box<dyn LockStrategy>,
}

impl LockCoordinator {
    pub fn new(strategy: impl LockStrategy + 'static) -> Self {
        Self::from_boxed(Box::new(strategy))
    }

    pub fn from_boxed(strategy: Box<dyn LockStrategy>) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> &dyn LockStrategy {
        self.strategy.as_ref()
    }

    pub fn kind(&self) -> StrategyKind {
        self.strategy.kind()
    }

    /// Try to acquire `name`, waiting at most `timeout`.
    ///
    /// Backend failures are returned as errors and never reported as
    /// [`Acquisition::Denied`].
    pub fn acquire(
        &self,
        name: &LockName,
        timeout: LockTimeout,
    ) -> Result<Acquisition<'_>, LockStrategyError> {
        debug!(
            lock = %name,
            strategy = %self.kind(),
            %timeout,
            state = %LockState::Attempting,
            "acquiring lock"
        );

        let acquired = self.strategy.acquire(name, timeout)?;
        let acquisition = if acquired {
            Acquisition::Held(LockHandle::new(self.strategy.as_ref(), name.clone()))
        } else {
            Acquisition::Denied
        };

        debug!(lock = %name, state = %acquisition.state(), "acquire finished");
        Ok(acquisition)
    }
}

impl fmt::Debug for LockCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockCoordinator")
            .field("strategy", &self.kind())
            .finish()
    }
}
