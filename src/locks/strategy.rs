//! The lock strategy capability and strategy selection.

use super::timeout::LockTimeout;
use crate::error::LockStrategyError;
use crate::lock_name::LockName;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Interval between claim attempts while waiting for a held lock.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Backing medium for a job's lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Exclusive-create lock file (default).
    #[default]
    File,
    /// Row in a SQLite locks table.
    #[serde(alias = "mysql", alias = "sqlite")]
    Database,
    /// Add-if-absent cache entry.
    #[serde(alias = "redis", alias = "memcached")]
    Cache,
}

impl StrategyKind {
    /// Parse a strategy kind, accepting the backend aliases too.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "file" => Some(Self::File),
            "database" | "mysql" | "sqlite" => Some(Self::Database),
            "cache" | "redis" | "memcached" => Some(Self::Cache),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::File => "file",
            StrategyKind::Database => "database",
            StrategyKind::Cache => "cache",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Atomic claim/release of a named resource on a shared medium.
///
/// Implementations must make `try_acquire` a single atomic "claim if
/// unclaimed" on the medium; mutual exclusion between processes rests
/// entirely on that primitive. `release` must be idempotent and must never
/// remove a claim made by a different owner.
pub trait LockStrategy: Send + Sync {
    /// Which medium this strategy uses.
    fn kind(&self) -> StrategyKind;

    /// One claim attempt. `Ok(false)` means another holder is present.
    fn try_acquire(&self, name: &LockName) -> Result<bool, LockStrategyError>;

    /// Drop this owner's claim on `name`, if it has one.
    fn release(&self, name: &LockName) -> Result<(), LockStrategyError>;

    fn poll_interval(&self) -> Duration {
        DEFAULT_POLL_INTERVAL
    }

    /// Claim `name`, waiting up to `timeout` for the current holder to go away.
    ///
    /// Returns `Ok(false)` only when the budget ran out with the lock still
    /// held elsewhere. With [`LockTimeout::Unbounded`] this never returns
    /// `Ok(false)`.
    fn acquire(&self, name: &LockName, timeout: LockTimeout) -> Result<bool, LockStrategyError> {
        let deadline = timeout.as_duration().map(|budget| Instant::now() + budget);
        let poll = self.poll_interval();

        loop {
            if self.try_acquire(name)? {
                return Ok(true);
            }

            let pause = match deadline {
                None => poll,
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Ok(false);
                    }
                    poll.min(deadline - now)
                }
            };
            std::thread::sleep(pause);
        }
    }
}

/// Get the owner string for lock metadata (e.g. `user@HOST`).
pub(crate) fn get_owner_string() -> String {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string());

    let host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    format!("{}@{}", user, host)
}

static NEXT_OWNER_SEQ: AtomicU64 = AtomicU64::new(0);

/// A token unique to one strategy instance: `user@HOST:pid:seq`.
///
/// Two strategy instances never share a token, even inside one process, so a
/// claim is only ever released by the instance that made it.
pub(crate) fn new_owner_token() -> String {
    let seq = NEXT_OWNER_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("{}:{}:{}", get_owner_string(), std::process::id(), seq)
}
