//! Locking subsystem for jobmutex.
//!
//! A [`LockStrategy`] claims and releases a named resource on a shared medium:
//! - [`FileStrategy`]: exclusive-create lock file per lock name
//! - [`DatabaseStrategy`]: row per lock name in a SQLite table
//! - [`CacheStrategy`]: add-if-absent cache entry per lock name
//!
//! Mutual exclusion between processes comes from the medium's atomic claim
//! primitive. Nothing here caches lock state in memory.
//!
//! # RAII Handles
//!
//! [`LockCoordinator::acquire`] returns a [`LockHandle`] when the lock is
//! granted. The handle releases the lock when dropped, so the lock goes away
//! on every exit path of the scope that holds it, including panics.

mod cache;
mod coordinator;
mod database;
mod file;
mod guard;
mod metadata;
mod operations;
mod strategy;
mod timeout;
mod types;

#[cfg(test)]
mod tests;

// Re-export public API
pub use cache::{CacheStore, CacheStrategy, MemoryCache, RedisCache};
pub use coordinator::{Acquisition, LockCoordinator, LockState};
pub use database::{DatabaseStrategy, LockRow};
pub use file::{FileStrategy, escape_file_stem, lock_path_in, unescape_file_stem};
pub use guard::LockHandle;
pub use metadata::LockMetadata;
pub use operations::{UNKNOWN_OWNER, clear_lock, list_locks, lock_info};
pub use strategy::{DEFAULT_POLL_INTERVAL, LockStrategy, StrategyKind};
pub use timeout::LockTimeout;
pub use types::LockInfo;
