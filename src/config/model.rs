//! Config struct definition and default implementation.

use super::types::*;
use crate::locks::{LockTimeout, StrategyKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Configuration for jobmutex.
///
/// This struct represents the contents of `jobmutex.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // =========================================================================
    // Lock defaults
    // =========================================================================
    /// Lock-name prefix (default: "icmutex").
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// Backend used by jobs that do not pick one.
    #[serde(default)]
    pub strategy: StrategyKind,

    /// Wait budget used by jobs that do not set one (default: 0, try once).
    #[serde(default)]
    pub timeout: LockTimeout,

    // =========================================================================
    // Backend settings
    // =========================================================================
    /// Directory holding lock files for the file strategy.
    #[serde(default = "default_lock_dir")]
    pub lock_dir: PathBuf,

    /// SQLite database used by the database strategy.
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,

    /// Redis server used by the cache strategy, e.g. `redis://127.0.0.1/`.
    /// The cache strategy cannot be used without it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_url: Option<String>,

    /// Minutes after which a claim left by a dead holder may be taken over.
    /// Unset means claims never expire on their own.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stale_minutes: Option<u32>,

    /// Delay between attempts while waiting for a lock.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    // =========================================================================
    // Jobs
    // =========================================================================
    /// Registered jobs keyed by job name.
    #[serde(default)]
    pub jobs: BTreeMap<String, JobConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            strategy: StrategyKind::default(),
            timeout: LockTimeout::default(),
            lock_dir: default_lock_dir(),
            database_path: default_database_path(),
            cache_url: None,
            stale_minutes: None,
            poll_interval_ms: default_poll_interval_ms(),
            jobs: BTreeMap::new(),
        }
    }
}
