//! Configuration types and defaults for jobmutex.
//!
//! This module defines the per-job entry type, constants, and default value
//! functions used by the Config struct.

use crate::locks::{LockTimeout, StrategyKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// File name looked up in the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "jobmutex.yaml";

/// Age in minutes after which `locks list` flags a lock as stale when
/// `stale_minutes` is not configured.
pub const DEFAULT_STALE_MINUTES: u32 = 120;

/// Settings registered for one job under `jobs:`.
///
/// Every field is optional; missing fields inherit the top-level value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct JobConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<StrategyKind>,

    /// Wait budget. A YAML `null` here means "inherit"; write `0` to force
    /// a single attempt.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout: Option<LockTimeout>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,

    /// Shell-style command line run by `jobmutex run` for this job.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

pub fn default_prefix() -> String {
    crate::lock_name::DEFAULT_PREFIX.to_string()
}

pub fn default_lock_dir() -> PathBuf {
    std::env::temp_dir().join("jobmutex")
}

pub fn default_database_path() -> PathBuf {
    default_lock_dir().join("locks.sqlite")
}

pub fn default_poll_interval_ms() -> u64 {
    100
}
