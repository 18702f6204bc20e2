//! Configuration model for jobmutex.
//!
//! This module defines the Config struct that represents `jobmutex.yaml`.
//! Unknown fields are ignored, optional fields fall back to defaults, and
//! values are validated after parsing. Per-job entries under `jobs:` are the
//! registration layer: they fix each job's strategy, timeout and prefix.

mod model;
mod operations;
pub mod types;


// Re-export public API
pub use model::Config;
pub use operations::validate_name;
pub use types::{DEFAULT_CONFIG_FILE, DEFAULT_STALE_MINUTES, JobConfig};
