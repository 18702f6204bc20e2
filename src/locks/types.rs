//! Information about lock files found on disk.

use super::metadata::LockMetadata;
use crate::lock_name::LockName;
use std::path::PathBuf;

/// Information about an active file lock.
#[derive(Debug, Clone)]
pub struct LockInfo {
    /// The lock file path.
    pub path: PathBuf,

    /// The lock name, recovered from the file name.
    pub name: LockName,

    /// The lock metadata.
    pub metadata: LockMetadata,

    /// Whether the lock is stale.
    pub is_stale: bool,

    /// The file's metadata could not be parsed. `metadata` then carries an
    /// unknown owner and the file's modification time.
    pub unreadable: bool,
}

impl std::fmt::Display for LockInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} (owner: {}, age: {}{}{})",
            self.name,
            self.metadata.owner,
            self.metadata.age_string(),
            if self.unreadable {
                ", unreadable metadata"
            } else {
                ""
            },
            if self.is_stale { ", STALE" } else { "" }
        )
    }
}
