//! Listing and clearing lock files.
//!
//! These work directly on a lock directory and are meant for operators
//! dealing with stale locks left by killed processes. They bypass owner
//! checks, so callers decide whether clearing is appropriate.

use super::file::{LOCK_FILE_EXTENSION, lock_path_in, unescape_file_stem};
use super::metadata::LockMetadata;
use super::types::LockInfo;
use crate::error::{MutexError, Result};
use crate::lock_name::LockName;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};

/// Owner shown for lock files whose metadata cannot be read.
pub const UNKNOWN_OWNER: &str = "unknown";

/// List all lock files in `lock_dir`, sorted by name.
///
/// Files that are not lock files are skipped. Lock files with empty or
/// corrupt metadata are listed with an unknown owner and their modification
/// time as creation time, since they still block acquisition.
pub fn list_locks(lock_dir: &Path, stale_minutes: u32) -> Result<Vec<LockInfo>> {
    let mut locks = Vec::new();

    if !lock_dir.exists() {
        return Ok(locks);
    }

    let entries = fs::read_dir(lock_dir).map_err(|e| {
        MutexError::UserError(format!(
            "failed to read locks directory '{}': {}",
            lock_dir.display(),
            e
        ))
    })?;

    for entry in entries {
        let entry = entry.map_err(|e| {
            MutexError::UserError(format!("failed to read locks directory entry: {}", e))
        })?;

        let path = entry.path();

        if path.extension().and_then(|e| e.to_str()) != Some(LOCK_FILE_EXTENSION) {
            continue;
        }

        let Some(name) = path
            .file_stem()
            .and_then(|s| s.to_str())
            .and_then(unescape_file_stem)
        else {
            continue;
        };

        locks.push(read_lock_info(path, LockName::new(name), stale_minutes));
    }

    locks.sort_by(|a, b| a.name.cmp(&b.name));

    Ok(locks)
}

/// Information about the lock file for `name`, if there is one.
pub fn lock_info(lock_dir: &Path, name: &LockName, stale_minutes: u32) -> Option<LockInfo> {
    let lock_path = lock_path_in(lock_dir, name);
    lock_path
        .exists()
        .then(|| read_lock_info(lock_path, name.clone(), stale_minutes))
}

/// Remove the lock file for `name` regardless of who holds it. Files with
/// unreadable metadata are removed too.
///
/// Returns the cleared lock's information for reporting.
pub fn clear_lock(lock_dir: &Path, name: &LockName, stale_minutes: u32) -> Result<LockInfo> {
    let lock_path = lock_path_in(lock_dir, name);

    let lock_info = lock_info(lock_dir, name, stale_minutes).ok_or_else(|| {
        MutexError::UserError(format!(
            "lock '{}' does not exist at: {}",
            name,
            lock_path.display()
        ))
    })?;

    fs::remove_file(&lock_path).map_err(|e| {
        MutexError::UserError(format!(
            "failed to clear lock '{}': {}",
            lock_path.display(),
            e
        ))
    })?;

    Ok(lock_info)
}

fn read_lock_info(path: PathBuf, name: LockName, stale_minutes: u32) -> LockInfo {
    let (metadata, unreadable) = match LockMetadata::from_file(&path) {
        Ok(meta) => (meta, false),
        Err(_) => {
            let modified = fs::metadata(&path)
                .and_then(|m| m.modified())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(|_| Utc::now());
            let meta = LockMetadata {
                lock: name.to_string(),
                owner: UNKNOWN_OWNER.to_string(),
                token: String::new(),
                pid: None,
                created_at: modified,
            };
            (meta, true)
        }
    };

    let is_stale = metadata.is_stale(stale_minutes);
    LockInfo {
        path,
        name,
        metadata,
        is_stale,
        unreadable,
    }
}
