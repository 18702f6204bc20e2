//! File-backed lock strategy.
//!
//! A lock is a file `<lock_dir>/<escaped name>.lock` created with
//! **create_new** semantics (exclusive create), so only one process can
//! create it. The file holds JSON [`LockMetadata`]; release deletes the file
//! only if its token belongs to this strategy instance.
//!
//! Reclaiming an expired file and owner-checked release both run under an
//! exclusive advisory lock on [`GUARD_FILE_NAME`] in the lock directory, so
//! no check-then-remove sequence can interleave with another. Plain creation
//! needs no guard: `create_new` never touches an existing file.
//!
//! Lock names may contain characters that are not portable in file names
//! (`icm:generic`), so the file stem is percent-escaped. The escaping is
//! injective, which keeps distinct lock names on distinct files.

use super::metadata::LockMetadata;
use super::strategy::{DEFAULT_POLL_INTERVAL, LockStrategy, StrategyKind, new_owner_token};
use crate::error::LockStrategyError;
use crate::lock_name::LockName;
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, warn};

/// Extension used for lock files.
pub const LOCK_FILE_EXTENSION: &str = "lock";

/// File in the lock directory whose advisory lock serializes reclaim and
/// release. Its extension keeps it out of lock listings.
pub const GUARD_FILE_NAME: &str = ".jobmutex.guard";

/// Lock strategy backed by exclusive-create files in one directory.
#[derive(Debug)]
pub struct FileStrategy {
    lock_dir: PathBuf,
    token: String,
    expire_after: Option<Duration>,
    poll_interval: Duration,
}

impl FileStrategy {
    /// Create a strategy that keeps its lock files in `lock_dir`.
    ///
    /// The directory is created on first acquire.
    pub fn new(lock_dir: impl Into<PathBuf>) -> Self {
        Self {
            lock_dir: lock_dir.into(),
            token: new_owner_token(),
            expire_after: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Treat lock files older than `max_age` as expired and reclaim them.
    pub fn with_expiry(mut self, max_age: Duration) -> Self {
        self.expire_after = Some(max_age);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn lock_dir(&self) -> &Path {
        &self.lock_dir
    }

    /// Path of the lock file for `name`.
    pub fn lock_path(&self, name: &LockName) -> PathBuf {
        lock_path_in(&self.lock_dir, name)
    }

    fn ensure_lock_dir(&self) -> Result<(), LockStrategyError> {
        fs::create_dir_all(&self.lock_dir).map_err(|e| {
            LockStrategyError::File(format!(
                "failed to create locks directory '{}': {}",
                self.lock_dir.display(),
                e
            ))
        })
    }

    /// Try to create the lock file. `Ok(false)` if it already exists.
    fn create_lock_file(&self, name: &LockName, path: &Path) -> Result<bool, LockStrategyError> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => return Ok(false),
            Err(e) => {
                return Err(LockStrategyError::File(format!(
                    "failed to create lock file '{}': {}",
                    path.display(),
                    e
                )));
            }
        };

        let json = LockMetadata::new(name, &self.token).to_json().inspect_err(|_| {
            let _ = fs::remove_file(path);
        })?;

        file.write_all(json.as_bytes()).map_err(|e| {
            // Clean up the lock file on write failure
            let _ = fs::remove_file(path);
            LockStrategyError::File(format!("failed to write lock metadata: {}", e))
        })?;

        file.sync_all().map_err(|e| {
            // Clean up the lock file on sync failure
            let _ = fs::remove_file(path);
            LockStrategyError::File(format!("failed to sync lock file: {}", e))
        })?;

        Ok(true)
    }

    /// Take the directory's exclusive advisory lock. It is held until the
    /// returned file is dropped.
    fn lock_guard(&self) -> Result<File, LockStrategyError> {
        let guard_path = self.lock_dir.join(GUARD_FILE_NAME);
        let guard = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&guard_path)
            .map_err(|e| {
                LockStrategyError::File(format!(
                    "failed to open guard file '{}': {}",
                    guard_path.display(),
                    e
                ))
            })?;

        FileExt::lock_exclusive(&guard).map_err(|e| {
            LockStrategyError::File(format!(
                "failed to lock guard file '{}': {}",
                guard_path.display(),
                e
            ))
        })?;
        Ok(guard)
    }

    /// Replace an expired lock file with a fresh one of ours. Returns true if
    /// the lock is now held.
    ///
    /// Expiry is re-checked under the guard, so of several contenders that
    /// saw the same expired file only the first replaces it; the rest find
    /// the fresh file and give up.
    fn reclaim_expired(
        &self,
        name: &LockName,
        path: &Path,
        max_age: Duration,
    ) -> Result<bool, LockStrategyError> {
        if !is_expired(path, max_age) {
            return Ok(false);
        }

        let _guard = self.lock_guard()?;
        if !is_expired(path, max_age) {
            return Ok(false);
        }

        match fs::remove_file(path) {
            Ok(()) => warn!(path = %path.display(), "reclaimed expired lock file"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                return Err(LockStrategyError::File(format!(
                    "failed to reclaim expired lock '{}': {}",
                    path.display(),
                    e
                )));
            }
        }

        // A contender without expiry may still win the create in between.
        self.create_lock_file(name, path)
    }
}

impl LockStrategy for FileStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::File
    }

    fn try_acquire(&self, name: &LockName) -> Result<bool, LockStrategyError> {
        self.ensure_lock_dir()?;
        let path = self.lock_path(name);

        if self.create_lock_file(name, &path)? {
            debug!(lock = %name, path = %path.display(), "lock file created");
            return Ok(true);
        }

        match self.expire_after {
            Some(max_age) => self.reclaim_expired(name, &path, max_age),
            None => Ok(false),
        }
    }

    fn release(&self, name: &LockName) -> Result<(), LockStrategyError> {
        let path = self.lock_path(name);
        if !path.exists() {
            return Ok(());
        }

        // Keeps a reclaimer from replacing the file between check and remove.
        let _guard = self.lock_guard()?;
        let ours = match read_metadata(&path) {
            Ok(Some(meta)) => meta.token == self.token,
            Ok(None) => return Ok(()),
            // Unparseable files are never ours: ours are fully written before
            // try_acquire returns.
            Err(_) => false,
        };

        if !ours {
            debug!(lock = %name, "release skipped, lock file is not held by this owner");
            return Ok(());
        }

        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LockStrategyError::File(format!(
                "failed to release lock '{}': {}",
                path.display(),
                e
            ))),
        }
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}

/// Path of the lock file for `name` inside `lock_dir`.
pub fn lock_path_in(lock_dir: &Path, name: &LockName) -> PathBuf {
    lock_dir.join(format!(
        "{}.{}",
        escape_file_stem(name.as_str()),
        LOCK_FILE_EXTENSION
    ))
}

/// Read lock metadata; `Ok(None)` when the file does not exist.
fn read_metadata(path: &Path) -> Result<Option<LockMetadata>, LockStrategyError> {
    match fs::metadata(path) {
        Ok(_) => LockMetadata::from_file(path).map(Some),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
        Err(e) => Err(LockStrategyError::File(format!(
            "failed to stat lock file '{}': {}",
            path.display(),
            e
        ))),
    }
}

/// Whether the lock file at `path` is older than `max_age`.
///
/// Age comes from the metadata timestamp, or from the file's modification
/// time when the metadata cannot be parsed (e.g. a holder crashed between
/// creating the file and writing it). A missing file is not expired.
fn is_expired(path: &Path, max_age: Duration) -> bool {
    match read_metadata(path) {
        Ok(Some(meta)) => meta.is_older_than(max_age),
        Ok(None) => false,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "falling back to mtime for lock age");
            let age = fs::metadata(path)
                .and_then(|m| m.modified())
                .ok()
                .and_then(|modified| modified.elapsed().ok());
            age.is_some_and(|age| age > max_age)
        }
    }
}

/// Percent-escape every byte outside `[A-Za-z0-9._-]`.
pub fn escape_file_stem(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for byte in name.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'.' | b'_' | b'-') {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{:02X}", byte));
        }
    }
    out
}

/// Inverse of [`escape_file_stem`]. `None` if `stem` is not a valid escape.
pub fn unescape_file_stem(stem: &str) -> Option<String> {
    let bytes = stem.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let hex = stem.get(i + 1..i + 3)?;
            out.push(u8::from_str_radix(hex, 16).ok()?);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn name() -> LockName {
        LockName::new("icmutex-icm:generic-0123")
    }

    #[test]
    fn escape_is_reversible_and_portable() {
        let escaped = escape_file_stem("icmutex-icm:generic-ab/c%");
        assert_eq!(escaped, "icmutex-icm%3Ageneric-ab%2Fc%25");
        assert_eq!(
            unescape_file_stem(&escaped).as_deref(),
            Some("icmutex-icm:generic-ab/c%")
        );
    }

    #[test]
    fn escape_keeps_distinct_names_distinct() {
        assert_ne!(escape_file_stem("a:b"), escape_file_stem("a_b"));
        assert_ne!(escape_file_stem("a:b"), escape_file_stem("a%3Ab"));
    }

    #[test]
    fn unescape_rejects_truncated_sequences() {
        assert_eq!(unescape_file_stem("abc%3"), None);
        assert_eq!(unescape_file_stem("abc%zz"), None);
    }

    #[test]
    fn acquire_creates_lock_file_with_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let strategy = FileStrategy::new(temp_dir.path().join("locks"));

        assert!(strategy.try_acquire(&name()).unwrap());

        let path = strategy.lock_path(&name());
        assert!(path.exists());
        let meta = LockMetadata::from_file(&path).unwrap();
        assert_eq!(meta.lock, name().as_str());
        assert_eq!(meta.pid, Some(std::process::id()));

        strategy.release(&name()).unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn second_owner_is_denied_and_cannot_release() {
        let temp_dir = TempDir::new().unwrap();
        let first = FileStrategy::new(temp_dir.path());
        let second = FileStrategy::new(temp_dir.path());

        assert!(first.try_acquire(&name()).unwrap());
        assert!(!second.try_acquire(&name()).unwrap());

        second.release(&name()).unwrap();
        assert!(first.lock_path(&name()).exists());

        first.release(&name()).unwrap();
        assert!(second.try_acquire(&name()).unwrap());
    }

    #[test]
    fn release_without_lock_file_is_noop() {
        let temp_dir = TempDir::new().unwrap();
        let strategy = FileStrategy::new(temp_dir.path().join("never-created"));

        strategy.release(&name()).unwrap();
        strategy.release(&name()).unwrap();
    }

    #[test]
    fn corrupt_lock_file_counts_as_held() {
        let temp_dir = TempDir::new().unwrap();
        let strategy = FileStrategy::new(temp_dir.path()).with_expiry(Duration::from_secs(1));
        fs::write(strategy.lock_path(&name()), "not json").unwrap();

        assert!(!strategy.try_acquire(&name()).unwrap());
        strategy.release(&name()).unwrap();
        assert!(strategy.lock_path(&name()).exists());
    }

    #[test]
    fn expired_lock_file_is_reclaimed() {
        let temp_dir = TempDir::new().unwrap();
        let strategy = FileStrategy::new(temp_dir.path()).with_expiry(Duration::from_secs(60));

        let mut stale = LockMetadata::new(&name(), "dead-owner");
        stale.created_at = Utc::now() - chrono::Duration::minutes(10);
        fs::write(strategy.lock_path(&name()), stale.to_json().unwrap()).unwrap();

        assert!(strategy.try_acquire(&name()).unwrap());
        let meta = LockMetadata::from_file(strategy.lock_path(&name())).unwrap();
        assert_ne!(meta.token, "dead-owner");

        // Only the lock file and the guard file remain.
        let mut entries: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        entries.sort();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0], GUARD_FILE_NAME);
    }

    #[test]
    fn reclaim_waits_for_guard_and_rechecks_expiry() {
        let temp_dir = TempDir::new().unwrap();
        let first = FileStrategy::new(temp_dir.path()).with_expiry(Duration::from_secs(60));
        let second = FileStrategy::new(temp_dir.path()).with_expiry(Duration::from_secs(60));

        let mut stale = LockMetadata::new(&name(), "dead-owner");
        stale.created_at = Utc::now() - chrono::Duration::minutes(10);
        fs::write(first.lock_path(&name()), stale.to_json().unwrap()).unwrap();

        // `second` sees the expired file but blocks on the guard while
        // `first` reclaims it.
        let held = first.lock_guard().unwrap();
        let contender = std::thread::spawn(move || second.try_acquire(&name()).unwrap());
        std::thread::sleep(Duration::from_millis(100));
        assert!(!contender.is_finished());

        fs::remove_file(first.lock_path(&name())).unwrap();
        assert!(first.create_lock_file(&name(), &first.lock_path(&name())).unwrap());
        drop(held);

        assert!(!contender.join().unwrap());
        let meta = LockMetadata::from_file(first.lock_path(&name())).unwrap();
        assert_eq!(meta.token, first.token);
    }

    #[test]
    fn release_waits_for_guard() {
        let temp_dir = TempDir::new().unwrap();
        let holder = FileStrategy::new(temp_dir.path());
        assert!(holder.try_acquire(&name()).unwrap());
        let path = holder.lock_path(&name());

        let other = FileStrategy::new(temp_dir.path());
        let held = other.lock_guard().unwrap();
        let releaser = std::thread::spawn(move || holder.release(&name()).unwrap());
        std::thread::sleep(Duration::from_millis(100));
        assert!(!releaser.is_finished());
        assert!(path.exists());

        drop(held);
        releaser.join().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn fresh_lock_file_is_not_reclaimed() {
        let temp_dir = TempDir::new().unwrap();
        let holder = FileStrategy::new(temp_dir.path());
        let contender = FileStrategy::new(temp_dir.path()).with_expiry(Duration::from_secs(60));

        assert!(holder.try_acquire(&name()).unwrap());
        assert!(!contender.try_acquire(&name()).unwrap());
    }

    #[test]
    fn without_expiry_old_lock_files_are_kept() {
        let temp_dir = TempDir::new().unwrap();
        let strategy = FileStrategy::new(temp_dir.path());

        let mut stale = LockMetadata::new(&name(), "dead-owner");
        stale.created_at = Utc::now() - chrono::Duration::days(2);
        fs::write(strategy.lock_path(&name()), stale.to_json().unwrap()).unwrap();

        assert!(!strategy.try_acquire(&name()).unwrap());
    }
}
