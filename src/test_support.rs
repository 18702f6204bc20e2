use crate::error::LockStrategyError;
use crate::lock_name::LockName;
use crate::locks::{LockStrategy, LockTimeout, StrategyKind};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};

static CWD_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub(crate) struct DirGuard {
    original: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

impl DirGuard {
    pub(crate) fn new(new_dir: &Path) -> Self {
        // Changing the process current working directory is global and not thread-safe.
        // Lock it so tests don't race even if a #[serial] annotation is missed.
        let lock = CWD_LOCK.lock().unwrap_or_else(|poison| poison.into_inner());
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(new_dir).unwrap();
        Self {
            original,
            _lock: lock,
        }
    }
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.original);
    }
}

#[derive(Default)]
struct RecorderState {
    held: Mutex<HashSet<String>>,
    acquires: AtomicUsize,
    releases: AtomicUsize,
    timeouts: Mutex<Vec<LockTimeout>>,
    deny: AtomicBool,
    fail_acquire: AtomicBool,
    fail_release: AtomicBool,
}

/// In-memory strategy that records every call. Clones share state, so a test
/// can keep one clone while the coordinator owns another.
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    state: Arc<RecorderState>,
}

impl Recorder {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Every acquire reports another holder.
    pub(crate) fn denying() -> Self {
        let recorder = Self::default();
        recorder.state.deny.store(true, Ordering::SeqCst);
        recorder
    }

    /// Every acquire fails as if the medium were unreachable.
    pub(crate) fn failing_acquire() -> Self {
        let recorder = Self::default();
        recorder.state.fail_acquire.store(true, Ordering::SeqCst);
        recorder
    }

    /// Acquire works, release fails.
    pub(crate) fn failing_release() -> Self {
        let recorder = Self::default();
        recorder.state.fail_release.store(true, Ordering::SeqCst);
        recorder
    }

    pub(crate) fn acquires(&self) -> usize {
        self.state.acquires.load(Ordering::SeqCst)
    }

    pub(crate) fn releases(&self) -> usize {
        self.state.releases.load(Ordering::SeqCst)
    }

    pub(crate) fn timeouts(&self) -> Vec<LockTimeout> {
        self.state.timeouts.lock().unwrap().clone()
    }

    pub(crate) fn is_held(&self, name: &LockName) -> bool {
        self.state.held.lock().unwrap().contains(name.as_str())
    }
}

impl LockStrategy for Recorder {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Cache
    }

    fn try_acquire(&self, name: &LockName) -> Result<bool, LockStrategyError> {
        if self.state.fail_acquire.load(Ordering::SeqCst) {
            return Err(LockStrategyError::Cache("connection refused".to_string()));
        }
        if self.state.deny.load(Ordering::SeqCst) {
            return Ok(false);
        }
        Ok(self.state.held.lock().unwrap().insert(name.to_string()))
    }

    fn release(&self, name: &LockName) -> Result<(), LockStrategyError> {
        self.state.releases.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_release.load(Ordering::SeqCst) {
            return Err(LockStrategyError::Cache("connection reset".to_string()));
        }
        self.state.held.lock().unwrap().remove(name.as_str());
        Ok(())
    }

    fn acquire(&self, name: &LockName, timeout: LockTimeout) -> Result<bool, LockStrategyError> {
        self.state.acquires.fetch_add(1, Ordering::SeqCst);
        self.state.timeouts.lock().unwrap().push(timeout);
        self.try_acquire(name)
    }
}
