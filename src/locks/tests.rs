//! Tests for the locks subsystem.

use super::*;
use crate::lock_name::LockName;
use crate::test_support::Recorder;
use chrono::{Duration as ChronoDuration, Utc};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};
use tempfile::TempDir;

fn name() -> LockName {
    LockName::new("icmutex-icm:generic-5c1e5b4a5e0ad0c7ac1d2a6c9a0e4d11")
}

fn fast_file(dir: &std::path::Path) -> FileStrategy {
    FileStrategy::new(dir).with_poll_interval(Duration::from_millis(10))
}

/// Run `contenders` strategies against one name at the same instant and
/// count how many win.
fn race<S, F>(contenders: usize, make: F) -> usize
where
    S: LockStrategy + 'static,
    F: Fn() -> S,
{
    let barrier = Arc::new(Barrier::new(contenders));
    let handles: Vec<_> = (0..contenders)
        .map(|_| {
            let strategy = make();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                strategy.acquire(&name(), LockTimeout::Millis(0)).unwrap()
            })
        })
        .collect();

    handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|won| *won)
        .count()
}

#[test]
fn exactly_one_file_contender_wins() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().to_path_buf();
    assert_eq!(race(8, || FileStrategy::new(dir.clone())), 1);
}

#[test]
fn exactly_one_contender_reclaims_expired_file() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().to_path_buf();

    for _ in 0..20 {
        let mut stale = LockMetadata::new(&name(), "dead-owner");
        stale.created_at = Utc::now() - ChronoDuration::minutes(10);
        std::fs::write(lock_path_in(&dir, &name()), stale.to_json().unwrap()).unwrap();

        let winners = race(8, || {
            FileStrategy::new(dir.clone()).with_expiry(Duration::from_secs(60))
        });
        assert_eq!(winners, 1);

        let meta = LockMetadata::from_file(lock_path_in(&dir, &name())).unwrap();
        assert_ne!(meta.token, "dead-owner");
    }
}

#[test]
fn exactly_one_database_contender_wins() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("locks.sqlite");
    // Create the schema before the race.
    DatabaseStrategy::open(&db_path).unwrap();
    assert_eq!(race(8, || DatabaseStrategy::open(&db_path).unwrap()), 1);
}

#[test]
fn exactly_one_cache_contender_wins() {
    let cache = MemoryCache::new();
    assert_eq!(race(8, || CacheStrategy::new(cache.clone())), 1);
}

#[test]
fn released_lock_can_be_taken_by_anyone() {
    let temp_dir = TempDir::new().unwrap();
    let first = FileStrategy::new(temp_dir.path());
    let second = FileStrategy::new(temp_dir.path());

    assert!(first.acquire(&name(), LockTimeout::Millis(0)).unwrap());
    first.release(&name()).unwrap();
    assert!(second.acquire(&name(), LockTimeout::Millis(0)).unwrap());
}

#[test]
fn try_once_returns_immediately_when_held() {
    let temp_dir = TempDir::new().unwrap();
    let holder = FileStrategy::new(temp_dir.path());
    let contender = FileStrategy::new(temp_dir.path());
    assert!(holder.try_acquire(&name()).unwrap());

    let start = Instant::now();
    assert!(!contender.acquire(&name(), LockTimeout::Millis(0)).unwrap());
    assert!(start.elapsed() < Duration::from_millis(100));
}

#[test]
fn wait_budget_expires_while_held() {
    let temp_dir = TempDir::new().unwrap();
    let holder = FileStrategy::new(temp_dir.path());
    let contender = fast_file(temp_dir.path());
    assert!(holder.try_acquire(&name()).unwrap());

    let start = Instant::now();
    assert!(!contender.acquire(&name(), LockTimeout::Millis(200)).unwrap());
    assert!(start.elapsed() >= Duration::from_millis(200));
}

#[test]
fn waiter_gets_lock_released_within_budget() {
    let temp_dir = TempDir::new().unwrap();
    let dir = temp_dir.path().to_path_buf();
    let holder = FileStrategy::new(&dir);
    assert!(holder.try_acquire(&name()).unwrap());

    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(500));
        holder.release(&name()).unwrap();
    });

    let contender = fast_file(&dir);
    let start = Instant::now();
    assert!(contender.acquire(&name(), LockTimeout::Millis(3000)).unwrap());
    let waited = start.elapsed();
    releaser.join().unwrap();

    assert!(waited >= Duration::from_millis(400));
    assert!(waited < Duration::from_millis(3000));
}

#[test]
fn unbounded_wait_returns_once_released() {
    let cache = MemoryCache::new();
    let holder = CacheStrategy::new(cache.clone());
    assert!(holder.try_acquire(&name()).unwrap());

    let releaser = thread::spawn(move || {
        thread::sleep(Duration::from_millis(100));
        holder.release(&name()).unwrap();
    });

    let contender = CacheStrategy::new(cache).with_poll_interval(Duration::from_millis(10));
    assert!(contender.acquire(&name(), LockTimeout::Unbounded).unwrap());
    releaser.join().unwrap();
}

#[test]
fn coordinator_grants_handle_and_releases_once() {
    let recorder = Recorder::new();
    let coordinator = LockCoordinator::new(recorder.clone());

    let acquisition = coordinator.acquire(&name(), LockTimeout::Millis(0)).unwrap();
    assert_eq!(acquisition.state(), LockState::Held);
    let handle = acquisition.into_handle().unwrap();
    assert_eq!(handle.name(), &name());
    assert!(recorder.is_held(&name()));

    handle.release().unwrap();
    assert_eq!(recorder.releases(), 1);
    assert!(!recorder.is_held(&name()));
}

#[test]
fn dropping_handle_releases() {
    let recorder = Recorder::new();
    let coordinator = LockCoordinator::new(recorder.clone());

    {
        let acquisition = coordinator.acquire(&name(), LockTimeout::Millis(0)).unwrap();
        assert!(acquisition.is_held());
    }

    assert_eq!(recorder.releases(), 1);
    assert!(!recorder.is_held(&name()));
}

#[test]
fn denied_acquisition_owes_no_release() {
    let recorder = Recorder::denying();
    let coordinator = LockCoordinator::new(recorder.clone());

    let acquisition = coordinator.acquire(&name(), LockTimeout::Millis(0)).unwrap();
    assert_eq!(acquisition.state(), LockState::Denied);
    assert!(acquisition.into_handle().is_none());
    assert_eq!(recorder.releases(), 0);
}

#[test]
fn backend_failure_is_an_error_not_a_denial() {
    let coordinator = LockCoordinator::new(Recorder::failing_acquire());

    let err = coordinator
        .acquire(&name(), LockTimeout::Millis(0))
        .unwrap_err();
    assert!(matches!(err, crate::error::LockStrategyError::Cache(_)));
}

#[test]
fn explicit_release_reports_backend_failure() {
    let recorder = Recorder::failing_release();
    let coordinator = LockCoordinator::new(recorder.clone());

    let handle = coordinator
        .acquire(&name(), LockTimeout::Millis(0))
        .unwrap()
        .into_handle()
        .unwrap();
    assert!(handle.release().is_err());
    assert_eq!(recorder.releases(), 1);
}

#[test]
fn coordinator_passes_timeout_through() {
    let recorder = Recorder::new();
    let coordinator = LockCoordinator::new(recorder.clone());

    let _held = coordinator.acquire(&name(), LockTimeout::Millis(3000)).unwrap();
    assert_eq!(recorder.timeouts(), vec![LockTimeout::Millis(3000)]);
    assert_eq!(coordinator.kind(), StrategyKind::Cache);
}

#[test]
fn coordinator_over_file_strategy_end_to_end() {
    let temp_dir = TempDir::new().unwrap();
    let coordinator = LockCoordinator::new(FileStrategy::new(temp_dir.path()));
    let rival = LockCoordinator::new(FileStrategy::new(temp_dir.path()));

    let held = coordinator.acquire(&name(), LockTimeout::Millis(0)).unwrap();
    assert!(held.is_held());
    assert!(!rival.acquire(&name(), LockTimeout::Millis(0)).unwrap().is_held());

    drop(held);
    assert!(rival.acquire(&name(), LockTimeout::Millis(0)).unwrap().is_held());
}

#[test]
fn list_locks_empty_for_missing_dir() {
    let temp_dir = TempDir::new().unwrap();
    let locks = list_locks(&temp_dir.path().join("missing"), 120).unwrap();
    assert!(locks.is_empty());
}

#[test]
fn list_locks_with_locks() {
    let temp_dir = TempDir::new().unwrap();
    let strategy = FileStrategy::new(temp_dir.path());
    let other = LockName::new("icmutex-icm:timeout-command-99914b932bd37a50b39c8a4efe1d5ea0");

    assert!(strategy.try_acquire(&name()).unwrap());
    assert!(strategy.try_acquire(&other).unwrap());
    std::fs::write(temp_dir.path().join("notes.txt"), "ignored").unwrap();
    std::fs::write(temp_dir.path().join("broken.lock"), "not json").unwrap();

    let locks = list_locks(temp_dir.path(), 120).unwrap();
    let names: Vec<&str> = locks.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["broken", name().as_str(), other.as_str()]);
    assert!(locks.iter().all(|l| !l.is_stale));
    assert!(locks[0].unreadable);
    assert!(!locks[1].unreadable);
}

#[test]
fn list_locks_reports_unreadable_lock_files() {
    let temp_dir = TempDir::new().unwrap();
    let path = lock_path_in(temp_dir.path(), &name());
    std::fs::write(&path, "").unwrap();

    let locks = list_locks(temp_dir.path(), 120).unwrap();
    assert_eq!(locks.len(), 1);
    assert_eq!(locks[0].name, name());
    assert_eq!(locks[0].metadata.owner, UNKNOWN_OWNER);
    assert_eq!(locks[0].metadata.pid, None);
    assert!(locks[0].unreadable);
    assert!(!locks[0].is_stale);
    assert!(locks[0].metadata.age() < ChronoDuration::minutes(1));
    assert!(locks[0].to_string().contains("unreadable metadata"));

    // Age comes from the file's modification time.
    let old = std::time::SystemTime::now() - std::time::Duration::from_secs(300 * 60);
    std::fs::File::options()
        .write(true)
        .open(&path)
        .unwrap()
        .set_modified(old)
        .unwrap();
    let locks = list_locks(temp_dir.path(), 120).unwrap();
    assert!(locks[0].is_stale);
}

#[test]
fn clear_lock_removes_unreadable_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = lock_path_in(temp_dir.path(), &name());
    std::fs::write(&path, "{\"truncated\": ").unwrap();

    let cleared = clear_lock(temp_dir.path(), &name(), 120).unwrap();
    assert!(cleared.unreadable);
    assert_eq!(cleared.metadata.owner, UNKNOWN_OWNER);
    assert!(!path.exists());
    assert!(lock_info(temp_dir.path(), &name(), 120).is_none());
}

#[test]
fn list_locks_detects_stale() {
    let temp_dir = TempDir::new().unwrap();

    let mut stale = LockMetadata::new(&name(), "gone");
    stale.created_at = Utc::now() - ChronoDuration::minutes(200);
    std::fs::write(
        lock_path_in(temp_dir.path(), &name()),
        stale.to_json().unwrap(),
    )
    .unwrap();

    let locks = list_locks(temp_dir.path(), 120).unwrap();
    assert_eq!(locks.len(), 1);
    assert_eq!(locks[0].name, name());
    assert!(locks[0].is_stale);
    assert!(locks[0].to_string().contains("STALE"));
}

#[test]
fn clear_lock_removes_file() {
    let temp_dir = TempDir::new().unwrap();
    let strategy = FileStrategy::new(temp_dir.path());
    assert!(strategy.try_acquire(&name()).unwrap());

    let cleared = clear_lock(temp_dir.path(), &name(), 120).unwrap();
    assert_eq!(cleared.name, name());
    assert!(!strategy.lock_path(&name()).exists());

    // The former holder's release is still harmless.
    strategy.release(&name()).unwrap();
}

#[test]
fn clear_lock_nonexistent_fails() {
    let temp_dir = TempDir::new().unwrap();
    let result = clear_lock(temp_dir.path(), &name(), 120);
    assert!(result.unwrap_err().to_string().contains("does not exist"));
}

#[test]
fn lock_info_display() {
    let temp_dir = TempDir::new().unwrap();
    let info = LockInfo {
        path: lock_path_in(temp_dir.path(), &name()),
        name: name(),
        metadata: LockMetadata::new(&name(), "tok"),
        is_stale: false,
        unreadable: false,
    };

    let display = info.to_string();
    assert!(display.contains(name().as_str()));
    assert!(!display.contains("STALE"));
}
