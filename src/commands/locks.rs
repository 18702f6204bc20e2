//! Implementation of the `jobmutex locks` commands.

use crate::cli::LocksClearArgs;
use jobmutex::config::Config;
use jobmutex::error::{MutexError, Result};
use jobmutex::exit_codes;
use jobmutex::lock_name::LockName;
use jobmutex::locks;
use tracing::warn;

pub fn cmd_locks_list(config: &Config) -> Result<i32> {
    let stale_minutes = config.display_stale_minutes();
    let locks = locks::list_locks(&config.lock_dir, stale_minutes)?;

    if locks.is_empty() {
        println!("No active locks in {}.", config.lock_dir.display());
        return Ok(exit_codes::SUCCESS);
    }

    println!("Active locks ({}):", locks.len());
    println!();

    for lock in &locks {
        println!("  {}:", lock.name);
        println!("    Owner:      {}", lock.metadata.owner);
        if lock.unreadable {
            println!("    Metadata:   unreadable (age taken from file modification time)");
        }
        if let Some(pid) = lock.metadata.pid {
            println!("    PID:        {}", pid);
        }
        println!(
            "    Created:    {}",
            lock.metadata.created_at.format("%Y-%m-%d %H:%M:%S UTC")
        );
        println!("    Age:        {}", lock.metadata.age_string());
        if lock.is_stale {
            println!("    Status:     STALE (exceeds {} min threshold)", stale_minutes);
        }
        println!("    Path:       {}", lock.path.display());
        println!();
    }

    let stale_count = locks.iter().filter(|l| l.is_stale).count();
    if stale_count > 0 {
        println!(
            "Note: {} lock(s) are stale. Use `jobmutex locks clear <lock-name>` to clear.",
            stale_count
        );
    }

    Ok(exit_codes::SUCCESS)
}

pub fn cmd_locks_clear(config: &Config, args: LocksClearArgs) -> Result<i32> {
    let name = LockName::new(args.lock_name);
    let stale_minutes = config.display_stale_minutes();

    // Missing files fall through to clear_lock, which reports them.
    if !args.force
        && let Some(info) = locks::lock_info(&config.lock_dir, &name, stale_minutes)
        && !info.is_stale
    {
        return Err(MutexError::UserError(format!(
            "refusing to clear lock '{}' that is not stale.\n\n\
             Clearing a live lock lets a second run of the job start while the first \
             is still working.\n\
             Only clear locks if you are certain the holder has died.\n\n\
             To clear the lock anyway, run:\n  jobmutex locks clear {} --force",
            name, name
        )));
    }

    let cleared = locks::clear_lock(&config.lock_dir, &name, stale_minutes)?;
    if !cleared.is_stale {
        warn!(lock = %cleared.name, owner = %cleared.metadata.owner, "cleared a lock that was not stale");
    }

    println!("Cleared lock: {}", cleared);
    Ok(exit_codes::SUCCESS)
}
