//! Implementation of the `jobmutex run` command.
//!
//! Resolves the job's registered lock settings, applies command-line
//! overrides, and runs the job's command as a child process while the lock
//! is held. The child's exit code becomes ours. Termination signals are
//! relayed to the child so the lock is still released when jobmutex is asked
//! to stop.

use super::signals::SignalForwarder;
use crate::cli::RunArgs;
use jobmutex::config::{Config, validate_name};
use jobmutex::error::{MutexError, Result};
use jobmutex::exit_codes;
use jobmutex::guard::{BUSY_MESSAGE, Execution};
use std::process::{Command, ExitStatus};
use tracing::{info, warn};

/// Execute the `jobmutex run` command.
pub fn cmd_run(config: &Config, args: RunArgs) -> Result<i32> {
    let mut definition = config.job_definition(&args.job)?;
    if let Some(strategy) = args.strategy {
        definition.lock.strategy = strategy;
    }
    if let Some(prefix) = args.prefix {
        validate_name("prefix", &prefix)?;
        definition.lock.prefix = prefix;
    }

    let command = if args.command.is_empty() {
        definition.command.clone().ok_or_else(|| {
            MutexError::UserError(format!(
                "no command for job '{}'.\n\n\
                 Pass one after `--`, e.g.:\n  jobmutex run {} -- <command> [args...]\n\n\
                 or set `jobs.{}.command` in the config file.",
                definition.name, definition.name, definition.name
            ))
        })?
    } else {
        args.command
    };

    let mut invocation = definition.invocation().with_params(args.params);
    if let Some(timeout) = args.timeout {
        invocation = invocation.with_timeout(timeout);
    }

    let guard = config.guard_for(&definition)?;
    let signals = SignalForwarder::install()?;
    match guard.run_invocation(&invocation, || run_child(&command, &signals))? {
        Execution::Executed(status) => status,
        Execution::Busy(_) => {
            println!("{}", BUSY_MESSAGE);
            Ok(i32::from(args.busy_exit_code))
        }
    }
}

/// Spawn `command` and wait for it, returning its exit code.
///
/// Signals caught by `signals` while the child runs are passed on to it. If
/// one arrived before the child could start, the child is not started.
fn run_child(command: &[String], signals: &SignalForwarder) -> Result<i32> {
    let (program, args) = command
        .split_first()
        .ok_or_else(|| MutexError::UserError("command is empty".to_string()))?;

    if let Some(signal) = signals.received() {
        warn!(signal, "stop requested before the job command started");
        return Ok(128 + signal);
    }

    info!(program = %program, "starting job command");
    let mut child = Command::new(program).args(args).spawn().map_err(|e| {
        MutexError::JobError(format!("failed to start '{}': {}", program, e))
    })?;

    signals.attach(child.id());
    let waited = child.wait();
    signals.detach();

    let status = waited.map_err(|e| {
        MutexError::JobError(format!("failed to wait for '{}': {}", program, e))
    })?;
    Ok(exit_code_of(status))
}

/// Exit code of a finished child. A child killed by a signal reports
/// 128 + signal number, as shells do.
fn exit_code_of(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }

    exit_codes::JOB_FAILURE
}
