//! Command implementations for jobmutex.
//!
//! This module provides the dispatcher that routes CLI commands to their
//! implementations. Handlers return the process exit code on success so that
//! `run` can pass a child's exit code through.

mod locks;
mod name;
mod run;
mod signals;

use crate::cli::{Cli, Command, LocksAction};
use jobmutex::config::Config;
use jobmutex::error::Result;

/// Dispatch a command to its implementation.
///
/// Loads the config once and routes the command to its handler.
pub fn dispatch(cli: Cli) -> Result<i32> {
    let config = Config::discover(cli.config.as_deref())?;

    match cli.command {
        Command::Run(args) => run::cmd_run(&config, args),
        Command::Name(args) => name::cmd_name(&config, args),
        Command::Locks(locks_cmd) => match locks_cmd.action {
            LocksAction::List => locks::cmd_locks_list(&config),
            LocksAction::Clear(args) => locks::cmd_locks_clear(&config, args),
        },
    }
}
