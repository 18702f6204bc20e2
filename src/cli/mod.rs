//! CLI argument parsing for jobmutex.
//!
//! Uses clap derive macros for declarative argument definitions.
//! This module defines the command structure; actual implementations
//! are in the `commands` module.

use clap::{ArgAction, Parser, Subcommand};
use jobmutex::exit_codes;
use jobmutex::locks::{LockTimeout, StrategyKind};
use std::path::PathBuf;

/// Jobmutex: keep recurring jobs from overlapping.
///
/// Each run of a job takes a named lock derived from the job name and its
/// parameters. A second run with the same name and parameters finds the
/// lock held and exits without doing anything.
#[derive(Parser, Debug)]
#[command(name = "jobmutex")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Config file (default: ./jobmutex.yaml when present).
    #[arg(long, short = 'c', global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// More log output (-v info, -vv debug). JOBMUTEX_LOG overrides.
    #[arg(long, short = 'v', global = true, action = ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands for jobmutex.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a job's command under its lock.
    ///
    /// If another run with the same job name and parameters holds the lock,
    /// prints "Command is running now!" and exits with --busy-exit-code.
    Run(RunArgs),

    /// Print the lock name a job run would use.
    Name(NameArgs),

    /// Lock file management commands.
    ///
    /// List or clear locks held through the file strategy.
    Locks(LocksCommand),
}

/// Arguments for the `run` command.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Job name, e.g. "icm:generic".
    pub job: String,

    /// Run parameter that distinguishes runs of the job (repeatable).
    #[arg(long = "param", short = 'p', value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Wait budget in milliseconds, or "unbounded". Overrides the config.
    #[arg(long, short = 't', value_name = "MS|unbounded")]
    pub timeout: Option<LockTimeout>,

    /// Lock backend: file, database (mysql, sqlite) or cache (redis, memcached).
    #[arg(long, short = 's', value_parser = parse_strategy)]
    pub strategy: Option<StrategyKind>,

    /// Lock-name prefix. Overrides the config.
    #[arg(long)]
    pub prefix: Option<String>,

    /// Exit code when another run holds the lock.
    #[arg(long, default_value_t = exit_codes::BUSY_DEFAULT as u8)]
    pub busy_exit_code: u8,

    /// Command to run. Defaults to the job's configured command.
    #[arg(last = true, value_name = "COMMAND")]
    pub command: Vec<String>,
}

/// Arguments for the `name` command.
#[derive(Parser, Debug)]
pub struct NameArgs {
    /// Job name.
    pub job: String,

    /// Run parameter (repeatable).
    #[arg(long = "param", short = 'p', value_name = "KEY=VALUE", value_parser = parse_param)]
    pub params: Vec<(String, String)>,

    /// Lock-name prefix. Overrides the config.
    #[arg(long)]
    pub prefix: Option<String>,
}

/// Lock subcommand wrapper.
#[derive(Parser, Debug)]
pub struct LocksCommand {
    #[command(subcommand)]
    pub action: LocksAction,
}

/// Available lock actions.
#[derive(Subcommand, Debug)]
pub enum LocksAction {
    /// List lock files with their owner and age.
    List,

    /// Remove a lock file.
    ///
    /// Locks that are not stale are only removed with --force.
    Clear(LocksClearArgs),
}

/// Arguments for the `locks clear` command.
#[derive(Parser, Debug)]
pub struct LocksClearArgs {
    /// Full lock name as shown by `jobmutex locks list`.
    pub lock_name: String,

    /// Clear the lock even if it is not stale.
    #[arg(long)]
    pub force: bool,
}

/// Parse a `KEY=VALUE` run parameter. The value may itself contain `=`.
fn parse_param(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("invalid parameter '{}': expected KEY=VALUE", s)),
    }
}

fn parse_strategy(s: &str) -> Result<StrategyKind, String> {
    StrategyKind::from_str(s).ok_or_else(|| {
        format!(
            "unknown strategy '{}': expected file, database, mysql, sqlite, cache, redis or memcached",
            s
        )
    })
}

impl Cli {
    /// Parse command-line arguments.
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
