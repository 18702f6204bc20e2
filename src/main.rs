//! Jobmutex: named, timed mutual exclusion for recurring jobs.
//!
//! This is the main entry point for the `jobmutex` CLI. It parses arguments,
//! installs logging, dispatches to the appropriate command handler, and maps
//! the outcome to an exit code.

mod cli;
mod commands;

use cli::Cli;
use jobmutex::logging;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse_args();
    logging::init(cli.verbose);

    match commands::dispatch(cli) {
        Ok(code) => ExitCode::from(code.clamp(0, 255) as u8),
        Err(err) => {
            // Print user-actionable error message to stderr
            eprintln!("Error: {}", err);

            // Return appropriate exit code
            ExitCode::from(err.exit_code() as u8)
        }
    }
}
