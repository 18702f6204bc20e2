//! Implementation of the `jobmutex name` command.

use crate::cli::NameArgs;
use jobmutex::config::{Config, validate_name};
use jobmutex::error::Result;
use jobmutex::exit_codes;
use jobmutex::lock_name::{LockName, derive_lock_name};

/// Print the lock name for a job and its parameters.
pub fn cmd_name(config: &Config, args: NameArgs) -> Result<i32> {
    println!("{}", lock_name_for(config, args)?);
    Ok(exit_codes::SUCCESS)
}

fn lock_name_for(config: &Config, args: NameArgs) -> Result<LockName> {
    let mut definition = config.job_definition(&args.job)?;
    if let Some(prefix) = args.prefix {
        validate_name("prefix", &prefix)?;
        definition.lock.prefix = prefix;
    }

    let invocation = definition.invocation().with_params(args.params);
    Ok(derive_lock_name(
        &invocation.settings().prefix,
        invocation.identity(),
    ))
}
