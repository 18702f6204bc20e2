//! Config loading, validation, and job/strategy construction.

use super::model::Config;
use super::types::{DEFAULT_CONFIG_FILE, DEFAULT_STALE_MINUTES};
use crate::error::{MutexError, Result};
use crate::guard::JobExecutionGuard;
use crate::job::{JobDefinition, JobLockSettings};
use crate::locks::{
    CacheStrategy, DatabaseStrategy, FileStrategy, LockCoordinator, LockStrategy, RedisCache,
    StrategyKind,
};
use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use std::time::Duration;

/// Allowed characters for prefixes and job names. They end up in lock names,
/// which become file names and cache keys.
static NAME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.:-]+$").expect("Invalid name regex"));

impl Config {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            MutexError::UserError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load `path` if given, otherwise `jobmutex.yaml` from the working
    /// directory if present, otherwise the defaults.
    pub fn discover(path: Option<&Path>) -> Result<Self> {
        if let Some(path) = path {
            return Self::load(path);
        }

        let local = Path::new(DEFAULT_CONFIG_FILE);
        if local.is_file() {
            return Self::load(local);
        }

        Ok(Self::default())
    }

    /// Parse config from a YAML string.
    ///
    /// An empty document yields the defaults.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Config = if yaml.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(yaml)
                .map_err(|e| MutexError::UserError(format!("failed to parse config YAML: {}", e)))?
        };

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self)
            .map_err(|e| MutexError::UserError(format!("failed to serialize config to YAML: {}", e)))
    }

    /// Validate config values and return error on invalid values.
    ///
    /// Validation rules:
    /// - `prefix`, job names and job prefixes match `^[A-Za-z0-9_.:-]+$`
    /// - `poll_interval_ms` must be positive
    /// - `stale_minutes`, when set, must be positive
    /// - job `command` must split into at least one word
    pub fn validate(&self) -> Result<()> {
        validate_name("prefix", &self.prefix)?;

        if self.poll_interval_ms == 0 {
            return Err(MutexError::UserError(
                "config validation failed: poll_interval_ms must be greater than 0".to_string(),
            ));
        }

        if let Some(url) = &self.cache_url
            && url.trim().is_empty()
        {
            return Err(MutexError::UserError(
                "config validation failed: cache_url must not be empty".to_string(),
            ));
        }

        if self.stale_minutes == Some(0) {
            return Err(MutexError::UserError(
                "config validation failed: stale_minutes must be greater than 0".to_string(),
            ));
        }

        for (name, job) in &self.jobs {
            validate_name("job name", name)?;

            if let Some(prefix) = &job.prefix {
                validate_name(&format!("prefix of job '{}'", name), prefix)?;
            }

            if let Some(command) = &job.command {
                split_command(command).map_err(|e| {
                    MutexError::UserError(format!(
                        "config validation failed: command of job '{}': {}",
                        name, e
                    ))
                })?;
            }
        }

        Ok(())
    }

    /// Minutes after which `locks list` flags a lock as stale.
    pub fn display_stale_minutes(&self) -> u32 {
        self.stale_minutes.unwrap_or(DEFAULT_STALE_MINUTES)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn expiry(&self) -> Option<Duration> {
        self.stale_minutes
            .map(|minutes| Duration::from_secs(u64::from(minutes) * 60))
    }

    /// The registered definition of `name`.
    ///
    /// Jobs without an entry under `jobs:` get the top-level settings.
    pub fn job_definition(&self, name: &str) -> Result<JobDefinition> {
        validate_name("job name", name)?;

        let mut lock = JobLockSettings {
            strategy: self.strategy,
            timeout: self.timeout,
            prefix: self.prefix.clone(),
        };
        let mut command = None;

        if let Some(job) = self.jobs.get(name) {
            if let Some(strategy) = job.strategy {
                lock.strategy = strategy;
            }
            if let Some(timeout) = job.timeout {
                lock.timeout = timeout;
            }
            if let Some(prefix) = &job.prefix {
                lock.prefix = prefix.clone();
            }
            if let Some(line) = &job.command {
                command = Some(split_command(line).map_err(MutexError::UserError)?);
            }
        }

        Ok(JobDefinition {
            name: name.to_string(),
            lock,
            command,
        })
    }

    /// Construct the backend for `kind` from the backend settings.
    pub fn build_strategy(&self, kind: StrategyKind) -> Result<Box<dyn LockStrategy>> {
        let poll = self.poll_interval();
        let expiry = self.expiry();

        let strategy: Box<dyn LockStrategy> = match kind {
            StrategyKind::File => {
                let mut file = FileStrategy::new(&self.lock_dir).with_poll_interval(poll);
                if let Some(max_age) = expiry {
                    file = file.with_expiry(max_age);
                }
                Box::new(file)
            }
            StrategyKind::Database => {
                let mut database =
                    DatabaseStrategy::open(&self.database_path)?.with_poll_interval(poll);
                if let Some(ttl) = expiry {
                    database = database.with_expiry(ttl);
                }
                Box::new(database)
            }
            StrategyKind::Cache => {
                // An in-process store would not exclude other processes.
                let url = self.cache_url.as_deref().ok_or_else(|| {
                    MutexError::UserError(
                        "the cache strategy needs a shared cache server: set `cache_url` \
                         (e.g. redis://127.0.0.1/) in the config file"
                            .to_string(),
                    )
                })?;
                let mut cache = CacheStrategy::new(RedisCache::connect(url)?).with_poll_interval(poll);
                if let Some(ttl) = expiry {
                    cache = cache.with_ttl(ttl);
                }
                Box::new(cache)
            }
        };

        Ok(strategy)
    }

    /// A guard wired to `definition`'s strategy and prefix.
    pub fn guard_for(&self, definition: &JobDefinition) -> Result<JobExecutionGuard> {
        let strategy = self.build_strategy(definition.lock.strategy)?;
        Ok(JobExecutionGuard::new(LockCoordinator::from_boxed(strategy))
            .with_prefix(definition.lock.prefix.clone()))
    }
}

/// Check that `value` only uses characters allowed in lock names.
pub fn validate_name(what: &str, value: &str) -> Result<()> {
    if NAME_REGEX.is_match(value) {
        return Ok(());
    }
    Err(MutexError::UserError(format!(
        "invalid {} '{}' (allowed: letters, digits, '_', '.', ':', '-')",
        what, value
    )))
}

/// Split a shell-style command line into program and arguments.
pub(crate) fn split_command(line: &str) -> std::result::Result<Vec<String>, String> {
    let args = shell_words::split(line).map_err(|e| format!("failed to parse '{}': {}", line, e))?;
    if args.is_empty() {
        return Err("command is empty".to_string());
    }
    Ok(args)
}
