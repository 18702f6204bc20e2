//! Job identity and job definitions.
//!
//! A [`JobIdentity`] is what two overlapping runs must agree on to collide:
//! the job name plus its scalar parameters. A [`JobDefinition`] is the static,
//! registration-time lock configuration for one job, and a [`JobInvocation`]
//! is one run of that job with its parameters and an optional run-time
//! timeout override.

use crate::locks::{LockTimeout, StrategyKind};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A scalar job parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

impl From<&str> for Scalar {
    fn from(value: &str) -> Self {
        Scalar::String(value.to_string())
    }
}

impl From<String> for Scalar {
    fn from(value: String) -> Self {
        Scalar::String(value)
    }
}

impl From<bool> for Scalar {
    fn from(value: bool) -> Self {
        Scalar::Bool(value)
    }
}

impl From<i64> for Scalar {
    fn from(value: i64) -> Self {
        Scalar::Int(value)
    }
}

impl From<i32> for Scalar {
    fn from(value: i32) -> Self {
        Scalar::Int(value.into())
    }
}

impl From<f64> for Scalar {
    fn from(value: f64) -> Self {
        Scalar::Float(value)
    }
}

impl<T: Into<Scalar>> From<Option<T>> for Scalar {
    fn from(value: Option<T>) -> Self {
        value.map_or(Scalar::Null, Into::into)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scalar::Null => write!(f, "null"),
            Scalar::Bool(b) => write!(f, "{}", b),
            Scalar::Int(i) => write!(f, "{}", i),
            Scalar::Float(x) => write!(f, "{}", x),
            Scalar::String(s) => write!(f, "{}", s),
        }
    }
}

/// Identity of one job run for locking purposes.
///
/// Parameters are kept in a `BTreeMap`, so their serialization is always
/// key-sorted no matter the order they were inserted in.
#[derive(Debug, Clone, PartialEq)]
pub struct JobIdentity {
    name: String,
    parameters: BTreeMap<String, Scalar>,
}

impl JobIdentity {
    /// Create an identity with no parameters.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: BTreeMap::new(),
        }
    }

    /// Add (or replace) a parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Add every pair from an iterator of parameters.
    pub fn with_params<K, V, I>(mut self, params: I) -> Self
    where
        K: Into<String>,
        V: Into<Scalar>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.parameters
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    /// The job name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The parameters in key order.
    pub fn parameters(&self) -> &BTreeMap<String, Scalar> {
        &self.parameters
    }
}

/// Lock settings fixed when a job is registered.
#[derive(Debug, Clone, PartialEq)]
pub struct JobLockSettings {
    /// Backend used for this job's lock.
    pub strategy: StrategyKind,

    /// Wait budget used when the run does not override it.
    pub timeout: LockTimeout,

    /// Lock-name prefix.
    pub prefix: String,
}

impl Default for JobLockSettings {
    fn default() -> Self {
        Self {
            strategy: StrategyKind::default(),
            timeout: LockTimeout::default(),
            prefix: crate::lock_name::DEFAULT_PREFIX.to_string(),
        }
    }
}

/// A registered job: its name and its static lock settings.
#[derive(Debug, Clone, PartialEq)]
pub struct JobDefinition {
    pub name: String,
    pub lock: JobLockSettings,

    /// Command line the CLI runner executes for this job, if configured.
    pub command: Option<Vec<String>>,
}

impl JobDefinition {
    /// Define a job with default lock settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lock: JobLockSettings::default(),
            command: None,
        }
    }

    /// Set the lock strategy.
    pub fn with_strategy(mut self, strategy: StrategyKind) -> Self {
        self.lock.strategy = strategy;
        self
    }

    /// Set the static timeout.
    pub fn with_timeout(mut self, timeout: LockTimeout) -> Self {
        self.lock.timeout = timeout;
        self
    }

    /// Set the lock-name prefix.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.lock.prefix = prefix.into();
        self
    }

    /// Start a run of this job with no parameters.
    pub fn invocation(&self) -> JobInvocation {
        JobInvocation {
            identity: JobIdentity::new(self.name.clone()),
            settings: self.lock.clone(),
            timeout_override: None,
        }
    }
}

/// One run of a registered job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobInvocation {
    identity: JobIdentity,
    settings: JobLockSettings,
    timeout_override: Option<LockTimeout>,
}

impl JobInvocation {
    /// Add a run parameter.
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.identity = self.identity.with_param(key, value);
        self
    }

    /// Add run parameters.
    pub fn with_params<K, V, I>(mut self, params: I) -> Self
    where
        K: Into<String>,
        V: Into<Scalar>,
        I: IntoIterator<Item = (K, V)>,
    {
        self.identity = self.identity.with_params(params);
        self
    }

    /// Override the registered timeout for this run only.
    pub fn with_timeout(mut self, timeout: LockTimeout) -> Self {
        self.timeout_override = Some(timeout);
        self
    }

    pub fn identity(&self) -> &JobIdentity {
        &self.identity
    }

    pub fn settings(&self) -> &JobLockSettings {
        &self.settings
    }

    /// The wait budget for this run. A run-time override always wins.
    pub fn effective_timeout(&self) -> LockTimeout {
        self.timeout_override.unwrap_or(self.settings.timeout)
    }
}
