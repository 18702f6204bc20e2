//! Lock-name derivation.
//!
//! A lock name is `<prefix>-<job name>-<md5 of canonical parameters>`. The
//! canonical form is the compact JSON object of the parameters with keys in
//! sorted order, so two processes that build the same identity from maps with
//! different insertion orders still collide on the same lock.

use crate::job::{JobIdentity, Scalar};
use md5::{Digest, Md5};
use serde_json::{Map, Number, Value};
use std::fmt;

/// Prefix used when a job does not configure its own.
pub const DEFAULT_PREFIX: &str = "icmutex";

/// A derived, deterministic lock name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LockName(String);

impl LockName {
    /// Wrap an already-derived name (e.g. one read back from a lock file).
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for LockName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&Scalar> for Value {
    fn from(value: &Scalar) -> Self {
        match value {
            Scalar::Null => Value::Null,
            Scalar::Bool(b) => Value::Bool(*b),
            Scalar::Int(i) => Value::Number((*i).into()),
            // JSON has no NaN or infinities; those go in as their display text.
            Scalar::Float(x) => Number::from_f64(*x)
                .map_or_else(|| Value::String(x.to_string()), Value::Number),
            Scalar::String(s) => Value::String(s.clone()),
        }
    }
}

/// Canonical JSON encoding of a job's parameters (sorted keys, no whitespace).
pub fn canonical_parameters(identity: &JobIdentity) -> String {
    let map: Map<String, Value> = identity
        .parameters()
        .iter()
        .map(|(k, v)| (k.clone(), Value::from(v)))
        .collect();
    Value::Object(map).to_string()
}

/// Derive the lock name for a job identity.
pub fn derive_lock_name(prefix: &str, identity: &JobIdentity) -> LockName {
    let digest = Md5::digest(canonical_parameters(identity).as_bytes());
    LockName(format!(
        "{}-{}-{}",
        prefix,
        identity.name(),
        hex::encode(digest)
    ))
}
