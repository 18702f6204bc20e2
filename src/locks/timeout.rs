//! Wait budget for lock acquisition.

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// How long an acquire may wait for a held lock.
///
/// `Millis(0)` (the default) means a single attempt with no waiting.
/// `Unbounded` waits until the lock is obtained and can hang a process if the
/// holder never releases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockTimeout {
    Millis(u64),
    Unbounded,
}

impl Default for LockTimeout {
    fn default() -> Self {
        LockTimeout::Millis(0)
    }
}

impl LockTimeout {
    /// True for the non-blocking single attempt.
    pub fn is_try_once(&self) -> bool {
        matches!(self, LockTimeout::Millis(0))
    }

    /// The budget as a duration, `None` when unbounded.
    pub fn as_duration(&self) -> Option<Duration> {
        match self {
            LockTimeout::Millis(ms) => Some(Duration::from_millis(*ms)),
            LockTimeout::Unbounded => None,
        }
    }
}

impl fmt::Display for LockTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockTimeout::Millis(ms) => write!(f, "{}ms", ms),
            LockTimeout::Unbounded => write!(f, "unbounded"),
        }
    }
}

impl FromStr for LockTimeout {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.to_ascii_lowercase().as_str() {
            "unbounded" | "infinite" | "none" => Ok(LockTimeout::Unbounded),
            _ => s.parse::<u64>().map(LockTimeout::Millis).map_err(|_| {
                format!(
                    "invalid timeout '{}': expected milliseconds or 'unbounded'",
                    s
                )
            }),
        }
    }
}

impl Serialize for LockTimeout {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            LockTimeout::Millis(ms) => serializer.serialize_u64(*ms),
            LockTimeout::Unbounded => serializer.serialize_str("unbounded"),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TimeoutRepr {
    Millis(u64),
    Word(String),
}

impl<'de> Deserialize<'de> for LockTimeout {
    /// Accepts an integer, `null` (the try-once default), or a word such as
    /// `unbounded`.
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Option::<TimeoutRepr>::deserialize(deserializer)? {
            None => Ok(LockTimeout::default()),
            Some(TimeoutRepr::Millis(ms)) => Ok(LockTimeout::Millis(ms)),
            Some(TimeoutRepr::Word(word)) => word.parse().map_err(de::Error::custom),
        }
    }
}
