//! Cache-entry lock strategy.
//!
//! The lock is a cache key equal to the lock name whose value is the owner
//! token. Claiming relies on the store's atomic add-if-absent; entries can
//! carry a TTL so a crashed holder's claim lapses on its own.
//!
//! [`RedisCache`] is the store shared between processes; [`MemoryCache`] is an
//! in-process store for embedding and tests.

use super::strategy::{DEFAULT_POLL_INTERVAL, LockStrategy, StrategyKind, new_owner_token};
use crate::error::LockStrategyError;
use crate::lock_name::LockName;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

/// Minimal key/value store contract needed for locking.
pub trait CacheStore: Send + Sync {
    /// Store `value` under `key` only if no live entry exists. Returns whether
    /// the value was stored.
    fn add(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, LockStrategyError>;

    /// The live value under `key`.
    fn get(&self, key: &str) -> Result<Option<String>, LockStrategyError>;

    /// Delete `key` only if its value equals `value`. Returns whether it was deleted.
    fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, LockStrategyError>;
}

#[derive(Debug, Clone)]
struct CacheEntry {
    value: String,
    expires_at: Option<Instant>,
}

impl CacheEntry {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

/// In-process cache store. Clones share the same entries.
///
/// Only contenders inside one process see each other's claims; use
/// [`RedisCache`] to exclude across processes.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
    entries: Arc<DashMap<String, CacheEntry>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.iter().filter(|e| e.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CacheStore for MemoryCache {
    fn add(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, LockStrategyError> {
        let now = Instant::now();
        let fresh = CacheEntry {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| now + ttl),
        };

        match self.entries.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    Ok(false)
                } else {
                    occupied.insert(fresh);
                    Ok(true)
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(true)
            }
        }
    }

    fn get(&self, key: &str) -> Result<Option<String>, LockStrategyError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(key)
            .filter(|entry| entry.is_live(now))
            .map(|entry| entry.value.clone()))
    }

    fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, LockStrategyError> {
        Ok(self
            .entries
            .remove_if(key, |_, entry| entry.value == value)
            .is_some())
    }
}

/// How long connecting to a cache server may take.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Deletes KEYS[1] only while it still holds ARGV[1].
const DELETE_IF_EQUALS_SCRIPT: &str =
    "if redis.call('GET', KEYS[1]) == ARGV[1] then return redis.call('DEL', KEYS[1]) else return 0 end";

/// Cache store on a Redis server, shared by every process that connects to it.
///
/// `add` is `SET key value NX [PX ttl]`; `delete_if_equals` is a Lua script so
/// the compare and the delete happen as one server-side step.
pub struct RedisCache {
    url: String,
    conn: Mutex<redis::Connection>,
}

impl std::fmt::Debug for RedisCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisCache")
            .field("url", &self.url)
            .finish_non_exhaustive()
    }
}

impl RedisCache {
    /// Connect to the server at `url` (e.g. `redis://127.0.0.1/`).
    pub fn connect(url: &str) -> Result<Self, LockStrategyError> {
        let client = redis::Client::open(url).map_err(|e| {
            LockStrategyError::Cache(format!("invalid cache url '{}': {}", url, e))
        })?;
        let conn = client
            .get_connection_with_timeout(DEFAULT_CONNECT_TIMEOUT)
            .map_err(|e| {
                LockStrategyError::Cache(format!("failed to connect to '{}': {}", url, e))
            })?;

        Ok(Self {
            url: url.to_string(),
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, redis::Connection> {
        self.conn.lock().unwrap_or_else(|poison| poison.into_inner())
    }
}

impl CacheStore for RedisCache {
    fn add(&self, key: &str, value: &str, ttl: Option<Duration>) -> Result<bool, LockStrategyError> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if let Some(ttl) = ttl {
            // PX 0 is rejected by the server.
            let millis = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1);
            cmd.arg("PX").arg(millis);
        }

        let reply: Option<String> = cmd
            .query(&mut *self.conn())
            .map_err(|e| LockStrategyError::Cache(format!("SET NX on '{}' failed: {}", key, e)))?;
        Ok(reply.is_some())
    }

    fn get(&self, key: &str) -> Result<Option<String>, LockStrategyError> {
        redis::cmd("GET")
            .arg(key)
            .query(&mut *self.conn())
            .map_err(|e| LockStrategyError::Cache(format!("GET '{}' failed: {}", key, e)))
    }

    fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, LockStrategyError> {
        let deleted: i64 = redis::cmd("EVAL")
            .arg(DELETE_IF_EQUALS_SCRIPT)
            .arg(1)
            .arg(key)
            .arg(value)
            .query(&mut *self.conn())
            .map_err(|e| LockStrategyError::Cache(format!("DEL '{}' failed: {}", key, e)))?;
        Ok(deleted > 0)
    }
}

/// Lock strategy over any [`CacheStore`].
pub struct CacheStrategy {
    store: Arc<dyn CacheStore>,
    token: String,
    ttl: Option<Duration>,
    poll_interval: Duration,
}

impl std::fmt::Debug for CacheStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheStrategy")
            .field("token", &self.token)
            .field("ttl", &self.ttl)
            .finish_non_exhaustive()
    }
}

impl CacheStrategy {
    pub fn new(store: impl CacheStore + 'static) -> Self {
        Self::with_store(Arc::new(store))
    }

    /// Share a store already held elsewhere.
    pub fn with_store(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            token: new_owner_token(),
            ttl: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Claims made by this strategy lapse after `ttl`.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = Some(ttl);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Token of whoever currently holds `name`.
    pub fn holder(&self, name: &LockName) -> Result<Option<String>, LockStrategyError> {
        self.store.get(name.as_str())
    }
}

impl LockStrategy for CacheStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Cache
    }

    fn try_acquire(&self, name: &LockName) -> Result<bool, LockStrategyError> {
        let added = self.store.add(name.as_str(), &self.token, self.ttl)?;
        debug!(lock = %name, acquired = added, "cache claim attempt");
        Ok(added)
    }

    fn release(&self, name: &LockName) -> Result<(), LockStrategyError> {
        self.store.delete_if_equals(name.as_str(), &self.token)?;
        Ok(())
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
