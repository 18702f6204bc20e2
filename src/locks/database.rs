//! SQLite-backed lock strategy.
//!
//! Each held lock is one row in `mutex_locks`, keyed by lock name. A claim is a
//! single upsert statement: it inserts the row, or takes over an existing row
//! only when that row has expired. The number of changed rows tells whether
//! the claim won, so the primary key is the only arbiter between processes.

use super::strategy::{DEFAULT_POLL_INTERVAL, LockStrategy, StrategyKind, new_owner_token};
use crate::error::LockStrategyError;
use crate::lock_name::LockName;
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::debug;

/// How long a statement waits on a SQLite file locked by another connection.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// A row of the locks table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockRow {
    pub name: String,
    pub owner: String,
    /// Milliseconds since the Unix epoch.
    pub acquired_at: i64,
    /// Milliseconds since the Unix epoch; `None` never expires.
    pub expires_at: Option<i64>,
}

/// Lock strategy backed by a row-per-lock SQLite table.
pub struct DatabaseStrategy {
    conn: Mutex<Connection>,
    token: String,
    expire_after: Option<Duration>,
    poll_interval: Duration,
}

impl std::fmt::Debug for DatabaseStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseStrategy")
            .field("token", &self.token)
            .field("expire_after", &self.expire_after)
            .finish_non_exhaustive()
    }
}

impl DatabaseStrategy {
    /// Open (or create) the database file and its locks table.
    pub fn open(db_path: &Path) -> Result<Self, LockStrategyError> {
        if let Some(parent) = db_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|e| {
                LockStrategyError::Database(format!(
                    "failed to create database directory '{}': {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let conn = Connection::open(db_path).map_err(|e| {
            LockStrategyError::Database(format!(
                "failed to open lock database '{}': {}",
                db_path.display(),
                e
            ))
        })?;
        Self::from_connection(conn)
    }

    /// Private in-memory database. Only useful when every contender shares
    /// this one instance.
    pub fn open_in_memory() -> Result<Self, LockStrategyError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            LockStrategyError::Database(format!("failed to open in-memory database: {}", e))
        })?;
        Self::from_connection(conn)
    }

    /// Use an existing connection.
    pub fn from_connection(conn: Connection) -> Result<Self, LockStrategyError> {
        conn.busy_timeout(DEFAULT_BUSY_TIMEOUT)
            .map_err(|e| LockStrategyError::Database(format!("failed to set busy timeout: {}", e)))?;

        let strategy = Self {
            conn: Mutex::new(conn),
            token: new_owner_token(),
            expire_after: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
        };
        strategy.init_schema()?;
        Ok(strategy)
    }

    /// Rows claimed by this strategy expire after `ttl` and may be taken over.
    pub fn with_expiry(mut self, ttl: Duration) -> Self {
        self.expire_after = Some(ttl);
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    fn init_schema(&self) -> Result<(), LockStrategyError> {
        self.conn()
            .execute_batch(
                r"
            CREATE TABLE IF NOT EXISTS mutex_locks (
                name TEXT PRIMARY KEY NOT NULL,
                owner TEXT NOT NULL,
                acquired_at INTEGER NOT NULL,
                expires_at INTEGER
            );
        ",
            )
            .map_err(|e| LockStrategyError::Database(format!("failed to initialize schema: {}", e)))
    }

    /// The current row for `name`, if any (expired rows included).
    pub fn lock_row(&self, name: &LockName) -> Result<Option<LockRow>, LockStrategyError> {
        self.conn()
            .query_row(
                "SELECT name, owner, acquired_at, expires_at FROM mutex_locks WHERE name = ?1",
                params![name.as_str()],
                |row| {
                    Ok(LockRow {
                        name: row.get(0)?,
                        owner: row.get(1)?,
                        acquired_at: row.get(2)?,
                        expires_at: row.get(3)?,
                    })
                },
            )
            .optional()
            .map_err(|e| LockStrategyError::Database(format!("failed to read lock row: {}", e)))
    }
}

impl LockStrategy for DatabaseStrategy {
    fn kind(&self) -> StrategyKind {
        StrategyKind::Database
    }

    fn try_acquire(&self, name: &LockName) -> Result<bool, LockStrategyError> {
        let now = Utc::now().timestamp_millis();
        let expires_at = self
            .expire_after
            .map(|ttl| now.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX)));

        let rows = self
            .conn()
            .execute(
                "INSERT INTO mutex_locks (name, owner, acquired_at, expires_at) \
                 VALUES (?1, ?2, ?3, ?4) \
                 ON CONFLICT(name) DO UPDATE SET owner = excluded.owner, \
                 acquired_at = excluded.acquired_at, expires_at = excluded.expires_at \
                 WHERE mutex_locks.expires_at IS NOT NULL \
                 AND mutex_locks.expires_at <= excluded.acquired_at",
                params![name.as_str(), self.token, now, expires_at],
            )
            .map_err(|e| LockStrategyError::Database(format!("failed to acquire lock: {}", e)))?;

        debug!(lock = %name, acquired = rows > 0, "database claim attempt");
        Ok(rows > 0)
    }

    fn release(&self, name: &LockName) -> Result<(), LockStrategyError> {
        self.conn()
            .execute(
                "DELETE FROM mutex_locks WHERE name = ?1 AND owner = ?2",
                params![name.as_str(), self.token],
            )
            .map_err(|e| LockStrategyError::Database(format!("failed to release lock: {}", e)))?;
        Ok(())
    }

    fn poll_interval(&self) -> Duration {
        self.poll_interval
    }
}
