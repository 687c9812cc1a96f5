//! SQLite-backed lock store
//!
//! Acquisition is one atomic conditional upsert against a row keyed by the
//! lock key. It succeeds when no row exists, when the row is released
//! (`completed`/`failed`), or when an `in_progress` row has expired. It never
//! waits on another holder; SQLite's own write lock is held only for the
//! duration of the statement.
//!
//! Several processes may open the same database file; the row is the lock.

use crate::sync::lock::{
    Acquisition, LockError, LockHandle, LockOutcome, LockRecord, LockStatus, SyncLockGuard,
    SyncLockKey,
};
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::time::Duration;

/// How long a statement waits for SQLite's file lock (not for the sync lock)
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sync_locks (
    lock_key    TEXT PRIMARY KEY,
    status      TEXT NOT NULL CHECK (status IN ('in_progress', 'completed', 'failed')),
    holder      TEXT NOT NULL,
    acquired_at INTEGER NOT NULL,
    expires_at  INTEGER NOT NULL,
    released_at INTEGER
);
";

const ACQUIRE_SQL: &str = "
INSERT INTO sync_locks (lock_key, status, holder, acquired_at, expires_at, released_at)
VALUES (?1, 'in_progress', ?2, ?3, ?4, NULL)
ON CONFLICT(lock_key) DO UPDATE SET
    status = 'in_progress',
    holder = excluded.holder,
    acquired_at = excluded.acquired_at,
    expires_at = excluded.expires_at,
    released_at = NULL
WHERE sync_locks.status <> 'in_progress'
   OR sync_locks.expires_at < excluded.acquired_at
";

const RELEASE_SQL: &str = "
UPDATE sync_locks
SET status = ?3, released_at = ?4
WHERE lock_key = ?1 AND holder = ?2 AND status = 'in_progress'
";

fn from_millis(key: &str, millis: i64) -> Result<DateTime<Utc>, LockError> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| LockError::CorruptRecord {
            key: key.to_string(),
            reason: format!("timestamp {} out of range", millis),
        })
}

pub struct SqliteLockStore {
    conn: Mutex<Connection>,
}

impl SqliteLockStore {
    pub fn open(path: &Path) -> Result<Self, LockError> {
        Self::init(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, LockError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, LockError> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Non-blocking acquisition at the current time
    pub fn acquire(&self, key: &SyncLockKey, ttl: Duration) -> Result<Acquisition, LockError> {
        self.acquire_at(key, ttl, Utc::now())
    }

    /// Non-blocking acquisition at an explicit time
    pub fn acquire_at(
        &self,
        key: &SyncLockKey,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<Acquisition, LockError> {
        let ttl_ms = i64::try_from(ttl.as_millis()).map_err(|_| LockError::InvalidTtl)?;
        let now_ms = now.timestamp_millis();
        let expires_ms = now_ms.checked_add(ttl_ms).ok_or(LockError::InvalidTtl)?;
        let holder = uuid::Uuid::new_v4().to_string();

        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(ACQUIRE_SQL, params![key.as_str(), holder, now_ms, expires_ms])?;
        let current_expiry: i64 = if changed == 1 {
            expires_ms
        } else {
            tx.query_row(
                "SELECT expires_at FROM sync_locks WHERE lock_key = ?1",
                params![key.as_str()],
                |row| row.get(0),
            )?
        };
        tx.commit()?;

        let expires_at = from_millis(key.as_str(), current_expiry)?;
        if changed == 1 {
            tracing::info!(key = %key, holder = %holder, %expires_at, "sync lock acquired");
            Ok(Acquisition::Locked(LockHandle {
                key: key.clone(),
                holder,
                acquired_at: from_millis(key.as_str(), now_ms)?,
                expires_at,
            }))
        } else {
            tracing::info!(key = %key, %expires_at, "sync lock already held");
            Ok(Acquisition::AlreadyLocked {
                key: key.clone(),
                expires_at,
            })
        }
    }

    /// Acquire and wrap in a guard; a held lock is reported as `Contention`
    pub fn try_lock(&self, key: &SyncLockKey, ttl: Duration) -> Result<SyncLockGuard<'_>, LockError> {
        match self.acquire(key, ttl)? {
            Acquisition::Locked(handle) => Ok(SyncLockGuard::new(self, handle)),
            Acquisition::AlreadyLocked { key, expires_at } => {
                Err(LockError::Contention { key, expires_at })
            }
        }
    }

    /// Mark the lock completed or failed
    ///
    /// Fails with `NotHeld` when the lock expired and was taken over.
    pub fn release(&self, handle: &LockHandle, outcome: LockOutcome) -> Result<(), LockError> {
        let status = LockStatus::from(outcome);
        let mut conn = self.conn.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let changed = tx.execute(
            RELEASE_SQL,
            params![
                handle.key.as_str(),
                handle.holder,
                status.as_str(),
                Utc::now().timestamp_millis()
            ],
        )?;
        tx.commit()?;

        if changed == 0 {
            tracing::warn!(key = %handle.key, holder = %handle.holder, "release of a lock no longer held");
            return Err(LockError::NotHeld {
                key: handle.key.clone(),
            });
        }
        tracing::info!(key = %handle.key, status = status.as_str(), "sync lock released");
        Ok(())
    }

    /// Whether `handle`'s acquisition is still the in-progress one
    pub fn holds(&self, handle: &LockHandle) -> Result<bool, LockError> {
        let conn = self.conn.lock();
        let held = conn
            .query_row(
                "SELECT 1 FROM sync_locks
                 WHERE lock_key = ?1 AND holder = ?2 AND status = 'in_progress'",
                params![handle.key.as_str(), handle.holder],
                |_| Ok(()),
            )
            .optional()?;
        Ok(held.is_some())
    }

    /// Current row for a key; `None` means the lock was never taken
    pub fn status(&self, key: &SyncLockKey) -> Result<Option<LockRecord>, LockError> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT status, holder, acquired_at, expires_at, released_at
                 FROM sync_locks WHERE lock_key = ?1",
                params![key.as_str()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, Option<i64>>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((status, holder, acquired_at, expires_at, released_at)) = row else {
            return Ok(None);
        };
        let status = LockStatus::parse(&status).ok_or_else(|| LockError::CorruptRecord {
            key: key.to_string(),
            reason: format!("unknown status {}", status),
        })?;
        Ok(Some(LockRecord {
            key: key.clone(),
            status,
            holder,
            acquired_at: from_millis(key.as_str(), acquired_at)?,
            expires_at: from_millis(key.as_str(), expires_at)?,
            released_at: released_at
                .map(|millis| from_millis(key.as_str(), millis))
                .transpose()?,
        }))
    }
}
