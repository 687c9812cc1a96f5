//! Lock keys, records and the release guard

use crate::sync::sqlite::SqliteLockStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Deterministic lock key
///
/// Only requests for the same tenant and external source produce the same
/// key, so unrelated imports never contend.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SyncLockKey(String);

impl SyncLockKey {
    /// Key guarding a bulk rate import of `source` into `tenant_id`'s tables
    ///
    /// # Example
    /// ```
    /// use rate_engine_core::sync::SyncLockKey;
    ///
    /// let a = SyncLockKey::rate_import("tenant-a", "gls-feed");
    /// assert_eq!(a, SyncLockKey::rate_import("tenant-a", "gls-feed"));
    /// assert_ne!(a, SyncLockKey::rate_import("tenant-b", "gls-feed"));
    /// assert!(a.as_str().starts_with("rate_import:"));
    /// ```
    pub fn rate_import(tenant_id: &str, source: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(tenant_id.as_bytes());
        hasher.update([0u8]);
        hasher.update(source.as_bytes());
        Self(format!("rate_import:{:x}", hasher.finalize()))
    }

    /// Wrap an already encoded key (as read back from storage)
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SyncLockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStatus {
    InProgress,
    Completed,
    Failed,
}

impl LockStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LockStatus::InProgress => "in_progress",
            LockStatus::Completed => "completed",
            LockStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "in_progress" => Some(LockStatus::InProgress),
            "completed" => Some(LockStatus::Completed),
            "failed" => Some(LockStatus::Failed),
            _ => None,
        }
    }
}

/// How the guarded operation ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    Completed,
    Failed,
}

impl From<LockOutcome> for LockStatus {
    fn from(outcome: LockOutcome) -> Self {
        match outcome {
            LockOutcome::Completed => LockStatus::Completed,
            LockOutcome::Failed => LockStatus::Failed,
        }
    }
}

/// Stored lock row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LockRecord {
    pub key: SyncLockKey,
    pub status: LockStatus,
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub released_at: Option<DateTime<Utc>>,
}

impl LockRecord {
    /// Free when released, or when the holder's TTL has run out
    pub fn is_free_at(&self, now: DateTime<Utc>) -> bool {
        self.status != LockStatus::InProgress || now > self.expires_at
    }
}

/// Proof of a successful acquisition; needed to release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockHandle {
    pub key: SyncLockKey,
    /// Unique per acquisition; a taken-over lock cannot be released by its old holder
    pub holder: String,
    pub acquired_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Result of a non-blocking acquisition attempt
#[derive(Debug, Clone, PartialEq)]
pub enum Acquisition {
    Locked(LockHandle),
    AlreadyLocked {
        key: SyncLockKey,
        expires_at: DateTime<Utc>,
    },
}

#[derive(Debug, Error)]
pub enum LockError {
    /// Retryable; the caller decides when
    #[error("Lock {key} is held until {expires_at}")]
    Contention {
        key: SyncLockKey,
        expires_at: DateTime<Utc>,
    },

    #[error("Lock {key} is no longer held by this holder")]
    NotHeld { key: SyncLockKey },

    #[error("Lock TTL out of range")]
    InvalidTtl,

    #[error("Corrupt lock record for {key}: {reason}")]
    CorruptRecord { key: String, reason: String },

    #[error("Lock storage error: {0}")]
    Storage(#[from] rusqlite::Error),
}

impl LockError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, LockError::Contention { .. })
    }
}

/// Holds a lock for the duration of an operation
///
/// Call [`SyncLockGuard::complete`] or [`SyncLockGuard::fail`] on the normal
/// exit paths. If the guard is dropped without either (early return, panic,
/// task cancellation) the lock is released as `failed`.
pub struct SyncLockGuard<'a> {
    store: &'a SqliteLockStore,
    handle: Option<LockHandle>,
}

impl<'a> SyncLockGuard<'a> {
    pub(crate) fn new(store: &'a SqliteLockStore, handle: LockHandle) -> Self {
        Self {
            store,
            handle: Some(handle),
        }
    }

    pub fn key(&self) -> Option<&SyncLockKey> {
        self.handle.as_ref().map(|handle| &handle.key)
    }

    /// Fails with `NotHeld` when the lock expired and another caller took it
    pub fn ensure_held(&self) -> Result<(), LockError> {
        let Some(handle) = &self.handle else {
            return Ok(());
        };
        if self.store.holds(handle)? {
            Ok(())
        } else {
            Err(LockError::NotHeld {
                key: handle.key.clone(),
            })
        }
    }

    pub fn complete(mut self) -> Result<(), LockError> {
        self.finish(LockOutcome::Completed)
    }

    pub fn fail(mut self) -> Result<(), LockError> {
        self.finish(LockOutcome::Failed)
    }

    fn finish(&mut self, outcome: LockOutcome) -> Result<(), LockError> {
        match self.handle.take() {
            Some(handle) => self.store.release(&handle, outcome),
            None => Ok(()),
        }
    }
}

impl Drop for SyncLockGuard<'_> {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            tracing::warn!(key = %handle.key, "lock guard dropped without outcome; releasing as failed");
            if let Err(err) = self.store.release(&handle, LockOutcome::Failed) {
                tracing::warn!(key = %handle.key, error = %err, "lock release on drop failed");
            }
        }
    }
}
