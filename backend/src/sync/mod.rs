//! Synchronization Lock
//!
//! Durable, keyed mutual exclusion guarding bulk rate imports.
//!
//! # Critical Invariants
//!
//! 1. At most one `in_progress` row per key at any time
//! 2. Acquisition never blocks: a contending caller gets `AlreadyLocked`
//! 3. An `in_progress` row past `expires_at` may be taken over (TTL recovery)
//! 4. A missing row and a `completed`/`failed` row both mean "free"
//! 5. The lock is a database row, not an in-process mutex, since holder and
//!    checker may be different processes

pub mod lock;
pub mod sqlite;

pub use lock::{
    Acquisition, LockError, LockHandle, LockOutcome, LockRecord, LockStatus, SyncLockGuard,
    SyncLockKey,
};
pub use sqlite::SqliteLockStore;
