//! Bulk rate import
//!
//! Translates an external rate feed into supplier tables owned by the
//! importing tenant. The whole import runs under the Synchronization Lock
//! keyed by (tenant, source).
//!
//! # Critical Invariants
//!
//! 1. No table is written before the lock is held
//! 2. The lock is released on every exit path: `completed` on success,
//!    `failed` on error, and by the guard's `Drop` on panic or cancellation
//! 3. Re-importing the same source updates the existing table (version bump)
//!    instead of creating a duplicate
//! 4. The feed is fully parsed and validated before the first write
//! 5. All carriers of one import commit together or not at all
//! 6. With a snapshot target, load, write and save all happen while the
//!    lock is held

pub mod feed;

use crate::config::PricingConfig;
use crate::models::rule::check_no_overlap;
use crate::models::{AuthContext, NewRateTable, Rule, TableChanges, TableKind, TableStatus, ValidationError};
use crate::store::{AuditSink, BatchWrite, RateTableStore, StoreError, TableFilter};
use crate::sync::{LockError, SqliteLockStore, SyncLockGuard, SyncLockKey};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

pub use feed::{parse_break, rules_by_carrier, FeedRow, FeedSurcharge, FeedSurchargeKind, FeedSurchargeTrigger};

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Invalid feed: {0}")]
    Validation(#[from] ValidationError),
}

impl ImportError {
    pub fn is_retryable(&self) -> bool {
        match self {
            ImportError::Lock(err) => err.is_retryable(),
            ImportError::Store(err) => err.is_retryable(),
            ImportError::Validation(_) => false,
        }
    }
}

/// Summary of a successful import
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportReport {
    pub tables_created: usize,
    pub tables_updated: usize,
    pub rules_written: usize,
}

/// Where an import reads current tables from and makes its writes durable
enum ImportTarget {
    /// A store shared with the rest of the process
    Shared(Arc<RateTableStore>),
    /// A snapshot file shared between processes; loaded and saved under the lock
    Snapshot {
        path: PathBuf,
        audit: Arc<dyn AuditSink>,
    },
}

pub struct RateImporter {
    target: ImportTarget,
    locks: Arc<SqliteLockStore>,
    config: PricingConfig,
}

impl RateImporter {
    pub fn new(store: Arc<RateTableStore>, locks: Arc<SqliteLockStore>, config: PricingConfig) -> Self {
        Self {
            target: ImportTarget::Shared(store),
            locks,
            config,
        }
    }

    /// Import into the store persisted at `path`
    ///
    /// The snapshot is read after the lock is taken and saved before it is
    /// released, so concurrent imports of one source never see or overwrite
    /// each other's half-finished state.
    pub fn for_snapshot(
        path: impl Into<PathBuf>,
        audit: Arc<dyn AuditSink>,
        locks: Arc<SqliteLockStore>,
        config: PricingConfig,
    ) -> Self {
        Self {
            target: ImportTarget::Snapshot {
                path: path.into(),
                audit,
            },
            locks,
            config,
        }
    }

    /// Import `rows` from `source` into the caller's supplier tables
    ///
    /// Fails fast with `ImportError::Lock(LockError::Contention)` when another
    /// import of the same source for the same tenant is running.
    pub fn import(
        &self,
        auth: &AuthContext,
        source: &str,
        rows: &[FeedRow],
    ) -> Result<ImportReport, ImportError> {
        let key = SyncLockKey::rate_import(auth.tenant_id(), source);
        let guard = self.locks.try_lock(&key, self.config.lock_ttl())?;

        match self.run_locked(&guard, auth, source, rows) {
            Ok(report) => {
                // tables are committed; a failed release is only logged
                if let Err(release) = guard.complete() {
                    tracing::warn!(key = %key, error = %release, "rate import committed but lock release failed");
                }
                tracing::info!(
                    tenant_id = %auth.tenant_id(),
                    source = %source,
                    created = report.tables_created,
                    updated = report.tables_updated,
                    rules = report.rules_written,
                    "rate import completed"
                );
                Ok(report)
            }
            Err(err) => {
                tracing::warn!(tenant_id = %auth.tenant_id(), source = %source, error = %err, "rate import failed");
                if let Err(release) = guard.fail() {
                    tracing::warn!(key = %key, error = %release, "failed to release import lock");
                }
                Err(err)
            }
        }
    }

    fn run_locked(
        &self,
        guard: &SyncLockGuard<'_>,
        auth: &AuthContext,
        source: &str,
        rows: &[FeedRow],
    ) -> Result<ImportReport, ImportError> {
        let grouped = rules_by_carrier(rows)?;
        for rules in grouped.values() {
            check_no_overlap(rules)?;
        }

        match &self.target {
            ImportTarget::Shared(store) => self.write_tables(store, auth, source, grouped),
            ImportTarget::Snapshot { path, audit } => {
                let store = if path.exists() {
                    RateTableStore::load_snapshot(path, Arc::clone(audit))?
                } else {
                    RateTableStore::with_audit(Arc::clone(audit))
                };
                let report = self.write_tables(&store, auth, source, grouped)?;
                // a holder whose lock was taken over must not overwrite the new holder's snapshot
                guard.ensure_held()?;
                store.save_snapshot(path)?;
                Ok(report)
            }
        }
    }

    /// Write every carrier's table in one all-or-nothing commit
    fn write_tables(
        &self,
        store: &RateTableStore,
        auth: &AuthContext,
        source: &str,
        grouped: BTreeMap<String, Vec<Rule>>,
    ) -> Result<ImportReport, ImportError> {
        let existing = store.query(
            auth,
            &TableFilter::default()
                .kind(TableKind::Supplier)
                .import_source(source)
                .owned_only(),
        );

        let mut report = ImportReport::default();
        let mut writes = Vec::with_capacity(grouped.len());
        for (carrier, rules) in grouped {
            report.rules_written += rules.len();
            let current = existing
                .iter()
                .find(|t| t.carrier_id.as_deref() == Some(carrier.as_str()) && t.status != TableStatus::Archived);

            match current {
                Some(table) => {
                    writes.push(BatchWrite::Update {
                        table_id: table.id.clone(),
                        expected_version: table.version,
                        changes: TableChanges::rules(rules),
                    });
                    report.tables_updated += 1;
                }
                None => {
                    let mut new_table = NewRateTable::new(format!("{} {}", source, carrier), TableKind::Supplier)
                        .for_carrier(carrier.as_str())
                        .active()
                        .with_billing_model(self.config.default_billing_model)
                        .with_import_source(source);
                    new_table.rules = rules;
                    writes.push(BatchWrite::Create(new_table));
                    report.tables_created += 1;
                }
            }
        }
        store.write_batch(auth, writes)?;
        Ok(report)
    }
}

/// Count of rules per carrier, for dry runs
pub fn preview(rows: &[FeedRow]) -> Result<BTreeMap<String, usize>, ValidationError> {
    let grouped = rules_by_carrier(rows)?;
    for rules in grouped.values() {
        check_no_overlap(rules)?;
    }
    Ok(grouped.into_iter().map(|(carrier, rules)| (carrier, rules.len())).collect())
}
