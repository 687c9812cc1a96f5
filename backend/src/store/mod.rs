//! Rate Table Store
//!
//! Versioned rate tables, their rules and assignment history.
//!
//! # Authorization Boundary
//!
//! [`RateTableStore::query`] is the single visibility predicate. A tenant
//! sees exactly the union of:
//! - tables it owns
//! - active global tables
//! - tables with a non-revoked assignment to it
//!
//! The predicate is applied before any other filter and regardless of role.
//! Cross-tenant reads and writes exist only as separate functions taking a
//! [`crate::models::SuperAdminScope`].
//!
//! A table the caller may not see or mutate is reported exactly like a table
//! that does not exist.

pub mod audit;
pub mod snapshot;
pub mod tables;

use crate::models::{NewRateTable, TableChanges, TableKind, TableStatus, ValidationError};
use thiserror::Error;

pub use audit::{AuditError, AuditEvent, AuditEventKind, AuditSink, MemoryAuditSink, TracingAuditSink};
pub use snapshot::StoreSnapshot;
pub use tables::RateTableStore;

/// One write in a [`RateTableStore::write_batch`] commit
#[derive(Debug, Clone)]
pub enum BatchWrite {
    Create(NewRateTable),
    Update {
        table_id: String,
        expected_version: u64,
        changes: TableChanges,
    },
}

/// Errors from store operations
///
/// Context fields only ever carry the caller's own tenant id.
#[derive(Debug, Error, PartialEq)]
pub enum StoreError {
    #[error("Rate table {table_id} not found")]
    NotFound { tenant_id: String, table_id: String },

    #[error("Rate table {table_id} was modified: expected version {expected}, current {current}")]
    WriteConflict {
        table_id: String,
        expected: u64,
        current: u64,
    },

    #[error("Assignment {assignment_id} not found")]
    AssignmentNotFound {
        tenant_id: String,
        assignment_id: String,
    },

    #[error("Tenant {tenant_id} may not {action}")]
    NotPermitted {
        tenant_id: String,
        action: &'static str,
    },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Snapshot error: {0}")]
    Snapshot(String),
}

impl StoreError {
    /// Write conflicts can be retried after re-reading current state
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::WriteConflict { .. })
    }
}

/// Filters applied after the visibility predicate
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TableFilter {
    pub kind: Option<TableKind>,
    pub status: Option<TableStatus>,
    /// Keep tables that price this carrier (including all-carrier tables)
    pub carrier_id: Option<String>,
    pub import_source: Option<String>,
    /// Keep only tables owned by the caller
    pub owned_only: bool,
}

impl TableFilter {
    pub fn active() -> Self {
        Self {
            status: Some(TableStatus::Active),
            ..Self::default()
        }
    }

    pub fn kind(mut self, kind: TableKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn carrier(mut self, carrier_id: impl Into<String>) -> Self {
        self.carrier_id = Some(carrier_id.into());
        self
    }

    pub fn import_source(mut self, source: impl Into<String>) -> Self {
        self.import_source = Some(source.into());
        self
    }

    pub fn owned_only(mut self) -> Self {
        self.owned_only = true;
        self
    }
}
