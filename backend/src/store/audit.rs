//! Audit events for rate table mutations
//!
//! Emission is best effort: a failing sink is logged and the mutation that
//! triggered it stands.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventKind {
    TableCreated,
    TableUpdated,
    TableArchived,
    TableCloned,
    TableAssigned,
    AssignmentRevoked,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    #[serde(rename = "type")]
    pub kind: AuditEventKind,
    pub table_id: String,
    pub actor_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
    pub at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(kind: AuditEventKind, table_id: impl Into<String>, actor_id: impl Into<String>) -> Self {
        Self {
            kind,
            table_id: table_id.into(),
            actor_id: actor_id.into(),
            before: None,
            after: None,
            at: Utc::now(),
        }
    }

    pub fn with_before<T: Serialize>(mut self, before: &T) -> Self {
        self.before = serde_json::to_value(before).ok();
        self
    }

    pub fn with_after<T: Serialize>(mut self, after: &T) -> Self {
        self.after = serde_json::to_value(after).ok();
        self
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum AuditError {
    #[error("Audit sink unavailable: {0}")]
    Unavailable(String),
}

/// Destination for audit events
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: &AuditEvent) -> Result<(), AuditError>;
}

/// Writes audit events as `tracing` events under the `audit` target
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: &AuditEvent) -> Result<(), AuditError> {
        tracing::info!(
            target: "audit",
            kind = ?event.kind,
            table_id = %event.table_id,
            actor_id = %event.actor_id,
            "rate table audit event"
        );
        Ok(())
    }
}

/// Keeps events in memory; can be switched to fail for tests
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: Mutex<Vec<AuditEvent>>,
    failing: bool,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that rejects every event
    pub fn failing() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }
}

impl AuditSink for MemoryAuditSink {
    fn emit(&self, event: &AuditEvent) -> Result<(), AuditError> {
        if self.failing {
            return Err(AuditError::Unavailable("sink disabled".to_string()));
        }
        self.events.lock().push(event.clone());
        Ok(())
    }
}
