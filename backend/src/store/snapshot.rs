//! Store snapshots - save/load rate table state
//!
//! Persists the complete store (tables and assignment history) as JSON.
//!
//! # Critical Invariants
//!
//! - **Integrity**: the snapshot carries a SHA-256 checksum of its canonical
//!   content; a snapshot whose checksum does not match is rejected
//! - **Referential integrity**: every assignment references a stored table
//! - **Rule invariants**: every table is re-validated on load

use crate::models::{Assignment, RateTable};
use crate::store::audit::AuditSink;
use crate::store::tables::{RateTableStore, StoreState};
use crate::store::StoreError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::Arc;

/// Complete store snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub tables: Vec<RateTable>,
    pub assignments: Vec<Assignment>,
    /// SHA-256 of the canonical JSON of `tables` and `assignments`
    pub checksum: String,
}

#[derive(Serialize)]
struct SnapshotContent<'a> {
    tables: &'a [RateTable],
    assignments: &'a [Assignment],
}

/// Compute a deterministic SHA-256 hash of any serializable value
///
/// Object keys are sorted recursively before hashing so the result does not
/// depend on map iteration order.
pub fn canonical_hash<T: Serialize>(value: &T) -> Result<String, StoreError> {
    use serde_json::Value;

    let value = serde_json::to_value(value)
        .map_err(|e| StoreError::Snapshot(format!("Serialization failed: {}", e)))?;

    fn canonicalize(value: Value) -> Value {
        match value {
            Value::Object(map) => {
                let sorted: BTreeMap<String, Value> =
                    map.into_iter().map(|(k, v)| (k, canonicalize(v))).collect();
                Value::Object(sorted.into_iter().collect())
            }
            Value::Array(arr) => Value::Array(arr.into_iter().map(canonicalize).collect()),
            other => other,
        }
    }

    let json = serde_json::to_string(&canonicalize(value))
        .map_err(|e| StoreError::Snapshot(format!("Serialization failed: {}", e)))?;

    let mut hasher = Sha256::new();
    hasher.update(json.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

impl StoreSnapshot {
    fn build(mut tables: Vec<RateTable>, assignments: Vec<Assignment>) -> Result<Self, StoreError> {
        tables.sort_by(|a, b| a.id.cmp(&b.id));
        let checksum = canonical_hash(&SnapshotContent {
            tables: &tables,
            assignments: &assignments,
        })?;
        Ok(Self {
            tables,
            assignments,
            checksum,
        })
    }

    /// Check checksum, referential integrity and rule invariants
    pub fn validate(&self) -> Result<(), StoreError> {
        let expected = canonical_hash(&SnapshotContent {
            tables: &self.tables,
            assignments: &self.assignments,
        })?;
        if expected != self.checksum {
            return Err(StoreError::Snapshot(format!(
                "Checksum mismatch: expected {}, got {}",
                expected, self.checksum
            )));
        }

        let mut ids = HashSet::new();
        for table in &self.tables {
            if !ids.insert(table.id.as_str()) {
                return Err(StoreError::Snapshot(format!("Duplicate table {}", table.id)));
            }
            table.validate()?;
        }
        for assignment in &self.assignments {
            if !ids.contains(assignment.table_id.as_str()) {
                return Err(StoreError::Snapshot(format!(
                    "Assignment {} references missing table {}",
                    assignment.id, assignment.table_id
                )));
            }
        }
        Ok(())
    }
}

/// Write to a sibling temp file, then rename over `path`
///
/// Readers see either the previous snapshot or the new one, never a torn file.
fn atomic_write(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.to_path_buf();
    tmp.set_extension("tmp");
    std::fs::write(&tmp, data)?;
    std::fs::rename(&tmp, path)
}

impl RateTableStore {
    pub fn snapshot(&self) -> Result<StoreSnapshot, StoreError> {
        let state = self.state_copy();
        StoreSnapshot::build(state.tables.into_values().collect(), state.assignments)
    }

    pub fn restore(snapshot: StoreSnapshot, audit: Arc<dyn AuditSink>) -> Result<Self, StoreError> {
        snapshot.validate()?;
        let state = StoreState {
            tables: snapshot
                .tables
                .into_iter()
                .map(|table| (table.id.clone(), table))
                .collect(),
            assignments: snapshot.assignments,
        };
        Ok(Self::from_state(state, audit))
    }

    pub fn save_snapshot(&self, path: &Path) -> Result<(), StoreError> {
        let snapshot = self.snapshot()?;
        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| StoreError::Snapshot(format!("Serialization failed: {}", e)))?;
        atomic_write(path, json.as_bytes())
            .map_err(|e| StoreError::Snapshot(format!("Write {} failed: {}", path.display(), e)))?;
        tracing::info!(path = %path.display(), tables = snapshot.tables.len(), "store snapshot saved");
        Ok(())
    }

    pub fn load_snapshot(path: &Path, audit: Arc<dyn AuditSink>) -> Result<Self, StoreError> {
        let json = std::fs::read_to_string(path)
            .map_err(|e| StoreError::Snapshot(format!("Read {} failed: {}", path.display(), e)))?;
        let snapshot: StoreSnapshot = serde_json::from_str(&json)
            .map_err(|e| StoreError::Snapshot(format!("Parse {} failed: {}", path.display(), e)))?;
        Self::restore(snapshot, audit)
    }
}
