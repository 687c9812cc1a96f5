//! Carrier cost records
//!
//! A cost record holds the real amount paid to the carrier for one shipment.
//! It is written once by the reconciliation process and never changed. A
//! missing record is a normal state, not an error.

use crate::money::Money;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CostRecord {
    pub shipment_id: String,
    pub provider_cost: Money,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Error, PartialEq)]
pub enum CostRecordError {
    #[error("Cost for shipment {shipment_id} is already recorded")]
    AlreadyRecorded { shipment_id: String },
}

/// Read side used by the pricing engine
pub trait CostRecordSource: Send + Sync {
    /// Real carrier cost for a shipment, if reconciliation has produced one
    fn provider_cost(&self, shipment_id: &str) -> Option<Money>;
}

/// In-process cost ledger with write-once semantics
#[derive(Debug, Default)]
pub struct CostLedger {
    records: RwLock<HashMap<String, CostRecord>>,
}

impl CostLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the carrier cost for a shipment; a second write is rejected
    pub fn record(
        &self,
        shipment_id: impl Into<String>,
        provider_cost: Money,
    ) -> Result<CostRecord, CostRecordError> {
        let shipment_id = shipment_id.into();
        let mut records = self.records.write();
        if records.contains_key(&shipment_id) {
            return Err(CostRecordError::AlreadyRecorded { shipment_id });
        }
        let record = CostRecord {
            shipment_id: shipment_id.clone(),
            provider_cost,
            recorded_at: Utc::now(),
        };
        records.insert(shipment_id, record.clone());
        Ok(record)
    }

    pub fn get(&self, shipment_id: &str) -> Option<CostRecord> {
        self.records.read().get(shipment_id).cloned()
    }
}

impl CostRecordSource for CostLedger {
    fn provider_cost(&self, shipment_id: &str) -> Option<Money> {
        self.records
            .read()
            .get(shipment_id)
            .map(|record| record.provider_cost)
    }
}
