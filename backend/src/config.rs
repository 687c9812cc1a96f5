//! Engine configuration
//!
//! Every field has a default so a partial JSON file is enough.

use crate::models::BillingModel;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Cannot read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Pricing engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PricingConfig {
    /// Tenant owning the platform master contract
    pub master_tenant_id: String,

    /// Carrier ids accepted in requests; empty accepts any carrier
    pub known_carriers: Vec<String>,

    /// Lifetime of an import lock before another caller may take it over
    pub lock_ttl_secs: u64,

    /// Billing model for imported supplier tables
    pub default_billing_model: BillingModel,

    /// SQLite database holding sync locks
    pub lock_db_path: PathBuf,

    /// JSON snapshot of the rate table store
    pub store_snapshot_path: PathBuf,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            master_tenant_id: "platform".to_string(),
            known_carriers: Vec::new(),
            lock_ttl_secs: 30 * 60,
            default_billing_model: BillingModel::Markup,
            lock_db_path: PathBuf::from("rate_engine_locks.db"),
            store_snapshot_path: PathBuf::from("rate_tables.json"),
        }
    }
}

impl PricingConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config: PricingConfig = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.master_tenant_id.trim().is_empty() {
            return Err(ConfigError::Invalid("master_tenant_id must not be empty".to_string()));
        }
        if self.lock_ttl_secs == 0 {
            return Err(ConfigError::Invalid("lock_ttl_secs must be positive".to_string()));
        }
        Ok(())
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }
}
