//! Rate table model
//!
//! A rate table is a versioned, tenant-owned set of pricing rules for one
//! carrier (or all carriers when `carrier_id` is `None`).
//!
//! # Critical Invariants
//!
//! - `version` increases by exactly one on every accepted write
//! - Rules never overlap (see [`crate::models::rule::check_no_overlap`])
//! - Tables are archived, never deleted
//! - `cloned_from` is set once at clone time and never rewritten

use crate::models::request::Destination;
use crate::models::rule::{check_no_overlap, Rule};
use crate::models::validation::ValidationError;
use crate::money::Money;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Table type, which also decides its resolution tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Global,
    Supplier,
    Custom,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableStatus {
    Draft,
    Active,
    Archived,
}

impl TableStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TableStatus::Draft => "draft",
            TableStatus::Active => "active",
            TableStatus::Archived => "archived",
        }
    }

    /// Allowed transitions: draft→active, draft→archived, active→archived
    pub fn transition_to(self, next: TableStatus) -> Result<TableStatus, ValidationError> {
        match (self, next) {
            (TableStatus::Draft, TableStatus::Active)
            | (TableStatus::Draft, TableStatus::Archived)
            | (TableStatus::Active, TableStatus::Archived) => Ok(next),
            (from, to) => Err(ValidationError::InvalidStatusTransition {
                from: from.as_str(),
                to: to.as_str(),
            }),
        }
    }
}

/// How the sell price relates to the table's cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BillingModel {
    /// Sell price = cost plus the table's default margin
    #[default]
    Markup,
    /// Cost is re-billed as is; margin is structurally meaningless
    PassThrough,
}

/// Default margin applied on top of the rule cost
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarginPolicy {
    /// Percentage of total cost
    #[serde(default)]
    pub percent: Decimal,
    /// Flat amount added after the percentage
    #[serde(default)]
    pub fixed: Money,
}

impl MarginPolicy {
    pub fn percent(percent: Decimal) -> Self {
        Self {
            percent,
            fixed: Decimal::ZERO,
        }
    }

    /// Sell price for a given pre-margin cost (unrounded)
    pub fn apply(&self, total_cost: Money) -> Money {
        total_cost + total_cost * self.percent / Decimal::ONE_HUNDRED + self.fixed
    }

    fn validate(&self) -> Result<(), ValidationError> {
        if self.percent < Decimal::ZERO || self.fixed < Decimal::ZERO {
            return Err(ValidationError::NegativeMargin);
        }
        Ok(())
    }
}

/// Named destination zone
///
/// A destination belongs to the zone when the country matches and either
/// the province is listed, the postal code starts with a listed prefix, or
/// both lists are empty (whole country).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneDefinition {
    pub code: String,
    pub country: String,
    #[serde(default)]
    pub provinces: Vec<String>,
    #[serde(default)]
    pub postal_prefixes: Vec<String>,
}

impl ZoneDefinition {
    pub fn matches(&self, destination: &Destination) -> bool {
        if !self.country.eq_ignore_ascii_case(destination.country.trim()) {
            return false;
        }
        if self.provinces.is_empty() && self.postal_prefixes.is_empty() {
            return true;
        }
        let province = destination.province.trim();
        let postal_code = destination.postal_code.trim();
        self.provinces.iter().any(|p| p.eq_ignore_ascii_case(province))
            || self
                .postal_prefixes
                .iter()
                .any(|prefix| postal_code.starts_with(prefix.as_str()))
    }
}

/// Persisted rate table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateTable {
    pub id: String,
    pub name: String,
    pub version: u64,
    pub kind: TableKind,
    pub owner_tenant: String,
    pub carrier_id: Option<String>,
    pub status: TableStatus,
    pub default_margin: MarginPolicy,
    pub billing_model: BillingModel,
    /// Carrier account configuration used when a shipment is created from this table
    pub carrier_config_id: Option<String>,
    pub zones: Vec<ZoneDefinition>,
    pub rules: Vec<Rule>,
    pub cloned_from: Option<String>,
    /// External feed this table was imported from
    pub import_source: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RateTable {
    pub fn is_active(&self) -> bool {
        self.status == TableStatus::Active
    }

    /// True when this table prices the given carrier
    pub fn covers_carrier(&self, carrier_id: Option<&str>) -> bool {
        match (&self.carrier_id, carrier_id) {
            (None, _) => true,
            (Some(own), Some(requested)) => own == requested,
            (Some(_), None) => false,
        }
    }

    /// Zone code of a destination under this table's zone map
    pub fn zone_for(&self, destination: &Destination) -> Option<&str> {
        self.zones
            .iter()
            .find(|zone| zone.matches(destination))
            .map(|zone| zone.code.as_str())
    }

    /// Structural validation run on every write
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        self.default_margin.validate()?;
        for (i, zone) in self.zones.iter().enumerate() {
            if self.zones[..i].iter().any(|z| z.code == zone.code) {
                return Err(ValidationError::DuplicateZone {
                    code: zone.code.clone(),
                });
            }
        }
        check_no_overlap(&self.rules)
    }
}

/// Input for creating a table; the store assigns id, version and timestamps
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRateTable {
    pub name: String,
    pub kind: TableKind,
    #[serde(default)]
    pub carrier_id: Option<String>,
    #[serde(default = "default_status")]
    pub status: TableStatus,
    #[serde(default)]
    pub default_margin: MarginPolicy,
    #[serde(default)]
    pub billing_model: BillingModel,
    #[serde(default)]
    pub carrier_config_id: Option<String>,
    #[serde(default)]
    pub zones: Vec<ZoneDefinition>,
    #[serde(default)]
    pub rules: Vec<Rule>,
    #[serde(default)]
    pub import_source: Option<String>,
}

fn default_status() -> TableStatus {
    TableStatus::Draft
}

impl NewRateTable {
    pub fn new(name: impl Into<String>, kind: TableKind) -> Self {
        Self {
            name: name.into(),
            kind,
            carrier_id: None,
            status: TableStatus::Draft,
            default_margin: MarginPolicy::default(),
            billing_model: BillingModel::default(),
            carrier_config_id: None,
            zones: Vec::new(),
            rules: Vec::new(),
            import_source: None,
        }
    }

    pub fn for_carrier(mut self, carrier_id: impl Into<String>) -> Self {
        self.carrier_id = Some(carrier_id.into());
        self
    }

    pub fn active(mut self) -> Self {
        self.status = TableStatus::Active;
        self
    }

    pub fn with_margin(mut self, margin: MarginPolicy) -> Self {
        self.default_margin = margin;
        self
    }

    pub fn with_billing_model(mut self, model: BillingModel) -> Self {
        self.billing_model = model;
        self
    }

    pub fn with_carrier_config(mut self, config_id: impl Into<String>) -> Self {
        self.carrier_config_id = Some(config_id.into());
        self
    }

    pub fn with_zone(mut self, zone: ZoneDefinition) -> Self {
        self.zones.push(zone);
        self
    }

    pub fn with_rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_import_source(mut self, source: impl Into<String>) -> Self {
        self.import_source = Some(source.into());
        self
    }
}

/// Partial update; `None` fields are left unchanged
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableChanges {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub default_margin: Option<MarginPolicy>,
    #[serde(default)]
    pub billing_model: Option<BillingModel>,
    #[serde(default)]
    pub carrier_config_id: Option<Option<String>>,
    #[serde(default)]
    pub zones: Option<Vec<ZoneDefinition>>,
    #[serde(default)]
    pub rules: Option<Vec<Rule>>,
    #[serde(default)]
    pub status: Option<TableStatus>,
}

impl TableChanges {
    pub fn rules(rules: Vec<Rule>) -> Self {
        Self {
            rules: Some(rules),
            ..Self::default()
        }
    }

    pub fn status(status: TableStatus) -> Self {
        Self {
            status: Some(status),
            ..Self::default()
        }
    }

    /// Apply onto a copy of `table`; the caller persists the result
    pub fn apply_to(&self, table: &RateTable) -> Result<RateTable, ValidationError> {
        let mut next = table.clone();
        if let Some(name) = &self.name {
            next.name = name.clone();
        }
        if let Some(margin) = &self.default_margin {
            next.default_margin = margin.clone();
        }
        if let Some(model) = self.billing_model {
            next.billing_model = model;
        }
        if let Some(config_id) = &self.carrier_config_id {
            next.carrier_config_id = config_id.clone();
        }
        if let Some(zones) = &self.zones {
            next.zones = zones.clone();
        }
        if let Some(rules) = &self.rules {
            next.rules = rules.clone();
        }
        if let Some(status) = self.status {
            if status != table.status {
                next.status = table.status.transition_to(status)?;
            }
        }
        next.validate()?;
        Ok(next)
    }
}

/// Grant of a table to a non-owner tenant
///
/// Assignment history is append-only: revocation sets `revoked_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: String,
    pub table_id: String,
    pub tenant_id: String,
    pub can_write: bool,
    pub assigned_by: String,
    pub assigned_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
}

impl Assignment {
    pub fn is_active(&self) -> bool {
        self.revoked_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn destination(postal_code: &str, province: &str) -> Destination {
        Destination {
            postal_code: postal_code.to_string(),
            province: province.to_string(),
            country: "IT".to_string(),
        }
    }

    #[test]
    fn test_status_transitions() {
        assert_eq!(
            TableStatus::Draft.transition_to(TableStatus::Active),
            Ok(TableStatus::Active)
        );
        assert!(TableStatus::Archived
            .transition_to(TableStatus::Active)
            .is_err());
        assert!(TableStatus::Active.transition_to(TableStatus::Draft).is_err());
    }

    #[test]
    fn test_zone_matches_by_province_or_prefix() {
        let south = ZoneDefinition {
            code: "SOUTH".to_string(),
            country: "IT".to_string(),
            provinces: vec!["SA".to_string()],
            postal_prefixes: vec!["80".to_string()],
        };
        assert!(south.matches(&destination("84087", "SA")));
        assert!(south.matches(&destination("80100", "NA")));
        assert!(!south.matches(&destination("20121", "MI")));
    }

    #[test]
    fn test_margin_policy_applies_percent_then_fixed() {
        let policy = MarginPolicy {
            percent: Decimal::new(15, 0),
            fixed: Decimal::new(50, 2),
        };
        // 6.50 * 1.15 + 0.50
        assert_eq!(policy.apply(Decimal::new(650, 2)), Decimal::new(7975, 3));
    }
}
