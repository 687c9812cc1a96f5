//! Pricing rule model
//!
//! A rule belongs to exactly one rate table. It matches a predicate over
//! (weight, destination zone, service type, declared value) and yields a base
//! price plus named surcharges.
//!
//! # Critical Invariants
//!
//! - No two rules in the same table have overlapping predicates; checked by
//!   [`check_no_overlap`] on every table write, so at most one rule in a table
//!   can match a request and no tie-break is ever needed.
//! - Ranges are half-open `[min, max)`: adjacent weight breaks never overlap.

use crate::models::request::ShipmentRequest;
use crate::models::validation::ValidationError;
use crate::money::{DecimalRange, Money};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Predicate a request must satisfy for a rule to apply
///
/// `None` in an optional dimension means "any value".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RulePredicate {
    pub weight_kg: DecimalRange,
    #[serde(default)]
    pub zone: Option<String>,
    #[serde(default)]
    pub service_type: Option<String>,
    #[serde(default)]
    pub declared_value: Option<DecimalRange>,
}

impl RulePredicate {
    /// Predicate on weight only, any zone, service and declared value
    pub fn weight(weight_kg: DecimalRange) -> Self {
        Self {
            weight_kg,
            zone: None,
            service_type: None,
            declared_value: None,
        }
    }

    pub fn with_zone(mut self, zone: impl Into<String>) -> Self {
        self.zone = Some(zone.into());
        self
    }

    pub fn with_service_type(mut self, service_type: impl Into<String>) -> Self {
        self.service_type = Some(service_type.into());
        self
    }

    pub fn with_declared_value(mut self, range: DecimalRange) -> Self {
        self.declared_value = Some(range);
        self
    }

    /// Check whether a request (already classified into `zone`) matches
    pub fn matches(&self, request: &ShipmentRequest, zone: Option<&str>) -> bool {
        if !self.weight_kg.contains(request.weight_kg) {
            return false;
        }
        if let Some(required) = &self.zone {
            if zone != Some(required.as_str()) {
                return false;
            }
        }
        if let Some(required) = &self.service_type {
            if !required.eq_ignore_ascii_case(&request.service_type) {
                return false;
            }
        }
        if let Some(range) = &self.declared_value {
            let declared = request.options.declared_value.unwrap_or(Decimal::ZERO);
            if !range.contains(declared) {
                return false;
            }
        }
        true
    }

    /// Two predicates overlap iff every dimension overlaps
    pub fn overlaps(&self, other: &RulePredicate) -> bool {
        fn optional_eq(a: &Option<String>, b: &Option<String>, ignore_case: bool) -> bool {
            match (a, b) {
                (Some(a), Some(b)) if ignore_case => a.eq_ignore_ascii_case(b),
                (Some(a), Some(b)) => a == b,
                _ => true,
            }
        }

        let declared_overlaps = match (&self.declared_value, &other.declared_value) {
            (Some(a), Some(b)) => a.overlaps(b),
            _ => true,
        };

        self.weight_kg.overlaps(&other.weight_kg)
            && optional_eq(&self.zone, &other.zone, false)
            && optional_eq(&self.service_type, &other.service_type, true)
            && declared_overlaps
    }
}

/// How a surcharge amount is computed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SurchargeAmount {
    /// Flat amount
    Fixed { amount: Money },
    /// Percentage of the rule's base price
    PercentOfBase { percent: Decimal },
    /// Percentage of the declared goods value
    PercentOfDeclaredValue { percent: Decimal },
}

/// When a surcharge applies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SurchargeTrigger {
    Always,
    CashOnDelivery,
    Insurance,
    /// Weight strictly above the threshold
    WeightAbove { kg: Decimal },
    /// Declared value strictly above the threshold
    DeclaredValueAbove { amount: Money },
    /// Destination province in the list (remote areas, islands)
    Provinces { provinces: Vec<String> },
}

/// Named surcharge evaluated independently of every other surcharge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Surcharge {
    pub name: String,
    pub amount: SurchargeAmount,
    pub trigger: SurchargeTrigger,
}

impl Surcharge {
    pub fn new(name: impl Into<String>, amount: SurchargeAmount, trigger: SurchargeTrigger) -> Self {
        Self {
            name: name.into(),
            amount,
            trigger,
        }
    }
}

/// A single predicate → price mapping inside a rate table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub id: String,
    pub predicate: RulePredicate,
    pub base_price: Money,
    #[serde(default)]
    pub surcharges: Vec<Surcharge>,
}

impl Rule {
    pub fn new(predicate: RulePredicate, base_price: Money) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            predicate,
            base_price,
            surcharges: Vec::new(),
        }
    }

    pub fn with_surcharge(mut self, surcharge: Surcharge) -> Self {
        self.surcharges.push(surcharge);
        self
    }

    /// Field-level checks for a single rule
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.base_price < Decimal::ZERO {
            return Err(ValidationError::NegativeBasePrice {
                rule_id: self.id.clone(),
            });
        }
        if self.predicate.weight_kg.is_degenerate() {
            return Err(ValidationError::DegenerateRange {
                rule_id: self.id.clone(),
                field: "weight",
            });
        }
        if let Some(range) = &self.predicate.declared_value {
            if range.is_degenerate() {
                return Err(ValidationError::DegenerateRange {
                    rule_id: self.id.clone(),
                    field: "declared value",
                });
            }
        }
        Ok(())
    }
}

/// Validate every rule and reject any overlapping pair
pub fn check_no_overlap(rules: &[Rule]) -> Result<(), ValidationError> {
    for rule in rules {
        rule.validate()?;
    }
    for (i, first) in rules.iter().enumerate() {
        for second in &rules[i + 1..] {
            if first.predicate.overlaps(&second.predicate) {
                return Err(ValidationError::OverlappingRules {
                    first: first.id.clone(),
                    second: second.id.clone(),
                });
            }
        }
    }
    Ok(())
}
