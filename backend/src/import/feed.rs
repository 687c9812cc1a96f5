//! External rate-feed rows and their translation into rules
//!
//! Break syntax accepted in `zone_or_weight_break`:
//!
//! ```text
//! SOUTH            zone only, any weight
//! 0-2kg            weight band [0, 2)
//! 30+kg            weight band [30, ∞)
//! SOUTH:2-5kg      zone and weight band
//! ```

use crate::models::{Rule, RulePredicate, Surcharge, SurchargeAmount, SurchargeTrigger, ValidationError};
use crate::money::{DecimalRange, Money};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSurchargeKind {
    #[default]
    Fixed,
    PercentOfBase,
    PercentOfDeclaredValue,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSurchargeTrigger {
    #[default]
    Always,
    CashOnDelivery,
    Insurance,
}

/// One entry of a row's surcharge schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedSurcharge {
    pub name: String,
    pub value: Decimal,
    #[serde(default)]
    pub kind: FeedSurchargeKind,
    #[serde(default)]
    pub applies_when: FeedSurchargeTrigger,
}

/// Raw row of an external rate feed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedRow {
    pub carrier_code: String,
    pub zone_or_weight_break: String,
    pub price: Money,
    #[serde(default)]
    pub surcharge_schedule: Vec<FeedSurcharge>,
}

fn malformed(row: usize, reason: impl Into<String>) -> ValidationError {
    ValidationError::MalformedFeedRow {
        row,
        reason: reason.into(),
    }
}

fn parse_weight_band(row: usize, raw: &str) -> Result<DecimalRange, ValidationError> {
    let band = raw
        .trim()
        .strip_suffix("kg")
        .ok_or_else(|| malformed(row, format!("weight break {:?} must end in kg", raw)))?;
    let parse = |value: &str| {
        value
            .trim()
            .parse::<Decimal>()
            .map_err(|_| malformed(row, format!("invalid weight {:?}", value)))
    };

    if let Some(min) = band.strip_suffix('+') {
        return Ok(DecimalRange::at_least(parse(min)?));
    }
    let (min, max) = band
        .split_once('-')
        .ok_or_else(|| malformed(row, format!("weight break {:?} needs min-max", raw)))?;
    let range = DecimalRange::new(parse(min)?, Some(parse(max)?));
    if range.is_degenerate() {
        return Err(malformed(row, format!("weight break {:?} is empty", raw)));
    }
    Ok(range)
}

fn looks_like_weight(raw: &str) -> bool {
    raw.trim().ends_with("kg")
}

/// Parse a break into (zone, weight band)
pub fn parse_break(row: usize, raw: &str) -> Result<(Option<String>, DecimalRange), ValidationError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(malformed(row, "empty zone or weight break"));
    }
    if let Some((zone, weight)) = raw.split_once(':') {
        let zone = zone.trim();
        if zone.is_empty() {
            return Err(malformed(row, "empty zone"));
        }
        return Ok((Some(zone.to_string()), parse_weight_band(row, weight)?));
    }
    if looks_like_weight(raw) {
        Ok((None, parse_weight_band(row, raw)?))
    } else {
        Ok((Some(raw.to_string()), DecimalRange::at_least(Decimal::ZERO)))
    }
}

impl FeedSurcharge {
    fn to_surcharge(&self) -> Surcharge {
        let amount = match self.kind {
            FeedSurchargeKind::Fixed => SurchargeAmount::Fixed { amount: self.value },
            FeedSurchargeKind::PercentOfBase => SurchargeAmount::PercentOfBase { percent: self.value },
            FeedSurchargeKind::PercentOfDeclaredValue => {
                SurchargeAmount::PercentOfDeclaredValue { percent: self.value }
            }
        };
        let trigger = match self.applies_when {
            FeedSurchargeTrigger::Always => SurchargeTrigger::Always,
            FeedSurchargeTrigger::CashOnDelivery => SurchargeTrigger::CashOnDelivery,
            FeedSurchargeTrigger::Insurance => SurchargeTrigger::Insurance,
        };
        Surcharge::new(self.name.clone(), amount, trigger)
    }
}

impl FeedRow {
    /// Translate into a rule; `row` is the 1-based position for error messages
    pub fn to_rule(&self, row: usize) -> Result<Rule, ValidationError> {
        if self.carrier_code.trim().is_empty() {
            return Err(malformed(row, "missing carrier code"));
        }
        if self.price < Decimal::ZERO {
            return Err(malformed(row, "negative price"));
        }
        let (zone, weight) = parse_break(row, &self.zone_or_weight_break)?;
        let mut predicate = RulePredicate::weight(weight);
        predicate.zone = zone;

        let mut rule = Rule::new(predicate, self.price);
        rule.surcharges = self.surcharge_schedule.iter().map(FeedSurcharge::to_surcharge).collect();
        Ok(rule)
    }
}

/// Translate a whole feed, grouping rules by carrier code
pub fn rules_by_carrier(rows: &[FeedRow]) -> Result<BTreeMap<String, Vec<Rule>>, ValidationError> {
    let mut grouped: BTreeMap<String, Vec<Rule>> = BTreeMap::new();
    for (i, row) in rows.iter().enumerate() {
        let rule = row.to_rule(i + 1)?;
        grouped
            .entry(row.carrier_code.trim().to_string())
            .or_default()
            .push(rule);
    }
    Ok(grouped)
}
