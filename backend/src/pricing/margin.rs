//! Margin Policy Engine
//!
//! Derives the sell margin of a quote strictly from real cost inputs.
//!
//! # Critical Invariants
//!
//! 1. Cost is never back-solved from the final price and an assumed percentage
//! 2. Cost preference: provider cost, then base price, else not calculable
//! 3. `margin_percent = margin / cost × 100`; the denominator is always cost
//! 4. Aggregates use `Σmargin / Σcost × 100`, never a mean of percentages
//! 5. A non-calculable margin is a first-class outcome carrying its reason;
//!    it never collapses into zero

use crate::models::quote::ApiSource;
use crate::models::rate_table::BillingModel;
use crate::money::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Why a margin could not be derived
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MarginReason {
    /// Neither provider cost nor base price is available
    MissingCostData,
    /// The billing model has no meaningful margin (pass-through)
    NotApplicableForModel,
    /// Final price missing or zero
    MissingFinalPrice,
}

/// Which input anchored the cost
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CostSource {
    ProviderCost,
    BasePrice,
}

/// Inputs to [`compute_margin`]
#[derive(Debug, Clone, PartialEq)]
pub struct MarginInputs {
    pub final_price: Option<Money>,
    /// Real carrier cost from a reconciled cost record
    pub provider_cost: Option<Money>,
    /// Pre-margin cost from the rate table (the calculator's total cost)
    pub base_price: Option<Money>,
    pub billing_model: BillingModel,
    pub api_source: Option<ApiSource>,
}

/// Result of the margin computation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MarginOutcome {
    Calculable {
        margin: Money,
        margin_percent: Decimal,
        cost: Money,
        cost_source: CostSource,
    },
    NotCalculable {
        reason: MarginReason,
    },
}

impl MarginOutcome {
    pub fn is_calculable(&self) -> bool {
        matches!(self, MarginOutcome::Calculable { .. })
    }

    pub fn reason(&self) -> Option<MarginReason> {
        match self {
            MarginOutcome::Calculable { .. } => None,
            MarginOutcome::NotCalculable { reason } => Some(*reason),
        }
    }

    pub fn margin(&self) -> Option<Money> {
        match self {
            MarginOutcome::Calculable { margin, .. } => Some(*margin),
            MarginOutcome::NotCalculable { .. } => None,
        }
    }

    pub fn margin_percent(&self) -> Option<Decimal> {
        match self {
            MarginOutcome::Calculable { margin_percent, .. } => Some(*margin_percent),
            MarginOutcome::NotCalculable { .. } => None,
        }
    }

    pub fn cost(&self) -> Option<Money> {
        match self {
            MarginOutcome::Calculable { cost, .. } => Some(*cost),
            MarginOutcome::NotCalculable { .. } => None,
        }
    }

    pub fn cost_source(&self) -> Option<CostSource> {
        match self {
            MarginOutcome::Calculable { cost_source, .. } => Some(*cost_source),
            MarginOutcome::NotCalculable { .. } => None,
        }
    }
}

fn positive(value: Option<Money>) -> Option<Money> {
    value.filter(|v| *v > Decimal::ZERO)
}

/// Compute the margin of a priced shipment
///
/// # Example
/// ```
/// use rate_engine_core::pricing::margin::{compute_margin, MarginInputs, MarginReason};
/// use rate_engine_core::models::BillingModel;
///
/// let outcome = compute_margin(&MarginInputs {
///     final_price: Some("10".parse().unwrap()),
///     provider_cost: None,
///     base_price: None,
///     billing_model: BillingModel::Markup,
///     api_source: None,
/// });
/// assert_eq!(outcome.reason(), Some(MarginReason::MissingCostData));
/// assert_eq!(outcome.margin(), None);
/// ```
pub fn compute_margin(inputs: &MarginInputs) -> MarginOutcome {
    if inputs.billing_model == BillingModel::PassThrough {
        return MarginOutcome::NotCalculable {
            reason: MarginReason::NotApplicableForModel,
        };
    }

    let final_price = match positive(inputs.final_price) {
        Some(price) => price,
        None => {
            return MarginOutcome::NotCalculable {
                reason: MarginReason::MissingFinalPrice,
            }
        }
    };

    let (cost, cost_source) = match (positive(inputs.provider_cost), positive(inputs.base_price)) {
        (Some(cost), _) => (cost, CostSource::ProviderCost),
        (None, Some(cost)) => (cost, CostSource::BasePrice),
        (None, None) => {
            tracing::debug!(api_source = ?inputs.api_source, "margin not calculable: no cost data");
            return MarginOutcome::NotCalculable {
                reason: MarginReason::MissingCostData,
            };
        }
    };

    let margin = final_price - cost;
    MarginOutcome::Calculable {
        margin,
        margin_percent: margin / cost * Decimal::ONE_HUNDRED,
        cost,
        cost_source,
    }
}

/// Running margin totals across many quotes (fiscal reporting)
///
/// Only calculable outcomes contribute to the sums; the others are counted
/// per reason.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarginAggregate {
    pub total_margin: Money,
    pub total_cost: Money,
    pub calculable: usize,
    pub not_calculable: BTreeMap<MarginReason, usize>,
}

impl MarginAggregate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, outcome: &MarginOutcome) {
        match outcome {
            MarginOutcome::Calculable { margin, cost, .. } => {
                self.total_margin += *margin;
                self.total_cost += *cost;
                self.calculable += 1;
            }
            MarginOutcome::NotCalculable { reason } => {
                *self.not_calculable.entry(*reason).or_insert(0) += 1;
            }
        }
    }

    /// `Σmargin / Σcost × 100`; `None` until some cost has been accumulated
    pub fn margin_percent(&self) -> Option<Decimal> {
        if self.total_cost > Decimal::ZERO {
            Some(self.total_margin / self.total_cost * Decimal::ONE_HUNDRED)
        } else {
            None
        }
    }
}

impl<'a> FromIterator<&'a MarginOutcome> for MarginAggregate {
    fn from_iter<I: IntoIterator<Item = &'a MarginOutcome>>(iter: I) -> Self {
        let mut aggregate = MarginAggregate::new();
        for outcome in iter {
            aggregate.add(outcome);
        }
        aggregate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn inputs(final_price: Option<&str>, provider: Option<&str>, base: Option<&str>) -> MarginInputs {
        MarginInputs {
            final_price: final_price.map(d),
            provider_cost: provider.map(d),
            base_price: base.map(d),
            billing_model: BillingModel::Markup,
            api_source: None,
        }
    }

    #[test]
    fn test_zero_provider_cost_falls_back_to_base_price() {
        let outcome = compute_margin(&inputs(Some("12"), Some("0"), Some("10")));
        assert_eq!(outcome.cost_source(), Some(CostSource::BasePrice));
        assert_eq!(outcome.margin(), Some(d("2")));
    }

    #[test]
    fn test_aggregate_without_cost_has_no_percent() {
        let mut aggregate = MarginAggregate::new();
        aggregate.add(&MarginOutcome::NotCalculable {
            reason: MarginReason::MissingCostData,
        });
        assert_eq!(aggregate.margin_percent(), None);
        assert_eq!(
            aggregate.not_calculable.get(&MarginReason::MissingCostData),
            Some(&1)
        );
    }
}
