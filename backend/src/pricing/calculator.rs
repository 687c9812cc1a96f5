//! Rate Calculator
//!
//! Evaluates the winning rule into a base price plus itemized surcharges.
//! Surcharges are independent and additive. An untriggered surcharge is
//! omitted from the breakdown, not listed as a zero line.
//!
//! `total_cost` is the cost before margin.

use crate::models::{Rule, ShipmentRequest, Surcharge, SurchargeAmount, SurchargeLine, SurchargeTrigger};
use crate::money::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateBreakdown {
    pub base_price: Money,
    pub surcharges: Vec<SurchargeLine>,
    pub total_cost: Money,
}

fn is_triggered(trigger: &SurchargeTrigger, request: &ShipmentRequest) -> bool {
    let declared = request.options.declared_value.unwrap_or(Decimal::ZERO);
    match trigger {
        SurchargeTrigger::Always => true,
        SurchargeTrigger::CashOnDelivery => request.options.has_cash_on_delivery(),
        SurchargeTrigger::Insurance => request.options.insurance,
        SurchargeTrigger::WeightAbove { kg } => request.weight_kg > *kg,
        SurchargeTrigger::DeclaredValueAbove { amount } => declared > *amount,
        SurchargeTrigger::Provinces { provinces } => {
            let province = request.destination.province.trim();
            provinces.iter().any(|p| p.eq_ignore_ascii_case(province))
        }
    }
}

fn surcharge_amount(surcharge: &Surcharge, base_price: Money, request: &ShipmentRequest) -> Money {
    match &surcharge.amount {
        SurchargeAmount::Fixed { amount } => *amount,
        SurchargeAmount::PercentOfBase { percent } => base_price * *percent / Decimal::ONE_HUNDRED,
        SurchargeAmount::PercentOfDeclaredValue { percent } => {
            request.options.declared_value.unwrap_or(Decimal::ZERO) * *percent / Decimal::ONE_HUNDRED
        }
    }
}

/// Apply a rule to a request
pub fn apply(rule: &Rule, request: &ShipmentRequest) -> RateBreakdown {
    let surcharges: Vec<SurchargeLine> = rule
        .surcharges
        .iter()
        .filter(|surcharge| is_triggered(&surcharge.trigger, request))
        .map(|surcharge| SurchargeLine {
            name: surcharge.name.clone(),
            amount: surcharge_amount(surcharge, rule.base_price, request),
        })
        .collect();

    let total_cost = rule.base_price + surcharges.iter().map(|line| line.amount).sum::<Decimal>();

    RateBreakdown {
        base_price: rule.base_price,
        surcharges,
        total_cost,
    }
}
