//! Quote model
//!
//! A quote is the ephemeral output of the pricing pipeline. It is not
//! persisted here; shipment creation charges the wallet for `total_cost`
//! and routes through the carrier configuration named by `api_source` and
//! `config_id`, and fiscal reporting sums `margin` where it is present.
//!
//! `total_cost` is the cost *before* margin; `final_price` is what the
//! customer pays. The two names are not interchangeable.

use crate::money::{present, Money};
use crate::pricing::margin::{CostSource, MarginOutcome, MarginReason};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which pricing path produced a reseller quote
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiSource {
    /// The reseller's own contract and carrier account
    Reseller,
    /// The platform master contract and carrier account
    Master,
}

impl ApiSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiSource::Reseller => "reseller",
            ApiSource::Master => "master",
        }
    }
}

/// One triggered surcharge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SurchargeLine {
    pub name: String,
    pub amount: Money,
}

/// Priced shipment (unrounded)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub base_price: Money,
    pub surcharges: Vec<SurchargeLine>,
    pub total_cost: Money,
    pub final_price: Money,
    pub margin: MarginOutcome,
    /// Winning rate table
    pub price_list_id: String,
    pub price_list_version: u64,
    pub rule_id: String,
    pub carrier_id: Option<String>,
    /// Set on reseller quotes only
    pub api_source: Option<ApiSource>,
    pub config_id: Option<String>,
}

impl Quote {
    pub fn margin_amount(&self) -> Option<Money> {
        self.margin.margin()
    }

    pub fn margin_percent(&self) -> Option<Decimal> {
        self.margin.margin_percent()
    }

    pub fn margin_reason(&self) -> Option<MarginReason> {
        self.margin.reason()
    }

    /// Outbound representation with money rounded for presentation
    pub fn view(&self) -> QuoteView {
        QuoteView {
            base_price: present(self.base_price),
            surcharges: self
                .surcharges
                .iter()
                .map(|line| SurchargeLine {
                    name: line.name.clone(),
                    amount: present(line.amount),
                })
                .collect(),
            total_cost: present(self.total_cost),
            final_price: present(self.final_price),
            margin: self.margin.margin().map(present),
            margin_percent: self.margin.margin_percent().map(present),
            margin_reason: self.margin.reason(),
            cost_source: self.margin.cost_source(),
            price_list_id: self.price_list_id.clone(),
            api_source: self.api_source,
            config_id: self.config_id.clone(),
        }
    }
}

/// Quote as handed to shipment creation and reporting
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteView {
    pub base_price: Money,
    pub surcharges: Vec<SurchargeLine>,
    pub total_cost: Money,
    pub final_price: Money,
    pub margin: Option<Money>,
    pub margin_percent: Option<Decimal>,
    pub margin_reason: Option<MarginReason>,
    pub cost_source: Option<CostSource>,
    pub price_list_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_source: Option<ApiSource>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_id: Option<String>,
}
