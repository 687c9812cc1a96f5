//! Pricing pipeline
//!
//! Quote resolution runs Rule Resolver → Rate Calculator → Margin Policy
//! Engine. Resellers run that path twice through the Best-Price Selector.
//!
//! # Example
//!
//! ```rust
//! use rate_engine_core::config::PricingConfig;
//! use rate_engine_core::models::*;
//! use rate_engine_core::money::DecimalRange;
//! use rate_engine_core::pricing::QuoteEngine;
//! use rate_engine_core::store::RateTableStore;
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! let store = Arc::new(RateTableStore::new());
//! let shop = AuthContext::new("shop-1", Role::User);
//! store
//!     .create(
//!         &shop,
//!         NewRateTable::new("Listino", TableKind::Custom)
//!             .active()
//!             .with_rule(Rule::new(
//!                 RulePredicate::weight(DecimalRange::new(Decimal::ZERO, Some(Decimal::new(5, 0)))),
//!                 Decimal::new(600, 2),
//!             )),
//!     )
//!     .unwrap();
//!
//! let engine = QuoteEngine::new(store, Arc::new(CostLedger::new()), PricingConfig::default());
//! let request = ShipmentRequest::new(
//!     Decimal::new(2, 0),
//!     Destination {
//!         postal_code: "84087".to_string(),
//!         province: "SA".to_string(),
//!         country: "IT".to_string(),
//!     },
//!     "standard",
//! );
//! let quote = engine.quote(&shop, &request).unwrap();
//! assert_eq!(quote.total_cost, Decimal::new(600, 2));
//! ```

pub mod best_price;
pub mod calculator;
pub mod engine;
pub mod margin;
pub mod resolver;

use crate::models::ValidationError;
use thiserror::Error;

pub use best_price::{pick_winner, BestPriceSelector};
pub use calculator::{apply, RateBreakdown};
pub use engine::QuoteEngine;
pub use margin::{
    compute_margin, CostSource, MarginAggregate, MarginInputs, MarginOutcome, MarginReason,
};
pub use resolver::{resolve, resolve_in_tiers, ResolvedRate, Tier};

/// Errors from quoting
#[derive(Debug, Error, PartialEq)]
pub enum QuoteError {
    #[error("Invalid request: {0}")]
    Validation(#[from] ValidationError),

    /// Terminal; never retried automatically
    #[error("No applicable rate for tenant {tenant_id}")]
    NoApplicableRate {
        tenant_id: String,
        carrier_id: Option<String>,
    },
}
