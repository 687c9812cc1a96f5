//! Domain models for the rate engine

pub mod cost;
pub mod quote;
pub mod rate_table;
pub mod request;
pub mod rule;
pub mod tenant;
pub mod validation;

// Re-exports
pub use cost::{CostLedger, CostRecord, CostRecordError, CostRecordSource};
pub use quote::{ApiSource, Quote, QuoteView, SurchargeLine};
pub use rate_table::{
    Assignment, BillingModel, MarginPolicy, NewRateTable, RateTable, TableChanges, TableKind,
    TableStatus, ZoneDefinition,
};
pub use request::{Destination, ShipmentOptions, ShipmentRequest};
pub use rule::{Rule, RulePredicate, Surcharge, SurchargeAmount, SurchargeTrigger};
pub use tenant::{AuthContext, Role, SuperAdminScope};
pub use validation::ValidationError;
