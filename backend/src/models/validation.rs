//! Validation errors
//!
//! Raised before any resolution or write begins; a request or table that
//! fails validation leaves no partial side effects behind.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("Weight must be positive, got {weight_kg} kg")]
    NonPositiveWeight { weight_kg: String },

    #[error("Unknown carrier: {carrier_id}")]
    UnknownCarrier { carrier_id: String },

    #[error("Declared value must not be negative")]
    NegativeDeclaredValue,

    #[error("Destination country is required")]
    MissingCountry,

    #[error("Rate table name must not be empty")]
    EmptyName,

    #[error("Rule {rule_id}: {field} range is empty or inverted")]
    DegenerateRange { rule_id: String, field: &'static str },

    #[error("Rule {rule_id}: base price must not be negative")]
    NegativeBasePrice { rule_id: String },

    #[error("Rules {first} and {second} have overlapping predicates")]
    OverlappingRules { first: String, second: String },

    #[error("Duplicate zone code {code}")]
    DuplicateZone { code: String },

    #[error("Margin percent must not be negative")]
    NegativeMargin,

    #[error("Cannot move table from {from} to {to}")]
    InvalidStatusTransition { from: &'static str, to: &'static str },

    #[error("Table {table_id} is archived")]
    ArchivedTable { table_id: String },

    #[error("Feed row {row}: {reason}")]
    MalformedFeedRow { row: usize, reason: String },
}
