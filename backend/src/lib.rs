//! Rate Engine Core
//!
//! Multi-tenant shipping rate engine: rate table storage, rule resolution,
//! pricing, margin analysis and reseller best-price selection.
//!
//! # Architecture
//!
//! - **models**: Domain types (tenants, rate tables, rules, requests, quotes)
//! - **store**: Rate Table Store with the tenant visibility predicate
//! - **pricing**: Rule Resolver, Rate Calculator, Margin Policy Engine,
//!   Best-Price Selector
//! - **sync**: Durable keyed lock guarding bulk imports
//! - **import**: External rate feed import
//! - **config**: Engine configuration
//!
//! # Critical Invariants
//!
//! 1. All money values are `Decimal`, rounded only for presentation
//! 2. A tenant never resolves a table outside its visibility predicate
//! 3. Margin is never invented: no cost data means no margin
//! 4. Bulk imports hold the sync lock for their whole duration

// Module declarations
pub mod config;
pub mod import;
pub mod models;
pub mod money;
pub mod pricing;
pub mod store;
pub mod sync;

// Re-exports for convenience
pub use config::{ConfigError, PricingConfig};
pub use import::{FeedRow, ImportError, ImportReport, RateImporter};
pub use models::{
    ApiSource, AuthContext, CostLedger, Destination, Quote, QuoteView, RateTable, Role,
    ShipmentOptions, ShipmentRequest, ValidationError,
};
pub use money::Money;
pub use pricing::{BestPriceSelector, MarginOutcome, MarginReason, QuoteEngine, QuoteError};
pub use store::{RateTableStore, StoreError, TableFilter};
pub use sync::{LockError, SqliteLockStore, SyncLockKey};
