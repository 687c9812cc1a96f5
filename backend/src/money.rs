//! Money helpers
//!
//! All prices, costs and margins are `rust_decimal::Decimal` values in the
//! shipment's billing currency.
//!
//! # Critical Invariants
//!
//! 1. Internal arithmetic is never rounded
//! 2. Rounding (2 dp, half-up) happens only in [`present`], at the edge where
//!    a value leaves the core (quote views, reports)

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};

/// Monetary amount (unrounded)
pub type Money = Decimal;

/// Number of decimal places shown to the outside world
pub const PRESENTATION_SCALE: u32 = 2;

/// Round a monetary amount for presentation (2 dp, half away from zero)
///
/// # Example
/// ```
/// use rate_engine_core::money::present;
/// use rust_decimal::Decimal;
///
/// assert_eq!(present(Decimal::new(7475, 3)), Decimal::new(748, 2));
/// ```
pub fn present(amount: Money) -> Money {
    amount.round_dp_with_strategy(PRESENTATION_SCALE, RoundingStrategy::MidpointAwayFromZero)
}

/// Half-open decimal interval `[min, max)`; `max = None` is unbounded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecimalRange {
    pub min: Decimal,
    #[serde(default)]
    pub max: Option<Decimal>,
}

impl DecimalRange {
    pub fn new(min: Decimal, max: Option<Decimal>) -> Self {
        Self { min, max }
    }

    /// Range starting at `min` with no upper bound
    pub fn at_least(min: Decimal) -> Self {
        Self { min, max: None }
    }

    pub fn contains(&self, value: Decimal) -> bool {
        value >= self.min && self.max.map_or(true, |max| value < max)
    }

    /// True when the range is empty or inverted
    pub fn is_degenerate(&self) -> bool {
        self.max.map_or(false, |max| max <= self.min)
    }

    /// Two half-open ranges overlap when `max(lo) < min(hi)`
    pub fn overlaps(&self, other: &DecimalRange) -> bool {
        let lo = self.min.max(other.min);
        match (self.max, other.max) {
            (None, None) => true,
            (Some(hi), None) | (None, Some(hi)) => lo < hi,
            (Some(a), Some(b)) => lo < a.min(b),
        }
    }
}
