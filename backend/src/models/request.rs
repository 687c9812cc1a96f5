//! Shipment request attributes
//!
//! Inbound shape of a quote request. Validation runs before resolution so a
//! malformed request never reaches the rate tables.

use crate::models::validation::ValidationError;
use crate::money::Money;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Destination {
    pub postal_code: String,
    #[serde(default)]
    pub province: String,
    pub country: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentOptions {
    /// Declared goods value
    #[serde(default)]
    pub declared_value: Option<Money>,
    /// Amount to collect on delivery; `None` or zero means no COD
    #[serde(default)]
    pub cash_on_delivery: Option<Money>,
    #[serde(default)]
    pub insurance: bool,
}

impl ShipmentOptions {
    pub fn has_cash_on_delivery(&self) -> bool {
        self.cash_on_delivery.map_or(false, |amount| amount > Decimal::ZERO)
    }
}

/// A shipment to be priced
///
/// # Example
/// ```
/// use rate_engine_core::models::{Destination, ShipmentRequest};
/// use rust_decimal::Decimal;
///
/// let request = ShipmentRequest::new(
///     Decimal::new(2, 0),
///     Destination {
///         postal_code: "84087".to_string(),
///         province: "SA".to_string(),
///         country: "IT".to_string(),
///     },
///     "standard",
/// )
/// .with_carrier("BRT");
/// assert_eq!(request.carrier_id.as_deref(), Some("BRT"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShipmentRequest {
    pub weight_kg: Decimal,
    pub destination: Destination,
    #[serde(default)]
    pub carrier_id: Option<String>,
    pub service_type: String,
    #[serde(default)]
    pub options: ShipmentOptions,
    /// Existing shipment being re-priced; used to look up its cost record
    #[serde(default)]
    pub shipment_id: Option<String>,
}

impl ShipmentRequest {
    pub fn new(weight_kg: Decimal, destination: Destination, service_type: impl Into<String>) -> Self {
        Self {
            weight_kg,
            destination,
            carrier_id: None,
            service_type: service_type.into(),
            options: ShipmentOptions::default(),
            shipment_id: None,
        }
    }

    pub fn with_carrier(mut self, carrier_id: impl Into<String>) -> Self {
        self.carrier_id = Some(carrier_id.into());
        self
    }

    pub fn with_options(mut self, options: ShipmentOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_shipment_id(mut self, shipment_id: impl Into<String>) -> Self {
        self.shipment_id = Some(shipment_id.into());
        self
    }

    /// Reject malformed requests
    ///
    /// `known_carriers` empty means any carrier id is accepted.
    pub fn validate(&self, known_carriers: &[String]) -> Result<(), ValidationError> {
        if self.weight_kg <= Decimal::ZERO {
            return Err(ValidationError::NonPositiveWeight {
                weight_kg: self.weight_kg.to_string(),
            });
        }
        if self.destination.country.trim().is_empty() {
            return Err(ValidationError::MissingCountry);
        }
        if let Some(value) = self.options.declared_value {
            if value < Decimal::ZERO {
                return Err(ValidationError::NegativeDeclaredValue);
            }
        }
        if let Some(carrier) = &self.carrier_id {
            if !known_carriers.is_empty() && !known_carriers.iter().any(|known| known == carrier) {
                return Err(ValidationError::UnknownCarrier {
                    carrier_id: carrier.clone(),
                });
            }
        }
        Ok(())
    }
}
