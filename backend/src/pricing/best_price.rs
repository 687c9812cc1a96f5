//! Best-Price Selector (reseller dual path)
//!
//! Resellers are priced twice, concurrently: once on their own contract and
//! once on the platform master contract. The lower final price wins; an
//! exact tie keeps the reseller's own path.
//!
//! # Critical Invariants
//!
//! - The winner's `api_source` tells shipment creation which carrier account
//!   to use; a master win is never routed through the reseller's account
//! - Either path may fail without aborting the other; only a double failure
//!   surfaces, as `NoApplicableRate`
//! - Both paths are side-effect free; the loser is simply dropped
//! - Ties are judged on presented (2 dp) prices, the amounts actually billed

use crate::models::{ApiSource, AuthContext, Quote, ShipmentRequest};
use crate::money::present;
use crate::pricing::engine::QuoteEngine;
use crate::pricing::QuoteError;
use std::sync::Arc;
use tokio::task::JoinError;

pub struct BestPriceSelector {
    engine: Arc<QuoteEngine>,
}

/// Choose between the two path results
pub fn pick_winner(own: Option<Quote>, master: Option<Quote>) -> Option<Quote> {
    match (own, master) {
        (Some(own), Some(master)) => {
            if present(master.final_price) < present(own.final_price) {
                Some(master)
            } else {
                Some(own)
            }
        }
        (Some(own), None) => Some(own),
        (None, Some(master)) => Some(master),
        (None, None) => None,
    }
}

fn settle_path(
    result: Result<Result<Quote, QuoteError>, JoinError>,
    source: ApiSource,
    tenant_id: &str,
) -> Option<Quote> {
    match result {
        Ok(Ok(quote)) => Some(quote),
        Ok(Err(err)) => {
            tracing::debug!(
                tenant_id = %tenant_id,
                path = source.as_str(),
                error = %err,
                "pricing path produced no quote"
            );
            None
        }
        Err(err) => {
            tracing::warn!(
                tenant_id = %tenant_id,
                path = source.as_str(),
                error = %err,
                "pricing path aborted"
            );
            None
        }
    }
}

impl BestPriceSelector {
    pub fn new(engine: Arc<QuoteEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &QuoteEngine {
        &self.engine
    }

    /// Best price for the authenticated tenant
    ///
    /// Non-reseller roles get the single-path quote, without `api_source`.
    pub async fn select_best_price(
        &self,
        auth: &AuthContext,
        request: &ShipmentRequest,
    ) -> Result<Quote, QuoteError> {
        request.validate(&self.engine.config().known_carriers)?;

        if !auth.role().is_reseller() {
            return self.engine.price_path(auth, request, None);
        }

        let own = {
            let engine = Arc::clone(&self.engine);
            let auth = auth.clone();
            let request = request.clone();
            tokio::task::spawn_blocking(move || {
                engine.price_path(&auth, &request, Some(ApiSource::Reseller))
            })
        };
        let master = {
            let engine = Arc::clone(&self.engine);
            let request = request.clone();
            tokio::task::spawn_blocking(move || {
                let master_auth = engine.master_context();
                engine.price_path(&master_auth, &request, Some(ApiSource::Master))
            })
        };

        let (own, master) = tokio::join!(own, master);
        let tenant_id = auth.tenant_id();
        let own = settle_path(own, ApiSource::Reseller, tenant_id);
        let master = settle_path(master, ApiSource::Master, tenant_id);

        match pick_winner(own, master) {
            Some(quote) => {
                tracing::info!(
                    tenant_id = %tenant_id,
                    api_source = ?quote.api_source,
                    price_list_id = %quote.price_list_id,
                    "best price selected"
                );
                Ok(quote)
            }
            None => Err(QuoteError::NoApplicableRate {
                tenant_id: tenant_id.to_string(),
                carrier_id: request.carrier_id.clone(),
            }),
        }
    }
}
