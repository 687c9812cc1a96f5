//! Quote engine
//!
//! Runs one pricing path: validate → resolve → apply → price → margin.
//!
//! Quoting is read-only and stateless, so a single engine can serve any
//! number of concurrent requests without locking beyond the store's read
//! lock.

use crate::config::PricingConfig;
use crate::models::{
    ApiSource, AuthContext, BillingModel, CostRecordSource, Quote, ShipmentRequest,
};
use crate::pricing::calculator;
use crate::pricing::margin::{compute_margin, MarginInputs};
use crate::pricing::resolver::{resolve_in_tiers, ResolvedRate, Tier};
use crate::pricing::QuoteError;
use crate::store::RateTableStore;
use std::sync::Arc;

pub struct QuoteEngine {
    store: Arc<RateTableStore>,
    costs: Arc<dyn CostRecordSource>,
    config: PricingConfig,
}

impl QuoteEngine {
    pub fn new(
        store: Arc<RateTableStore>,
        costs: Arc<dyn CostRecordSource>,
        config: PricingConfig,
    ) -> Self {
        Self {
            store,
            costs,
            config,
        }
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    pub fn store(&self) -> &RateTableStore {
        &self.store
    }

    /// Platform master context for the comparison path
    pub(crate) fn master_context(&self) -> AuthContext {
        AuthContext::platform(&self.config.master_tenant_id)
    }

    /// Quote a shipment for the authenticated tenant (single path)
    pub fn quote(&self, auth: &AuthContext, request: &ShipmentRequest) -> Result<Quote, QuoteError> {
        request.validate(&self.config.known_carriers)?;
        self.price_path(auth, request, None)
    }

    /// Price an already validated request under `auth`
    ///
    /// The reseller path only sees the tenant's own and assigned contracts;
    /// a global table would otherwise be billed through the reseller's
    /// carrier account.
    pub(crate) fn price_path(
        &self,
        auth: &AuthContext,
        request: &ShipmentRequest,
        api_source: Option<ApiSource>,
    ) -> Result<Quote, QuoteError> {
        let tiers = match api_source {
            Some(ApiSource::Reseller) => Tier::own_contract_for(auth.role()),
            _ => Tier::precedence_for(auth.role()),
        };
        let resolved = resolve_in_tiers(&self.store, auth, request, tiers)?;
        Ok(self.build_quote(resolved, request, api_source))
    }

    fn build_quote(
        &self,
        resolved: ResolvedRate,
        request: &ShipmentRequest,
        api_source: Option<ApiSource>,
    ) -> Quote {
        let ResolvedRate { table, rule, .. } = resolved;
        let breakdown = calculator::apply(&rule, request);

        let final_price = match table.billing_model {
            BillingModel::Markup => table.default_margin.apply(breakdown.total_cost),
            BillingModel::PassThrough => breakdown.total_cost,
        };

        // pass-through quotes carry no margin, so no cost is looked up
        let provider_cost = match table.billing_model {
            BillingModel::PassThrough => None,
            BillingModel::Markup => request
                .shipment_id
                .as_deref()
                .and_then(|shipment_id| self.costs.provider_cost(shipment_id)),
        };

        let margin = compute_margin(&MarginInputs {
            final_price: Some(final_price),
            provider_cost,
            base_price: Some(breakdown.total_cost),
            billing_model: table.billing_model,
            api_source,
        });

        tracing::debug!(
            table_id = %table.id,
            rule_id = %rule.id,
            total_cost = %breakdown.total_cost,
            final_price = %final_price,
            "quote priced"
        );

        Quote {
            base_price: breakdown.base_price,
            surcharges: breakdown.surcharges,
            total_cost: breakdown.total_cost,
            final_price,
            margin,
            price_list_id: table.id,
            price_list_version: table.version,
            rule_id: rule.id,
            carrier_id: table.carrier_id.or_else(|| request.carrier_id.clone()),
            api_source,
            config_id: table.carrier_config_id,
        }
    }
}
