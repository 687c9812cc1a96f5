//! Rule Resolver
//!
//! Picks the single rate table and rule that legally apply to a tenant's
//! request.
//!
//! # Precedence
//!
//! Tiers are evaluated top-down with early return:
//! 1. active `custom` table owned by or assigned to the tenant
//! 2. active `supplier` table owned by the tenant
//! 3. active `global` table
//!
//! A tier whose tables have no matching rule is skipped. Custom always wins
//! over supplier, even when the supplier price would be lower. BYOC tenants
//! only ever resolve supplier tables.
//!
//! Within a tier, carrier-specific tables are tried before all-carrier
//! tables, and owned tables before assigned ones; remaining ties fall back to
//! creation order.
//!
//! The reseller's own-contract path of the best-price selector stops before
//! the global tier: platform tables are priced only by the master path.

use crate::models::{AuthContext, RateTable, Role, Rule, ShipmentRequest, TableKind};
use crate::pricing::QuoteError;
use crate::store::{RateTableStore, TableFilter};

/// Resolution tier, in precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Custom,
    Supplier,
    Global,
}

const FULL_PRECEDENCE: [Tier; 3] = [Tier::Custom, Tier::Supplier, Tier::Global];
const OWN_CONTRACT: [Tier; 2] = [Tier::Custom, Tier::Supplier];
const SUPPLIER_ONLY: [Tier; 1] = [Tier::Supplier];

impl Tier {
    /// Tiers a role may resolve, in order
    pub fn precedence_for(role: Role) -> &'static [Tier] {
        match role {
            Role::Byoc => &SUPPLIER_ONLY,
            _ => &FULL_PRECEDENCE,
        }
    }

    /// Tiers holding the tenant's own or assigned contracts, in order
    pub fn own_contract_for(role: Role) -> &'static [Tier] {
        match role {
            Role::Byoc => &SUPPLIER_ONLY,
            _ => &OWN_CONTRACT,
        }
    }

    fn admits(&self, tenant_id: &str, table: &RateTable) -> bool {
        match self {
            // visibility already limits custom tables to owned or assigned
            Tier::Custom => table.kind == TableKind::Custom,
            Tier::Supplier => table.kind == TableKind::Supplier && table.owner_tenant == tenant_id,
            Tier::Global => table.kind == TableKind::Global,
        }
    }
}

/// The winning table and rule
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedRate {
    pub table: RateTable,
    pub rule: Rule,
    pub zone: Option<String>,
    pub tier: Tier,
}

/// Find the matching rule in one table, if any
///
/// The no-overlap invariant guarantees at most one match.
pub fn match_rule<'a>(table: &'a RateTable, request: &ShipmentRequest) -> Option<&'a Rule> {
    let zone = table.zone_for(&request.destination);
    table
        .rules
        .iter()
        .find(|rule| rule.predicate.matches(request, zone))
}

/// Resolve the applicable rate for the authenticated tenant
pub fn resolve(
    store: &RateTableStore,
    auth: &AuthContext,
    request: &ShipmentRequest,
) -> Result<ResolvedRate, QuoteError> {
    resolve_in_tiers(store, auth, request, Tier::precedence_for(auth.role()))
}

/// Resolve using only `tiers`, in the given order
pub fn resolve_in_tiers(
    store: &RateTableStore,
    auth: &AuthContext,
    request: &ShipmentRequest,
    tiers: &[Tier],
) -> Result<ResolvedRate, QuoteError> {
    let tenant_id = auth.tenant_id();
    let carrier_id = request.carrier_id.as_deref();

    let mut filter = TableFilter::active();
    if let Some(carrier) = carrier_id {
        filter = filter.carrier(carrier);
    }
    let candidates: Vec<RateTable> = store
        .query(auth, &filter)
        .into_iter()
        .filter(|table| table.covers_carrier(carrier_id))
        .collect();

    for tier in tiers {
        let mut tier_tables: Vec<&RateTable> = candidates
            .iter()
            .filter(|table| tier.admits(tenant_id, table))
            .collect();
        // stable sort keeps creation order among equals
        tier_tables.sort_by_key(|table| (table.carrier_id.is_none(), table.owner_tenant != tenant_id));

        for table in tier_tables {
            if let Some(rule) = match_rule(table, request) {
                tracing::debug!(
                    tenant_id = %tenant_id,
                    table_id = %table.id,
                    rule_id = %rule.id,
                    tier = ?tier,
                    "rate resolved"
                );
                return Ok(ResolvedRate {
                    zone: table.zone_for(&request.destination).map(str::to_string),
                    rule: rule.clone(),
                    table: table.clone(),
                    tier: *tier,
                });
            }
        }
    }

    Err(QuoteError::NoApplicableRate {
        tenant_id: tenant_id.to_string(),
        carrier_id: request.carrier_id.clone(),
    })
}
