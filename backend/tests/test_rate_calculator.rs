//! Rate Calculator Tests
//!
//! Critical invariants tested:
//! - total_cost = base price + Σ triggered surcharges
//! - Untriggered surcharges are omitted, not listed at zero
//! - Internal amounts stay unrounded; rounding happens only in the view
//! - Final price follows the table's billing model

use rate_engine_core::config::PricingConfig;
use rate_engine_core::models::{
    AuthContext, BillingModel, CostLedger, Destination, MarginPolicy, NewRateTable, Role, Rule,
    RulePredicate, ShipmentOptions, ShipmentRequest, Surcharge, SurchargeAmount, SurchargeTrigger,
    TableKind,
};
use rate_engine_core::money::DecimalRange;
use rate_engine_core::pricing::{apply, QuoteEngine};
use rate_engine_core::store::RateTableStore;
use rust_decimal::Decimal;
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn base_rule(price: &str) -> Rule {
    Rule::new(RulePredicate::weight(DecimalRange::at_least(d("0"))), d(price))
}

fn request(weight: &str, province: &str) -> ShipmentRequest {
    ShipmentRequest::new(
        d(weight),
        Destination {
            postal_code: "00100".to_string(),
            province: province.to_string(),
            country: "IT".to_string(),
        },
        "standard",
    )
}

fn engine_with(table: NewRateTable) -> (QuoteEngine, AuthContext) {
    let store = Arc::new(RateTableStore::new());
    let tenant = AuthContext::new("shop-1", Role::User);
    store.create(&tenant, table).unwrap();
    let engine = QuoteEngine::new(store, Arc::new(CostLedger::new()), PricingConfig::default());
    (engine, tenant)
}

// ============================================================================
// Breakdown
// ============================================================================

#[test]
fn test_rule_without_surcharges_costs_base_price() {
    let breakdown = apply(&base_rule("6.50"), &request("2", "RM"));
    assert_eq!(breakdown.base_price, d("6.50"));
    assert!(breakdown.surcharges.is_empty());
    assert_eq!(breakdown.total_cost, d("6.50"));
}

#[test]
fn test_surcharges_are_additive() {
    let rule = base_rule("10.00")
        .with_surcharge(Surcharge::new(
            "fuel",
            SurchargeAmount::PercentOfBase { percent: d("12.5") },
            SurchargeTrigger::Always,
        ))
        .with_surcharge(Surcharge::new(
            "handling",
            SurchargeAmount::Fixed { amount: d("0.90") },
            SurchargeTrigger::Always,
        ));

    let breakdown = apply(&rule, &request("2", "RM"));
    assert_eq!(breakdown.surcharges.len(), 2);
    assert_eq!(breakdown.surcharges[0].name, "fuel");
    assert_eq!(breakdown.surcharges[0].amount, d("1.25"));
    assert_eq!(breakdown.total_cost, d("12.15"));
}

#[test]
fn test_untriggered_surcharges_are_omitted() {
    let rule = base_rule("8.00")
        .with_surcharge(Surcharge::new(
            "cod",
            SurchargeAmount::Fixed { amount: d("3.00") },
            SurchargeTrigger::CashOnDelivery,
        ))
        .with_surcharge(Surcharge::new(
            "islands",
            SurchargeAmount::Fixed { amount: d("5.00") },
            SurchargeTrigger::Provinces {
                provinces: vec!["CA".to_string(), "PA".to_string()],
            },
        ))
        .with_surcharge(Surcharge::new(
            "heavy",
            SurchargeAmount::Fixed { amount: d("4.00") },
            SurchargeTrigger::WeightAbove { kg: d("20") },
        ));

    let breakdown = apply(&rule, &request("2", "RM"));
    assert!(breakdown.surcharges.is_empty(), "no zero lines for untriggered surcharges");
    assert_eq!(breakdown.total_cost, d("8.00"));

    let breakdown = apply(&rule, &request("25", "pa"));
    let names: Vec<&str> = breakdown.surcharges.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["islands", "heavy"]);
    assert_eq!(breakdown.total_cost, d("17.00"));
}

#[test]
fn test_cash_on_delivery_and_insurance_triggers() {
    let rule = base_rule("8.00")
        .with_surcharge(Surcharge::new(
            "cod",
            SurchargeAmount::Fixed { amount: d("3.00") },
            SurchargeTrigger::CashOnDelivery,
        ))
        .with_surcharge(Surcharge::new(
            "insurance",
            SurchargeAmount::PercentOfDeclaredValue { percent: d("1.5") },
            SurchargeTrigger::Insurance,
        ));

    let shipment = request("2", "RM").with_options(ShipmentOptions {
        declared_value: Some(d("250.00")),
        cash_on_delivery: Some(d("120.00")),
        insurance: true,
    });
    let breakdown = apply(&rule, &shipment);
    assert_eq!(breakdown.surcharges.len(), 2);
    assert_eq!(breakdown.surcharges[1].amount, d("3.75"));
    assert_eq!(breakdown.total_cost, d("14.75"));

    // a zero COD amount means no COD
    let no_cod = request("2", "RM").with_options(ShipmentOptions {
        cash_on_delivery: Some(Decimal::ZERO),
        ..ShipmentOptions::default()
    });
    assert_eq!(apply(&rule, &no_cod).total_cost, d("8.00"));
}

#[test]
fn test_declared_value_threshold_is_strict() {
    let rule = base_rule("8.00").with_surcharge(Surcharge::new(
        "high value",
        SurchargeAmount::Fixed { amount: d("2.00") },
        SurchargeTrigger::DeclaredValueAbove { amount: d("500") },
    ));
    let at = request("2", "RM").with_options(ShipmentOptions {
        declared_value: Some(d("500")),
        ..ShipmentOptions::default()
    });
    let above = request("2", "RM").with_options(ShipmentOptions {
        declared_value: Some(d("500.01")),
        ..ShipmentOptions::default()
    });
    assert_eq!(apply(&rule, &at).total_cost, d("8.00"));
    assert_eq!(apply(&rule, &above).total_cost, d("10.00"));
}

#[test]
fn test_amounts_are_not_rounded_internally() {
    let rule = base_rule("3.33").with_surcharge(Surcharge::new(
        "fuel",
        SurchargeAmount::PercentOfBase { percent: d("7.5") },
        SurchargeTrigger::Always,
    ));
    let breakdown = apply(&rule, &request("1", "RM"));
    assert_eq!(breakdown.surcharges[0].amount, d("0.24975"));
    assert_eq!(breakdown.total_cost, d("3.57975"));
}

// ============================================================================
// Final Price
// ============================================================================

#[test]
fn test_markup_final_price_uses_default_margin() {
    let (engine, tenant) = engine_with(
        NewRateTable::new("Markup", TableKind::Custom)
            .active()
            .with_margin(MarginPolicy {
                percent: d("15"),
                fixed: d("0.50"),
            })
            .with_rule(base_rule("6.50")),
    );

    let quote = engine.quote(&tenant, &request("2", "RM")).unwrap();
    assert_eq!(quote.total_cost, d("6.50"));
    assert_eq!(quote.final_price, d("7.975"));

    let view = quote.view();
    assert_eq!(view.final_price, d("7.98"));
    assert_eq!(view.total_cost, d("6.50"));
}

#[test]
fn test_pass_through_final_price_equals_cost() {
    let (engine, tenant) = engine_with(
        NewRateTable::new("Pass-through", TableKind::Custom)
            .active()
            .with_billing_model(BillingModel::PassThrough)
            .with_margin(MarginPolicy::percent(d("20")))
            .with_rule(base_rule("6.50")),
    );

    let quote = engine.quote(&tenant, &request("2", "RM")).unwrap();
    assert_eq!(quote.final_price, quote.total_cost);
}

#[test]
fn test_quote_carries_table_provenance() {
    let (engine, tenant) = engine_with(
        NewRateTable::new("BRT contract", TableKind::Custom)
            .for_carrier("BRT")
            .with_carrier_config("brt-account-7")
            .active()
            .with_rule(base_rule("6.50")),
    );

    let quote = engine
        .quote(&tenant, &request("2", "RM").with_carrier("BRT"))
        .unwrap();
    assert_eq!(quote.carrier_id.as_deref(), Some("BRT"));
    assert_eq!(quote.config_id.as_deref(), Some("brt-account-7"));
    assert_eq!(quote.price_list_version, 1);
    assert_eq!(quote.api_source, None);
}
