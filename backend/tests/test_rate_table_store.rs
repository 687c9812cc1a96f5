//! Rate Table Store Tests
//!
//! Critical invariants tested:
//! - Tenant isolation: a tenant sees only owned, assigned and active global tables
//! - Optimistic concurrency: stale writes are rejected, never merged
//! - Batches commit all of their writes or none
//! - Rule integrity: overlapping rules never reach the store
//! - Audit is best effort: sink failure never rolls back a mutation
//! - Snapshots are checksummed and reject tampering

use rate_engine_core::models::{
    AuthContext, NewRateTable, Role, Rule, RulePredicate, TableChanges, TableKind, TableStatus,
    ValidationError,
};
use rate_engine_core::money::DecimalRange;
use rate_engine_core::store::{
    AuditEventKind, BatchWrite, MemoryAuditSink, RateTableStore, StoreError, TableFilter,
};
use rust_decimal::Decimal;
use std::sync::Arc;

// ============================================================================
// Test Helpers
// ============================================================================

fn d(s: &str) -> Decimal {
    s.parse().unwrap()
}

fn weight_rule(min: &str, max: &str, price: &str) -> Rule {
    Rule::new(
        RulePredicate::weight(DecimalRange::new(d(min), Some(d(max)))),
        d(price),
    )
}

fn custom_table(name: &str) -> NewRateTable {
    NewRateTable::new(name, TableKind::Custom)
        .active()
        .with_rule(weight_rule("0", "5", "6.50"))
}

fn reseller(tenant_id: &str) -> AuthContext {
    AuthContext::new(tenant_id, Role::Reseller)
}

fn platform() -> AuthContext {
    AuthContext::new("platform", Role::Admin)
}

// ============================================================================
// Tenant Isolation
// ============================================================================

#[test]
fn test_tenant_cannot_see_other_tenants_tables() {
    let store = RateTableStore::new();
    let tenant_a = reseller("tenant-a");
    let tenant_b = reseller("tenant-b");

    let table = store.create(&tenant_a, custom_table("A contract")).unwrap();

    assert!(
        store.query(&tenant_b, &TableFilter::default()).is_empty(),
        "tenant B must not see tenant A's custom table"
    );
    assert_eq!(
        store.get(&tenant_b, &table.id),
        Err(StoreError::NotFound {
            tenant_id: "tenant-b".to_string(),
            table_id: table.id.clone(),
        })
    );
    assert_eq!(store.query(&tenant_a, &TableFilter::default()).len(), 1);
}

#[test]
fn test_foreign_write_is_reported_as_not_found() {
    let store = RateTableStore::new();
    let tenant_a = reseller("tenant-a");
    let tenant_b = reseller("tenant-b");
    let table = store.create(&tenant_a, custom_table("A contract")).unwrap();

    let changes = TableChanges {
        name: Some("hijacked".to_string()),
        ..TableChanges::default()
    };
    let result = store.update(&tenant_b, &table.id, table.version, &changes);

    assert!(matches!(result, Err(StoreError::NotFound { .. })));
    assert_eq!(store.get(&tenant_a, &table.id).unwrap().name, "A contract");
}

#[test]
fn test_tenant_filter_parameters_cannot_widen_visibility() {
    let store = RateTableStore::new();
    store.create(&reseller("tenant-a"), custom_table("A contract")).unwrap();

    let filter = TableFilter::default().kind(TableKind::Custom);
    assert!(store.query(&reseller("tenant-b"), &filter).is_empty());
}

#[test]
fn test_active_global_tables_are_visible_to_everyone() {
    let store = RateTableStore::new();
    let admin = platform();
    store
        .create(
            &admin,
            NewRateTable::new("Listino base", TableKind::Global)
                .active()
                .with_rule(weight_rule("0", "5", "7.00")),
        )
        .unwrap();
    store
        .create(&admin, NewRateTable::new("Listino bozza", TableKind::Global))
        .unwrap();

    let visible = store.query(&reseller("tenant-a"), &TableFilter::default());
    assert_eq!(visible.len(), 1, "only the active global table is shared");
    assert_eq!(visible[0].name, "Listino base");
}

#[test]
fn test_non_admin_cannot_create_global_table() {
    let store = RateTableStore::new();
    let result = store.create(
        &reseller("tenant-a"),
        NewRateTable::new("Fake global", TableKind::Global),
    );
    assert!(matches!(result, Err(StoreError::NotPermitted { .. })));
}

#[test]
fn test_super_admin_scope_sees_all_tables() {
    let store = RateTableStore::new();
    store.create(&reseller("tenant-a"), custom_table("A")).unwrap();
    store.create(&reseller("tenant-b"), custom_table("B")).unwrap();

    let operator = AuthContext::new("ops", Role::SuperAdmin);
    let scope = operator.super_admin_scope().expect("super admin gets a scope");
    assert_eq!(store.query_all(&scope, &TableFilter::default()).len(), 2);

    // a super admin acting as a tenant is bound by that tenant's visibility
    let impersonating = AuthContext::impersonating("tenant-a", Role::SuperAdmin);
    assert!(impersonating.super_admin_scope().is_none());
    assert_eq!(store.query(&impersonating, &TableFilter::default()).len(), 1);
}

#[test]
fn test_super_admin_update_crosses_tenants() {
    let store = RateTableStore::new();
    let table = store.create(&reseller("tenant-a"), custom_table("A")).unwrap();
    let scope = AuthContext::new("ops", Role::SuperAdmin)
        .super_admin_scope()
        .unwrap();

    let updated = store
        .update_as_super_admin(&scope, &table.id, 1, &TableChanges::status(TableStatus::Archived))
        .unwrap();
    assert_eq!(updated.status, TableStatus::Archived);
    assert_eq!(updated.version, 2);
}

// ============================================================================
// Versioning and Concurrency
// ============================================================================

#[test]
fn test_update_increments_version() {
    let store = RateTableStore::new();
    let owner = reseller("tenant-a");
    let table = store.create(&owner, custom_table("A")).unwrap();
    assert_eq!(table.version, 1);

    let updated = store
        .update(
            &owner,
            &table.id,
            1,
            &TableChanges::rules(vec![weight_rule("0", "10", "8.00")]),
        )
        .unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(updated.rules.len(), 1);
    assert_eq!(updated.rules[0].base_price, d("8.00"));
}

#[test]
fn test_stale_version_is_rejected_with_write_conflict() {
    let store = RateTableStore::new();
    let owner = reseller("tenant-a");
    let table = store.create(&owner, custom_table("A")).unwrap();

    let first = TableChanges {
        name: Some("first writer".to_string()),
        ..TableChanges::default()
    };
    let second = TableChanges {
        name: Some("second writer".to_string()),
        ..TableChanges::default()
    };
    store.update(&owner, &table.id, 1, &first).unwrap();
    let err = store.update(&owner, &table.id, 1, &second).unwrap_err();

    assert_eq!(
        err,
        StoreError::WriteConflict {
            table_id: table.id.clone(),
            expected: 1,
            current: 2,
        }
    );
    assert!(err.is_retryable());
    assert_eq!(store.get(&owner, &table.id).unwrap().name, "first writer");
}

#[test]
fn test_concurrent_writers_on_same_version_exactly_one_wins() {
    let store = Arc::new(RateTableStore::new());
    let owner = reseller("tenant-a");
    let table = store.create(&owner, custom_table("A")).unwrap();

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let store = Arc::clone(&store);
            let owner = owner.clone();
            let table_id = table.id.clone();
            std::thread::spawn(move || {
                let changes = TableChanges {
                    name: Some(format!("writer {}", i)),
                    ..TableChanges::default()
                };
                store.update(&owner, &table_id, 1, &changes).is_ok()
            })
        })
        .collect();

    let wins = handles
        .into_iter()
        .map(|h| h.join().unwrap())
        .filter(|ok| *ok)
        .count();
    assert_eq!(wins, 1, "exactly one writer may win version 1");
    assert_eq!(store.get(&owner, &table.id).unwrap().version, 2);
}

#[test]
fn test_batch_commits_creates_and_updates_together() {
    let store = RateTableStore::new();
    let tenant = reseller("tenant-a");
    let existing = store.create(&tenant, custom_table("Existing")).unwrap();

    let written = store
        .write_batch(
            &tenant,
            vec![
                BatchWrite::Update {
                    table_id: existing.id.clone(),
                    expected_version: 1,
                    changes: TableChanges::rules(vec![weight_rule("0", "10", "7.00")]),
                },
                BatchWrite::Create(custom_table("Fresh")),
            ],
        )
        .unwrap();

    assert_eq!(written.len(), 2);
    assert_eq!(written[0].version, 2);
    assert_eq!(written[1].version, 1);
    assert_eq!(store.query(&tenant, &TableFilter::default()).len(), 2);
}

#[test]
fn test_batch_with_stale_write_leaves_store_untouched() {
    let store = RateTableStore::new();
    let tenant = reseller("tenant-a");
    let first = store.create(&tenant, custom_table("First")).unwrap();
    let second = store.create(&tenant, custom_table("Second")).unwrap();
    // a concurrent edit moves the second table on
    store
        .update(&tenant, &second.id, 1, &TableChanges::rules(vec![weight_rule("0", "5", "6.60")]))
        .unwrap();

    let err = store
        .write_batch(
            &tenant,
            vec![
                BatchWrite::Update {
                    table_id: first.id.clone(),
                    expected_version: 1,
                    changes: TableChanges::rules(vec![weight_rule("0", "10", "7.00")]),
                },
                BatchWrite::Create(custom_table("Fresh")),
                BatchWrite::Update {
                    table_id: second.id.clone(),
                    expected_version: 1,
                    changes: TableChanges::rules(vec![weight_rule("0", "10", "7.00")]),
                },
            ],
        )
        .unwrap_err();

    assert!(matches!(err, StoreError::WriteConflict { expected: 1, current: 2, .. }));
    assert_eq!(store.get(&tenant, &first.id).unwrap().version, 1, "earlier write rolled back");
    assert_eq!(store.query(&tenant, &TableFilter::default()).len(), 2, "create rolled back");
}

// ============================================================================
// Rule Integrity and Status
// ============================================================================

#[test]
fn test_overlapping_rules_rejected_on_create() {
    let store = RateTableStore::new();
    let result = store.create(
        &reseller("tenant-a"),
        NewRateTable::new("Overlap", TableKind::Custom)
            .with_rule(weight_rule("0", "5", "6.00"))
            .with_rule(weight_rule("3", "10", "9.00")),
    );
    assert!(matches!(
        result,
        Err(StoreError::Validation(ValidationError::OverlappingRules { .. }))
    ));
    assert!(store
        .query(&reseller("tenant-a"), &TableFilter::default())
        .is_empty());
}

#[test]
fn test_overlapping_rules_rejected_on_update() {
    let store = RateTableStore::new();
    let owner = reseller("tenant-a");
    let table = store.create(&owner, custom_table("A")).unwrap();

    let result = store.update(
        &owner,
        &table.id,
        1,
        &TableChanges::rules(vec![
            weight_rule("0", "5", "6.00"),
            weight_rule("4", "6", "7.00"),
        ]),
    );
    assert!(matches!(
        result,
        Err(StoreError::Validation(ValidationError::OverlappingRules { .. }))
    ));
    assert_eq!(store.get(&owner, &table.id).unwrap().version, 1);
}

#[test]
fn test_adjacent_weight_breaks_are_accepted() {
    let store = RateTableStore::new();
    let table = store
        .create(
            &reseller("tenant-a"),
            NewRateTable::new("Breaks", TableKind::Custom)
                .with_rule(weight_rule("0", "2", "5.00"))
                .with_rule(weight_rule("2", "5", "6.00"))
                .with_rule(weight_rule("5", "10", "8.00")),
        )
        .unwrap();
    assert_eq!(table.rules.len(), 3);
}

#[test]
fn test_archived_table_is_terminal() {
    let store = RateTableStore::new();
    let owner = reseller("tenant-a");
    let table = store.create(&owner, custom_table("A")).unwrap();
    let archived = store.archive(&owner, &table.id, 1).unwrap();
    assert_eq!(archived.status, TableStatus::Archived);

    let result = store.activate(&owner, &table.id, archived.version);
    assert!(matches!(
        result,
        Err(StoreError::Validation(ValidationError::ArchivedTable { .. }))
    ));
    // archived tables are kept, never deleted
    assert_eq!(store.get(&owner, &table.id).unwrap().status, TableStatus::Archived);
}

#[test]
fn test_active_table_cannot_return_to_draft() {
    let store = RateTableStore::new();
    let owner = reseller("tenant-a");
    let table = store.create(&owner, custom_table("A")).unwrap();

    let result = store.update(&owner, &table.id, 1, &TableChanges::status(TableStatus::Draft));
    assert!(matches!(
        result,
        Err(StoreError::Validation(ValidationError::InvalidStatusTransition { .. }))
    ));
}

// ============================================================================
// Audit
// ============================================================================

#[test]
fn test_mutations_emit_audit_events() {
    let sink = Arc::new(MemoryAuditSink::new());
    let store = RateTableStore::with_audit(sink.clone());
    let owner = reseller("tenant-a");

    let table = store.create(&owner, custom_table("A")).unwrap();
    store.archive(&owner, &table.id, 1).unwrap();

    let events = sink.events();
    let kinds: Vec<AuditEventKind> = events.iter().map(|e| e.kind).collect();
    assert_eq!(kinds, vec![AuditEventKind::TableCreated, AuditEventKind::TableArchived]);
    assert_eq!(events[1].actor_id, "tenant-a");
    assert!(events[1].before.is_some() && events[1].after.is_some());
}

#[test]
fn test_audit_failure_does_not_roll_back() {
    let store = RateTableStore::with_audit(Arc::new(MemoryAuditSink::failing()));
    let owner = reseller("tenant-a");

    let table = store
        .create(&owner, custom_table("A"))
        .expect("create succeeds even when the audit sink is down");
    let updated = store
        .update(&owner, &table.id, 1, &TableChanges::status(TableStatus::Archived))
        .expect("update succeeds even when the audit sink is down");

    assert_eq!(store.get(&owner, &table.id).unwrap(), updated);
}

// ============================================================================
// Clone and Assignment
// ============================================================================

#[test]
fn test_clone_creates_draft_custom_copy_with_lineage() {
    let store = RateTableStore::new();
    let global = store
        .create(
            &platform(),
            NewRateTable::new("Listino base", TableKind::Global)
                .for_carrier("BRT")
                .active()
                .with_rule(weight_rule("0", "5", "7.00")),
        )
        .unwrap();

    let owner = reseller("tenant-a");
    let (copy, assignment) = store
        .clone_table(&owner, &global.id, "Listino rivendita", None)
        .unwrap();

    assert!(assignment.is_none());
    assert_eq!(copy.kind, TableKind::Custom);
    assert_eq!(copy.status, TableStatus::Draft);
    assert_eq!(copy.owner_tenant, "tenant-a");
    assert_eq!(copy.cloned_from.as_deref(), Some(global.id.as_str()));
    assert_eq!(copy.carrier_id.as_deref(), Some("BRT"));
    assert_eq!(copy.version, 1);
    assert_ne!(copy.rules[0].id, global.rules[0].id, "rule ids are fresh");
    assert_eq!(copy.rules[0].base_price, global.rules[0].base_price);
}

#[test]
fn test_clone_of_invisible_table_is_not_found() {
    let store = RateTableStore::new();
    let table = store.create(&reseller("tenant-a"), custom_table("A")).unwrap();

    let result = store.clone_table(&reseller("tenant-b"), &table.id, "stolen", None);
    assert!(matches!(result, Err(StoreError::NotFound { .. })));
}

#[test]
fn test_clone_with_assignment_is_visible_to_target() {
    let store = RateTableStore::new();
    let owner = reseller("tenant-a");
    let customer = AuthContext::new("customer-1", Role::User);
    let source = store.create(&owner, custom_table("A")).unwrap();

    let (copy, assignment) = store
        .clone_table(&owner, &source.id, "Per customer-1", Some("customer-1"))
        .unwrap();
    let assignment = assignment.expect("assignment created with the clone");

    assert_eq!(assignment.table_id, copy.id);
    assert_eq!(assignment.tenant_id, "customer-1");
    assert!(!assignment.can_write);

    let visible = store.query(&customer, &TableFilter::default());
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, copy.id);

    // read-only assignment: writes look like a missing table
    let result = store.activate(&customer, &copy.id, 1);
    assert!(matches!(result, Err(StoreError::NotFound { .. })));
}

#[test]
fn test_write_assignment_allows_assignee_updates() {
    let store = RateTableStore::new();
    let owner = reseller("tenant-a");
    let partner = reseller("tenant-b");
    let table = store
        .create(&owner, NewRateTable::new("Shared", TableKind::Custom))
        .unwrap();

    store.assign(&owner, &table.id, "tenant-b", true).unwrap();
    let updated = store.activate(&partner, &table.id, 1).unwrap();
    assert_eq!(updated.status, TableStatus::Active);
}

#[test]
fn test_only_owner_can_assign() {
    let store = RateTableStore::new();
    let table = store.create(&reseller("tenant-a"), custom_table("A")).unwrap();

    let result = store.assign(&reseller("tenant-b"), &table.id, "tenant-b", true);
    assert!(matches!(result, Err(StoreError::NotFound { .. })));
}

#[test]
fn test_revoked_assignment_hides_table_and_keeps_history() {
    let store = RateTableStore::new();
    let owner = reseller("tenant-a");
    let customer = AuthContext::new("customer-1", Role::User);
    let table = store.create(&owner, custom_table("A")).unwrap();

    let assignment = store.assign(&owner, &table.id, "customer-1", false).unwrap();
    assert_eq!(store.query(&customer, &TableFilter::default()).len(), 1);

    let revoked = store.revoke(&owner, &assignment.id).unwrap();
    assert!(revoked.revoked_at.is_some());
    assert!(store.query(&customer, &TableFilter::default()).is_empty());

    let history = store.assignment_history(&owner, &table.id).unwrap();
    assert_eq!(history.len(), 1, "revocation is soft");
    assert!(!history[0].is_active());

    // revoking twice is an error, not a silent success
    assert!(matches!(
        store.revoke(&owner, &assignment.id),
        Err(StoreError::AssignmentNotFound { .. })
    ));
}

#[test]
fn test_assignee_cannot_revoke() {
    let store = RateTableStore::new();
    let owner = reseller("tenant-a");
    let table = store.create(&owner, custom_table("A")).unwrap();
    let assignment = store.assign(&owner, &table.id, "customer-1", false).unwrap();

    let customer = AuthContext::new("customer-1", Role::User);
    assert!(matches!(
        store.revoke(&customer, &assignment.id),
        Err(StoreError::AssignmentNotFound { .. })
    ));
}

// ============================================================================
// Snapshots
// ============================================================================

#[test]
fn test_snapshot_round_trip_through_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rate_tables.json");

    let store = RateTableStore::new();
    let owner = reseller("tenant-a");
    let table = store.create(&owner, custom_table("A")).unwrap();
    store.assign(&owner, &table.id, "customer-1", false).unwrap();
    store.save_snapshot(&path).unwrap();

    let restored = RateTableStore::load_snapshot(&path, Arc::new(MemoryAuditSink::new())).unwrap();
    assert_eq!(restored.get(&owner, &table.id).unwrap(), table);
    let customer = AuthContext::new("customer-1", Role::User);
    assert_eq!(restored.query(&customer, &TableFilter::default()).len(), 1);
}

#[test]
fn test_tampered_snapshot_is_rejected() {
    let store = RateTableStore::new();
    store.create(&reseller("tenant-a"), custom_table("A")).unwrap();

    let mut snapshot = store.snapshot().unwrap();
    snapshot.tables[0].rules[0].base_price = d("0.01");

    let result = RateTableStore::restore(snapshot, Arc::new(MemoryAuditSink::new()));
    assert!(matches!(result, Err(StoreError::Snapshot(_))));
}
