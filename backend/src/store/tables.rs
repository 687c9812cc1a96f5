//! In-process rate table store
//!
//! All state sits behind one `RwLock`, so every operation (including clone
//! plus assignment) commits atomically. Durability is provided by
//! [`crate::store::snapshot`].

use crate::models::{
    Assignment, AuthContext, NewRateTable, RateTable, Role, SuperAdminScope, TableChanges,
    TableKind, TableStatus, ValidationError,
};
use crate::store::audit::{AuditEvent, AuditEventKind, AuditSink, TracingAuditSink};
use crate::store::{BatchWrite, StoreError, TableFilter};
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default, Clone)]
pub(crate) struct StoreState {
    pub(crate) tables: HashMap<String, RateTable>,
    pub(crate) assignments: Vec<Assignment>,
}

impl StoreState {
    fn has_assignment(&self, table_id: &str, tenant_id: &str) -> bool {
        self.assignments
            .iter()
            .any(|a| a.is_active() && a.table_id == table_id && a.tenant_id == tenant_id)
    }

    fn has_write_assignment(&self, table_id: &str, tenant_id: &str) -> bool {
        self.assignments.iter().any(|a| {
            a.is_active() && a.can_write && a.table_id == table_id && a.tenant_id == tenant_id
        })
    }

    /// The tenant visibility predicate
    fn is_visible(&self, tenant_id: &str, table: &RateTable) -> bool {
        table.owner_tenant == tenant_id
            || (table.kind == TableKind::Global && table.status == TableStatus::Active)
            || self.has_assignment(&table.id, tenant_id)
    }

    fn can_write(&self, tenant_id: &str, table: &RateTable) -> bool {
        table.owner_tenant == tenant_id || self.has_write_assignment(&table.id, tenant_id)
    }
}

fn passes_filter(table: &RateTable, tenant_id: Option<&str>, filter: &TableFilter) -> bool {
    if let Some(kind) = filter.kind {
        if table.kind != kind {
            return false;
        }
    }
    if let Some(status) = filter.status {
        if table.status != status {
            return false;
        }
    }
    if let Some(carrier) = &filter.carrier_id {
        if !table.covers_carrier(Some(carrier)) {
            return false;
        }
    }
    if let Some(source) = &filter.import_source {
        if table.import_source.as_deref() != Some(source.as_str()) {
            return false;
        }
    }
    if filter.owned_only {
        if let Some(tenant_id) = tenant_id {
            if table.owner_tenant != tenant_id {
                return false;
            }
        }
    }
    true
}

fn sorted(mut tables: Vec<RateTable>) -> Vec<RateTable> {
    tables.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
    tables
}

/// Who is performing a write, and how it was authorized
enum Writer<'a> {
    Tenant(&'a AuthContext),
    SuperAdmin(&'a SuperAdminScope),
}

impl Writer<'_> {
    fn actor_id(&self) -> &str {
        match self {
            Writer::Tenant(auth) => auth.tenant_id(),
            Writer::SuperAdmin(scope) => scope.actor_id(),
        }
    }
}

/// Rate table store
///
/// # Example
/// ```
/// use rate_engine_core::models::{AuthContext, NewRateTable, Role, TableKind};
/// use rate_engine_core::store::{RateTableStore, TableFilter};
///
/// let store = RateTableStore::new();
/// let owner = AuthContext::new("tenant-a", Role::Reseller);
/// let table = store
///     .create(&owner, NewRateTable::new("Tariffe 2025", TableKind::Custom))
///     .unwrap();
/// assert_eq!(table.version, 1);
///
/// let other = AuthContext::new("tenant-b", Role::Reseller);
/// assert!(store.query(&other, &TableFilter::default()).is_empty());
/// ```
pub struct RateTableStore {
    state: RwLock<StoreState>,
    audit: Arc<dyn AuditSink>,
}

impl Default for RateTableStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RateTableStore {
    pub fn new() -> Self {
        Self::with_audit(Arc::new(TracingAuditSink))
    }

    pub fn with_audit(audit: Arc<dyn AuditSink>) -> Self {
        Self {
            state: RwLock::new(StoreState::default()),
            audit,
        }
    }

    pub(crate) fn from_state(state: StoreState, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            state: RwLock::new(state),
            audit,
        }
    }

    pub(crate) fn state_copy(&self) -> StoreState {
        self.state.read().clone()
    }

    fn emit(&self, event: AuditEvent) {
        if let Err(err) = self.audit.emit(&event) {
            tracing::warn!(
                table_id = %event.table_id,
                kind = ?event.kind,
                error = %err,
                "audit event dropped"
            );
        }
    }

    fn not_found(tenant_id: &str, table_id: &str) -> StoreError {
        StoreError::NotFound {
            tenant_id: tenant_id.to_string(),
            table_id: table_id.to_string(),
        }
    }

    // ------------------------------------------------------------------------
    // Reads
    // ------------------------------------------------------------------------

    /// Tables visible to the authenticated tenant, narrowed by `filter`
    pub fn query(&self, auth: &AuthContext, filter: &TableFilter) -> Vec<RateTable> {
        let tenant_id = auth.tenant_id();
        let state = self.state.read();
        let visible = state
            .tables
            .values()
            .filter(|table| state.is_visible(tenant_id, table))
            .filter(|table| passes_filter(table, Some(tenant_id), filter))
            .cloned()
            .collect();
        sorted(visible)
    }

    /// Every table, for platform operators
    pub fn query_all(&self, _scope: &SuperAdminScope, filter: &TableFilter) -> Vec<RateTable> {
        let state = self.state.read();
        let all = state
            .tables
            .values()
            .filter(|table| passes_filter(table, None, filter))
            .cloned()
            .collect();
        sorted(all)
    }

    pub fn get(&self, auth: &AuthContext, table_id: &str) -> Result<RateTable, StoreError> {
        let state = self.state.read();
        state
            .tables
            .get(table_id)
            .filter(|table| state.is_visible(auth.tenant_id(), table))
            .cloned()
            .ok_or_else(|| Self::not_found(auth.tenant_id(), table_id))
    }

    /// Assignment history of a table; owner only
    pub fn assignment_history(
        &self,
        auth: &AuthContext,
        table_id: &str,
    ) -> Result<Vec<Assignment>, StoreError> {
        let state = self.state.read();
        match state.tables.get(table_id) {
            Some(table) if table.owner_tenant == auth.tenant_id() => Ok(state
                .assignments
                .iter()
                .filter(|a| a.table_id == table_id)
                .cloned()
                .collect()),
            _ => Err(Self::not_found(auth.tenant_id(), table_id)),
        }
    }

    // ------------------------------------------------------------------------
    // Writes
    // ------------------------------------------------------------------------

    /// Create a table owned by the caller at version 1
    ///
    /// Global tables can only be created by platform operators.
    pub fn create(&self, auth: &AuthContext, new_table: NewRateTable) -> Result<RateTable, StoreError> {
        let table = Self::build_table(auth, new_table)?;
        self.state.write().tables.insert(table.id.clone(), table.clone());
        self.record_created(auth.tenant_id(), &table);
        Ok(table)
    }

    fn build_table(auth: &AuthContext, new_table: NewRateTable) -> Result<RateTable, StoreError> {
        if new_table.kind == TableKind::Global
            && !matches!(auth.role(), Role::Admin | Role::SuperAdmin)
        {
            return Err(StoreError::NotPermitted {
                tenant_id: auth.tenant_id().to_string(),
                action: "create global rate tables",
            });
        }

        let now = Utc::now();
        let table = RateTable {
            id: uuid::Uuid::new_v4().to_string(),
            name: new_table.name,
            version: 1,
            kind: new_table.kind,
            owner_tenant: auth.tenant_id().to_string(),
            carrier_id: new_table.carrier_id,
            status: new_table.status,
            default_margin: new_table.default_margin,
            billing_model: new_table.billing_model,
            carrier_config_id: new_table.carrier_config_id,
            zones: new_table.zones,
            rules: new_table.rules,
            cloned_from: None,
            import_source: new_table.import_source,
            created_at: now,
            updated_at: now,
        };
        table.validate()?;
        Ok(table)
    }

    fn record_created(&self, tenant_id: &str, table: &RateTable) {
        tracing::info!(
            tenant_id = %tenant_id,
            table_id = %table.id,
            kind = ?table.kind,
            "rate table created"
        );
        self.emit(AuditEvent::new(AuditEventKind::TableCreated, &table.id, tenant_id).with_after(table));
    }

    /// Apply changes on top of `expected_version`
    ///
    /// Requires ownership or a write-granted assignment. A stale
    /// `expected_version` fails with `WriteConflict`; nothing is overwritten.
    pub fn update(
        &self,
        auth: &AuthContext,
        table_id: &str,
        expected_version: u64,
        changes: &TableChanges,
    ) -> Result<RateTable, StoreError> {
        self.write(Writer::Tenant(auth), table_id, expected_version, changes)
    }

    /// Cross-tenant update for platform operators
    pub fn update_as_super_admin(
        &self,
        scope: &SuperAdminScope,
        table_id: &str,
        expected_version: u64,
        changes: &TableChanges,
    ) -> Result<RateTable, StoreError> {
        self.write(Writer::SuperAdmin(scope), table_id, expected_version, changes)
    }

    pub fn activate(
        &self,
        auth: &AuthContext,
        table_id: &str,
        expected_version: u64,
    ) -> Result<RateTable, StoreError> {
        self.update(
            auth,
            table_id,
            expected_version,
            &TableChanges::status(TableStatus::Active),
        )
    }

    /// Archive a table; tables are never hard-deleted
    pub fn archive(
        &self,
        auth: &AuthContext,
        table_id: &str,
        expected_version: u64,
    ) -> Result<RateTable, StoreError> {
        self.update(
            auth,
            table_id,
            expected_version,
            &TableChanges::status(TableStatus::Archived),
        )
    }

    fn write(
        &self,
        writer: Writer<'_>,
        table_id: &str,
        expected_version: u64,
        changes: &TableChanges,
    ) -> Result<RateTable, StoreError> {
        let actor_id = writer.actor_id().to_string();
        let (before, after) = {
            let mut state = self.state.write();
            let current = state.tables.get(table_id);
            let (before, after) = Self::stage_update(&state, current, &writer, table_id, expected_version, changes)?;
            state.tables.insert(after.id.clone(), after.clone());
            (before, after)
        };
        self.record_updated(&actor_id, &before, &after);
        Ok(after)
    }

    /// Check a write against `current` and build the next version
    fn stage_update(
        state: &StoreState,
        current: Option<&RateTable>,
        writer: &Writer<'_>,
        table_id: &str,
        expected_version: u64,
        changes: &TableChanges,
    ) -> Result<(RateTable, RateTable), StoreError> {
        let actor_id = writer.actor_id();
        let current = match current {
            Some(table) => table,
            None => return Err(Self::not_found(actor_id, table_id)),
        };
        if let Writer::Tenant(auth) = writer {
            if !state.can_write(auth.tenant_id(), current) {
                return Err(Self::not_found(actor_id, table_id));
            }
        }
        if current.version != expected_version {
            return Err(StoreError::WriteConflict {
                table_id: table_id.to_string(),
                expected: expected_version,
                current: current.version,
            });
        }
        if current.status == TableStatus::Archived {
            return Err(ValidationError::ArchivedTable {
                table_id: table_id.to_string(),
            }
            .into());
        }

        let mut next = changes.apply_to(current)?;
        next.version = current.version + 1;
        next.updated_at = Utc::now();
        Ok((current.clone(), next))
    }

    fn record_updated(&self, actor_id: &str, before: &RateTable, after: &RateTable) {
        let kind = if after.status == TableStatus::Archived {
            AuditEventKind::TableArchived
        } else {
            AuditEventKind::TableUpdated
        };
        tracing::info!(
            actor_id = %actor_id,
            table_id = %after.id,
            version = after.version,
            "rate table updated"
        );
        self.emit(
            AuditEvent::new(kind, &after.id, actor_id)
                .with_before(before)
                .with_after(after),
        );
    }

    /// Apply several creates and updates in one commit
    ///
    /// Every write is checked before any is applied: if one fails (stale
    /// version, permission, validation) nothing lands. Returns the written
    /// tables in input order.
    pub fn write_batch(&self, auth: &AuthContext, writes: Vec<BatchWrite>) -> Result<Vec<RateTable>, StoreError> {
        let writer = Writer::Tenant(auth);
        let staged = {
            let mut state = self.state.write();
            let mut staged: Vec<(Option<RateTable>, RateTable)> = Vec::with_capacity(writes.len());
            for write in writes {
                match write {
                    BatchWrite::Create(new_table) => staged.push((None, Self::build_table(auth, new_table)?)),
                    BatchWrite::Update {
                        table_id,
                        expected_version,
                        changes,
                    } => {
                        // a table written earlier in the batch is checked at its staged version
                        let current = staged
                            .iter()
                            .rev()
                            .map(|(_, after)| after)
                            .find(|table| table.id == table_id)
                            .or_else(|| state.tables.get(&table_id));
                        let (before, after) =
                            Self::stage_update(&state, current, &writer, &table_id, expected_version, &changes)?;
                        staged.push((Some(before), after));
                    }
                }
            }
            for (_, after) in &staged {
                state.tables.insert(after.id.clone(), after.clone());
            }
            staged
        };

        Ok(staged
            .into_iter()
            .map(|(before, after)| {
                match &before {
                    Some(before) => self.record_updated(auth.tenant_id(), before, &after),
                    None => self.record_created(auth.tenant_id(), &after),
                }
                after
            })
            .collect())
    }

    /// Copy a visible table into a new draft custom table owned by the caller
    ///
    /// The copy keeps a lineage pointer to its source. When `target_tenant`
    /// is given the copy is assigned to it in the same commit.
    pub fn clone_table(
        &self,
        auth: &AuthContext,
        source_id: &str,
        new_name: &str,
        target_tenant: Option<&str>,
    ) -> Result<(RateTable, Option<Assignment>), StoreError> {
        let tenant_id = auth.tenant_id();
        let (table, assignment) = {
            let mut state = self.state.write();
            let source = state
                .tables
                .get(source_id)
                .filter(|table| state.is_visible(tenant_id, table))
                .cloned()
                .ok_or_else(|| Self::not_found(tenant_id, source_id))?;

            let now = Utc::now();
            let rules = source
                .rules
                .iter()
                .map(|rule| {
                    let mut copy = rule.clone();
                    copy.id = uuid::Uuid::new_v4().to_string();
                    copy
                })
                .collect();
            let table = RateTable {
                id: uuid::Uuid::new_v4().to_string(),
                name: new_name.to_string(),
                version: 1,
                kind: TableKind::Custom,
                owner_tenant: tenant_id.to_string(),
                carrier_id: source.carrier_id.clone(),
                status: TableStatus::Draft,
                default_margin: source.default_margin.clone(),
                billing_model: source.billing_model,
                carrier_config_id: source.carrier_config_id.clone(),
                zones: source.zones.clone(),
                rules,
                cloned_from: Some(source.id.clone()),
                import_source: None,
                created_at: now,
                updated_at: now,
            };
            table.validate()?;

            let assignment = target_tenant.map(|target| Assignment {
                id: uuid::Uuid::new_v4().to_string(),
                table_id: table.id.clone(),
                tenant_id: target.to_string(),
                can_write: false,
                assigned_by: tenant_id.to_string(),
                assigned_at: now,
                revoked_at: None,
            });

            state.tables.insert(table.id.clone(), table.clone());
            if let Some(assignment) = &assignment {
                state.assignments.push(assignment.clone());
            }
            (table, assignment)
        };

        tracing::info!(
            tenant_id = %tenant_id,
            table_id = %table.id,
            cloned_from = %source_id,
            "rate table cloned"
        );
        self.emit(AuditEvent::new(AuditEventKind::TableCloned, &table.id, tenant_id).with_after(&table));
        if let Some(assignment) = &assignment {
            self.emit(
                AuditEvent::new(AuditEventKind::TableAssigned, &table.id, tenant_id)
                    .with_after(assignment),
            );
        }
        Ok((table, assignment))
    }

    /// Grant a table owned by the caller to another tenant
    pub fn assign(
        &self,
        auth: &AuthContext,
        table_id: &str,
        tenant_id: &str,
        can_write: bool,
    ) -> Result<Assignment, StoreError> {
        self.grant(auth.tenant_id(), Some(auth.tenant_id()), table_id, tenant_id, can_write)
    }

    pub fn assign_as_super_admin(
        &self,
        scope: &SuperAdminScope,
        table_id: &str,
        tenant_id: &str,
        can_write: bool,
    ) -> Result<Assignment, StoreError> {
        self.grant(scope.actor_id(), None, table_id, tenant_id, can_write)
    }

    fn grant(
        &self,
        actor_id: &str,
        required_owner: Option<&str>,
        table_id: &str,
        tenant_id: &str,
        can_write: bool,
    ) -> Result<Assignment, StoreError> {
        let assignment = {
            let mut state = self.state.write();
            match state.tables.get(table_id) {
                Some(table) if required_owner.map_or(true, |owner| table.owner_tenant == owner) => {
                    if table.status == TableStatus::Archived {
                        return Err(ValidationError::ArchivedTable {
                            table_id: table_id.to_string(),
                        }
                        .into());
                    }
                }
                _ => return Err(Self::not_found(actor_id, table_id)),
            }
            let assignment = Assignment {
                id: uuid::Uuid::new_v4().to_string(),
                table_id: table_id.to_string(),
                tenant_id: tenant_id.to_string(),
                can_write,
                assigned_by: actor_id.to_string(),
                assigned_at: Utc::now(),
                revoked_at: None,
            };
            state.assignments.push(assignment.clone());
            assignment
        };
        self.emit(AuditEvent::new(AuditEventKind::TableAssigned, table_id, actor_id).with_after(&assignment));
        Ok(assignment)
    }

    /// Soft-revoke an assignment; history is kept
    pub fn revoke(&self, auth: &AuthContext, assignment_id: &str) -> Result<Assignment, StoreError> {
        let tenant_id = auth.tenant_id();
        let (before, after) = {
            let mut state = self.state.write();
            let owned_tables: Vec<String> = state
                .tables
                .values()
                .filter(|t| t.owner_tenant == tenant_id)
                .map(|t| t.id.clone())
                .collect();
            let assignment = state
                .assignments
                .iter_mut()
                .find(|a| a.id == assignment_id && a.is_active() && owned_tables.contains(&a.table_id))
                .ok_or_else(|| StoreError::AssignmentNotFound {
                    tenant_id: tenant_id.to_string(),
                    assignment_id: assignment_id.to_string(),
                })?;
            let before = assignment.clone();
            assignment.revoked_at = Some(Utc::now());
            (before, assignment.clone())
        };
        self.emit(
            AuditEvent::new(AuditEventKind::AssignmentRevoked, &after.table_id, tenant_id)
                .with_before(&before)
                .with_after(&after),
        );
        Ok(after)
    }
}
