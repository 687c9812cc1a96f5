//! Tenant and authentication context
//!
//! The tenant id is trusted only when it arrives inside an [`AuthContext`]
//! built by the authentication collaborator. Every read of rate data applies
//! the visibility predicate for `AuthContext::tenant_id()` first.
//!
//! The only way around that predicate is a [`SuperAdminScope`], which can be
//! obtained from a non-impersonating super-admin context and nothing else.

use serde::{Deserialize, Serialize};

/// Role of the authenticated caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// End customer
    User,
    /// Tenant reselling platform carrier capacity
    Reseller,
    /// Reseller bringing its own carrier contract; supplier tables only
    Byoc,
    /// Platform operator
    Admin,
    /// Platform operator with cross-tenant rights
    SuperAdmin,
}

impl Role {
    /// Roles priced through the dual (own vs. master) path
    pub fn is_reseller(&self) -> bool {
        matches!(self, Role::Reseller | Role::Byoc)
    }
}

/// Authenticated tenant context
///
/// # Example
/// ```
/// use rate_engine_core::models::{AuthContext, Role};
///
/// let auth = AuthContext::new("reseller-1", Role::Reseller);
/// assert_eq!(auth.tenant_id(), "reseller-1");
/// assert!(auth.super_admin_scope().is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthContext {
    tenant_id: String,
    role: Role,
    #[serde(default)]
    is_impersonating: bool,
}

impl AuthContext {
    pub fn new(tenant_id: impl Into<String>, role: Role) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            role,
            is_impersonating: false,
        }
    }

    /// Context of an operator acting on behalf of `tenant_id`
    pub fn impersonating(tenant_id: impl Into<String>, role: Role) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            role,
            is_impersonating: true,
        }
    }

    /// Platform master context used for the comparison path.
    ///
    /// Built from configuration by the pricing engine, never from request input.
    pub(crate) fn platform(master_tenant_id: &str) -> Self {
        Self::new(master_tenant_id, Role::Admin)
    }

    pub fn tenant_id(&self) -> &str {
        &self.tenant_id
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_impersonating(&self) -> bool {
        self.is_impersonating
    }

    /// Cross-tenant scope, available only to a super-admin acting as itself
    pub fn super_admin_scope(&self) -> Option<SuperAdminScope> {
        if self.role == Role::SuperAdmin && !self.is_impersonating {
            Some(SuperAdminScope {
                actor_id: self.tenant_id.clone(),
            })
        } else {
            None
        }
    }
}

/// Proof that the caller may bypass tenant visibility
///
/// Cannot be constructed outside this module.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperAdminScope {
    actor_id: String,
}

impl SuperAdminScope {
    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }
}
