//! Tenant/role storage and scope-to-tenant authorization resolution.
//!
//! `authz` is a map `{tenant_or_"*" -> [resource strings]}`. A bare
//! `tenant:*` scope entry grants access to every tenant the credentials id
//! is assigned to; `tenant:<id>` grants exactly that tenant if assigned;
//! bare `tenant` (no colon) is a hint that at least one tenant must be
//! resolved, deferring to whichever tenant the client ultimately selects.
//! A session holding `authz:tenant:access` under `"*"`, or flagged
//! superuser, bypasses the assignment check entirely.

use anyhow::Result;
use std::collections::{BTreeMap, BTreeSet};
use tokio::sync::RwLock;

use crate::audit::AuditSink;

pub const SUPERUSER_RESOURCE: &str = "authz:superuser";
pub const TENANT_ACCESS_RESOURCE: &str = "authz:tenant:access";

#[derive(Debug, Clone)]
pub struct Tenant {
    pub id: String,
    pub enabled: bool,
}

#[derive(Debug, Clone, Default)]
pub struct Role {
    pub id: String,
    pub tenant_id: Option<String>,
    pub resources: BTreeSet<String>,
}

/// Storage for tenants, role definitions and credentials-to-tenant
/// assignment, independent of the session/token stores.
#[async_trait::async_trait]
pub trait TenantStorage: Send + Sync {
    async fn get_tenant(&self, id: &str) -> Result<Option<Tenant>>;
    async fn list_tenants(&self) -> Result<Vec<Tenant>>;
    async fn assigned_tenants(&self, credentials_id: &str) -> Result<BTreeSet<String>>;
    async fn assign_tenant(&self, credentials_id: &str, tenant_id: &str) -> Result<()>;
    async fn unassign_tenant(&self, credentials_id: &str, tenant_id: &str) -> Result<()>;
    /// The union of resources granted to `credentials_id` across every
    /// role assigned to them, scoped to `tenant_id` and to global (`"*"`)
    /// roles.
    async fn resources_for(&self, credentials_id: &str, tenant_id: &str) -> Result<BTreeSet<String>>;
    async fn is_superuser(&self, credentials_id: &str) -> Result<bool>;
}

/// Validates that a tenant name matches the format required by
/// `create_tenant`: starts with a letter, 3-32 chars, `[a-zA-Z0-9._-]`
/// thereafter.
pub fn is_valid_tenant_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    if !first.is_ascii_alphabetic() {
        return false;
    }
    let rest_len = name.len() - first.len_utf8();
    if !(2..=31).contains(&rest_len) {
        return false;
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-')
}

/// Resolve the set of tenants an authorize request should bind the new
/// session to, given the requested scope and the credentials id's
/// assignments. Used at authorize time (§4.6); returns every tenant that
/// satisfies at least one `tenant*` scope entry, or an error on the first
/// scope entry that cannot be satisfied.
pub fn resolve_tenants_for_authorize(
    scope: &BTreeSet<String>,
    assigned: &BTreeSet<String>,
    is_superuser: bool,
) -> Result<BTreeSet<String>, TenantResolutionError> {
    let mut resolved = BTreeSet::new();
    for entry in scope.iter().filter(|s| s.as_str() == "tenant" || s.starts_with("tenant:")) {
        match entry.as_str() {
            "tenant" => {
                // A bare `tenant` scope just asserts "some tenant is needed";
                // the caller resolves it via `resolve_bare_tenant` once this
                // pass confirms no `tenant:*`/`tenant:<id>` entry already did.
                continue;
            }
            "tenant:*" => {
                resolved.extend(assigned.iter().cloned());
            }
            other => {
                let tenant_id = other.trim_start_matches("tenant:");
                if is_superuser || assigned.contains(tenant_id) {
                    resolved.insert(tenant_id.to_string());
                } else {
                    return Err(TenantResolutionError::NotAssigned(tenant_id.to_string()));
                }
            }
        }
    }
    Ok(resolved)
}

/// Resolve a single accessible tenant from scope, used when rebuilding a
/// session during refresh (§4.8): only the first resolvable tenant of the
/// set is carried forward.
pub fn accessible_tenant_from_scope(
    scope: &BTreeSet<String>,
    assigned: &BTreeSet<String>,
    is_superuser: bool,
) -> Result<Option<String>, TenantResolutionError> {
    Ok(resolve_tenants_for_authorize(scope, assigned, is_superuser)?
        .into_iter()
        .next())
}

/// Resolve a bare `tenant` scope entry (§4.4): the most-recently
/// authorized tenant for this credentials id that is still assigned,
/// falling back to any currently assigned tenant. `None` only when
/// neither exists, which the caller turns into `user_has_no_tenant`.
pub async fn resolve_bare_tenant(
    audit: &dyn AuditSink,
    credentials_id: &str,
    assigned: &BTreeSet<String>,
) -> Option<String> {
    if let Ok(recent) = audit.last_authorized_tenants(credentials_id).await {
        if let Some(tenant) = recent.into_iter().find(|t| assigned.contains(t)) {
            return Some(tenant);
        }
    }
    assigned.iter().next().cloned()
}

#[derive(Debug, thiserror::Error)]
pub enum TenantResolutionError {
    #[error("tenant {0} is not assigned to this credentials id")]
    NotAssigned(String),
}

/// Compute the effective `authz` map for a session: global (`"*"`)
/// resources always apply; per-tenant resources apply only for tenants in
/// `bound_tenants`.
pub fn effective_authz(
    bound_tenants: &BTreeSet<String>,
    global_resources: &BTreeSet<String>,
    per_tenant_resources: &BTreeMap<String, BTreeSet<String>>,
) -> BTreeMap<String, BTreeSet<String>> {
    let mut authz = BTreeMap::new();
    if !global_resources.is_empty() {
        authz.insert("*".to_string(), global_resources.clone());
    }
    for tenant in bound_tenants {
        if let Some(resources) = per_tenant_resources.get(tenant) {
            authz.insert(tenant.clone(), resources.clone());
        }
    }
    authz
}

/// Recompute `authz` for `credentials_id` against `bound_tenants` from
/// current `TenantStorage` state, for rebuilding a session at refresh
/// time (§4.8) so role changes since the original authorize take effect
/// immediately rather than persisting until the session expires.
pub async fn rebuild_authz(
    storage: &dyn TenantStorage,
    credentials_id: &str,
    bound_tenants: &BTreeSet<String>,
) -> Result<BTreeMap<String, BTreeSet<String>>> {
    let global_resources = if storage.is_superuser(credentials_id).await? {
        BTreeSet::from([SUPERUSER_RESOURCE.to_string()])
    } else {
        BTreeSet::new()
    };
    let mut per_tenant_resources = BTreeMap::new();
    for tenant in bound_tenants {
        let resources = storage.resources_for(credentials_id, tenant).await?;
        per_tenant_resources.insert(tenant.clone(), resources);
    }
    Ok(effective_authz(bound_tenants, &global_resources, &per_tenant_resources))
}

/// In-memory tenant/role/assignment store: for tests and single-node
/// deployments that don't need an external tenant directory.
#[derive(Default)]
pub struct InMemoryTenantStorage {
    tenants: RwLock<BTreeMap<String, Tenant>>,
    roles: RwLock<BTreeMap<String, Role>>,
    role_assignments: RwLock<BTreeMap<String, BTreeSet<String>>>,
    tenant_assignments: RwLock<BTreeMap<String, BTreeSet<String>>>,
    superusers: RwLock<BTreeSet<String>>,
}

impl InMemoryTenantStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add_tenant(&self, tenant: Tenant) {
        self.tenants.write().await.insert(tenant.id.clone(), tenant);
    }

    pub async fn add_role(&self, role: Role) {
        self.roles.write().await.insert(role.id.clone(), role);
    }

    pub async fn grant_role(&self, credentials_id: &str, role_id: &str) {
        self.role_assignments
            .write()
            .await
            .entry(credentials_id.to_string())
            .or_default()
            .insert(role_id.to_string());
    }

    pub async fn set_superuser(&self, credentials_id: &str, is_superuser: bool) {
        let mut superusers = self.superusers.write().await;
        if is_superuser {
            superusers.insert(credentials_id.to_string());
        } else {
            superusers.remove(credentials_id);
        }
    }
}

#[async_trait::async_trait]
impl TenantStorage for InMemoryTenantStorage {
    async fn get_tenant(&self, id: &str) -> Result<Option<Tenant>> {
        Ok(self.tenants.read().await.get(id).cloned())
    }

    async fn list_tenants(&self) -> Result<Vec<Tenant>> {
        Ok(self.tenants.read().await.values().cloned().collect())
    }

    async fn assigned_tenants(&self, credentials_id: &str) -> Result<BTreeSet<String>> {
        Ok(self
            .tenant_assignments
            .read()
            .await
            .get(credentials_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn assign_tenant(&self, credentials_id: &str, tenant_id: &str) -> Result<()> {
        self.tenant_assignments
            .write()
            .await
            .entry(credentials_id.to_string())
            .or_default()
            .insert(tenant_id.to_string());
        Ok(())
    }

    async fn unassign_tenant(&self, credentials_id: &str, tenant_id: &str) -> Result<()> {
        if let Some(assigned) = self.tenant_assignments.write().await.get_mut(credentials_id) {
            assigned.remove(tenant_id);
        }
        Ok(())
    }

    async fn resources_for(&self, credentials_id: &str, tenant_id: &str) -> Result<BTreeSet<String>> {
        let role_ids = self
            .role_assignments
            .read()
            .await
            .get(credentials_id)
            .cloned()
            .unwrap_or_default();
        let roles = self.roles.read().await;
        let mut resources = BTreeSet::new();
        for role_id in &role_ids {
            let Some(role) = roles.get(role_id) else {
                continue;
            };
            match &role.tenant_id {
                None => resources.extend(role.resources.iter().cloned()),
                Some(t) if t == tenant_id => resources.extend(role.resources.iter().cloned()),
                Some(_) => {}
            }
        }
        Ok(resources)
    }

    async fn is_superuser(&self, credentials_id: &str) -> Result<bool> {
        Ok(self.superusers.read().await.contains(credentials_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tenant_name_validation() {
        assert!(is_valid_tenant_name("acme"));
        assert!(is_valid_tenant_name("a-b.c_d"));
        assert!(!is_valid_tenant_name("1acme"));
        assert!(!is_valid_tenant_name("ab"));
        assert!(!is_valid_tenant_name(&"a".repeat(40)));
    }

    #[test]
    fn resolve_explicit_tenant_requires_assignment() {
        let scope = BTreeSet::from(["tenant:acme".to_string()]);
        let assigned = BTreeSet::from(["other".to_string()]);
        let err = resolve_tenants_for_authorize(&scope, &assigned, false).unwrap_err();
        assert!(matches!(err, TenantResolutionError::NotAssigned(_)));
    }

    #[test]
    fn resolve_wildcard_expands_to_all_assigned() {
        let scope = BTreeSet::from(["tenant:*".to_string()]);
        let assigned = BTreeSet::from(["acme".to_string(), "globex".to_string()]);
        let resolved = resolve_tenants_for_authorize(&scope, &assigned, false).unwrap();
        assert_eq!(resolved, assigned);
    }

    #[test]
    fn superuser_wildcard_still_expands_to_assigned_tenants() {
        let scope = BTreeSet::from(["tenant:*".to_string()]);
        let assigned = BTreeSet::from(["acme".to_string()]);
        let resolved = resolve_tenants_for_authorize(&scope, &assigned, true).unwrap();
        assert_eq!(resolved, assigned);
    }

    #[test]
    fn superuser_bypasses_assignment_check_for_explicit_tenant() {
        let scope = BTreeSet::from(["tenant:acme".to_string()]);
        let assigned = BTreeSet::new();
        let resolved = resolve_tenants_for_authorize(&scope, &assigned, true).unwrap();
        assert!(resolved.contains("acme"));
    }
}
