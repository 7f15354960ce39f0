use std::collections::BTreeSet;
use tokio::sync::OnceCell;
use uuid::Uuid;

use crate::error::AuthResult;
use crate::models::{Permission, Role};
use crate::repository::RoleState;

/// PermissionSet
///
/// A user's effective permissions: the union of the permission names of every
/// assigned role, deduplicated by name. Ordered so responses are stable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PermissionSet(BTreeSet<String>);

impl PermissionSet {
    pub fn contains(&self, name: &str) -> bool {
        self.0.contains(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn into_vec(self) -> Vec<String> {
        self.0.into_iter().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self(iter.into_iter().map(Into::into).collect())
    }
}

/// PermissionGraph
///
/// Queryable view over `role -> permissions` and `user -> roles`. Holds no cache of
/// its own, so every call observes the store's current state; request-lifetime
/// caching is opt-in through `scope`.
#[derive(Clone)]
pub struct PermissionGraph {
    store: RoleState,
}

impl PermissionGraph {
    pub fn new(store: RoleState) -> Self {
        Self { store }
    }

    pub async fn create_role(&self, name: &str) -> AuthResult<Role> {
        let role = self.store.create_role(name).await?;
        tracing::info!(role = %role.name, role_id = %role.id, "role created");
        Ok(role)
    }

    pub async fn create_permission(&self, name: &str) -> AuthResult<Permission> {
        let permission = self.store.create_permission(name).await?;
        tracing::info!(permission = %permission.name, "permission created");
        Ok(permission)
    }

    pub async fn find_role(&self, name: &str) -> AuthResult<Option<Role>> {
        Ok(self.store.find_role_by_name(name).await?)
    }

    pub async fn find_permission(&self, name: &str) -> AuthResult<Option<Permission>> {
        Ok(self.store.find_permission_by_name(name).await?)
    }

    /// Idempotent: granting a permission the role already holds is a no-op.
    pub async fn grant_permission(&self, role_id: Uuid, permission_id: Uuid) -> AuthResult<()> {
        self.store.grant_permission(role_id, permission_id).await?;
        tracing::debug!(%role_id, %permission_id, "permission granted");
        Ok(())
    }

    /// Idempotent: assigning a role the user already holds is a no-op.
    pub async fn assign_role(&self, user_id: Uuid, role_id: Uuid) -> AuthResult<()> {
        self.store.assign_role(user_id, role_id).await?;
        tracing::debug!(%user_id, %role_id, "role assigned");
        Ok(())
    }

    /// permissions_of
    ///
    /// Loads the user's roles, then unions each role's permission names.
    /// Unknown user or a dangling role reference fails with `NotFound`.
    pub async fn permissions_of(&self, user_id: Uuid) -> AuthResult<PermissionSet> {
        let role_ids = self.store.user_role_ids(user_id).await?;
        let mut names = BTreeSet::new();
        for role_id in role_ids {
            names.extend(self.store.role_permission_names(role_id).await?);
        }
        Ok(PermissionSet(names))
    }

    pub async fn has_permission(&self, user_id: Uuid, permission: &str) -> AuthResult<bool> {
        Ok(self.permissions_of(user_id).await?.contains(permission))
    }

    /// A per-request handle that loads the user's permissions on first use and
    /// reuses them until dropped.
    pub fn scope(&self, user_id: Uuid) -> ScopedPermissions {
        ScopedPermissions {
            graph: self.clone(),
            user_id,
            loaded: OnceCell::new(),
        }
    }
}

/// ScopedPermissions
///
/// Lazily warmed permission set bound to one request. Never shared across
/// requests, so it cannot serve stale grants beyond the request that loaded it.
pub struct ScopedPermissions {
    graph: PermissionGraph,
    user_id: Uuid,
    loaded: OnceCell<PermissionSet>,
}

impl ScopedPermissions {
    pub async fn get(&self) -> AuthResult<&PermissionSet> {
        self.loaded
            .get_or_try_init(|| self.graph.permissions_of(self.user_id))
            .await
    }

    pub async fn has(&self, permission: &str) -> AuthResult<bool> {
        Ok(self.get().await?.contains(permission))
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded.initialized()
    }
}
