use crate::AppState;
use crate::crypto;
use crate::error::{AuthError, AuthResult};
use crate::models::{NewUser, Permission, Role, User};
use crate::permissions::PermissionGraph;
use crate::policy::{
    DELETE_POSTS, EDIT_POSTS, MANAGE_CATEGORIES, MANAGE_POSTS, MANAGE_USERS, PUBLISH_POSTS,
};
use crate::repository::CredentialState;

pub const ADMIN_ROLE: &str = "Admin";
pub const EDITOR_ROLE: &str = "Editor";
pub const AUTHOR_ROLE: &str = "Author";
pub const READER_ROLE: &str = "Reader";

pub const DEFAULT_PERMISSIONS: [&str; 6] = [
    MANAGE_POSTS,
    PUBLISH_POSTS,
    EDIT_POSTS,
    DELETE_POSTS,
    MANAGE_CATEGORIES,
    MANAGE_USERS,
];

/// Role name and the permissions it bundles.
pub fn default_roles() -> Vec<(&'static str, Vec<&'static str>)> {
    vec![
        (ADMIN_ROLE, DEFAULT_PERMISSIONS.to_vec()),
        (EDITOR_ROLE, vec![MANAGE_POSTS, PUBLISH_POSTS, EDIT_POSTS]),
        (AUTHOR_ROLE, vec![EDIT_POSTS, PUBLISH_POSTS]),
        (READER_ROLE, vec![]),
    ]
}

/// seed_defaults
///
/// Creates the default permissions and roles and links them. Safe to run on
/// every start: existing names are reused and grants are idempotent.
pub async fn seed_defaults(graph: &PermissionGraph) -> AuthResult<()> {
    for name in DEFAULT_PERMISSIONS {
        ensure_permission(graph, name).await?;
    }
    for (role_name, permissions) in default_roles() {
        let role = ensure_role(graph, role_name).await?;
        for name in permissions {
            let permission = ensure_permission(graph, name).await?;
            graph.grant_permission(role.id, permission.id).await?;
        }
    }
    tracing::info!("default roles and permissions seeded");
    Ok(())
}

/// seed_admin
///
/// Ensures an admin account exists for `email`. An existing account keeps its
/// password but is (re)attached to the Admin role.
pub async fn seed_admin(
    users: &CredentialState,
    graph: &PermissionGraph,
    email: &str,
    password: &str,
) -> AuthResult<User> {
    let email = crypto::normalize_email(email);
    let user = match users.find_by_email(&email).await? {
        Some(user) => user,
        None => {
            users
                .create_user(NewUser {
                    name: "Administrator".to_string(),
                    email,
                    password_hash: crypto::hash_password(password).await?,
                    is_admin: true,
                })
                .await?
        }
    };

    let role = graph
        .find_role(ADMIN_ROLE)
        .await?
        .ok_or_else(|| AuthError::NotFound(format!("role {ADMIN_ROLE}")))?;
    graph.assign_role(user.id, role.id).await?;

    tracing::info!(user_id = %user.id, "admin account ready");
    Ok(user)
}

async fn ensure_role(graph: &PermissionGraph, name: &str) -> AuthResult<Role> {
    match graph.find_role(name).await? {
        Some(role) => Ok(role),
        None => graph.create_role(name).await,
    }
}

async fn ensure_permission(graph: &PermissionGraph, name: &str) -> AuthResult<Permission> {
    match graph.find_permission(name).await? {
        Some(permission) => Ok(permission),
        None => graph.create_permission(name).await,
    }
}

/// bootstrap
///
/// Startup seeding driven by `AppConfig`: default roles when `seed_defaults` is
/// set, and the admin account when both `admin_email` and `admin_password` are.
pub async fn bootstrap(state: &AppState) -> AuthResult<()> {
    if state.config.seed_defaults {
        seed_defaults(&state.graph).await?;
    }
    if let (Some(email), Some(password)) = (&state.config.admin_email, &state.config.admin_password)
    {
        seed_admin(&state.users, &state.graph, email, password).await?;
    }
    Ok(())
}
