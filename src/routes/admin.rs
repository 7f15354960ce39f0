use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Admin Router Module
///
/// Role and permission management, nested under `/admin`. The router is wrapped in
/// the same authentication layer as the authenticated routes; each handler then
/// requires `manage_users` (or `is_admin`) via the Authorization Engine.
pub fn admin_routes() -> Router<AppState> {
    Router::new()
        .route("/roles", post(handlers::create_role))
        .route("/permissions", post(handlers::create_permission))
        // PUT is idempotent here: re-granting an existing permission is a no-op.
        .route(
            "/roles/{role_id}/permissions/{permission_id}",
            put(handlers::grant_permission),
        )
        .route("/users/{user_id}/roles/{role_id}", put(handlers::assign_role))
        .route(
            "/users/{user_id}/permissions",
            get(handlers::get_user_permissions),
        )
}
