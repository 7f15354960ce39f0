use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post, put},
};

/// Authenticated Router Module
///
/// Routes behind `auth_middleware`. Every handler receives a validated `AuthUser`;
/// permission and ownership checks happen in the handler through the
/// Authorization Engine.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // GET /me
        // Profile plus the union of permissions over all assigned roles.
        .route("/me", get(handlers::get_me))
        // POST /logout ends every session of the caller; /logout/current only this one.
        .route("/logout", post(handlers::logout))
        .route("/logout/current", post(handlers::logout_current))
        // POST /authorize
        // Dry-run authorization question for clients that need to hide UI affordances.
        .route("/authorize", post(handlers::authorize_request))
        // POST /posts requires `manage_posts`.
        .route("/posts", post(handlers::create_post))
        // PUT/DELETE /posts/{id}
        // Author-or-admin ownership policy, enforced before `manage_posts` is consulted.
        .route(
            "/posts/{id}",
            put(handlers::update_post).delete(handlers::delete_post),
        )
}
