use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a bearer token: the session gateway (register,
/// login, password reset) and read-only post access.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness probe for load balancers.
        .route("/health", get(|| async { "ok" }))
        .route("/register", post(handlers::register_user))
        // POST /login
        // Throttled: the 5th failure for an email+origin locks it for the lockout window.
        .route("/login", post(handlers::login))
        .route("/password/forgot", post(handlers::forgot_password))
        .route("/password/reset", post(handlers::reset_password))
        .route("/posts", get(handlers::get_posts))
        .route("/posts/{id}", get(handlers::get_post))
}
