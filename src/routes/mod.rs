/// Router Module Index
///
/// Routing split by access level. Authentication is applied per module with an
/// axum layer, so a route cannot end up unprotected by being registered in the
/// wrong place.

/// Routes reachable without a bearer token.
pub mod public;

/// Routes behind the `AuthUser` middleware.
pub mod authenticated;

/// Role/permission administration; authenticated, then capability-checked.
pub mod admin;
