use axum::{
    Router,
    extract::{FromRef, Request},
    http::HeaderName,
    middleware::{self, Next},
    response::Response,
};
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Authorization core: transport-agnostic, usable without axum.
pub mod authorization;
pub mod crypto;
pub mod error;
pub mod permissions;
pub mod policy;
pub mod reset;
pub mod sessions;
pub mod throttle;
pub mod tokens;

// Record store seam and its implementations.
pub mod memory;
pub mod models;
pub mod repository;

// Service wiring and the HTTP front end.
pub mod auth;
pub mod config;
pub mod handlers;
pub mod notifier;
pub mod seed;

// Module for routing segregation (Public, Authenticated, Admin).
pub mod routes;
use auth::AuthUser;
use routes::{admin, authenticated, public};

// --- Public Re-exports ---

pub use authorization::{AuthorizationEngine, Decision, DenyReason};
pub use config::AppConfig;
pub use error::{AuthError, AuthResult, StoreError};
pub use memory::InMemoryRepository;
pub use notifier::{LogNotifier, MockNotifier, NotifierState};
pub use permissions::PermissionGraph;
pub use policy::PolicyRegistry;
pub use repository::{
    CredentialState, PostState, PostgresRepository, ResetState, ResourceState, RoleState,
    TokenState,
};
pub use reset::PasswordResets;
pub use sessions::SessionService;
pub use throttle::SessionThrottle;
pub use tokens::TokenRegistry;

/// ApiDoc
///
/// Aggregates every `#[utoipa::path]` handler and `ToSchema` model into the
/// OpenAPI document served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register_user, handlers::login, handlers::logout, handlers::logout_current,
        handlers::forgot_password, handlers::reset_password, handlers::get_me,
        handlers::authorize_request, handlers::get_posts, handlers::get_post,
        handlers::create_post, handlers::update_post, handlers::delete_post,
        handlers::create_role, handlers::create_permission, handlers::grant_permission,
        handlers::assign_role, handlers::get_user_permissions
    ),
    components(
        schemas(
            models::RegisterRequest, models::RegisterResponse, models::LoginRequest,
            models::LoginResponse, models::ForgotPasswordRequest, models::ResetPasswordRequest,
            models::UserResponse, models::UserProfile, models::MessageResponse,
            models::AuthorizeRequest, models::AuthorizeResponse, models::Post,
            models::CreatePostRequest, models::UpdatePostRequest, models::NamedRequest,
            models::Role, models::Permission, error::ErrorBody, authorization::DenyReason,
            policy::ResourceType, policy::Action,
        )
    ),
    tags(
        (name = "cms-portal", description = "CMS Authorization API")
    )
)]
struct ApiDoc;

/// Stores
///
/// One handle per record-store trait. Both repositories implement every trait,
/// so a single backend fills all slots; tests may swap individual slots.
#[derive(Clone)]
pub struct Stores {
    pub users: CredentialState,
    pub tokens: TokenState,
    pub roles: RoleState,
    pub posts: PostState,
    pub resources: ResourceState,
    pub resets: ResetState,
}

impl Stores {
    pub fn from_repository<R>(repo: Arc<R>) -> Self
    where
        R: repository::CredentialStore
            + repository::TokenStore
            + repository::RoleStore
            + repository::PostStore
            + repository::ResourceStore
            + repository::ResetTokenStore
            + 'static,
    {
        Self {
            users: repo.clone(),
            tokens: repo.clone(),
            roles: repo.clone(),
            posts: repo.clone(),
            resources: repo.clone(),
            resets: repo,
        }
    }
}

/// AppState
///
/// Implements the **Unified State Pattern**: one Clone-able container of every
/// service handle plus the immutable configuration, shared by all requests.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub users: CredentialState,
    pub posts: PostState,
    pub tokens: TokenRegistry,
    pub graph: PermissionGraph,
    pub engine: AuthorizationEngine,
    pub sessions: SessionService,
    pub resets: PasswordResets,
}

impl AppState {
    /// build
    ///
    /// Wires the core components over the given stores and notifier, using the
    /// default policy table.
    pub fn build(config: AppConfig, stores: Stores, notifier: NotifierState) -> Self {
        let tokens = TokenRegistry::new(stores.tokens.clone(), config.token_ttl);
        let graph = PermissionGraph::new(stores.roles.clone());
        let engine = AuthorizationEngine::new(
            stores.users.clone(),
            graph.clone(),
            stores.resources.clone(),
            tokens.clone(),
            Arc::new(PolicyRegistry::with_defaults()),
        );
        let sessions = SessionService::new(
            stores.users.clone(),
            graph.clone(),
            tokens.clone(),
            SessionThrottle::new(config.throttle_max_attempts, config.throttle_lockout),
            config.default_roles.clone(),
        );
        let resets = PasswordResets::new(
            stores.users.clone(),
            stores.resets.clone(),
            notifier,
            config.reset_token_ttl,
        );

        Self {
            config,
            users: stores.users,
            posts: stores.posts,
            tokens,
            graph,
            engine,
            sessions,
            resets,
        }
    }
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

impl FromRef<AppState> for TokenRegistry {
    fn from_ref(app_state: &AppState) -> TokenRegistry {
        app_state.tokens.clone()
    }
}

impl FromRef<AppState> for CredentialState {
    fn from_ref(app_state: &AppState) -> CredentialState {
        app_state.users.clone()
    }
}

/// auth_middleware
///
/// Enforces authentication for the routes it wraps. Extracting `AuthUser` rejects
/// with 401 before the handler runs; on success the resolved identity is cached in
/// the request extensions for the handler's own `AuthUser` extraction.
async fn auth_middleware(_auth_user: AuthUser, request: Request, next: Next) -> Response {
    next.run(request).await
}

/// create_router
///
/// Assembles the routing structure, applies scoped and global middleware, and
/// registers the application state.
pub fn create_router(state: AppState) -> Router {
    // 1. CORS Configuration
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    // Header name constant for Request Correlation.
    let x_request_id = HeaderName::from_static("x-request-id");

    // 2. Base Router Assembly
    let base_router = Router::new()
        // Documentation: Serve the auto-generated Swagger UI.
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .nest(
            "/admin",
            admin::admin_routes().route_layer(middleware::from_fn_with_state(
                state.clone(),
                auth_middleware,
            )),
        )
        .with_state(state);

    // 3. Observability and Correlation Layers
    base_router
        .layer(
            ServiceBuilder::new()
                // 3a. Request ID Generation
                .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
                // 3b. Request Tracing, correlated by the generated request id.
                .layer(
                    TraceLayer::new_for_http()
                        .make_span_with(trace_span_logger)
                        .on_response(
                            DefaultOnResponse::new()
                                .level(Level::INFO)
                                .latency_unit(tower_http::LatencyUnit::Millis),
                        ),
                )
                // 3c. Request ID Propagation back to the client.
                .layer(PropagateRequestIdLayer::new(x_request_id)),
        )
        // 4. CORS Layer
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span with method, URI and `x-request-id`. The
/// `Authorization` header is never recorded.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}
