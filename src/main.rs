use cms_portal::{
    AppState, InMemoryRepository, LogNotifier, NotifierState, PostgresRepository, Stores,
    config::{AppConfig, Env},
    create_router, seed,
};
use sqlx::postgres::PgPoolOptions;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// main
///
/// Entry point: configuration, logging, record store, seeding, then the HTTP server.
#[tokio::main]
async fn main() {
    // 1. Configuration & Environment Loading (Fail-Fast)
    dotenv::dotenv().ok();
    let config = AppConfig::load();

    // 2. Logging Filter Setup
    // RUST_LOG wins; otherwise debug for this crate and info for tower_http.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "cms_portal=debug,tower_http=info".into());

    // 3. Initialize Logging based on Environment
    match config.env {
        Env::Local => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
        Env::Production => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
    }

    tracing::info!("Application starting in {:?} mode", config.env);

    // 4. Record Store Initialization
    // Postgres when DATABASE_URL is set (always in production), in-memory otherwise.
    let stores = match &config.db_url {
        Some(db_url) => {
            let pool = PgPoolOptions::new()
                .max_connections(5)
                .connect(db_url)
                .await
                .expect("FATAL: Failed to connect to Postgres. Check DATABASE_URL.");
            let repo = PostgresRepository::new(pool);
            repo.migrate()
                .await
                .expect("FATAL: Failed to apply database migrations.");
            Stores::from_repository(Arc::new(repo))
        }
        None => {
            tracing::warn!("DATABASE_URL not set; using the in-memory store");
            Stores::from_repository(Arc::new(InMemoryRepository::new()))
        }
    };

    // 5. Reset Notifier
    // Reset tokens are only written to the log in local development.
    let notifier = Arc::new(LogNotifier::new(config.env == Env::Local)) as NotifierState;

    // 6. Unified State Assembly and Seeding
    let bind_addr = config.bind_addr.clone();
    let app_state = AppState::build(config, stores, notifier);
    seed::bootstrap(&app_state)
        .await
        .expect("FATAL: Failed to seed roles and permissions.");

    // 7. Router and Server Startup
    let app = create_router(app_state);

    let listener = TcpListener::bind(&bind_addr)
        .await
        .expect("FATAL: Failed to bind BIND_ADDR.");

    tracing::info!("Listening on {}", bind_addr);
    tracing::info!("API Documentation (Swagger UI) available at /swagger-ui");

    // ConnectInfo feeds the client origin used by the login throttle.
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .expect("FATAL: HTTP server terminated unexpectedly.");
}
