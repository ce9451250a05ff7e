use std::net::SocketAddr;
use std::sync::Arc;

use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use birzha_backend::config::AppConfig;
use birzha_backend::db::{self, Database};
use birzha_backend::services::matching::MatchingEngine;
use birzha_backend::{api, AppState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "birzha_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = AppConfig::load()?;

    tracing::info!("Starting birzha backend v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Environment: {}", config.environment);

    // Initialize database
    let database = Database::connect(&config.database_url, config.db_max_connections).await?;
    db::run_migrations(&database.pool).await?;
    tracing::info!("Database connected");

    // Initialize matching engine and rebuild books from resting orders
    let engine = Arc::new(MatchingEngine::new(database.pool.clone()));
    match engine.recover_from_db().await {
        Ok(0) => tracing::info!("No open orders to recover"),
        Ok(count) => tracing::info!("Recovered {} open limit orders to the book", count),
        Err(e) => {
            tracing::error!("Failed to recover orders from database: {}", e);
            tracing::warn!("Starting with empty order books");
        }
    }

    // Build application state
    let state = Arc::new(AppState {
        config: config.clone(),
        db: database,
        engine,
    });

    // Build router
    let app = axum::Router::new()
        .route("/health", axum::routing::get(health_check))
        .nest("/api/v1", api::routes::create_router(state.clone()))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}
