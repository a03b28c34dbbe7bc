//! Deskline API server entrypoint

use anyhow::Context;
use axum::http::{HeaderValue, Method};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use deskline_api::{routes::create_router, AppState, Config};
use deskline_shared::db;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env in development; absence is fine in production
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info,sqlx=warn".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env().context("failed to load configuration")?;

    let pool = db::create_pool(&config.database_url, config.database_max_connections)
        .await
        .context("failed to connect to database")?;

    if config.run_migrations {
        db::run_migrations(&pool)
            .await
            .context("failed to run migrations")?;
        tracing::info!("Database migrations applied");
    }

    let state = AppState::new(pool);

    let cors_origins = config
        .cors_origins
        .iter()
        .filter_map(|origin| origin.parse::<HeaderValue>().ok())
        .collect::<Vec<_>>();
    let cors = CorsLayer::new()
        .allow_origin(cors_origins)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(tower_http::cors::Any);

    let app = create_router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    );

    let listener = tokio::net::TcpListener::bind(&config.bind_address)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_address))?;
    tracing::info!(address = %config.bind_address, "Deskline API listening");

    axum::serve(listener, app)
        .await
        .context("server terminated unexpectedly")?;
    Ok(())
}
