mod config;
mod db;
mod error;
mod models;
mod routes;
mod scrape;
mod sources;
mod store;

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use clap::Parser;
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use crate::config::{Command, Config};
use crate::routes::AppState;
use crate::scrape::RunCoordinator;
use crate::store::{JobStore, MemoryStore, PgStore};

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn readyz(State(store): State<Arc<dyn JobStore>>) -> impl IntoResponse {
    match store.ping().await {
        Ok(()) => (StatusCode::OK, "ready"),
        Err(e) => {
            tracing::warn!("Readiness check failed: {e}");
            (StatusCode::SERVICE_UNAVAILABLE, "not ready")
        }
    }
}

async fn open_store(config: &Config) -> anyhow::Result<Arc<dyn JobStore>> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set; jobs are kept in memory and lost on restart");
        return Ok(Arc::new(MemoryStore::new()));
    };

    tracing::info!("Connecting to database...");
    let pool = db::create_pool(url).await?;

    if config.run_migrations {
        tracing::info!("Running database migrations...");
        db::run_migrations(&pool).await?;
        tracing::info!("Migrations complete");
    }

    Ok(Arc::new(PgStore::new(pool)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("jobboard=info,tower_http=info")),
        )
        .init();

    let config = Config::parse();
    let store = open_store(&config).await?;
    let sources = sources::configured_sources(&config)?;
    tracing::info!(
        sources = ?sources.iter().map(|s| s.name().to_string()).collect::<Vec<_>>(),
        "Sources configured"
    );

    let coordinator = Arc::new(RunCoordinator::new(
        sources,
        store.clone(),
        config.run_settings(),
    ));
    coordinator.restore().await?;

    match config.resolved_command() {
        Command::Serve { listen_addr } => {
            let health = Router::new()
                .route("/healthz", get(healthz))
                .route("/readyz", get(readyz))
                .with_state(store.clone());

            let app = Router::new()
                .merge(health)
                .merge(routes::api::router(AppState { store, coordinator }))
                .layer(
                    ServiceBuilder::new()
                        .layer(TraceLayer::new_for_http())
                        .layer(CorsLayer::permissive()),
                );

            let listener = tokio::net::TcpListener::bind(&listen_addr).await?;
            tracing::info!("Listening on {listen_addr}");
            axum::serve(listener, app).await?;
        }
        Command::Scrape { max_jobs } => {
            let report = coordinator.trigger(max_jobs)?.finished().await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.success() {
                anyhow::bail!(
                    "scrape run {} finished with status {}",
                    report.id,
                    report.status.as_str()
                );
            }
        }
    }

    Ok(())
}
