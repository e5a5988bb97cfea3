//! Parish Care workflow service — entry point.
//!
//! Wires the workflow core to its surroundings: SQLite via `sqlx`, the
//! Axum REST API, the shared notification gateway, and the daily
//! contribution-reminder sweep running as a background task.

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use parish_care::api::{self, AppState};
use parish_care::config::Config;
use parish_care::db;
use parish_care::mailer::Mailer;
use parish_care::sweep::{self, SweepState};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    // Load config from environment.
    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // One mail gateway shared by the API and the sweep.
    let mailer = Arc::new(Mailer::from_config(&config));

    // ─── Background reminder sweep ────────────────────────
    let sweep_state = Arc::new(SweepState {
        pool: pool.clone(),
        mailer: mailer.clone(),
        config: config.clone(),
    });
    tokio::spawn(sweep::run(sweep_state));

    // ─── REST API ─────────────────────────────────────────
    let app = api::router(AppState {
        pool,
        mailer,
        config: config.clone(),
    })
    .layer(CorsLayer::permissive())
    .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
