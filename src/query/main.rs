//! Query server for locode lookups.
//!
//! Loads regions from the configured store, builds the spatial index and
//! serves point lookups over HTTP. `POST /v1/refresh` rebuilds the index
//! from the store and swaps it in without interrupting lookups.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use locode::error::{QueryError, RefreshError};
use locode::pip::{LocodeResolver, RefreshReport};
use locode::sources::RegionStore;

mod config;
use config::Config;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[derive(Parser, Debug)]
#[command(name = "query")]
#[command(about = "Locode reverse geocoding server")]
struct Args {
    /// Path to the TOML config file
    #[arg(short, long, default_value = "locode.toml")]
    config: PathBuf,

    /// Listen address (overrides the config file)
    #[arg(short, long)]
    listen: Option<String>,
}

/// Application state shared across handlers
struct AppState {
    resolver: LocodeResolver,
    store: RegionStore,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("Locode Query Server");
    info!("Loading config from {}", args.config.display());
    let config = Config::load_from_file(&args.config)?;

    let store = config.source.open().await?;
    info!("Region store: {}", store.describe());

    let resolver = LocodeResolver::empty(config.index);
    let report = resolver
        .refresh(&store)
        .await
        .context("Failed to build initial spatial index")?;
    info!(
        "Index ready with {} regions ({} fetched)",
        report.stats.indexed, report.fetched
    );

    let state = Arc::new(AppState { resolver, store });

    // Build router
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/v1/locode", get(locode_handler))
        .route("/v1/locodes", get(locodes_handler))
        .route("/v1/refresh", post(refresh_handler))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let listen = args.listen.unwrap_or(config.server.listen);
    info!("Starting server on {}", listen);

    let listener = tokio::net::TcpListener::bind(&listen).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// Health check endpoint
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let index = state.resolver.current();

    Json(HealthResponse {
        status: if index.is_empty() { "empty" } else { "ok" },
        regions: index.len(),
        built_at: index.stats().built_at,
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    regions: usize,
    built_at: DateTime<Utc>,
}

/// Most specific locode containing the point
async fn locode_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PointQueryParams>,
) -> Result<Json<LocodeResponse>, (StatusCode, String)> {
    let locode = state
        .resolver
        .query_first(params.lat, params.lon)
        .map_err(bad_request)?;

    Ok(Json(LocodeResponse { locode }))
}

/// Every locode containing the point, most specific first
async fn locodes_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<PointQueryParams>,
) -> Result<Json<LocodesResponse>, (StatusCode, String)> {
    let locodes = state
        .resolver
        .query(params.lat, params.lon)
        .map_err(bad_request)?;

    Ok(Json(LocodesResponse { locodes }))
}

/// Rebuild the index from the region store
async fn refresh_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<RefreshReport>, (StatusCode, String)> {
    let report = state
        .resolver
        .refresh(&state.store)
        .await
        .map_err(|e| {
            let status = match e {
                RefreshError::InProgress => StatusCode::CONFLICT,
                _ => {
                    tracing::error!("Index refresh failed: {}", e);
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            };
            (status, e.to_string())
        })?;

    Ok(Json(report))
}

fn bad_request(e: QueryError) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, e.to_string())
}

#[derive(Deserialize)]
struct PointQueryParams {
    /// Latitude in degrees
    lat: f64,
    /// Longitude in degrees
    lon: f64,
}

#[derive(Serialize)]
struct LocodeResponse {
    locode: Option<String>,
}

#[derive(Serialize)]
struct LocodesResponse {
    locodes: Vec<String>,
}
