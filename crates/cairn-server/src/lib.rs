//! Cairn HTTP API Server
//!
//! Provides REST endpoints for pushing package instances, reading package
//! history and managing tags, versions and sharing.

use axum::{Router, extract::DefaultBodyLimit, response::Json, routing::get};
use cairn_registry::{MemoryStore, Registry, SqliteStore};
use serde_json::{Value, json};
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;

pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod routes;

use config::ServerConfig;
use error::Result;

/// Main application state
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(registry: Registry, config: ServerConfig) -> Self {
        Self {
            registry: Arc::new(registry),
            config: Arc::new(config),
        }
    }

    /// Open the configured storage backend
    pub async fn from_config(config: ServerConfig) -> Result<Self> {
        let registry = match &config.database_url {
            Some(url) => {
                info!("Using SQLite storage at {}", url);
                Registry::new(SqliteStore::new(url).await?)
            }
            None => {
                info!("DATABASE_URL not set, using in-memory storage");
                Registry::new(MemoryStore::new())
            }
        };

        Ok(Self::new(registry, config))
    }
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    let body_limit = state.config.max_body_bytes;

    Router::new()
        // Health check
        .route("/health", get(health_check))
        // API routes
        .nest("/api", api_routes())
        // Middleware
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
}

/// API routes
fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/package", routes::package::router())
        .nest("/log", routes::log::router())
        .nest("/version", routes::version::router())
        .nest("/tag", routes::tag::router())
        .nest("/access", routes::access::router())
}

/// Health check endpoint
async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "cairn-server",
        "version": env!("CARGO_PKG_VERSION"),
        "timestamp": time::OffsetDateTime::now_utc().unix_timestamp()
    }))
}
