//! Package history routes

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};
use tracing::debug;

use super::package_ref;
use crate::{
    AppState,
    auth::Reader,
    error::Result,
    models::{LogItem, LogResponse},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{owner}/{package}", get(get_log))
        .route("/{owner}/{package}/", get(get_log))
}

/// Push history of a package, oldest first
async fn get_log(
    State(state): State<AppState>,
    Reader(viewer): Reader,
    Path((owner, package)): Path<(String, String)>,
) -> Result<Json<LogResponse>> {
    let package = package_ref(&owner, &package)?;
    debug!("Reading log of {}", package);

    let records = state.registry.get_log(&package, &viewer).await?;

    Ok(Json(LogResponse {
        logs: records.into_iter().map(LogItem::from).collect(),
    }))
}
