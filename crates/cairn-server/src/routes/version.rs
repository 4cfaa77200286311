//! Version routes

use axum::{
    Json, Router,
    extract::{Path, State},
    routing::get,
};

use super::package_ref;
use crate::{
    AppState,
    auth::{Reader, Writer},
    error::Result,
    models::{HashBody, VersionItem, VersionsResponse},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{owner}/{package}", get(list_versions))
        .route("/{owner}/{package}/", get(list_versions))
        .route(
            "/{owner}/{package}/{version}",
            get(get_version).put(put_version),
        )
}

async fn put_version(
    State(state): State<AppState>,
    writer: Writer,
    Path((owner, package, version)): Path<(String, String, String)>,
    Json(body): Json<HashBody>,
) -> Result<Json<HashBody>> {
    let package = package_ref(&owner, &package)?;
    writer.require_owner(&package)?;

    state
        .registry
        .assign_version(&package, &version, &body.hash)
        .await?;

    Ok(Json(body))
}

async fn get_version(
    State(state): State<AppState>,
    Reader(viewer): Reader,
    Path((owner, package, version)): Path<(String, String, String)>,
) -> Result<Json<HashBody>> {
    let package = package_ref(&owner, &package)?;
    let hash = state
        .registry
        .resolve_version(&package, &version, &viewer)
        .await?;

    Ok(Json(HashBody { hash }))
}

async fn list_versions(
    State(state): State<AppState>,
    Reader(viewer): Reader,
    Path((owner, package)): Path<(String, String)>,
) -> Result<Json<VersionsResponse>> {
    let package = package_ref(&owner, &package)?;
    let versions = state.registry.list_versions(&package, &viewer).await?;

    Ok(Json(VersionsResponse {
        versions: versions.into_iter().map(VersionItem::from).collect(),
    }))
}
