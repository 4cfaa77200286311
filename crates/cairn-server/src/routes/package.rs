//! Package instance routes

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    routing::put,
};
use cairn::{ContentHash, PackageTree, hash_tree};
use tracing::{debug, info};

use super::package_ref;
use crate::{
    AppState,
    auth::{Reader, Writer},
    error::{ApiError, Result},
    models::{PackageResponse, PushQuery, PushRequest, PushResponse},
};

pub fn router() -> Router<AppState> {
    Router::new().route(
        "/{owner}/{package}/{hash}",
        put(push_package).get(get_package),
    )
}

/// Store a package instance
///
/// The hash in the path must match the hash of the uploaded contents.
async fn push_package(
    State(state): State<AppState>,
    writer: Writer,
    Path((owner, package, hash)): Path<(String, String, String)>,
    Query(query): Query<PushQuery>,
    Json(request): Json<PushRequest>,
) -> Result<Json<PushResponse>> {
    let package = package_ref(&owner, &package)?;
    let expected: ContentHash = hash.parse()?;
    writer.require_owner(&package)?;

    let tree = PackageTree::from_nested(&request.contents)?;
    let computed = hash_tree(&tree)?;
    if computed != expected {
        return Err(ApiError::HashMismatch { expected, computed });
    }

    let entry = state
        .registry
        .push(&package, tree, &writer.0, query.tag_latest)
        .await?;
    info!("Stored {} as #{} of {}", entry.hash, entry.sequence, package);

    Ok(Json(PushResponse::from(entry)))
}

async fn get_package(
    State(state): State<AppState>,
    Reader(viewer): Reader,
    Path((owner, package, hash)): Path<(String, String, String)>,
) -> Result<Json<PackageResponse>> {
    let package = package_ref(&owner, &package)?;
    let hash: ContentHash = hash.parse()?;
    debug!("Fetching {} of {}", hash, package);

    let instance = state.registry.get_instance(&package, &hash, &viewer).await?;

    Ok(Json(PackageResponse {
        hash: instance.hash,
        author: instance.author,
        created: instance.created_at,
        contents: instance.tree.to_nested()?,
    }))
}
