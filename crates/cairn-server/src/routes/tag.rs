//! Tag routes

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::get,
};

use super::package_ref;
use crate::{
    AppState,
    auth::{Reader, Writer},
    error::Result,
    models::{HashBody, TagItem, TagsResponse},
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{owner}/{package}", get(list_tags))
        .route("/{owner}/{package}/", get(list_tags))
        .route(
            "/{owner}/{package}/{tag}",
            get(get_tag).put(put_tag).delete(delete_tag),
        )
}

async fn put_tag(
    State(state): State<AppState>,
    writer: Writer,
    Path((owner, package, tag)): Path<(String, String, String)>,
    Json(body): Json<HashBody>,
) -> Result<Json<HashBody>> {
    let package = package_ref(&owner, &package)?;
    writer.require_owner(&package)?;

    state.registry.set_tag(&package, &tag, &body.hash).await?;

    Ok(Json(body))
}

async fn get_tag(
    State(state): State<AppState>,
    Reader(viewer): Reader,
    Path((owner, package, tag)): Path<(String, String, String)>,
) -> Result<Json<HashBody>> {
    let package = package_ref(&owner, &package)?;
    let hash = state.registry.resolve_tag(&package, &tag, &viewer).await?;

    Ok(Json(HashBody { hash }))
}

async fn delete_tag(
    State(state): State<AppState>,
    writer: Writer,
    Path((owner, package, tag)): Path<(String, String, String)>,
) -> Result<StatusCode> {
    let package = package_ref(&owner, &package)?;
    writer.require_owner(&package)?;

    state.registry.remove_tag(&package, &tag).await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn list_tags(
    State(state): State<AppState>,
    Reader(viewer): Reader,
    Path((owner, package)): Path<(String, String)>,
) -> Result<Json<TagsResponse>> {
    let package = package_ref(&owner, &package)?;
    let tags = state.registry.list_tags(&package, &viewer).await?;

    Ok(Json(TagsResponse {
        tags: tags.into_iter().map(TagItem::from).collect(),
    }))
}
