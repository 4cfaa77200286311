//! Package sharing routes
//!
//! `public` in place of a user name shares the package with everyone.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, put},
};
use cairn_registry::Grantee;

use super::package_ref;
use crate::{
    AppState,
    auth::{Reader, Writer},
    error::Result,
    models::SharesResponse,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{owner}/{package}", get(list_access))
        .route("/{owner}/{package}/", get(list_access))
        .route(
            "/{owner}/{package}/{user}",
            put(grant_access).delete(revoke_access),
        )
}

async fn grant_access(
    State(state): State<AppState>,
    writer: Writer,
    Path((owner, package, user)): Path<(String, String, String)>,
) -> Result<StatusCode> {
    let package = package_ref(&owner, &package)?;
    writer.require_owner(&package)?;

    state
        .registry
        .grant_share(&package, &Grantee::from(user))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn revoke_access(
    State(state): State<AppState>,
    writer: Writer,
    Path((owner, package, user)): Path<(String, String, String)>,
) -> Result<StatusCode> {
    let package = package_ref(&owner, &package)?;
    writer.require_owner(&package)?;

    state
        .registry
        .revoke_share(&package, &Grantee::from(user))
        .await?;

    Ok(StatusCode::NO_CONTENT)
}

async fn list_access(
    State(state): State<AppState>,
    Reader(viewer): Reader,
    Path((owner, package)): Path<(String, String)>,
) -> Result<Json<SharesResponse>> {
    let package = package_ref(&owner, &package)?;
    let users = state.registry.list_shares(&package, &viewer).await?;

    Ok(Json(SharesResponse { users }))
}
