//! Caller identity extraction
//!
//! Authentication happens in front of this server. The proxy forwards the
//! authenticated user name in a configurable header, and the handlers only
//! decide what that user may see or change.

use axum::{extract::FromRequestParts, http::request::Parts};
use cairn_registry::{PackageRef, Viewer, reference::validate_identity};

use crate::{
    AppState,
    error::{ApiError, Result},
};

fn identity_from_parts(parts: &Parts, state: &AppState) -> Result<Option<String>> {
    let Some(value) = parts.headers.get(state.config.identity_header.as_str()) else {
        return Ok(None);
    };

    let identity = value
        .to_str()
        .map_err(|_| ApiError::bad_request("Identity header is not valid ASCII"))?
        .trim();
    if identity.is_empty() {
        return Ok(None);
    }

    validate_identity(identity)?;
    Ok(Some(identity.to_string()))
}

/// Viewer for read endpoints
///
/// Anonymous callers are turned away unless anonymous access is enabled.
pub struct Reader(pub Viewer);

impl FromRequestParts<AppState> for Reader {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match identity_from_parts(parts, state)? {
            Some(identity) => Ok(Reader(Viewer::User(identity))),
            None if state.config.allow_anonymous_access => Ok(Reader(Viewer::Anonymous)),
            None => Err(ApiError::Unauthorized),
        }
    }
}

/// Authenticated user for write endpoints
pub struct Writer(pub String);

impl Writer {
    /// Only the owner may change a package
    pub fn require_owner(&self, package: &PackageRef) -> Result<()> {
        if self.0 != package.owner() {
            return Err(ApiError::forbidden(&format!(
                "Only {} can modify {}",
                package.owner(),
                package
            )));
        }
        Ok(())
    }
}

impl FromRequestParts<AppState> for Writer {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        identity_from_parts(parts, state)?
            .map(Writer)
            .ok_or(ApiError::Unauthorized)
    }
}
