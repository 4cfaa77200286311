//! HTTP route handlers

pub mod access;
pub mod log;
pub mod package;
pub mod tag;
pub mod version;

use cairn_registry::PackageRef;

use crate::error::Result;

/// Validated package reference from path segments
fn package_ref(owner: &str, package: &str) -> Result<PackageRef> {
    Ok(PackageRef::new(owner, package)?)
}
