//! Package visibility
//!
//! Every read goes through [`AccessGate::check`]. The gate answers with the
//! viewer's [`Access`] level or with [`RegistryError::PackageNotFound`]; a
//! missing package and a hidden package produce the same error value.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{RegistryError, Result};
use crate::reference::PackageRef;
use crate::storage::GrantStore;

/// Grantee name that makes a package visible to everyone
pub const PUBLIC: &str = "public";

/// Target of a share grant
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Grantee {
    User(String),
    Public,
}

impl Grantee {
    pub fn user(identity: impl Into<String>) -> Self {
        Grantee::User(identity.into())
    }

    pub fn as_str(&self) -> &str {
        match self {
            Grantee::User(identity) => identity,
            Grantee::Public => PUBLIC,
        }
    }
}

impl From<String> for Grantee {
    fn from(value: String) -> Self {
        if value == PUBLIC {
            Grantee::Public
        } else {
            Grantee::User(value)
        }
    }
}

impl From<&str> for Grantee {
    fn from(value: &str) -> Self {
        Grantee::from(value.to_string())
    }
}

impl From<Grantee> for String {
    fn from(value: Grantee) -> Self {
        value.as_str().to_string()
    }
}

impl fmt::Display for Grantee {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of whoever is reading, as established by the transport layer
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Viewer {
    User(String),
    Anonymous,
}

impl Viewer {
    pub fn user(identity: impl Into<String>) -> Self {
        Viewer::User(identity.into())
    }

    pub fn identity(&self) -> Option<&str> {
        match self {
            Viewer::User(identity) => Some(identity),
            Viewer::Anonymous => None,
        }
    }
}

/// Why a viewer was let in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Owner,
    Shared,
    Public,
}

/// Decide access from the package's grant set; `None` means denied
pub fn decide(package: &PackageRef, grants: &[Grantee], viewer: &Viewer) -> Option<Access> {
    if viewer.identity() == Some(package.owner()) {
        return Some(Access::Owner);
    }
    if grants.contains(&Grantee::Public) {
        return Some(Access::Public);
    }
    match viewer {
        Viewer::User(identity) if grants.iter().any(|g| g.as_str() == identity.as_str()) => {
            Some(Access::Shared)
        }
        _ => None,
    }
}

/// Read gate in front of the grant store
pub struct AccessGate<'a, G: GrantStore + ?Sized> {
    grants: &'a G,
}

impl<'a, G: GrantStore + ?Sized> AccessGate<'a, G> {
    pub fn new(grants: &'a G) -> Self {
        Self { grants }
    }

    /// Resolve the viewer's access or fail with `PackageNotFound`
    pub async fn check(&self, package: &PackageRef, viewer: &Viewer) -> Result<Access> {
        let denied = || RegistryError::PackageNotFound(package.clone());

        let grants = self.grants.package_grants(package).await?.ok_or_else(denied)?;
        let access = decide(package, &grants, viewer).ok_or_else(denied)?;

        tracing::debug!(%package, ?viewer, ?access, "access granted");
        Ok(access)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkg() -> PackageRef {
        PackageRef::new("alice", "pkg").unwrap()
    }

    #[test]
    fn test_owner_always_allowed() {
        assert_eq!(decide(&pkg(), &[], &Viewer::user("alice")), Some(Access::Owner));
    }

    #[test]
    fn test_private_package_hidden() {
        assert_eq!(decide(&pkg(), &[], &Viewer::user("bob")), None);
        assert_eq!(decide(&pkg(), &[], &Viewer::Anonymous), None);
    }

    #[test]
    fn test_shared_with_user() {
        let grants = vec![Grantee::user("bob")];
        assert_eq!(decide(&pkg(), &grants, &Viewer::user("bob")), Some(Access::Shared));
        assert_eq!(decide(&pkg(), &grants, &Viewer::user("carol")), None);
        assert_eq!(decide(&pkg(), &grants, &Viewer::Anonymous), None);
    }

    #[test]
    fn test_public_grant_admits_everyone() {
        let grants = vec![Grantee::Public];
        assert_eq!(decide(&pkg(), &grants, &Viewer::Anonymous), Some(Access::Public));
        assert_eq!(decide(&pkg(), &grants, &Viewer::user("carol")), Some(Access::Public));
        assert_eq!(decide(&pkg(), &grants, &Viewer::user("alice")), Some(Access::Owner));
    }

    #[test]
    fn test_grantee_string_forms() {
        assert_eq!(Grantee::from("public"), Grantee::Public);
        assert_eq!(Grantee::from("bob"), Grantee::user("bob"));
        assert_eq!(String::from(Grantee::Public), PUBLIC);
    }
}
