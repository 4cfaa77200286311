use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::access::PUBLIC;
use crate::error::ReferenceError;

/// The tag applied automatically on push unless suppressed
pub const LATEST_TAG: &str = "latest";

const MAX_NAME_LEN: usize = 64;
const MAX_TAG_LEN: usize = 128;
const MAX_VERSION_LEN: usize = 64;

/// A validated (owner, package) pair, serialized as `owner/package`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PackageRef {
    owner: String,
    name: String,
}

impl PackageRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Result<Self, ReferenceError> {
        let owner = owner.into();
        let name = name.into();

        validate_identity(&owner)?;
        validate_name(&name)?;

        Ok(Self { owner, name })
    }

    /// Parse reference string: owner/package
    pub fn parse(reference: &str) -> Result<Self, ReferenceError> {
        let (owner, name) =
            reference
                .split_once('/')
                .ok_or_else(|| ReferenceError::InvalidFormat {
                    reference: reference.to_string(),
                    reason: "Expected owner/package".to_string(),
                })?;

        if name.contains('/') {
            return Err(ReferenceError::InvalidFormat {
                reference: reference.to_string(),
                reason: "Too many '/' separators".to_string(),
            });
        }

        Self::new(owner, name)
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl FromStr for PackageRef {
    type Err = ReferenceError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PackageRef {
    type Error = ReferenceError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PackageRef> for String {
    fn from(value: PackageRef) -> Self {
        value.to_string()
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

/// Validate a package name: 1-64 chars of letters, digits, '_' and '-'
pub fn validate_name(name: &str) -> Result<(), ReferenceError> {
    let invalid = |reason: &str| ReferenceError::InvalidName {
        name: name.to_string(),
        reason: reason.to_string(),
    };

    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(invalid("Name length must be 1-64 characters"));
    }
    if !name.chars().all(is_name_char) {
        return Err(invalid(
            "Name can only contain letters, digits, underscores and dashes",
        ));
    }
    if name.starts_with('-') {
        return Err(invalid("Name cannot start with '-'"));
    }

    Ok(())
}

/// Validate a user identity used as owner, author or grantee
///
/// Same rules as package names; `public` is reserved for the public marker.
pub fn validate_identity(identity: &str) -> Result<(), ReferenceError> {
    validate_name(identity)?;
    if identity == PUBLIC {
        return Err(ReferenceError::InvalidName {
            name: identity.to_string(),
            reason: format!("'{}' is reserved", PUBLIC),
        });
    }
    Ok(())
}

/// Validate tag format: 1-128 chars of letters, digits, '.', '_' and '-'
pub fn validate_tag(tag: &str) -> Result<(), ReferenceError> {
    let invalid = |reason: &str| ReferenceError::InvalidTag {
        tag: tag.to_string(),
        reason: reason.to_string(),
    };

    if tag.is_empty() || tag.len() > MAX_TAG_LEN {
        return Err(invalid("Tag length must be 1-128 characters"));
    }
    if !tag.chars().all(|c| is_name_char(c) || c == '.') {
        return Err(invalid(
            "Tag can only contain letters, digits, dots, underscores and dashes",
        ));
    }
    if tag.starts_with('-') || tag.starts_with('.') {
        return Err(invalid("Tag cannot start with '-' or '.'"));
    }

    Ok(())
}

/// Validate version format, e.g. `1.0.0`, `2.1rc1`, `1.0+local`
pub fn validate_version(version: &str) -> Result<(), ReferenceError> {
    let invalid = |reason: &str| ReferenceError::InvalidVersion {
        version: version.to_string(),
        reason: reason.to_string(),
    };

    if version.is_empty() || version.len() > MAX_VERSION_LEN {
        return Err(invalid("Version length must be 1-64 characters"));
    }
    if !version
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '+' | '-' | '_'))
    {
        return Err(invalid(
            "Version can only contain letters, digits, '.', '+', '-' and '_'",
        ));
    }
    if !version.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(invalid("Version must start with a letter or digit"));
    }

    Ok(())
}
