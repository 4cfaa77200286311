//! Server configuration management

use crate::error::{ApiError, Result};
use serde::{Deserialize, Serialize};

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to bind to
    pub port: u16,

    /// SQLite connection string; the in-memory store is used when unset
    pub database_url: Option<String>,

    /// Request header carrying the caller's identity
    pub identity_header: String,

    /// Whether requests without an identity may read public packages
    pub allow_anonymous_access: bool,

    /// Upper bound for request bodies
    pub max_body_bytes: usize,
}

impl ServerConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: match lookup("PORT") {
                Some(port) => port
                    .parse()
                    .map_err(|_| ApiError::Config("Invalid PORT value".to_string()))?,
                None => defaults.port,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
            identity_header: match lookup("IDENTITY_HEADER") {
                Some(header) => {
                    axum::http::HeaderName::try_from(header.as_str()).map_err(|_| {
                        ApiError::Config("Invalid IDENTITY_HEADER value".to_string())
                    })?;
                    header.to_lowercase()
                }
                None => defaults.identity_header,
            },
            allow_anonymous_access: match lookup("ALLOW_ANONYMOUS_ACCESS") {
                Some(flag) => parse_flag(&flag).ok_or_else(|| {
                    ApiError::Config("Invalid ALLOW_ANONYMOUS_ACCESS value".to_string())
                })?,
                None => defaults.allow_anonymous_access,
            },
            max_body_bytes: match lookup("MAX_BODY_BYTES") {
                Some(limit) => limit
                    .parse()
                    .map_err(|_| ApiError::Config("Invalid MAX_BODY_BYTES value".to_string()))?,
                None => defaults.max_body_bytes,
            },
        })
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            database_url: None,
            identity_header: "x-cairn-user".to_string(),
            allow_anonymous_access: false,
            max_body_bytes: 16 * 1024 * 1024,
        }
    }
}
