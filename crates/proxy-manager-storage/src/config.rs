//! Storage configuration

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur when parsing storage configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Invalid URL format
    #[error("Invalid URL format: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Unsupported URL scheme
    #[error("Unsupported URL scheme: {0}. Supported schemes: sqlite")]
    UnsupportedScheme(String),
}

/// Storage backend type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendType {
    /// SQLite backend
    Sqlite,
}

/// Storage configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Backend type
    pub backend: BackendType,

    /// Connection string (file path or `:memory:`)
    pub connection_string: String,
}

impl StorageConfig {
    /// Parse connection URL into storage configuration
    ///
    /// Supported URL formats:
    /// - `sqlite://:memory:` - In-memory SQLite
    /// - `sqlite:///path/to/db.sqlite` - File-based SQLite (absolute path)
    /// - `sqlite://./relative.sqlite` - File-based SQLite (relative path)
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidUrl` if the URL cannot be parsed.
    /// Returns `ConfigError::UnsupportedScheme` if the URL scheme is not supported.
    pub fn from_url(url: &str) -> Result<Self, ConfigError> {
        // ":memory:" is not a valid URL host
        let normalized_url = if url.contains("://:memory:") {
            url.replace("://:memory:", ":///memory:")
        } else {
            url.to_string()
        };

        let parsed = url::Url::parse(&normalized_url)?;

        let backend = match parsed.scheme() {
            "sqlite" => BackendType::Sqlite,
            scheme => return Err(ConfigError::UnsupportedScheme(scheme.to_string())),
        };

        let connection_string = match parsed.host_str() {
            // sqlite://./relative.sqlite parses "." as the host
            Some(host) if !host.is_empty() => format!("{}{}", host, parsed.path()),
            _ => {
                let path = parsed.path();
                if path == "/memory:" || path == "/:memory:" {
                    ":memory:".to_string()
                } else {
                    path.to_string()
                }
            }
        };

        Ok(Self {
            backend,
            connection_string,
        })
    }

    /// Create in-memory SQLite configuration for testing
    #[must_use]
    pub fn sqlite_memory() -> Self {
        Self {
            backend: BackendType::Sqlite,
            connection_string: ":memory:".to_string(),
        }
    }

    /// Create file-based SQLite configuration
    #[must_use]
    pub fn sqlite_file(path: &str) -> Self {
        Self {
            backend: BackendType::Sqlite,
            connection_string: path.to_string(),
        }
    }
}
