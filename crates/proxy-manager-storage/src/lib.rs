//! Record store for proxy-manager
//!
//! Holds the authoritative proxy host and certificate records. Everything the
//! proxy serves is derived from these two tables.
//!
//! # Architecture
//!
//! All backends implement the same traits:
//! - [`HostStore`] - proxy host records
//! - [`CertificateStore`] - certificate records
//! - [`Storage`] - lifecycle management (initialize, health check, close)
//!
//! # Example
//!
//! ```no_run
//! use proxy_manager_storage::{create_storage, StorageConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // In-memory for testing
//! let config = StorageConfig::from_url("sqlite://:memory:")?;
//! let storage = create_storage(&config).await?;
//!
//! // File-based for production
//! let config = StorageConfig::from_url("sqlite:///var/lib/proxy-manager/proxy-manager.db")?;
//! let storage = create_storage(&config).await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod error;
mod traits;
mod types;

pub mod backends;

// Re-exports
pub use config::{BackendType, ConfigError, StorageConfig};
pub use error::StorageError;
pub use traits::{CertificateStore, HostStore, Storage};
pub use types::{
    Certificate, CertificateId, CertificateProvider, HostId, NewCertificate, NewProxyHost,
    ProxyHost, ProxyHostUpdate,
};

/// Create storage from configuration
///
/// Creates the backend and initializes its schema.
///
/// # Errors
///
/// Returns `StorageError::InvalidConnectionString` if the backend type
/// is not compiled in (missing feature flag).
pub async fn create_storage(
    config: &StorageConfig,
) -> Result<std::sync::Arc<dyn Storage>, StorageError> {
    let storage: std::sync::Arc<dyn Storage> = match config.backend {
        #[cfg(feature = "sqlite")]
        BackendType::Sqlite => std::sync::Arc::new(
            backends::sqlite::SqliteStorage::new(&config.connection_string).await?,
        ),
        #[cfg(not(feature = "sqlite"))]
        BackendType::Sqlite => {
            return Err(StorageError::InvalidConnectionString(
                "SQLite backend not compiled in (enable 'sqlite' feature)".into(),
            ))
        }
    };

    storage.initialize().await?;
    Ok(storage)
}
