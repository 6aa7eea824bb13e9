//! SQLite storage backend implementation using sqlx
//!
//! # Layout
//!
//! - **schema**: table definitions, applied by [`Storage::initialize`]
//! - **hosts**: proxy host records
//! - **certificates**: certificate records
//!
//! Timestamps are stored as microseconds since the Unix epoch.
//!
//! # Security
//!
//! All queries use sqlx's prepared statement bindings (`bind()`). User-provided
//! data is never interpolated into query strings.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::error::StorageError;
use crate::traits::{CertificateStore, HostStore, Storage};
use crate::types::{
    Certificate, CertificateId, HostId, NewCertificate, NewProxyHost, ProxyHost, ProxyHostUpdate,
};

mod certificates;
mod hosts;
mod schema;

/// SQLite storage backend
///
/// # Examples
///
/// ```no_run
/// use proxy_manager_storage::backends::sqlite::SqliteStorage;
/// use proxy_manager_storage::Storage;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let storage = SqliteStorage::new("/var/lib/proxy-manager/proxy-manager.db").await?;
/// storage.initialize().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Create a new SQLite storage backend
    ///
    /// `path` is a database file (created if missing) or `:memory:`.
    ///
    /// Every pooled connection to `:memory:` would open its own empty
    /// database, so the in-memory pool is pinned to one long-lived connection.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Connection` if the database connection fails.
    pub async fn new(path: &str) -> Result<Self, StorageError> {
        let in_memory = path == ":memory:";

        let options = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")
        } else {
            SqliteConnectOptions::from_str(&format!("sqlite://{}?mode=rwc", path))
        }
        .map_err(|e| StorageError::connection("invalid SQLite URL", e))?
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
        .foreign_keys(true);

        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .min_connections(1)
                .max_connections(5) // SQLite is single-writer
                .idle_timeout(Duration::from_secs(600))
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(options)
            .await
            .map_err(|e| StorageError::connection("failed to create SQLite pool", e))?;

        Ok(Self { pool })
    }

    pub(crate) fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Convert stored microseconds back into a timestamp
pub(crate) fn from_micros(field: &str, micros: i64) -> Result<DateTime<Utc>, StorageError> {
    DateTime::from_timestamp_micros(micros).ok_or_else(|| {
        StorageError::InvalidData(format!("invalid {} timestamp: {}", field, micros))
    })
}

/// Map a failed write to `DuplicateDomain` when it tripped the unique index
pub(crate) fn map_write_error(
    err: sqlx::Error,
    entity_type: &'static str,
    domain: &str,
    context: &str,
) -> StorageError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return StorageError::DuplicateDomain {
                entity_type,
                domain: domain.to_string(),
            };
        }
    }
    StorageError::query(context.to_string(), err)
}

#[async_trait]
impl HostStore for SqliteStorage {
    async fn list_hosts(&self) -> Result<Vec<ProxyHost>, StorageError> {
        self.list_hosts_impl().await
    }

    async fn get_host(&self, id: HostId) -> Result<Option<ProxyHost>, StorageError> {
        self.get_host_impl(id).await
    }

    async fn get_host_by_domain(&self, domain: &str) -> Result<Option<ProxyHost>, StorageError> {
        self.get_host_by_domain_impl(domain).await
    }

    async fn create_host(&self, host: NewProxyHost) -> Result<ProxyHost, StorageError> {
        self.create_host_impl(host).await
    }

    async fn update_host(
        &self,
        id: HostId,
        update: ProxyHostUpdate,
    ) -> Result<Option<ProxyHost>, StorageError> {
        self.update_host_impl(id, update).await
    }

    async fn delete_host(&self, id: HostId) -> Result<bool, StorageError> {
        self.delete_host_impl(id).await
    }

    async fn detach_certificate(
        &self,
        certificate_id: CertificateId,
    ) -> Result<Vec<HostId>, StorageError> {
        self.detach_certificate_impl(certificate_id).await
    }
}

#[async_trait]
impl CertificateStore for SqliteStorage {
    async fn list_certificates(&self) -> Result<Vec<Certificate>, StorageError> {
        self.list_certificates_impl().await
    }

    async fn get_certificate(
        &self,
        id: CertificateId,
    ) -> Result<Option<Certificate>, StorageError> {
        self.get_certificate_impl(id).await
    }

    async fn get_certificate_by_domain(
        &self,
        domain: &str,
    ) -> Result<Option<Certificate>, StorageError> {
        self.get_certificate_by_domain_impl(domain).await
    }

    async fn create_certificate(
        &self,
        certificate: NewCertificate,
        cert_path: &Path,
        key_path: &Path,
        expires_at: DateTime<Utc>,
    ) -> Result<Certificate, StorageError> {
        self.create_certificate_impl(certificate, cert_path, key_path, expires_at)
            .await
    }

    async fn update_certificate_expiry(
        &self,
        id: CertificateId,
        expires_at: DateTime<Utc>,
    ) -> Result<Certificate, StorageError> {
        self.update_certificate_expiry_impl(id, expires_at).await
    }

    async fn delete_certificate(&self, id: CertificateId) -> Result<bool, StorageError> {
        self.delete_certificate_impl(id).await
    }
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn initialize(&self) -> Result<(), StorageError> {
        schema::initialize_schema(self).await
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        sqlx::query("SELECT 1")
            .execute(self.pool())
            .await
            .map_err(|e| StorageError::connection("health check: database connection failed", e))?;

        let table_exists: bool = sqlx::query_scalar(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM sqlite_master
                WHERE type = 'table' AND name = 'proxy_hosts'
            )
            "#,
        )
        .fetch_one(self.pool())
        .await
        .map_err(|e| StorageError::connection("health check: failed to verify schema", e))?;

        if !table_exists {
            return Err(StorageError::connection(
                "health check: schema not initialized (proxy_hosts table missing)",
                std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "schema not initialized - call initialize() first",
                ),
            ));
        }

        Ok(())
    }

    async fn close(&self) -> Result<(), StorageError> {
        self.pool.close().await;
        Ok(())
    }
}
