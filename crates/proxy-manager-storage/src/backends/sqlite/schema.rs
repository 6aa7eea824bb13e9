//! Table definitions for the SQLite backend
//!
//! - `proxy_hosts`: one row per proxied domain
//! - `certificates`: one row per issued certificate
//!
//! Deleting a certificate nulls out `proxy_hosts.certificate_id` through the
//! foreign key, so a dangling reference can never be stored.

use super::SqliteStorage;
use crate::error::StorageError;

/// Create all tables and indexes. Safe to run repeatedly.
pub async fn initialize_schema(storage: &SqliteStorage) -> Result<(), StorageError> {
    sqlx::query("PRAGMA foreign_keys=ON")
        .execute(storage.pool())
        .await
        .map_err(|e| StorageError::migration("failed to set foreign_keys", e))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS certificates (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            domain TEXT NOT NULL UNIQUE,
            provider TEXT NOT NULL DEFAULT 'letsencrypt',
            cert_path TEXT NOT NULL,
            key_path TEXT NOT NULL,
            expires_at INTEGER NOT NULL,
            created_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(storage.pool())
    .await
    .map_err(|e| StorageError::migration("failed to create certificates table", e))?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS proxy_hosts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            domain TEXT NOT NULL UNIQUE,
            target_url TEXT NOT NULL,
            enabled INTEGER NOT NULL DEFAULT 1,
            ssl_enabled INTEGER NOT NULL DEFAULT 0,
            certificate_id INTEGER REFERENCES certificates(id) ON DELETE SET NULL,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        )
        "#,
    )
    .execute(storage.pool())
    .await
    .map_err(|e| StorageError::migration("failed to create proxy_hosts table", e))?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_proxy_hosts_certificate ON proxy_hosts(certificate_id)",
    )
    .execute(storage.pool())
    .await
    .map_err(|e| StorageError::migration("failed to create certificate reference index", e))?;

    // Drives the renewal sweep
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_certificates_expiry ON certificates(expires_at)")
        .execute(storage.pool())
        .await
        .map_err(|e| StorageError::migration("failed to create expiry index", e))?;

    tracing::debug!("SQLite schema initialized");
    Ok(())
}
