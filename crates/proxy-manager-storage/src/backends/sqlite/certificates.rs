//! Certificate records for SQLite

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::path::{Path, PathBuf};

use super::{from_micros, map_write_error, SqliteStorage};
use crate::error::StorageError;
use crate::types::{Certificate, CertificateId, CertificateProvider, NewCertificate};

const CERTIFICATE_COLUMNS: &str =
    "id, domain, provider, cert_path, key_path, expires_at, created_at";

impl SqliteStorage {
    pub(super) async fn list_certificates_impl(&self) -> Result<Vec<Certificate>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM certificates ORDER BY domain, id",
            CERTIFICATE_COLUMNS
        ))
        .fetch_all(self.pool())
        .await
        .map_err(|e| StorageError::query("list_certificates failed", e))?;

        rows.iter().map(row_to_certificate).collect()
    }

    pub(super) async fn get_certificate_impl(
        &self,
        id: CertificateId,
    ) -> Result<Option<Certificate>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM certificates WHERE id = ?",
            CERTIFICATE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| StorageError::query("get_certificate failed", e))?;

        row.as_ref().map(row_to_certificate).transpose()
    }

    pub(super) async fn get_certificate_by_domain_impl(
        &self,
        domain: &str,
    ) -> Result<Option<Certificate>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM certificates WHERE domain = ?",
            CERTIFICATE_COLUMNS
        ))
        .bind(domain)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| StorageError::query("get_certificate_by_domain failed", e))?;

        row.as_ref().map(row_to_certificate).transpose()
    }

    pub(super) async fn create_certificate_impl(
        &self,
        certificate: NewCertificate,
        cert_path: &Path,
        key_path: &Path,
        expires_at: DateTime<Utc>,
    ) -> Result<Certificate, StorageError> {
        let created_micros = Utc::now().timestamp_micros();
        let expires_micros = expires_at.timestamp_micros();

        let result = sqlx::query(
            r#"
            INSERT INTO certificates (
                domain, provider, cert_path, key_path, expires_at, created_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&certificate.domain)
        .bind(certificate.provider.as_str())
        .bind(path_to_text(cert_path)?)
        .bind(path_to_text(key_path)?)
        .bind(expires_micros)
        .bind(created_micros)
        .execute(self.pool())
        .await
        .map_err(|e| {
            map_write_error(
                e,
                "certificate",
                &certificate.domain,
                "create_certificate failed",
            )
        })?;

        Ok(Certificate {
            id: result.last_insert_rowid(),
            domain: certificate.domain,
            provider: certificate.provider,
            cert_path: cert_path.to_path_buf(),
            key_path: key_path.to_path_buf(),
            expires_at: from_micros("expires_at", expires_micros)?,
            created_at: from_micros("created_at", created_micros)?,
        })
    }

    pub(super) async fn update_certificate_expiry_impl(
        &self,
        id: CertificateId,
        expires_at: DateTime<Utc>,
    ) -> Result<Certificate, StorageError> {
        let result = sqlx::query("UPDATE certificates SET expires_at = ? WHERE id = ?")
            .bind(expires_at.timestamp_micros())
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| StorageError::query("update_certificate_expiry failed", e))?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity_type: "certificate",
                id: id.to_string(),
            });
        }

        self.get_certificate_impl(id)
            .await?
            .ok_or_else(|| StorageError::NotFound {
                entity_type: "certificate",
                id: id.to_string(),
            })
    }

    pub(super) async fn delete_certificate_impl(
        &self,
        id: CertificateId,
    ) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM certificates WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| StorageError::query("delete_certificate failed", e))?;

        Ok(result.rows_affected() > 0)
    }
}

fn path_to_text(path: &Path) -> Result<&str, StorageError> {
    path.to_str().ok_or_else(|| {
        StorageError::InvalidData(format!("path is not valid UTF-8: {}", path.display()))
    })
}

fn row_to_certificate(row: &SqliteRow) -> Result<Certificate, StorageError> {
    let get_err = |e| StorageError::query("failed to read certificate row", e);

    let provider: String = row.try_get("provider").map_err(get_err)?;
    let provider = provider
        .parse::<CertificateProvider>()
        .map_err(StorageError::InvalidData)?;
    let cert_path: String = row.try_get("cert_path").map_err(get_err)?;
    let key_path: String = row.try_get("key_path").map_err(get_err)?;

    Ok(Certificate {
        id: row.try_get("id").map_err(get_err)?,
        domain: row.try_get("domain").map_err(get_err)?,
        provider,
        cert_path: PathBuf::from(cert_path),
        key_path: PathBuf::from(key_path),
        expires_at: from_micros("expires_at", row.try_get("expires_at").map_err(get_err)?)?,
        created_at: from_micros("created_at", row.try_get("created_at").map_err(get_err)?)?,
    })
}
