//! Proxy host records for SQLite

use chrono::Utc;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;

use super::{from_micros, map_write_error, SqliteStorage};
use crate::error::StorageError;
use crate::types::{CertificateId, HostId, NewProxyHost, ProxyHost, ProxyHostUpdate};

const HOST_COLUMNS: &str = "id, domain, target_url, enabled, ssl_enabled, certificate_id, \
                            created_at, updated_at";

impl SqliteStorage {
    pub(super) async fn list_hosts_impl(&self) -> Result<Vec<ProxyHost>, StorageError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM proxy_hosts ORDER BY domain, id",
            HOST_COLUMNS
        ))
        .fetch_all(self.pool())
        .await
        .map_err(|e| StorageError::query("list_hosts failed", e))?;

        rows.iter().map(row_to_host).collect()
    }

    pub(super) async fn get_host_impl(&self, id: HostId) -> Result<Option<ProxyHost>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM proxy_hosts WHERE id = ?",
            HOST_COLUMNS
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| StorageError::query("get_host failed", e))?;

        row.as_ref().map(row_to_host).transpose()
    }

    pub(super) async fn get_host_by_domain_impl(
        &self,
        domain: &str,
    ) -> Result<Option<ProxyHost>, StorageError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM proxy_hosts WHERE domain = ?",
            HOST_COLUMNS
        ))
        .bind(domain)
        .fetch_optional(self.pool())
        .await
        .map_err(|e| StorageError::query("get_host_by_domain failed", e))?;

        row.as_ref().map(row_to_host).transpose()
    }

    pub(super) async fn create_host_impl(
        &self,
        host: NewProxyHost,
    ) -> Result<ProxyHost, StorageError> {
        let now = Utc::now();
        let now_micros = now.timestamp_micros();

        let result = sqlx::query(
            r#"
            INSERT INTO proxy_hosts (
                domain, target_url, enabled, ssl_enabled, certificate_id,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&host.domain)
        .bind(&host.target_url)
        .bind(host.enabled)
        .bind(host.ssl_enabled)
        .bind(host.certificate_id)
        .bind(now_micros)
        .bind(now_micros)
        .execute(self.pool())
        .await
        .map_err(|e| map_write_error(e, "proxy host", &host.domain, "create_host failed"))?;

        // Round-trip through the stored precision
        let stamp = from_micros("created_at", now_micros)?;

        Ok(ProxyHost {
            id: result.last_insert_rowid(),
            domain: host.domain,
            target_url: host.target_url,
            enabled: host.enabled,
            ssl_enabled: host.ssl_enabled,
            certificate_id: host.certificate_id,
            created_at: stamp,
            updated_at: stamp,
        })
    }

    pub(super) async fn update_host_impl(
        &self,
        id: HostId,
        update: ProxyHostUpdate,
    ) -> Result<Option<ProxyHost>, StorageError> {
        let Some(current) = self.get_host_impl(id).await? else {
            return Ok(None);
        };

        if update.is_empty() {
            return Ok(Some(current));
        }

        let updated_at = from_micros("updated_at", Utc::now().timestamp_micros())?;
        let merged = ProxyHost {
            id,
            domain: update.domain.unwrap_or(current.domain),
            target_url: update.target_url.unwrap_or(current.target_url),
            enabled: update.enabled.unwrap_or(current.enabled),
            ssl_enabled: update.ssl_enabled.unwrap_or(current.ssl_enabled),
            certificate_id: update.certificate_id.unwrap_or(current.certificate_id),
            created_at: current.created_at,
            updated_at,
        };

        let result = sqlx::query(
            r#"
            UPDATE proxy_hosts
            SET domain = ?, target_url = ?, enabled = ?, ssl_enabled = ?,
                certificate_id = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&merged.domain)
        .bind(&merged.target_url)
        .bind(merged.enabled)
        .bind(merged.ssl_enabled)
        .bind(merged.certificate_id)
        .bind(updated_at.timestamp_micros())
        .bind(id)
        .execute(self.pool())
        .await
        .map_err(|e| map_write_error(e, "proxy host", &merged.domain, "update_host failed"))?;

        // Deleted between the read and the write
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        Ok(Some(merged))
    }

    pub(super) async fn delete_host_impl(&self, id: HostId) -> Result<bool, StorageError> {
        let result = sqlx::query("DELETE FROM proxy_hosts WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(|e| StorageError::query("delete_host failed", e))?;

        Ok(result.rows_affected() > 0)
    }

    pub(super) async fn detach_certificate_impl(
        &self,
        certificate_id: CertificateId,
    ) -> Result<Vec<HostId>, StorageError> {
        let mut tx = self
            .pool()
            .begin()
            .await
            .map_err(|e| StorageError::query("failed to begin transaction", e))?;

        let ids: Vec<HostId> =
            sqlx::query_scalar("SELECT id FROM proxy_hosts WHERE certificate_id = ? ORDER BY id")
                .bind(certificate_id)
                .fetch_all(&mut *tx)
                .await
                .map_err(|e| StorageError::query("detach_certificate lookup failed", e))?;

        if !ids.is_empty() {
            sqlx::query(
                "UPDATE proxy_hosts SET certificate_id = NULL, updated_at = ? WHERE certificate_id = ?",
            )
            .bind(Utc::now().timestamp_micros())
            .bind(certificate_id)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::query("detach_certificate update failed", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| StorageError::query("failed to commit detach_certificate", e))?;

        Ok(ids)
    }
}

fn row_to_host(row: &SqliteRow) -> Result<ProxyHost, StorageError> {
    let get_err = |e| StorageError::query("failed to read proxy host row", e);

    Ok(ProxyHost {
        id: row.try_get("id").map_err(get_err)?,
        domain: row.try_get("domain").map_err(get_err)?,
        target_url: row.try_get("target_url").map_err(get_err)?,
        enabled: row.try_get("enabled").map_err(get_err)?,
        ssl_enabled: row.try_get("ssl_enabled").map_err(get_err)?,
        certificate_id: row.try_get("certificate_id").map_err(get_err)?,
        created_at: from_micros("created_at", row.try_get("created_at").map_err(get_err)?)?,
        updated_at: from_micros("updated_at", row.try_get("updated_at").map_err(get_err)?)?,
    })
}
