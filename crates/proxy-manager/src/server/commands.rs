//! Command handlers for proxy host and certificate operations
//!
//! Validation happens here, before anything is persisted. Every command that
//! changes state runs one reconciliation before returning and hands back its
//! result next to the command's own value.

use crate::server::certs::{
    CertificateDeletion, CertificateError, CertificateManager, RenewOutcome,
};
use crate::server::proxy::{ReconcileError, ReconcileQueue, ReconcileReport};
use proxy_manager_common::{validate_domain, validate_target_url};
use proxy_manager_storage::{
    Certificate, CertificateId, CertificateProvider, HostId, NewProxyHost, ProxyHost,
    ProxyHostUpdate, Storage, StorageError,
};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("{0}")]
    CertificateIssuance(String),

    #[error("{0}")]
    CertificateArtifactMissing(String),

    #[error("Storage error: {0}")]
    Storage(StorageError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<StorageError> for CommandError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::DuplicateDomain {
                entity_type,
                domain,
            } => CommandError::Conflict(format!("{} '{}' already exists", entity_type, domain)),
            StorageError::NotFound { entity_type, id } => {
                CommandError::NotFound(format!("{} {} not found", entity_type, id))
            }
            other => CommandError::Storage(other),
        }
    }
}

impl From<CertificateError> for CommandError {
    fn from(err: CertificateError) -> Self {
        match err {
            e @ CertificateError::Issuance { .. } => CommandError::CertificateIssuance(e.to_string()),
            e @ CertificateError::ArtifactMissing { .. } => {
                CommandError::CertificateArtifactMissing(e.to_string())
            }
            CertificateError::NotFound(domain) => {
                CommandError::NotFound(format!("certificate for {} not found", domain))
            }
            CertificateError::Storage(e) => e.into(),
        }
    }
}

pub type CommandResult<T> = Result<T, CommandError>;

/// A committed change plus the reconciliation that followed it
///
/// The change stands even when `reconcile` failed.
#[derive(Debug)]
pub struct Mutation<T> {
    pub value: T,
    pub reconcile: Result<ReconcileReport, ReconcileError>,
}

impl<T> Mutation<T> {
    pub fn reconciled(&self) -> bool {
        self.reconcile.is_ok()
    }
}

pub struct CommandHandler {
    storage: Arc<dyn Storage>,
    certificates: Arc<CertificateManager>,
    queue: ReconcileQueue,
}

impl CommandHandler {
    pub fn new(
        storage: Arc<dyn Storage>,
        certificates: Arc<CertificateManager>,
        queue: ReconcileQueue,
    ) -> Self {
        Self {
            storage,
            certificates,
            queue,
        }
    }

    pub fn queue(&self) -> &ReconcileQueue {
        &self.queue
    }

    pub async fn list_hosts(&self) -> CommandResult<Vec<ProxyHost>> {
        Ok(self.storage.list_hosts().await?)
    }

    pub async fn get_host(&self, id: HostId) -> CommandResult<ProxyHost> {
        self.storage
            .get_host(id)
            .await?
            .ok_or_else(|| CommandError::NotFound(format!("proxy host {} not found", id)))
    }

    pub async fn create_host(&self, new: NewProxyHost) -> CommandResult<Mutation<ProxyHost>> {
        let domain = validate_domain(&new.domain).map_err(validation)?;
        let target_url = validate_target_url(&new.target_url).map_err(validation)?;
        if let Some(cert_id) = new.certificate_id {
            self.ensure_certificate(cert_id).await?;
        }

        let host = self
            .storage
            .create_host(NewProxyHost {
                domain,
                target_url,
                ..new
            })
            .await?;

        info!(id = host.id, domain = %host.domain, target = %host.target_url, "Proxy host created");
        Ok(self.with_reconcile(host).await)
    }

    pub async fn update_host(
        &self,
        id: HostId,
        update: ProxyHostUpdate,
    ) -> CommandResult<Mutation<ProxyHost>> {
        let domain = update
            .domain
            .as_deref()
            .map(validate_domain)
            .transpose()
            .map_err(validation)?;
        let target_url = update
            .target_url
            .as_deref()
            .map(validate_target_url)
            .transpose()
            .map_err(validation)?;
        if let Some(Some(cert_id)) = update.certificate_id {
            self.ensure_certificate(cert_id).await?;
        }

        let host = self
            .storage
            .update_host(
                id,
                ProxyHostUpdate {
                    domain,
                    target_url,
                    ..update
                },
            )
            .await?
            .ok_or_else(|| CommandError::NotFound(format!("proxy host {} not found", id)))?;

        info!(id = host.id, domain = %host.domain, "Proxy host updated");
        Ok(self.with_reconcile(host).await)
    }

    /// Returns the removed host
    pub async fn delete_host(&self, id: HostId) -> CommandResult<Mutation<ProxyHost>> {
        let host = self.get_host(id).await?;

        if !self.storage.delete_host(id).await? {
            return Err(CommandError::NotFound(format!("proxy host {} not found", id)));
        }

        info!(id, domain = %host.domain, "Proxy host deleted");
        Ok(self.with_reconcile(host).await)
    }

    /// Rewrite and reload the proxy config even if nothing changed
    pub async fn reload(&self) -> Result<ReconcileReport, ReconcileError> {
        self.queue.force_reconcile().await
    }

    pub async fn list_certificates(&self) -> CommandResult<Vec<Certificate>> {
        Ok(self.storage.list_certificates().await?)
    }

    pub async fn get_certificate(&self, id: CertificateId) -> CommandResult<Certificate> {
        self.storage
            .get_certificate(id)
            .await?
            .ok_or_else(|| CommandError::NotFound(format!("certificate {} not found", id)))
    }

    /// Issue a certificate, or return the existing one for `domain`
    pub async fn request_certificate(
        &self,
        domain: &str,
        provider: CertificateProvider,
        email: Option<&str>,
    ) -> CommandResult<Mutation<Certificate>> {
        let domain = validate_domain(domain).map_err(validation)?;
        let certificate = self.certificates.request(&domain, provider, email).await?;
        Ok(self.with_reconcile(certificate).await)
    }

    pub async fn renew_certificate(&self, domain: &str) -> CommandResult<Mutation<RenewOutcome>> {
        let domain = validate_domain(domain).map_err(validation)?;
        let outcome = self.certificates.renew(&domain).await?;

        // Renewed files keep their paths, so only a forced reload picks them up
        let reconcile = if outcome.is_renewed() {
            self.queue.force_reconcile().await
        } else {
            self.queue.reconcile().await
        };
        Ok(Mutation {
            value: outcome,
            reconcile,
        })
    }

    /// Detach hosts, remove key material and delete the record
    pub async fn delete_certificate(
        &self,
        domain: &str,
    ) -> CommandResult<Mutation<CertificateDeletion>> {
        let domain = validate_domain(domain).map_err(validation)?;
        let deletion = match self.certificates.delete(&domain).await {
            Ok(deletion) => deletion,
            Err(e @ CertificateError::Storage(_)) => {
                // Key material may already be gone, so the proxy must drop it
                if let Err(reconcile) = self.queue.reconcile().await {
                    warn!(
                        domain = %domain,
                        error = %reconcile,
                        "Reconcile after partial delete failed"
                    );
                }
                return Err(e.into());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(self.with_reconcile(deletion).await)
    }

    async fn ensure_certificate(&self, id: CertificateId) -> CommandResult<()> {
        match self.storage.get_certificate(id).await? {
            Some(_) => Ok(()),
            None => Err(CommandError::Validation(format!(
                "certificate {} does not exist",
                id
            ))),
        }
    }

    async fn with_reconcile<T>(&self, value: T) -> Mutation<T> {
        Mutation {
            value,
            reconcile: self.queue.reconcile().await,
        }
    }
}

fn validation(err: proxy_manager_common::ValidationError) -> CommandError {
    CommandError::Validation(err.to_string())
}
