//! Certificate lifecycle: request, renew and delete
//!
//! All three operations take the per-domain lock first, so for one domain at
//! most one agent invocation is in flight and `request` never issues twice.

use super::authority::{ArtifactPaths, Authorities, CertificateAuthority};
use super::expiry::{estimated_expiry, read_chain_expiry};
use super::locks::DomainLocks;
use chrono::{DateTime, Utc};
use proxy_manager_storage::{
    Certificate, CertificateProvider, HostId, NewCertificate, Storage, StorageError,
};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum CertificateError {
    #[error("{reason}")]
    Issuance {
        domain: String,
        provider: CertificateProvider,
        reason: String,
    },

    #[error("certificate files for {domain} were not created: {path} is missing")]
    ArtifactMissing { domain: String, path: PathBuf },

    #[error("no certificate for {0}")]
    NotFound(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result of a renewal attempt that found the certificate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenewOutcome {
    Renewed(Certificate),
    /// Agent failed; the stored record is untouched
    Unchanged {
        certificate: Certificate,
        reason: String,
    },
}

impl RenewOutcome {
    pub fn certificate(&self) -> &Certificate {
        match self {
            RenewOutcome::Renewed(cert) => cert,
            RenewOutcome::Unchanged { certificate, .. } => certificate,
        }
    }

    pub fn is_renewed(&self) -> bool {
        matches!(self, RenewOutcome::Renewed(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupStatus {
    Removed,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDeletion {
    pub certificate: Certificate,
    /// Hosts whose reference was cleared
    pub detached_hosts: Vec<HostId>,
    pub file_cleanup: CleanupStatus,
}

pub struct CertificateManager {
    storage: Arc<dyn Storage>,
    authorities: Authorities,
    webroot: PathBuf,
    default_email: Option<String>,
    locks: DomainLocks,
}

impl CertificateManager {
    pub fn new(
        storage: Arc<dyn Storage>,
        authorities: Authorities,
        webroot: impl Into<PathBuf>,
        default_email: Option<String>,
    ) -> Self {
        Self {
            storage,
            authorities,
            webroot: webroot.into(),
            default_email,
            locks: DomainLocks::new(),
        }
    }

    /// Return the certificate for `domain`, issuing one if none is stored
    ///
    /// An existing record is returned as-is, whatever its provider.
    pub async fn request(
        &self,
        domain: &str,
        provider: CertificateProvider,
        email: Option<&str>,
    ) -> Result<Certificate, CertificateError> {
        let _guard = self.locks.lock(domain).await;

        if let Some(existing) = self.storage.get_certificate_by_domain(domain).await? {
            debug!(domain, id = existing.id, "Certificate already exists, skipping issuance");
            return Ok(existing);
        }

        let authority = self.authorities.for_provider(provider);
        let email = email.or(self.default_email.as_deref());

        info!(domain, %provider, "Requesting certificate");
        if let Err(e) = authority.issue(domain, &self.webroot, email).await {
            error!(domain, %provider, error = %e, "Certificate issuance failed");
            return Err(CertificateError::Issuance {
                domain: domain.to_string(),
                provider,
                reason: issuance_reason(domain, provider, &e.to_string()),
            });
        }

        let paths = authority.paths(domain);
        ensure_artifacts(domain, &paths).await?;

        let expires_at = resolve_expiry(authority.as_ref(), domain, &paths).await;
        let certificate = self
            .storage
            .create_certificate(
                NewCertificate {
                    domain: domain.to_string(),
                    provider,
                },
                &paths.cert_path,
                &paths.key_path,
                expires_at,
            )
            .await?;

        info!(domain, id = certificate.id, expires_at = %certificate.expires_at, "Certificate issued");
        Ok(certificate)
    }

    /// Renew the certificate for `domain`
    ///
    /// An agent failure is logged and reported as [`RenewOutcome::Unchanged`].
    pub async fn renew(&self, domain: &str) -> Result<RenewOutcome, CertificateError> {
        let _guard = self.locks.lock(domain).await;

        let certificate = self
            .storage
            .get_certificate_by_domain(domain)
            .await?
            .ok_or_else(|| CertificateError::NotFound(domain.to_string()))?;

        let authority = self.authorities.for_provider(certificate.provider);
        if let Err(e) = authority.renew(domain).await {
            warn!(domain, error = %e, "Certificate renewal failed, keeping current certificate");
            return Ok(RenewOutcome::Unchanged {
                certificate,
                reason: e.to_string(),
            });
        }

        let paths = authority.paths(domain);
        let expires_at = resolve_expiry(authority.as_ref(), domain, &paths).await;
        let renewed = self
            .storage
            .update_certificate_expiry(certificate.id, expires_at)
            .await?;

        info!(domain, expires_at = %renewed.expires_at, "Certificate renewed");
        Ok(RenewOutcome::Renewed(renewed))
    }

    /// Detach referencing hosts, remove key material and delete the record
    ///
    /// File cleanup runs even when a store step fails. A failed cleanup alone
    /// does not stop the record from being removed; a store failure is
    /// returned once cleanup has been attempted.
    pub async fn delete(&self, domain: &str) -> Result<CertificateDeletion, CertificateError> {
        let _guard = self.locks.lock(domain).await;

        let certificate = self
            .storage
            .get_certificate_by_domain(domain)
            .await?
            .ok_or_else(|| CertificateError::NotFound(domain.to_string()))?;

        let mut store_error = None;
        let detached_hosts = match self.storage.detach_certificate(certificate.id).await {
            Ok(hosts) => hosts,
            Err(e) => {
                warn!(domain, error = %e, "Failed to detach certificate from hosts");
                store_error = Some(e);
                Vec::new()
            }
        };
        if !detached_hosts.is_empty() {
            info!(domain, hosts = ?detached_hosts, "Detached certificate from hosts");
        }

        let authority = self.authorities.for_provider(certificate.provider);
        let file_cleanup = match authority.revoke(domain).await {
            Ok(()) => CleanupStatus::Removed,
            Err(e) => {
                warn!(domain, error = %e, "Failed to remove certificate files");
                CleanupStatus::Failed(e.to_string())
            }
        };

        match self.storage.delete_certificate(certificate.id).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(domain, id = certificate.id, "Certificate record already removed")
            }
            Err(e) => {
                warn!(domain, error = %e, "Failed to delete certificate record");
                store_error.get_or_insert(e);
            }
        }

        if let Some(e) = store_error {
            error!(
                domain,
                id = certificate.id,
                cleanup = ?file_cleanup,
                "Certificate deletion incomplete"
            );
            return Err(CertificateError::Storage(e));
        }

        info!(domain, id = certificate.id, "Certificate deleted");
        Ok(CertificateDeletion {
            certificate,
            detached_hosts,
            file_cleanup,
        })
    }

    /// Certificates expiring within `days_before_expiry` days
    pub async fn due_for_renewal(
        &self,
        days_before_expiry: i64,
    ) -> Result<Vec<Certificate>, StorageError> {
        let now = Utc::now();
        Ok(self
            .storage
            .list_certificates()
            .await?
            .into_iter()
            .filter(|cert| cert.days_until_expiry(now) <= days_before_expiry)
            .collect())
    }
}

fn issuance_reason(domain: &str, provider: CertificateProvider, cause: &str) -> String {
    match provider {
        CertificateProvider::LetsEncrypt => format!(
            "Failed to obtain SSL certificate for {domain}: {cause}. \
             Make sure DNS for {domain} points to this server and port 80 is reachable."
        ),
        CertificateProvider::SelfSigned => {
            format!("Failed to generate self-signed certificate for {domain}: {cause}")
        }
    }
}

async fn ensure_artifacts(domain: &str, paths: &ArtifactPaths) -> Result<(), CertificateError> {
    for path in [&paths.key_path, &paths.cert_path] {
        let present = tokio::fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !present {
            return Err(CertificateError::ArtifactMissing {
                domain: domain.to_string(),
                path: path.clone(),
            });
        }
    }
    Ok(())
}

/// Agent report, then the chain file, then a 90-day estimate
async fn resolve_expiry(
    authority: &dyn CertificateAuthority,
    domain: &str,
    paths: &ArtifactPaths,
) -> DateTime<Utc> {
    match authority.query_expiry(domain).await {
        Ok(Some(expiry)) => return expiry,
        Ok(None) => debug!(domain, "Agent did not report an expiry"),
        Err(e) => debug!(domain, error = %e, "Agent expiry query failed"),
    }

    match read_chain_expiry(&paths.cert_path).await {
        Ok(expiry) => return expiry,
        Err(e) => debug!(domain, error = %e, "Could not read expiry from chain"),
    }

    let estimate = estimated_expiry(Utc::now());
    warn!(domain, expires_at = %estimate, "Using estimated certificate expiry");
    estimate
}
