//! Locally generated self-signed certificates

use super::authority::{ArtifactPaths, AuthorityError, CertificateAuthority};
use super::cert_writer::write_certificate;
use super::expiry::read_chain_expiry;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use proxy_manager_storage::CertificateProvider;
use rcgen::{CertificateParams, DistinguishedName, DnType, KeyPair};
use std::path::{Path, PathBuf};
use tracing::info;

const VALIDITY_DAYS: i64 = 90;

/// Generates certificates with `rcgen` under `<base_dir>/<domain>/`
#[derive(Debug, Clone)]
pub struct SelfSignedAuthority {
    base_dir: PathBuf,
}

impl SelfSignedAuthority {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn domain_dir(&self, domain: &str) -> PathBuf {
        self.base_dir.join(domain)
    }

    async fn generate(&self, domain: &str) -> Result<(), AuthorityError> {
        let paths = self.paths(domain);
        let domain = domain.to_string();

        tokio::task::spawn_blocking(move || -> Result<(), AuthorityError> {
            let (cert_pem, key_pem) = generate_pem(&domain)?;
            write_certificate(&cert_pem, &key_pem, &paths.cert_path, &paths.key_path)?;
            info!(domain = %domain, "Generated self-signed certificate");
            Ok(())
        })
        .await
        .map_err(|e| AuthorityError::Generation(e.to_string()))?
    }
}

/// PEM chain and key for a certificate valid `VALIDITY_DAYS` from now
fn generate_pem(domain: &str) -> Result<(String, String), AuthorityError> {
    let key = KeyPair::generate().map_err(|e| AuthorityError::Generation(e.to_string()))?;

    let mut params = CertificateParams::new(vec![domain.to_string()])
        .map_err(|e| AuthorityError::Generation(e.to_string()))?;
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, domain);
    params.distinguished_name = name;

    let now = time::OffsetDateTime::now_utc();
    params.not_before = now - time::Duration::minutes(5);
    params.not_after = now + time::Duration::days(VALIDITY_DAYS);

    let cert = params
        .self_signed(&key)
        .map_err(|e| AuthorityError::Generation(e.to_string()))?;

    Ok((cert.pem(), key.serialize_pem()))
}

#[async_trait]
impl CertificateAuthority for SelfSignedAuthority {
    fn provider(&self) -> CertificateProvider {
        CertificateProvider::SelfSigned
    }

    fn paths(&self, domain: &str) -> ArtifactPaths {
        ArtifactPaths::in_dir(&self.domain_dir(domain))
    }

    async fn issue(
        &self,
        domain: &str,
        _webroot: &Path,
        _email: Option<&str>,
    ) -> Result<(), AuthorityError> {
        self.generate(domain).await
    }

    async fn query_expiry(&self, domain: &str) -> Result<Option<DateTime<Utc>>, AuthorityError> {
        read_chain_expiry(&self.paths(domain).cert_path)
            .await
            .map(Some)
            .map_err(AuthorityError::Parse)
    }

    async fn renew(&self, domain: &str) -> Result<(), AuthorityError> {
        self.generate(domain).await
    }

    async fn revoke(&self, domain: &str) -> Result<(), AuthorityError> {
        let dir = self.domain_dir(domain);
        match tokio::fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(AuthorityError::Io {
                command: format!("remove {}", dir.display()),
                source,
            }),
        }
    }
}
