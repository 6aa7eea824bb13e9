//! Domain types for the record store

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Store-assigned identifier of a proxy host
pub type HostId = i64;

/// Store-assigned identifier of a certificate
pub type CertificateId = i64;

/// A reverse-proxy route: requests for `domain` are forwarded to `target_url`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyHost {
    pub id: HostId,
    /// Unique, lower-cased hostname
    pub domain: String,
    pub target_url: String,
    /// Disabled hosts keep their record but are not served
    pub enabled: bool,
    pub ssl_enabled: bool,
    pub certificate_id: Option<CertificateId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Who issued (and renews) a certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum CertificateProvider {
    #[default]
    #[serde(rename = "letsencrypt")]
    LetsEncrypt,
    #[serde(rename = "self-signed")]
    SelfSigned,
}

impl CertificateProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateProvider::LetsEncrypt => "letsencrypt",
            CertificateProvider::SelfSigned => "self-signed",
        }
    }
}

impl fmt::Display for CertificateProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificateProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "letsencrypt" | "" => Ok(Self::LetsEncrypt),
            "self-signed" | "selfsigned" => Ok(Self::SelfSigned),
            other => Err(format!("Invalid certificate provider: '{}'", other)),
        }
    }
}

/// A TLS certificate whose key material lives on disk
///
/// The files at `cert_path`/`key_path` are owned by the issuing agent; the
/// record only references them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    pub id: CertificateId,
    /// Unique, lower-cased domain the certificate was issued for
    pub domain: String,
    pub provider: CertificateProvider,
    /// Full certificate chain (PEM)
    pub cert_path: PathBuf,
    /// Private key (PEM)
    pub key_path: PathBuf,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl Certificate {
    /// Whether both key and chain files are present on disk
    pub fn artifacts_exist(&self) -> bool {
        self.cert_path.is_file() && self.key_path.is_file()
    }

    /// Whole days until expiry (negative once expired)
    pub fn days_until_expiry(&self, now: DateTime<Utc>) -> i64 {
        (self.expires_at - now).num_days()
    }
}

/// Input for creating a proxy host
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewProxyHost {
    pub domain: String,
    pub target_url: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub ssl_enabled: bool,
    #[serde(default)]
    pub certificate_id: Option<CertificateId>,
}

fn default_enabled() -> bool {
    true
}

impl NewProxyHost {
    /// An enabled, plain-HTTP host
    pub fn new(domain: impl Into<String>, target_url: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            target_url: target_url.into(),
            enabled: true,
            ssl_enabled: false,
            certificate_id: None,
        }
    }
}

/// Partial update of a proxy host
///
/// `None` leaves a field unchanged. For `certificate_id`, `Some(None)` clears
/// the reference.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxyHostUpdate {
    pub domain: Option<String>,
    pub target_url: Option<String>,
    pub enabled: Option<bool>,
    pub ssl_enabled: Option<bool>,
    pub certificate_id: Option<Option<CertificateId>>,
}

impl ProxyHostUpdate {
    pub fn is_empty(&self) -> bool {
        self.domain.is_none()
            && self.target_url.is_none()
            && self.enabled.is_none()
            && self.ssl_enabled.is_none()
            && self.certificate_id.is_none()
    }
}

/// Input for creating a certificate record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewCertificate {
    pub domain: String,
    #[serde(default)]
    pub provider: CertificateProvider,
}
