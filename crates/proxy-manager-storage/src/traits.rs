//! Storage trait definitions
//!
//! The record store is split the same way callers use it:
//! - HostStore: proxy host records
//! - CertificateStore: certificate records
//! - Storage: combined interface with lifecycle management

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::error::StorageError;
use crate::types::{
    Certificate, CertificateId, HostId, NewCertificate, NewProxyHost, ProxyHost, ProxyHostUpdate,
};

/// Proxy host records
#[async_trait]
pub trait HostStore: Send + Sync {
    /// List all hosts, sorted by domain
    async fn list_hosts(&self) -> Result<Vec<ProxyHost>, StorageError>;

    /// Get a host by ID, `None` if it does not exist
    async fn get_host(&self, id: HostId) -> Result<Option<ProxyHost>, StorageError>;

    /// Get a host by its (normalized) domain
    async fn get_host_by_domain(&self, domain: &str) -> Result<Option<ProxyHost>, StorageError>;

    /// Insert a new host
    ///
    /// # Errors
    /// * `StorageError::DuplicateDomain` - another host already uses the domain
    async fn create_host(&self, host: NewProxyHost) -> Result<ProxyHost, StorageError>;

    /// Apply a partial update, returning `None` if the host does not exist
    ///
    /// An empty update returns the current record without touching `updated_at`.
    ///
    /// # Errors
    /// * `StorageError::DuplicateDomain` - the new domain is taken
    async fn update_host(
        &self,
        id: HostId,
        update: ProxyHostUpdate,
    ) -> Result<Option<ProxyHost>, StorageError>;

    /// Delete a host, returning whether a row was removed
    async fn delete_host(&self, id: HostId) -> Result<bool, StorageError>;

    /// Clear every host reference to a certificate
    ///
    /// Returns the IDs of the hosts that were detached.
    async fn detach_certificate(
        &self,
        certificate_id: CertificateId,
    ) -> Result<Vec<HostId>, StorageError>;
}

/// Certificate records
#[async_trait]
pub trait CertificateStore: Send + Sync {
    /// List all certificates, sorted by domain
    async fn list_certificates(&self) -> Result<Vec<Certificate>, StorageError>;

    /// Get a certificate by ID
    async fn get_certificate(&self, id: CertificateId)
        -> Result<Option<Certificate>, StorageError>;

    /// Get the certificate for a (normalized) domain
    async fn get_certificate_by_domain(
        &self,
        domain: &str,
    ) -> Result<Option<Certificate>, StorageError>;

    /// Insert a certificate record pointing at existing key material
    ///
    /// # Errors
    /// * `StorageError::DuplicateDomain` - a certificate for the domain exists
    async fn create_certificate(
        &self,
        certificate: NewCertificate,
        cert_path: &Path,
        key_path: &Path,
        expires_at: DateTime<Utc>,
    ) -> Result<Certificate, StorageError>;

    /// Refresh the stored expiry after a renewal
    ///
    /// # Errors
    /// * `StorageError::NotFound` - the certificate does not exist
    async fn update_certificate_expiry(
        &self,
        id: CertificateId,
        expires_at: DateTime<Utc>,
    ) -> Result<Certificate, StorageError>;

    /// Delete a certificate record, returning whether a row was removed
    async fn delete_certificate(&self, id: CertificateId) -> Result<bool, StorageError>;
}

/// Combined storage interface with lifecycle management
#[async_trait]
pub trait Storage: HostStore + CertificateStore {
    /// Initialize storage (schema setup)
    ///
    /// Must be called before any other operations. Idempotent.
    async fn initialize(&self) -> Result<(), StorageError>;

    /// Check storage health and connectivity
    async fn health_check(&self) -> Result<(), StorageError>;

    /// Close storage connections. Idempotent.
    async fn close(&self) -> Result<(), StorageError>;
}
