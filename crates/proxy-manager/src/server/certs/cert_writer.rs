//! Writing locally generated key material to disk
//!
//! The private key is written first with 0600 permissions, then the chain
//! with 0644. Both go through [`write_file_atomic`], so a crash leaves either
//! the old or the new file in place.

use crate::server::atomic_write::{write_file_atomic, AtomicWriteError, MODE_PRIVATE, MODE_PUBLIC};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum CertWriteError {
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Write(#[from] AtomicWriteError),

    #[error("certificate writer task failed: {0}")]
    Task(String),
}

pub fn write_certificate(
    cert_pem: &str,
    key_pem: &str,
    cert_path: &Path,
    key_path: &Path,
) -> Result<(), CertWriteError> {
    for parent in [cert_path.parent(), key_path.parent()].into_iter().flatten() {
        std::fs::create_dir_all(parent).map_err(|e| CertWriteError::CreateDir {
            path: parent.display().to_string(),
            source: e,
        })?;
    }

    write_file_atomic(key_path, key_pem.as_bytes(), MODE_PRIVATE)?;
    debug!(path = %key_path.display(), "Wrote private key");

    write_file_atomic(cert_path, cert_pem.as_bytes(), MODE_PUBLIC)?;
    debug!(path = %cert_path.display(), "Wrote certificate");

    Ok(())
}

/// Async wrapper running [`write_certificate`] on the blocking pool
pub async fn write_certificate_async(
    cert_pem: String,
    key_pem: String,
    cert_path: PathBuf,
    key_path: PathBuf,
) -> Result<(), CertWriteError> {
    tokio::task::spawn_blocking(move || {
        write_certificate(&cert_pem, &key_pem, &cert_path, &key_path)
    })
    .await
    .map_err(|e| CertWriteError::Task(e.to_string()))?
}
