//! Live config file with a last-known-good backup
//!
//! `commit` copies the live file to `<config>.bak` before atomically replacing
//! it, so a config the proxy rejects can be rolled back with
//! `restore_backup`.

use crate::server::atomic_write::{write_file_atomic_async, AtomicWriteError, MODE_PUBLIC};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CommitError {
    #[error("failed to read live config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to back up {path}: {source}")]
    Backup {
        path: String,
        #[source]
        source: AtomicWriteError,
    },

    #[error("failed to write config: {0}")]
    Write(#[from] AtomicWriteError),

    #[error("failed to remove {path}: {source}")]
    Remove {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct ConfigFile {
    path: PathBuf,
}

impl ConfigFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// `<config>.bak`, appended rather than replacing the extension
    pub fn backup_path(&self) -> PathBuf {
        let mut name = OsString::from(self.path.as_os_str());
        name.push(".bak");
        PathBuf::from(name)
    }

    /// Current live content, `None` if no config has been written yet
    pub async fn read_live(&self) -> Result<Option<String>, CommitError> {
        read_optional(&self.path).await
    }

    /// Back up the live file, then atomically replace it with `content`
    ///
    /// If there is no live file, any stale backup is removed so a later
    /// rollback removes the new file instead of resurrecting old content.
    pub async fn commit(&self, content: &str) -> Result<(), CommitError> {
        let backup = self.backup_path();

        match self.read_live().await? {
            Some(live) => {
                write_file_atomic_async(backup.clone(), live.into_bytes(), MODE_PUBLIC)
                    .await
                    .map_err(|source| CommitError::Backup {
                        path: backup.display().to_string(),
                        source,
                    })?;
            }
            None => remove_if_exists(&backup).await?,
        }

        write_file_atomic_async(self.path.clone(), content.as_bytes().to_vec(), MODE_PUBLIC)
            .await?;

        tracing::debug!(path = %self.path.display(), bytes = content.len(), "Config committed");
        Ok(())
    }

    /// Put the last-known-good config back in place
    ///
    /// Without a backup the live file is removed, which matches the state
    /// before the first commit.
    pub async fn restore_backup(&self) -> Result<(), CommitError> {
        let backup = self.backup_path();

        match read_optional(&backup).await? {
            Some(previous) => {
                write_file_atomic_async(self.path.clone(), previous.into_bytes(), MODE_PUBLIC)
                    .await?;
                tracing::info!(path = %self.path.display(), "Restored last-known-good config");
            }
            None => {
                remove_if_exists(&self.path).await?;
                tracing::info!(
                    path = %self.path.display(),
                    "No previous config to restore, removed live file"
                );
            }
        }
        Ok(())
    }
}

async fn read_optional(path: &Path) -> Result<Option<String>, CommitError> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(source) => Err(CommitError::Read {
            path: path.display().to_string(),
            source,
        }),
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), CommitError> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(CommitError::Remove {
            path: path.display().to_string(),
            source,
        }),
    }
}
