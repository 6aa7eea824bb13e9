//! Crash-safe file replacement
//!
//! 1. Write to a sibling temp file (`<target>` with a `.tmp` extension)
//! 2. fsync
//! 3. Rename over the target (atomic on POSIX)
//!
//! A reader of `target` sees either the old or the new content, never a mix.

use std::io::Write;
use std::path::Path;
use thiserror::Error;

/// Permission bits for world-readable output (config, certificate chains)
pub const MODE_PUBLIC: u32 = 0o644;

/// Permission bits for private keys
pub const MODE_PRIVATE: u32 = 0o600;

#[derive(Debug, Error)]
pub enum AtomicWriteError {
    #[error("failed to create temp file for {target}: {source}")]
    TempFile {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {target}: {source}")]
    Write {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to sync {target}: {source}")]
    Sync {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to set permissions on {target}: {source}")]
    Permissions {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to rename {from} to {to}: {source}")]
    Rename {
        from: String,
        to: String,
        #[source]
        source: std::io::Error,
    },
}

/// Atomically replace `target` with `content`
///
/// Permissions are applied to the temp file before the rename so the target
/// never exists with looser bits than `mode`. On failure the temp file is
/// removed and `target` is untouched.
pub fn write_file_atomic(target: &Path, content: &[u8], mode: u32) -> Result<(), AtomicWriteError> {
    let temp_path = target.with_extension("tmp");

    let result = write_temp_and_rename(target, &temp_path, content, mode);
    if result.is_err() {
        let _ = std::fs::remove_file(&temp_path);
    }
    result
}

fn write_temp_and_rename(
    target: &Path,
    temp_path: &Path,
    content: &[u8],
    mode: u32,
) -> Result<(), AtomicWriteError> {
    let target_str = target.display().to_string();

    let mut file = std::fs::File::create(temp_path).map_err(|e| AtomicWriteError::TempFile {
        target: target_str.clone(),
        source: e,
    })?;

    file.write_all(content).map_err(|e| AtomicWriteError::Write {
        target: target_str.clone(),
        source: e,
    })?;

    file.sync_all().map_err(|e| AtomicWriteError::Sync {
        target: target_str.clone(),
        source: e,
    })?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(temp_path, std::fs::Permissions::from_mode(mode)).map_err(
            |e| AtomicWriteError::Permissions {
                target: target_str.clone(),
                source: e,
            },
        )?;
    }
    #[cfg(not(unix))]
    let _ = mode;

    std::fs::rename(temp_path, target).map_err(|e| AtomicWriteError::Rename {
        from: temp_path.display().to_string(),
        to: target_str,
        source: e,
    })?;

    Ok(())
}

/// Async wrapper running [`write_file_atomic`] on the blocking pool
pub async fn write_file_atomic_async(
    target: std::path::PathBuf,
    content: Vec<u8>,
    mode: u32,
) -> Result<(), AtomicWriteError> {
    let target_str = target.display().to_string();
    tokio::task::spawn_blocking(move || write_file_atomic(&target, &content, mode))
        .await
        .map_err(|e| AtomicWriteError::Write {
            target: target_str,
            source: std::io::Error::other(e.to_string()),
        })?
}
