//! Certificate authority agents
//!
//! An agent obtains, renews and revokes key material for a domain and leaves
//! it at a fixed location. The manager treats agent failures as opaque: it
//! only ever looks at the error text and the files left on disk.

use super::cert_writer::CertWriteError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use proxy_manager_storage::CertificateProvider;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;

#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("`{command}` exited with code {code}: {stderr}")]
    CommandFailed {
        command: String,
        code: i32,
        stderr: String,
    },

    #[error("`{command}` timed out after {seconds} seconds")]
    Timeout { command: String, seconds: u64 },

    #[error("failed to run `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("key generation failed: {0}")]
    Generation(String),

    #[error("failed to write key material: {0}")]
    Write(#[from] CertWriteError),

    #[error("failed to parse agent output: {0}")]
    Parse(String),
}

/// Where an agent leaves the chain and key for a domain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            cert_path: dir.join("fullchain.pem"),
            key_path: dir.join("privkey.pem"),
        }
    }
}

#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    fn provider(&self) -> CertificateProvider;

    fn paths(&self, domain: &str) -> ArtifactPaths;

    /// Obtain a certificate via HTTP-01, answering from `webroot`
    async fn issue(
        &self,
        domain: &str,
        webroot: &Path,
        email: Option<&str>,
    ) -> Result<(), AuthorityError>;

    /// Exact expiry if the agent can report it
    async fn query_expiry(&self, domain: &str) -> Result<Option<DateTime<Utc>>, AuthorityError>;

    async fn renew(&self, domain: &str) -> Result<(), AuthorityError>;

    /// Revoke and remove the key material for `domain`
    async fn revoke(&self, domain: &str) -> Result<(), AuthorityError>;
}

/// One agent per provider
#[derive(Clone)]
pub struct Authorities {
    letsencrypt: Arc<dyn CertificateAuthority>,
    self_signed: Arc<dyn CertificateAuthority>,
}

impl Authorities {
    pub fn new(
        letsencrypt: Arc<dyn CertificateAuthority>,
        self_signed: Arc<dyn CertificateAuthority>,
    ) -> Self {
        Self {
            letsencrypt,
            self_signed,
        }
    }

    pub fn for_provider(&self, provider: CertificateProvider) -> &Arc<dyn CertificateAuthority> {
        match provider {
            CertificateProvider::LetsEncrypt => &self.letsencrypt,
            CertificateProvider::SelfSigned => &self.self_signed,
        }
    }
}

/// Run `program` with `args` (no shell) and return its stdout
pub(crate) async fn run_command(
    program: &Path,
    args: &[String],
    limit: Duration,
) -> Result<String, AuthorityError> {
    let command = format!("{} {}", program.display(), args.join(" "));
    tracing::debug!(command = %command, "Running certificate agent");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = match tokio::time::timeout(limit, child).await {
        Ok(Ok(output)) => output,
        Ok(Err(source)) => return Err(AuthorityError::Io { command, source }),
        Err(_) => {
            return Err(AuthorityError::Timeout {
                command,
                seconds: limit.as_secs(),
            })
        }
    };

    if !output.status.success() {
        return Err(AuthorityError::CommandFailed {
            command,
            code: output.status.code().unwrap_or(-1),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_paths_in_dir() {
        let paths = ArtifactPaths::in_dir(Path::new("/etc/letsencrypt/live/a.test"));
        assert_eq!(
            paths.cert_path,
            PathBuf::from("/etc/letsencrypt/live/a.test/fullchain.pem")
        );
        assert_eq!(
            paths.key_path,
            PathBuf::from("/etc/letsencrypt/live/a.test/privkey.pem")
        );
    }

    #[tokio::test]
    async fn test_run_command_captures_stdout() {
        let out = run_command(
            Path::new("sh"),
            &["-c".to_string(), "echo hello".to_string()],
            Duration::from_secs(5),
        )
        .await
        .unwrap();
        assert_eq!(out.trim(), "hello");
    }

    #[tokio::test]
    async fn test_run_command_failure() {
        let err = run_command(
            Path::new("sh"),
            &["-c".to_string(), "echo 'rate limited' >&2; exit 1".to_string()],
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

        match err {
            AuthorityError::CommandFailed { code, stderr, .. } => {
                assert_eq!(code, 1);
                assert_eq!(stderr, "rate limited");
            }
            other => panic!("expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_missing_binary() {
        let err = run_command(
            Path::new("/nonexistent/certbot"),
            &[],
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AuthorityError::Io { .. }));
    }
}
