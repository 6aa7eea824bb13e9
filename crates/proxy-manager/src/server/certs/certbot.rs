//! Let's Encrypt via the `certbot` CLI
//!
//! Arguments are passed as argv, never through a shell, so a domain can't
//! inject extra flags or commands.

use super::authority::{run_command, ArtifactPaths, AuthorityError, CertificateAuthority};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use proxy_manager_storage::CertificateProvider;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

// e.g. "Expiry Date: 2025-03-01 12:00:00+00:00 (VALID: 89 days)"
static EXPIRY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Expiry Date:\s*(\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}[+-]\d{2}:\d{2})").unwrap()
});

#[derive(Debug, Clone)]
pub struct Certbot {
    binary: PathBuf,
    config_dir: PathBuf,
    staging: bool,
    timeout: Duration,
}

impl Certbot {
    pub fn new(
        binary: impl Into<PathBuf>,
        config_dir: impl Into<PathBuf>,
        staging: bool,
        timeout: Duration,
    ) -> Self {
        Self {
            binary: binary.into(),
            config_dir: config_dir.into(),
            staging,
            timeout,
        }
    }

    fn issue_args(&self, domain: &str, webroot: &Path, email: Option<&str>) -> Vec<String> {
        let mut args = vec![
            "certonly".to_string(),
            "--webroot".to_string(),
            "-w".to_string(),
            webroot.display().to_string(),
            "-d".to_string(),
            domain.to_string(),
        ];
        match email {
            Some(email) => {
                args.push("--email".to_string());
                args.push(email.to_string());
            }
            None => args.push("--register-unsafely-without-email".to_string()),
        }
        args.push("--agree-tos".to_string());
        args.push("--non-interactive".to_string());
        if self.staging {
            args.push("--staging".to_string());
        }
        self.push_config_dir(&mut args);
        args
    }

    fn cert_name_args(&self, subcommand: &str, domain: &str, non_interactive: bool) -> Vec<String> {
        let mut args = vec![
            subcommand.to_string(),
            "--cert-name".to_string(),
            domain.to_string(),
        ];
        if non_interactive {
            args.push("--non-interactive".to_string());
        }
        self.push_config_dir(&mut args);
        args
    }

    fn push_config_dir(&self, args: &mut Vec<String>) {
        args.push("--config-dir".to_string());
        args.push(self.config_dir.display().to_string());
    }
}

/// Expiry from `certbot certificates` output, if listed
pub fn parse_expiry(output: &str) -> Option<DateTime<Utc>> {
    let captures = EXPIRY_REGEX.captures(output)?;
    DateTime::parse_from_str(&captures[1], "%Y-%m-%d %H:%M:%S%:z")
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

#[async_trait]
impl CertificateAuthority for Certbot {
    fn provider(&self) -> CertificateProvider {
        CertificateProvider::LetsEncrypt
    }

    fn paths(&self, domain: &str) -> ArtifactPaths {
        ArtifactPaths::in_dir(&self.config_dir.join("live").join(domain))
    }

    async fn issue(
        &self,
        domain: &str,
        webroot: &Path,
        email: Option<&str>,
    ) -> Result<(), AuthorityError> {
        let args = self.issue_args(domain, webroot, email);
        run_command(&self.binary, &args, self.timeout).await?;
        Ok(())
    }

    async fn query_expiry(&self, domain: &str) -> Result<Option<DateTime<Utc>>, AuthorityError> {
        let args = self.cert_name_args("certificates", domain, false);
        let output = run_command(&self.binary, &args, self.timeout).await?;
        Ok(parse_expiry(&output))
    }

    async fn renew(&self, domain: &str) -> Result<(), AuthorityError> {
        let args = self.cert_name_args("renew", domain, true);
        run_command(&self.binary, &args, self.timeout).await?;
        Ok(())
    }

    async fn revoke(&self, domain: &str) -> Result<(), AuthorityError> {
        let args = self.cert_name_args("delete", domain, true);
        run_command(&self.binary, &args, self.timeout).await?;
        Ok(())
    }
}
