use proxy_manager_storage::StorageConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::warn;

pub const DEFAULT_CONFIG_PATH: &str = "/etc/proxy-manager/config.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("{0} is required but not provided")]
    MissingField(&'static str),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Config file security: {0}")]
    InsecureConfig(String),

    #[error("Storage configuration error: {0}")]
    StorageConfig(#[from] proxy_manager_storage::ConfigError),
}

/// Record store location
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// e.g. `sqlite:///var/lib/proxy-manager/proxy-manager.db` or `sqlite://:memory:`
    #[serde(default = "default_database_url")]
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

fn default_database_url() -> String {
    "sqlite:///var/lib/proxy-manager/proxy-manager.db".to_string()
}

/// Generated nginx config and how to make nginx load it
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct ProxyConfig {
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    #[serde(default = "default_reload_command")]
    pub reload_command: String,

    /// Run before the reload; a non-zero exit aborts it
    #[serde(default = "default_validate_command")]
    pub validate_command: Option<String>,

    #[serde(default = "default_reload_timeout_secs")]
    pub reload_timeout_secs: u64,

    /// Restore `<config_path>.bak` when nginx rejects a new config
    #[serde(default = "default_true")]
    pub rollback_on_reload_failure: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            reload_command: default_reload_command(),
            validate_command: default_validate_command(),
            reload_timeout_secs: default_reload_timeout_secs(),
            rollback_on_reload_failure: true,
        }
    }
}

fn default_config_path() -> PathBuf {
    PathBuf::from("/etc/nginx/conf.d/proxy-manager.conf")
}

fn default_reload_command() -> String {
    "nginx -s reload".to_string()
}

fn default_validate_command() -> Option<String> {
    Some("nginx -t".to_string())
}

fn default_reload_timeout_secs() -> u64 {
    30
}

fn default_true() -> bool {
    true
}

/// Certificate agents
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct AcmeConfig {
    /// Served at `/.well-known/acme-challenge/` for HTTP-01
    #[serde(default = "default_webroot")]
    pub webroot: PathBuf,

    #[serde(default = "default_certbot_path")]
    pub certbot_path: PathBuf,

    /// certbot `--config-dir`; chains land in `<config_dir>/live/<domain>/`
    #[serde(default = "default_certbot_config_dir")]
    pub config_dir: PathBuf,

    /// Account email; without one certbot registers without an address
    #[serde(default)]
    pub email: Option<String>,

    /// Use the Let's Encrypt staging environment
    #[serde(default)]
    pub staging: bool,

    #[serde(default = "default_acme_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_self_signed_dir")]
    pub self_signed_dir: PathBuf,
}

impl Default for AcmeConfig {
    fn default() -> Self {
        Self {
            webroot: default_webroot(),
            certbot_path: default_certbot_path(),
            config_dir: default_certbot_config_dir(),
            email: None,
            staging: false,
            timeout_secs: default_acme_timeout_secs(),
            self_signed_dir: default_self_signed_dir(),
        }
    }
}

fn default_webroot() -> PathBuf {
    PathBuf::from("/var/www/certbot")
}

fn default_certbot_path() -> PathBuf {
    PathBuf::from("certbot")
}

fn default_certbot_config_dir() -> PathBuf {
    PathBuf::from("/etc/letsencrypt")
}

fn default_acme_timeout_secs() -> u64 {
    300
}

fn default_self_signed_dir() -> PathBuf {
    PathBuf::from("/etc/proxy-manager/self-signed")
}

/// Background renewal
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct RenewalConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Renew certificates expiring within this many days
    #[serde(default = "default_days_before_expiry")]
    pub days_before_expiry: i64,

    /// Random delay added to each 24h check interval
    #[serde(default = "default_jitter_minutes")]
    pub jitter_minutes: u64,
}

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            days_before_expiry: default_days_before_expiry(),
            jitter_minutes: default_jitter_minutes(),
        }
    }
}

fn default_days_before_expiry() -> i64 {
    30
}

fn default_jitter_minutes() -> u64 {
    60
}

/// Commands run after each reconciliation that rewrote or failed to
/// rewrite the nginx config
///
/// # Security Warning
///
/// Hook commands run through `sh -c` with the privileges of the
/// proxy-manager process, and so do `proxy.reload_command` and
/// `proxy.validate_command`. The config file must not be writable by
/// unprivileged users: `Config::from_file` refuses a world-writable file.
///
/// Context is passed through the environment, never interpolated:
///
/// - `PROXY_MANAGER_EVENT`: "success" or "failure"
/// - `PROXY_MANAGER_HOST_COUNT`: number of enabled hosts
/// - `PROXY_MANAGER_ERROR`: error message (failure hooks only)
///
/// ```toml
/// [hooks]
/// on_success = ["logger -t proxy-manager reloaded"]
/// on_failure = ["/usr/local/bin/alert-failure"]
/// ```
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
pub struct HooksConfig {
    #[serde(default)]
    pub on_success: Vec<String>,

    #[serde(default)]
    pub on_failure: Vec<String>,

    #[serde(default = "default_hook_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HooksConfig {
    fn default() -> Self {
        Self {
            on_success: Vec::new(),
            on_failure: Vec::new(),
            timeout_secs: default_hook_timeout_secs(),
        }
    }
}

fn default_hook_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq, Eq)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub proxy: ProxyConfig,

    #[serde(default)]
    pub acme: AcmeConfig,

    #[serde(default)]
    pub renewal: RenewalConfig,

    #[serde(default)]
    pub hooks: HooksConfig,
}

impl Config {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        // The file carries shell commands run with our privileges
        Self::check_config_permissions(path)?;

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.proxy.config_path.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("proxy.config_path"));
        }

        if self.proxy.reload_command.trim().is_empty() {
            return Err(ConfigError::MissingField("proxy.reload_command"));
        }

        if self.acme.webroot.as_os_str().is_empty() {
            return Err(ConfigError::MissingField("acme.webroot"));
        }

        if self.renewal.days_before_expiry <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "renewal.days_before_expiry",
                reason: format!("must be positive, got {}", self.renewal.days_before_expiry),
            });
        }

        for (field, secs) in [
            ("proxy.reload_timeout_secs", self.proxy.reload_timeout_secs),
            ("acme.timeout_secs", self.acme.timeout_secs),
            ("hooks.timeout_secs", self.hooks.timeout_secs),
        ] {
            if secs == 0 {
                return Err(ConfigError::InvalidValue {
                    field,
                    reason: "timeout must be at least 1 second".to_string(),
                });
            }
        }

        Ok(())
    }

    pub fn storage_config(&self) -> Result<StorageConfig, ConfigError> {
        Ok(StorageConfig::from_url(&self.database.url)?)
    }

    pub fn reload_timeout(&self) -> Duration {
        Duration::from_secs(self.proxy.reload_timeout_secs)
    }

    pub fn acme_timeout(&self) -> Duration {
        Duration::from_secs(self.acme.timeout_secs)
    }

    /// Check config file permissions for security
    ///
    /// A world-writable file is rejected; group-writable only warns.
    #[cfg(unix)]
    fn check_config_permissions(path: &Path) -> Result<(), ConfigError> {
        use std::os::unix::fs::PermissionsExt;

        let metadata = match std::fs::metadata(path) {
            Ok(m) => m,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ConfigError::ReadError(e));
            }
            Err(_) => {
                warn!(
                    path = %path.display(),
                    "Unable to check config file permissions - ensure file is not world-writable"
                );
                return Ok(());
            }
        };

        let mode = metadata.permissions().mode();

        if mode & 0o002 != 0 {
            return Err(ConfigError::InsecureConfig(format!(
                "Config file '{}' is world-writable (mode {:o}). \
                 It contains shell commands run by proxy-manager. \
                 Fix with: chmod o-w {}",
                path.display(),
                mode,
                path.display()
            )));
        }

        if mode & 0o020 != 0 {
            warn!(
                path = %path.display(),
                mode = format!("{:o}", mode),
                "Config file is group-writable - consider restricting with: chmod g-w {}",
                path.display()
            );
        }

        Ok(())
    }

    #[cfg(not(unix))]
    fn check_config_permissions(_path: &Path) -> Result<(), ConfigError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(content: &str) -> tempfile::NamedTempFile {
        let mut temp_file = tempfile::NamedTempFile::new().unwrap();
        temp_file.write_all(content.as_bytes()).unwrap();
        temp_file.flush().unwrap();
        temp_file
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: Config = toml::from_str("").unwrap();

        assert_eq!(config, Config::default());
        assert_eq!(
            config.proxy.config_path,
            PathBuf::from("/etc/nginx/conf.d/proxy-manager.conf")
        );
        assert_eq!(config.proxy.validate_command.as_deref(), Some("nginx -t"));
        assert!(config.proxy.rollback_on_reload_failure);
        assert_eq!(config.acme.webroot, PathBuf::from("/var/www/certbot"));
        assert_eq!(config.renewal.days_before_expiry, 30);
        assert_eq!(config.hooks.timeout_secs, 30);
        config.validate().unwrap();
    }

    #[test]
    fn test_config_parse_full() {
        let toml_str = r#"
            [database]
            url = "sqlite://:memory:"

            [proxy]
            config_path = "/tmp/proxy.conf"
            reload_command = "systemctl reload nginx"
            reload_timeout_secs = 10
            rollback_on_reload_failure = false

            [acme]
            webroot = "/srv/acme"
            email = "ops@example.test"
            staging = true

            [renewal]
            enabled = false
            days_before_expiry = 14
            jitter_minutes = 0

            [hooks]
            on_success = ["echo ok"]
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.proxy.reload_command, "systemctl reload nginx");
        assert_eq!(config.reload_timeout(), Duration::from_secs(10));
        assert!(!config.proxy.rollback_on_reload_failure);
        assert_eq!(config.acme.email.as_deref(), Some("ops@example.test"));
        assert!(config.acme.staging);
        assert_eq!(config.acme.config_dir, PathBuf::from("/etc/letsencrypt"));
        assert!(!config.renewal.enabled);
        assert_eq!(config.renewal.days_before_expiry, 14);
        assert_eq!(config.hooks.on_success, vec!["echo ok".to_string()]);

        let storage = config.storage_config().unwrap();
        assert_eq!(storage.connection_string, ":memory:");
    }

    #[test]
    fn test_config_missing_reload_command() {
        let temp_file = write_config(
            r#"
[proxy]
reload_command = "  "
"#,
        );

        let result = Config::from_file(temp_file.path());
        match result {
            Err(ConfigError::MissingField("proxy.reload_command")) => {}
            _ => panic!("Expected MissingField(proxy.reload_command), got {:?}", result),
        }
    }

    #[test]
    fn test_config_rejects_zero_renewal_window() {
        let temp_file = write_config(
            r#"
[renewal]
days_before_expiry = 0
"#,
        );

        let result = Config::from_file(temp_file.path());
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue {
                field: "renewal.days_before_expiry",
                ..
            })
        ));
    }

    #[test]
    fn test_config_rejects_zero_timeout() {
        let mut config = Config::default();
        config.acme.timeout_secs = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue {
                field: "acme.timeout_secs",
                ..
            })
        ));
    }

    #[test]
    fn test_config_unsupported_database_scheme() {
        let mut config = Config::default();
        config.database.url = "postgres://localhost/proxy".to_string();
        assert!(matches!(
            config.storage_config(),
            Err(ConfigError::StorageConfig(_))
        ));
    }

    #[test]
    fn test_config_missing_file() {
        let result = Config::from_file(Path::new("/nonexistent/proxy-manager.toml"));
        assert!(matches!(result, Err(ConfigError::ReadError(_))));
    }

    #[test]
    #[cfg(unix)]
    fn test_config_world_writable_rejected() {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        let temp_file = write_config("[proxy]\nreload_command = \"nginx -s reload\"\n");
        let path = temp_file.path();
        fs::set_permissions(path, fs::Permissions::from_mode(0o666)).unwrap();

        let result = Config::from_file(path);
        match result {
            Err(ConfigError::InsecureConfig(msg)) => {
                assert!(msg.contains("world-writable"));
            }
            _ => panic!(
                "Expected ConfigError::InsecureConfig for world-writable file, got {:?}",
                result
            ),
        }
    }

    #[test]
    #[cfg(unix)]
    fn test_config_secure_permissions_accepted() {
        use std::fs;
        use std::os::unix::fs::PermissionsExt;

        let temp_file = write_config("[proxy]\nreload_command = \"nginx -s reload\"\n");
        let path = temp_file.path();
        fs::set_permissions(path, fs::Permissions::from_mode(0o600)).unwrap();

        assert!(Config::from_file(path).is_ok());
    }
}
