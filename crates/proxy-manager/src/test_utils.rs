//! Test utilities for proxy-manager tests.
//!
//! In-memory storage, a scriptable certificate agent and a recording reload
//! signal, so engine tests never touch certbot or nginx.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use proxy_manager_storage::backends::sqlite::SqliteStorage;
use proxy_manager_storage::{Certificate, CertificateProvider, ProxyHost, Storage};
use tempfile::TempDir;

use crate::server::certs::{ArtifactPaths, Authorities, AuthorityError, CertificateAuthority};
use crate::server::commands::CommandHandler;
use crate::server::config::{Config, DatabaseConfig, RenewalConfig};
use crate::server::proxy::{ReloadError, ReloadSignal};
use crate::server::Engine;

/// Creates an in-memory SQLite storage for testing.
///
/// The storage is automatically initialized and ready for use.
pub async fn create_test_storage() -> Arc<dyn Storage> {
    let storage = SqliteStorage::new(":memory:")
        .await
        .expect("failed to create in-memory storage");
    storage
        .initialize()
        .await
        .expect("failed to initialize storage");
    Arc::new(storage)
}

/// Configuration with every path under `dir` and no real commands.
pub fn create_test_config(dir: &Path) -> Config {
    let mut config = Config {
        database: DatabaseConfig {
            url: "sqlite://:memory:".to_string(),
        },
        renewal: RenewalConfig {
            enabled: false,
            days_before_expiry: 30,
            jitter_minutes: 0,
        },
        ..Config::default()
    };
    config.proxy.config_path = dir.join("proxy.conf");
    config.proxy.reload_command = "true".to_string();
    config.proxy.validate_command = None;
    config.acme.webroot = dir.join("webroot");
    config.acme.config_dir = dir.join("letsencrypt");
    config.acme.self_signed_dir = dir.join("self-signed");
    config
}

/// An enabled plain-HTTP host record.
pub fn host(id: i64, domain: &str, target_url: &str) -> ProxyHost {
    ProxyHost {
        id,
        domain: domain.to_string(),
        target_url: target_url.to_string(),
        enabled: true,
        ssl_enabled: false,
        certificate_id: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    }
}

/// A certificate record with its files under `dir`.
pub fn certificate(id: i64, domain: &str, dir: &str) -> Certificate {
    let paths = ArtifactPaths::in_dir(Path::new(dir));
    Certificate {
        id,
        domain: domain.to_string(),
        provider: CertificateProvider::LetsEncrypt,
        cert_path: paths.cert_path,
        key_path: paths.key_path,
        expires_at: Utc::now() + chrono::Duration::days(90),
        created_at: Utc::now(),
    }
}

/// Reload signal that counts calls and can be told to fail.
#[derive(Default)]
pub struct RecordingReload {
    calls: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
    failing: AtomicBool,
    delay: Option<Duration>,
}

impl RecordingReload {
    pub fn succeeding() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let reload = Self::default();
        reload.set_failing(true);
        reload
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping `trigger_reload` calls seen.
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReloadSignal for RecordingReload {
    async fn trigger_reload(&self) -> Result<(), ReloadError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing.load(Ordering::SeqCst) {
            return Err(ReloadError::Rejected {
                command: "nginx -s reload".to_string(),
                code: 1,
                stderr: "emerg: invalid config".to_string(),
            });
        }
        Ok(())
    }
}

/// Certificate agent that writes placeholder files under `base_dir`.
pub struct FakeAuthority {
    provider: CertificateProvider,
    base_dir: PathBuf,
    issue_calls: AtomicUsize,
    renew_calls: AtomicUsize,
    revoke_calls: AtomicUsize,
    fail_issue: AtomicBool,
    fail_renew: AtomicBool,
    fail_revoke: AtomicBool,
    skip_artifacts: AtomicBool,
    expiry: Mutex<Option<DateTime<Utc>>>,
    issue_delay: Mutex<Option<Duration>>,
    last_email: Mutex<Option<String>>,
}

impl FakeAuthority {
    pub fn new(provider: CertificateProvider, base_dir: PathBuf) -> Self {
        Self {
            provider,
            base_dir,
            issue_calls: AtomicUsize::new(0),
            renew_calls: AtomicUsize::new(0),
            revoke_calls: AtomicUsize::new(0),
            fail_issue: AtomicBool::new(false),
            fail_renew: AtomicBool::new(false),
            fail_revoke: AtomicBool::new(false),
            skip_artifacts: AtomicBool::new(false),
            expiry: Mutex::new(Some(Utc::now() + chrono::Duration::days(90))),
            issue_delay: Mutex::new(None),
            last_email: Mutex::new(None),
        }
    }

    pub fn fail_issue(&self, fail: bool) {
        self.fail_issue.store(fail, Ordering::SeqCst);
    }

    pub fn fail_renew(&self, fail: bool) {
        self.fail_renew.store(fail, Ordering::SeqCst);
    }

    pub fn fail_revoke(&self, fail: bool) {
        self.fail_revoke.store(fail, Ordering::SeqCst);
    }

    /// Report success from `issue` without writing any files.
    pub fn skip_artifacts(&self, skip: bool) {
        self.skip_artifacts.store(skip, Ordering::SeqCst);
    }

    /// Expiry reported by `query_expiry`; `None` reports nothing.
    pub fn set_expiry(&self, expiry: Option<DateTime<Utc>>) {
        *self.expiry.lock() = expiry;
    }

    pub fn set_issue_delay(&self, delay: Duration) {
        *self.issue_delay.lock() = Some(delay);
    }

    pub fn issue_calls(&self) -> usize {
        self.issue_calls.load(Ordering::SeqCst)
    }

    pub fn renew_calls(&self) -> usize {
        self.renew_calls.load(Ordering::SeqCst)
    }

    pub fn revoke_calls(&self) -> usize {
        self.revoke_calls.load(Ordering::SeqCst)
    }

    pub fn last_email(&self) -> Option<String> {
        self.last_email.lock().clone()
    }

    fn failure(&self, op: &str) -> AuthorityError {
        AuthorityError::CommandFailed {
            command: format!("fake {}", op),
            code: 1,
            stderr: "challenge failed".to_string(),
        }
    }
}

#[async_trait]
impl CertificateAuthority for FakeAuthority {
    fn provider(&self) -> CertificateProvider {
        self.provider
    }

    fn paths(&self, domain: &str) -> ArtifactPaths {
        ArtifactPaths::in_dir(&self.base_dir.join(domain))
    }

    async fn issue(
        &self,
        domain: &str,
        _webroot: &Path,
        email: Option<&str>,
    ) -> Result<(), AuthorityError> {
        self.issue_calls.fetch_add(1, Ordering::SeqCst);
        *self.last_email.lock() = email.map(str::to_string);

        let delay = *self.issue_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.fail_issue.load(Ordering::SeqCst) {
            return Err(self.failure("issue"));
        }
        if self.skip_artifacts.load(Ordering::SeqCst) {
            return Ok(());
        }

        let paths = self.paths(domain);
        std::fs::create_dir_all(self.base_dir.join(domain)).expect("create cert dir");
        std::fs::write(&paths.cert_path, "FAKE CHAIN").expect("write chain");
        std::fs::write(&paths.key_path, "FAKE KEY").expect("write key");
        Ok(())
    }

    async fn query_expiry(&self, _domain: &str) -> Result<Option<DateTime<Utc>>, AuthorityError> {
        Ok(*self.expiry.lock())
    }

    async fn renew(&self, _domain: &str) -> Result<(), AuthorityError> {
        self.renew_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_renew.load(Ordering::SeqCst) {
            return Err(self.failure("renew"));
        }
        Ok(())
    }

    async fn revoke(&self, domain: &str) -> Result<(), AuthorityError> {
        self.revoke_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_revoke.load(Ordering::SeqCst) {
            return Err(self.failure("revoke"));
        }
        let _ = std::fs::remove_dir_all(self.base_dir.join(domain));
        Ok(())
    }
}

/// A fully wired engine backed by fakes.
pub struct TestHarness {
    pub handler: Arc<CommandHandler>,
    pub storage: Arc<dyn Storage>,
    pub reload: Arc<RecordingReload>,
    pub authority: Arc<FakeAuthority>,
    pub config: Config,
    pub engine: Engine,
    pub dir: TempDir,
}

/// Wires an [`Engine`] with one fake agent for both providers.
pub async fn create_test_handler() -> TestHarness {
    let dir = TempDir::new().expect("failed to create temp dir");
    let config = create_test_config(dir.path());
    let storage = create_test_storage().await;
    let reload = Arc::new(RecordingReload::succeeding());
    let authority = Arc::new(FakeAuthority::new(
        CertificateProvider::LetsEncrypt,
        dir.path().join("certs"),
    ));

    let engine = Engine::new(
        Arc::clone(&storage),
        Authorities::new(authority.clone(), authority.clone()),
        reload.clone(),
        &config,
    );

    TestHarness {
        handler: engine.handler(),
        storage,
        reload,
        authority,
        config,
        engine,
        dir,
    }
}
