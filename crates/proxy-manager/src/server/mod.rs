//! Engine for proxy-manager
//!
//! Wires the record store, certificate agents and the reconcile worker
//! together, and runs the long-lived `serve` loop:
//! - initial reconciliation so the live config matches the store
//! - background certificate renewal
//! - SIGHUP forces a rewrite and reload, SIGINT/SIGTERM shut down

pub mod atomic_write;
pub mod certs;
pub mod commands;
pub mod config;
pub mod hooks;
pub mod proxy;
pub mod tracing_setup;

use crate::server::certs::{
    Authorities, Certbot, CertificateManager, RenewalHandle, RenewalLoop, SelfSignedAuthority,
};
use crate::server::commands::CommandHandler;
use crate::server::config::{Config, ConfigError, RenewalConfig};
use crate::server::hooks::HookExecutor;
use crate::server::proxy::{
    CommandReload, ConfigFile, ConfigSynthesizer, ReconcileQueue, Reconciler, ReloadSignal,
};
use proxy_manager_storage::{create_storage, Storage, StorageError};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// How long shutdown waits for an in-flight reconciliation
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage initialization failed: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Reason the serve loop woke up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServeSignal {
    /// SIGTERM or Ctrl+C - exit completely
    Terminate,
    /// SIGHUP - rewrite the config and reload the proxy
    Reload,
}

/// Every long-lived component, built once per process
pub struct Engine {
    storage: Arc<dyn Storage>,
    certificates: Arc<CertificateManager>,
    queue: ReconcileQueue,
    handler: Arc<CommandHandler>,
    worker: JoinHandle<()>,
    renewal: RenewalConfig,
}

impl Engine {
    /// Assemble an engine around already-constructed collaborators
    ///
    /// Spawns the reconcile worker, so this must run inside a tokio runtime.
    pub fn new(
        storage: Arc<dyn Storage>,
        authorities: Authorities,
        reload: Arc<dyn ReloadSignal>,
        config: &Config,
    ) -> Self {
        let hooks = Arc::new(HookExecutor::new(
            config.hooks.on_success.clone(),
            config.hooks.on_failure.clone(),
            config.hooks.timeout_secs,
        ));

        let reconciler = Reconciler::new(
            Arc::clone(&storage),
            ConfigSynthesizer::new(config.acme.webroot.clone()),
            ConfigFile::new(config.proxy.config_path.clone()),
            reload,
            hooks,
            config.proxy.rollback_on_reload_failure,
        );
        let (queue, worker) = ReconcileQueue::spawn(reconciler);

        let certificates = Arc::new(CertificateManager::new(
            Arc::clone(&storage),
            authorities,
            config.acme.webroot.clone(),
            config.acme.email.clone(),
        ));

        let handler = Arc::new(CommandHandler::new(
            Arc::clone(&storage),
            Arc::clone(&certificates),
            queue.clone(),
        ));

        Self {
            storage,
            certificates,
            queue,
            handler,
            worker,
            renewal: config.renewal.clone(),
        }
    }

    /// Open the configured store and build the real agents
    pub async fn open(config: &Config) -> Result<Self, ServerError> {
        let storage_config = config.storage_config()?;
        info!(backend = ?storage_config.backend, url = %config.database.url, "Initializing storage");
        let storage = create_storage(&storage_config).await?;

        // certbot drops challenge files here; nginx must be able to serve it
        tokio::fs::create_dir_all(&config.acme.webroot).await?;

        let letsencrypt = Arc::new(Certbot::new(
            config.acme.certbot_path.clone(),
            config.acme.config_dir.clone(),
            config.acme.staging,
            config.acme_timeout(),
        ));
        let self_signed = Arc::new(SelfSignedAuthority::new(config.acme.self_signed_dir.clone()));

        let validate_command = config
            .proxy
            .validate_command
            .clone()
            .filter(|cmd| !cmd.trim().is_empty());
        let reload = Arc::new(CommandReload::new(
            validate_command,
            config.proxy.reload_command.clone(),
            config.reload_timeout(),
        ));

        Ok(Self::new(
            storage,
            Authorities::new(letsencrypt, self_signed),
            reload,
            config,
        ))
    }

    pub fn handler(&self) -> Arc<CommandHandler> {
        Arc::clone(&self.handler)
    }

    pub fn queue(&self) -> &ReconcileQueue {
        &self.queue
    }

    /// Start background renewal unless it is disabled
    pub fn start_renewal(&self) -> Option<RenewalHandle> {
        if !self.renewal.enabled {
            info!("Certificate renewal disabled");
            return None;
        }
        let renewal = RenewalLoop::new(
            Arc::clone(&self.certificates),
            self.queue.clone(),
            self.renewal.clone(),
        );
        Some(renewal.start())
    }

    /// Let the worker finish its current run, then close the store
    ///
    /// The worker exits once every queue handle is gone; clones held
    /// elsewhere only delay that up to [`SHUTDOWN_GRACE`].
    pub async fn shutdown(self) -> Result<(), ServerError> {
        let Engine {
            storage,
            certificates,
            queue,
            handler,
            mut worker,
            ..
        } = self;
        drop(handler);
        drop(certificates);
        drop(queue);

        if tokio::time::timeout(SHUTDOWN_GRACE, &mut worker).await.is_err() {
            warn!("Reconcile worker still busy at shutdown, aborting it");
            worker.abort();
        }

        storage.close().await?;
        Ok(())
    }
}

/// Run until SIGINT/SIGTERM
pub async fn serve(config: Config) -> Result<(), ServerError> {
    info!("proxy-manager starting");

    let engine = Engine::open(&config).await?;
    let mut signals = SignalListener::install()?;

    match engine.queue().reconcile().await {
        Ok(report) => info!(
            hosts = report.host_count,
            changed = report.changed,
            reloaded = report.reloaded,
            "Initial reconciliation complete"
        ),
        Err(e) => error!(error = %e, "Initial reconciliation failed"),
    }

    let renewal = engine.start_renewal();

    loop {
        match signals.next().await {
            ServeSignal::Reload => match engine.queue().force_reconcile().await {
                Ok(report) => info!(hosts = report.host_count, "Reload complete"),
                Err(e) => error!(error = %e, "Reload failed"),
            },
            ServeSignal::Terminate => break,
        }
    }

    if let Some(renewal) = renewal {
        renewal.shutdown().await;
    }
    engine.shutdown().await?;

    info!("Shutdown complete");
    Ok(())
}

#[cfg(unix)]
struct SignalListener {
    interrupt: tokio::signal::unix::Signal,
    terminate: tokio::signal::unix::Signal,
    hangup: tokio::signal::unix::Signal,
}

#[cfg(unix)]
impl SignalListener {
    fn install() -> Result<Self, ServerError> {
        use tokio::signal::unix::{signal, SignalKind};

        Ok(Self {
            interrupt: signal(SignalKind::interrupt())?,
            terminate: signal(SignalKind::terminate())?,
            hangup: signal(SignalKind::hangup())?,
        })
    }

    async fn next(&mut self) -> ServeSignal {
        tokio::select! {
            _ = self.interrupt.recv() => {
                info!("Received Ctrl+C, initiating graceful shutdown");
                ServeSignal::Terminate
            }
            _ = self.terminate.recv() => {
                info!("Received SIGTERM, initiating graceful shutdown");
                ServeSignal::Terminate
            }
            _ = self.hangup.recv() => {
                info!("Received SIGHUP, reloading proxy configuration");
                ServeSignal::Reload
            }
        }
    }
}

#[cfg(not(unix))]
struct SignalListener;

#[cfg(not(unix))]
impl SignalListener {
    fn install() -> Result<Self, ServerError> {
        Ok(Self)
    }

    async fn next(&mut self) -> ServeSignal {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to listen for Ctrl+C");
        }
        ServeSignal::Terminate
    }
}
