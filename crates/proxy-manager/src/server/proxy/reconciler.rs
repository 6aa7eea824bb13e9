//! Full re-sync of the proxy config from the record store
//!
//! Every run reads all hosts and certificates, renders the complete config,
//! commits it over the live file and signals a reload. There is no
//! incremental path: the store is the only source of truth.

use super::commit::{CommitError, ConfigFile};
use super::reload::{ReloadError, ReloadSignal};
use super::synth::ConfigSynthesizer;
use crate::server::hooks::HookExecutor;
use proxy_manager_storage::{Storage, StorageError};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::watch;
use tracing::{error, info, warn};

/// Where a reconciliation currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReconcilePhase {
    Idle,
    ReadingState,
    Synthesizing,
    Committing,
    Reloading,
}

impl fmt::Display for ReconcilePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReconcilePhase::Idle => "idle",
            ReconcilePhase::ReadingState => "reading_state",
            ReconcilePhase::Synthesizing => "synthesizing",
            ReconcilePhase::Committing => "committing",
            ReconcilePhase::Reloading => "reloading",
        };
        f.write_str(name)
    }
}

/// Outcome of a successful reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    /// Rendered config differed from the live file
    pub changed: bool,
    /// Enabled hosts in the rendered config
    pub host_count: usize,
    pub reloaded: bool,
    pub forced: bool,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("failed to read proxy state: {0}")]
    Storage(#[from] StorageError),

    #[error("failed to commit proxy config: {0}")]
    ConfigCommit(#[from] CommitError),

    #[error("proxy reload failed (rolled back: {rolled_back}): {source}")]
    Reload {
        #[source]
        source: ReloadError,
        rolled_back: bool,
    },

    #[error("reconcile worker is not running")]
    QueueClosed,
}

impl ReconcileError {
    pub fn rolled_back(&self) -> bool {
        matches!(self, ReconcileError::Reload { rolled_back: true, .. })
    }
}

pub struct Reconciler {
    storage: Arc<dyn Storage>,
    synthesizer: ConfigSynthesizer,
    config_file: ConfigFile,
    reload: Arc<dyn ReloadSignal>,
    hooks: Arc<HookExecutor>,
    rollback_on_reload_failure: bool,
    /// The live file was committed but the proxy never loaded it
    needs_reload: bool,
    phase: watch::Sender<ReconcilePhase>,
}

impl Reconciler {
    pub fn new(
        storage: Arc<dyn Storage>,
        synthesizer: ConfigSynthesizer,
        config_file: ConfigFile,
        reload: Arc<dyn ReloadSignal>,
        hooks: Arc<HookExecutor>,
        rollback_on_reload_failure: bool,
    ) -> Self {
        let (phase, _) = watch::channel(ReconcilePhase::Idle);
        Self {
            storage,
            synthesizer,
            config_file,
            reload,
            hooks,
            rollback_on_reload_failure,
            needs_reload: false,
            phase,
        }
    }

    pub fn config_file(&self) -> &ConfigFile {
        &self.config_file
    }

    pub fn subscribe_phase(&self) -> watch::Receiver<ReconcilePhase> {
        self.phase.subscribe()
    }

    /// Bring the live proxy config in line with the store
    ///
    /// Unless `force` is set, an artifact identical to the live file ends the
    /// run without a reload. That shortcut is off while a previously
    /// committed file is still waiting for a successful reload.
    pub async fn reconcile(&mut self, force: bool) -> Result<ReconcileReport, ReconcileError> {
        let mut host_count = 0;
        let result = self.run(force, &mut host_count).await;
        self.set_phase(ReconcilePhase::Idle);

        match &result {
            Ok(report) if report.reloaded => {
                info!(
                    changed = report.changed,
                    forced = report.forced,
                    host_count = report.host_count,
                    "Proxy config reconciled"
                );
                self.hooks.run_success(report.host_count).await;
            }
            Ok(_) => {
                tracing::debug!(host_count, "Proxy config unchanged, reload skipped");
            }
            Err(e) => {
                error!(error = %e, "Reconciliation failed");
                self.hooks.run_failure(host_count, &e.to_string()).await;
            }
        }

        result
    }

    async fn run(
        &mut self,
        force: bool,
        host_count: &mut usize,
    ) -> Result<ReconcileReport, ReconcileError> {
        self.set_phase(ReconcilePhase::ReadingState);
        let hosts = self.storage.list_hosts().await?;
        let certificates = self.storage.list_certificates().await?;
        *host_count = hosts.iter().filter(|h| h.enabled).count();

        self.set_phase(ReconcilePhase::Synthesizing);
        let rendered = self.synthesizer.render(&hosts, &certificates);
        let live = self.config_file.read_live().await?;
        let changed = live.as_deref() != Some(rendered.as_str());

        if !changed && !force && !self.needs_reload {
            return Ok(ReconcileReport {
                changed: false,
                host_count: *host_count,
                reloaded: false,
                forced: false,
            });
        }

        self.set_phase(ReconcilePhase::Committing);
        self.config_file.commit(&rendered).await?;

        self.set_phase(ReconcilePhase::Reloading);
        if let Err(source) = self.reload.trigger_reload().await {
            let rolled_back = self.rollback_on_reload_failure && self.roll_back(&source).await;
            self.needs_reload = !rolled_back;
            return Err(ReconcileError::Reload {
                source,
                rolled_back,
            });
        }

        self.needs_reload = false;
        Ok(ReconcileReport {
            changed,
            host_count: *host_count,
            reloaded: true,
            forced: force,
        })
    }

    /// Restore the backup and reload it; `true` if the backup is back in place
    async fn roll_back(&self, cause: &ReloadError) -> bool {
        warn!(error = %cause, "Proxy rejected new config, restoring last-known-good");

        if let Err(e) = self.config_file.restore_backup().await {
            error!(error = %e, "Failed to restore last-known-good config");
            return false;
        }

        if let Err(e) = self.reload.trigger_reload().await {
            warn!(error = %e, "Reload after rollback also failed");
        }
        true
    }

    fn set_phase(&self, phase: ReconcilePhase) {
        self.phase.send_replace(phase);
    }
}
