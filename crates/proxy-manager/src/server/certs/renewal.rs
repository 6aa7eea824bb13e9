//! Background certificate renewal
//!
//! Once at startup and then every 24 hours (plus jitter), every certificate
//! expiring within the configured window is renewed. If any renewal succeeds
//! one forced reconcile runs: the config text is usually unchanged, but nginx
//! must reload to pick up the new files.

use super::manager::{CertificateError, CertificateManager, RenewOutcome};
use crate::server::config::RenewalConfig;
use crate::server::proxy::ReconcileQueue;
use proxy_manager_storage::StorageError;
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

/// Base interval between renewal checks (24 hours)
const RENEWAL_CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Number of consecutive failing passes before emitting CRITICAL alert
const FAILURE_ALERT_THRESHOLD: u32 = 3;

/// Counts from one renewal pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenewalPass {
    /// Certificates inside the renewal window
    pub checked: usize,
    pub renewed: usize,
    pub failed: usize,
}

/// Handle for controlling a running renewal loop
pub struct RenewalHandle {
    shutdown_tx: oneshot::Sender<()>,
    join_handle: tokio::task::JoinHandle<()>,
}

impl RenewalHandle {
    /// Stop the loop and wait for an in-flight pass to finish
    pub async fn shutdown(self) {
        debug!("Shutting down certificate renewal loop");
        let _ = self.shutdown_tx.send(());
        let _ = self.join_handle.await;
    }
}

pub struct RenewalLoop {
    manager: Arc<CertificateManager>,
    queue: ReconcileQueue,
    config: RenewalConfig,
}

impl RenewalLoop {
    pub fn new(manager: Arc<CertificateManager>, queue: ReconcileQueue, config: RenewalConfig) -> Self {
        Self {
            manager,
            queue,
            config,
        }
    }

    /// Renew everything inside the window
    pub async fn run_once(&self) -> Result<RenewalPass, StorageError> {
        let due = self
            .manager
            .due_for_renewal(self.config.days_before_expiry)
            .await?;

        let mut pass = RenewalPass {
            checked: due.len(),
            ..Default::default()
        };

        for cert in due {
            debug!(domain = %cert.domain, expires_at = %cert.expires_at, "Certificate due for renewal");
            match self.manager.renew(&cert.domain).await {
                Ok(RenewOutcome::Renewed(_)) => pass.renewed += 1,
                Ok(RenewOutcome::Unchanged { .. }) => pass.failed += 1,
                Err(CertificateError::NotFound(_)) => {
                    debug!(domain = %cert.domain, "Certificate deleted before renewal");
                }
                Err(e) => {
                    error!(domain = %cert.domain, error = %e, "Certificate renewal errored");
                    pass.failed += 1;
                }
            }
        }

        if pass.renewed > 0 {
            if let Err(e) = self.queue.force_reconcile().await {
                error!(error = %e, "Reconcile after renewal failed");
            }
        }

        if pass.checked > 0 {
            info!(
                checked = pass.checked,
                renewed = pass.renewed,
                failed = pass.failed,
                "Renewal pass complete"
            );
        }
        Ok(pass)
    }

    /// Spawn the loop; the first pass runs immediately
    pub fn start(self) -> RenewalHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

        let join_handle = tokio::spawn(async move {
            let mut consecutive_failures: u32 = 0;
            let jitter_minutes = self.config.jitter_minutes;

            debug!(
                base_interval_hours = RENEWAL_CHECK_INTERVAL.as_secs() / 3600,
                max_jitter_minutes = jitter_minutes,
                days_before_expiry = self.config.days_before_expiry,
                "Certificate renewal loop starting"
            );

            loop {
                tokio::select! {
                    result = self.run_once() => {
                        self.track(result, &mut consecutive_failures);
                    }
                    _ = &mut shutdown_rx => break,
                }

                // Fresh jitter each cycle so multiple instances don't converge
                let jitter_secs = if jitter_minutes > 0 {
                    rand::thread_rng().gen_range(0..(jitter_minutes * 60))
                } else {
                    0
                };
                let check_interval = RENEWAL_CHECK_INTERVAL + Duration::from_secs(jitter_secs);
                debug!(
                    next_check_hours = check_interval.as_secs() / 3600,
                    jitter_minutes = jitter_secs / 60,
                    "Sleeping until next renewal check"
                );

                tokio::select! {
                    _ = tokio::time::sleep(check_interval) => {}
                    _ = &mut shutdown_rx => break,
                }
            }
            info!("Certificate renewal loop shutting down");
        });

        RenewalHandle {
            shutdown_tx,
            join_handle,
        }
    }

    fn track(&self, result: Result<RenewalPass, StorageError>, consecutive_failures: &mut u32) {
        let failed = match result {
            Ok(pass) => pass.failed > 0,
            Err(e) => {
                error!(error = %e, "Failed to list certificates for renewal");
                true
            }
        };

        if !failed {
            *consecutive_failures = 0;
            return;
        }

        *consecutive_failures += 1;
        warn!(consecutive_failures = *consecutive_failures, "Renewal pass had failures");

        if *consecutive_failures >= FAILURE_ALERT_THRESHOLD {
            error!(
                consecutive_failures = *consecutive_failures,
                threshold = FAILURE_ALERT_THRESHOLD,
                "CRITICAL: Certificate renewal has failed {} consecutive times. \
                 Troubleshooting steps: \
                 1) Verify DNS records point to this server, \
                 2) Ensure port 80 is accessible and the ACME webroot is served, \
                 3) Check Let's Encrypt rate limits at https://letsencrypt.org/docs/rate-limits/, \
                 4) Review earlier log entries for specific error details. \
                 Manual intervention may be required.",
                *consecutive_failures
            );
        }
    }
}
