//! Reconcile serialization queue
//!
//! A single worker task owns the [`Reconciler`]. Every caller submits a
//! request over a channel and waits for its own reply, so two reconciliations
//! can never interleave their commit and reload steps.

use super::reconciler::{ReconcileError, ReconcilePhase, ReconcileReport, Reconciler};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

const QUEUE_DEPTH: usize = 32;

/// Requests that can be sent to the reconcile worker
enum ReconcileCommand {
    Reconcile {
        force: bool,
        reply: oneshot::Sender<Result<ReconcileReport, ReconcileError>>,
    },
}

/// Cloneable handle to the reconcile worker
#[derive(Clone)]
pub struct ReconcileQueue {
    tx: mpsc::Sender<ReconcileCommand>,
    phase: watch::Receiver<ReconcilePhase>,
}

impl ReconcileQueue {
    /// Move the reconciler into a worker task and return a handle to it
    ///
    /// The worker exits once every handle has been dropped.
    pub fn spawn(mut reconciler: Reconciler) -> (Self, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel::<ReconcileCommand>(QUEUE_DEPTH);
        let phase = reconciler.subscribe_phase();

        let worker = tokio::spawn(async move {
            while let Some(command) = rx.recv().await {
                match command {
                    ReconcileCommand::Reconcile { force, reply } => {
                        let result = reconciler.reconcile(force).await;
                        // Caller may have given up waiting
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::debug!("Reconcile worker stopped");
        });

        (Self { tx, phase }, worker)
    }

    /// Reconcile, skipping the reload if the config is unchanged
    pub async fn reconcile(&self) -> Result<ReconcileReport, ReconcileError> {
        self.submit(false).await
    }

    /// Reconcile and reload even if the config is unchanged
    pub async fn force_reconcile(&self) -> Result<ReconcileReport, ReconcileError> {
        self.submit(true).await
    }

    pub fn phase(&self) -> ReconcilePhase {
        *self.phase.borrow()
    }

    async fn submit(&self, force: bool) -> Result<ReconcileReport, ReconcileError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(ReconcileCommand::Reconcile { force, reply })
            .await
            .map_err(|_| ReconcileError::QueueClosed)?;
        rx.await.map_err(|_| ReconcileError::QueueClosed)?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::hooks::HookExecutor;
    use crate::server::proxy::{ConfigFile, ConfigSynthesizer, ReloadSignal};
    use crate::test_utils::{create_test_storage, RecordingReload};
    use proxy_manager_storage::NewProxyHost;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_queue_runs_requests() {
        let dir = TempDir::new().unwrap();
        let storage = create_test_storage().await;
        let reload = Arc::new(RecordingReload::succeeding());
        let reconciler = Reconciler::new(
            Arc::clone(&storage),
            ConfigSynthesizer::new(dir.path().join("webroot")),
            ConfigFile::new(dir.path().join("proxy.conf")),
            Arc::clone(&reload) as Arc<dyn ReloadSignal>,
            Arc::new(HookExecutor::default()),
            true,
        );
        let (queue, _worker) = ReconcileQueue::spawn(reconciler);

        storage
            .create_host(NewProxyHost::new("a.test", "http://localhost:9000"))
            .await
            .unwrap();

        let first = queue.reconcile().await.unwrap();
        let second = queue.reconcile().await.unwrap();
        let forced = queue.force_reconcile().await.unwrap();

        assert!(first.changed);
        assert!(!second.reloaded);
        assert!(forced.reloaded);
        assert_eq!(reload.calls(), 2);
        assert_eq!(queue.phase(), ReconcilePhase::Idle);
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_serialized() {
        let dir = TempDir::new().unwrap();
        let storage = create_test_storage().await;
        let reload = Arc::new(RecordingReload::succeeding().with_delay(Duration::from_millis(20)));
        let reconciler = Reconciler::new(
            Arc::clone(&storage),
            ConfigSynthesizer::new(dir.path().join("webroot")),
            ConfigFile::new(dir.path().join("proxy.conf")),
            Arc::clone(&reload) as Arc<dyn ReloadSignal>,
            Arc::new(HookExecutor::default()),
            true,
        );
        let (queue, _worker) = ReconcileQueue::spawn(reconciler);

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                tokio::spawn(async move { queue.force_reconcile().await })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(reload.calls(), 4);
        assert_eq!(reload.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn test_closed_queue_reports_error() {
        let dir = TempDir::new().unwrap();
        let storage = create_test_storage().await;
        let reconciler = Reconciler::new(
            storage,
            ConfigSynthesizer::new(dir.path().join("webroot")),
            ConfigFile::new(dir.path().join("proxy.conf")),
            Arc::new(RecordingReload::succeeding()),
            Arc::new(HookExecutor::default()),
            true,
        );
        let (queue, worker) = ReconcileQueue::spawn(reconciler);
        worker.abort();
        let _ = worker.await;

        let err = queue.reconcile().await.unwrap_err();
        assert!(matches!(err, ReconcileError::QueueClosed));
    }
}
