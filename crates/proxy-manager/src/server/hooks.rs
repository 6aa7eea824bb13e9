//! Post-reconcile hook execution

use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum HookError {
    #[error("Hook timed out after {0} seconds")]
    Timeout(u64),

    #[error("Hook failed with exit code {0}: {1}")]
    Failed(i32, String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct HookExecutor {
    on_success: Vec<String>,
    on_failure: Vec<String>,
    timeout_secs: u64,
}

impl HookExecutor {
    pub fn new(on_success: Vec<String>, on_failure: Vec<String>, timeout_secs: u64) -> Self {
        Self {
            on_success,
            on_failure,
            timeout_secs,
        }
    }

    /// Run success hooks after a reconciliation that rewrote the config
    ///
    /// Returns the number of hooks that failed.
    pub async fn run_success(&self, host_count: usize) -> usize {
        let mut failed = 0;
        for cmd in &self.on_success {
            if let Err(e) = self.run_hook(cmd, "success", host_count, "").await {
                warn!(hook = %cmd, error = %e, "Success hook failed (continuing)");
                failed += 1;
            }
        }
        failed
    }

    /// Run failure hooks after a reconciliation failed to commit or reload
    pub async fn run_failure(&self, host_count: usize, error_msg: &str) -> usize {
        let mut failed = 0;
        for cmd in &self.on_failure {
            if let Err(e) = self.run_hook(cmd, "failure", host_count, error_msg).await {
                warn!(hook = %cmd, error = %e, "Failure hook failed (continuing)");
                failed += 1;
            }
        }
        failed
    }

    async fn run_hook(
        &self,
        cmd: &str,
        event: &str,
        host_count: usize,
        error_msg: &str,
    ) -> Result<(), HookError> {
        info!(hook = %cmd, event, "Running hook");

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .env("PROXY_MANAGER_EVENT", event)
            .env("PROXY_MANAGER_HOST_COUNT", host_count.to_string())
            .env("PROXY_MANAGER_ERROR", error_msg)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;

        match timeout(Duration::from_secs(self.timeout_secs), child.wait()).await {
            Ok(Ok(status)) if status.success() => {
                info!(hook = %cmd, "Hook completed successfully");
                Ok(())
            }
            Ok(Ok(status)) => {
                let code = status.code().unwrap_or(-1);
                error!(hook = %cmd, code, "Hook failed");
                Err(HookError::Failed(code, cmd.to_string()))
            }
            Ok(Err(e)) => Err(HookError::Io(e)),
            Err(_) => {
                let _ = child.kill().await;
                error!(hook = %cmd, "Hook timed out");
                Err(HookError::Timeout(self.timeout_secs))
            }
        }
    }
}

impl Default for HookExecutor {
    fn default() -> Self {
        Self::new(vec![], vec![], 30)
    }
}
