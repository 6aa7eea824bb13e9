//! Reload signal for the running proxy

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use thiserror::Error;
use tokio::process::Command;
use tokio::time::timeout;

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error("`{command}` exited with code {code}: {stderr}")]
    Rejected {
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
}

/// Tells the proxy to pick up the committed config
#[async_trait]
pub trait ReloadSignal: Send + Sync {
    async fn trigger_reload(&self) -> Result<(), ReloadError>;
}

/// Runs shell commands to validate and reload the proxy
///
/// e.g. `nginx -t` then `nginx -s reload`. Any non-zero exit is treated as the
/// proxy rejecting the config.
#[derive(Debug, Clone)]
pub struct CommandReload {
    validate_command: Option<String>,
    reload_command: String,
    timeout: Duration,
}

impl CommandReload {
    pub fn new(
        validate_command: Option<String>,
        reload_command: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            validate_command,
            reload_command: reload_command.into(),
            timeout,
        }
    }

    async fn run(&self, cmd: &str) -> Result<(), ReloadError> {
        tracing::debug!(command = %cmd, "Running proxy command");

        let child = Command::new("sh")
            .arg("-c")
            .arg(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        let output = match timeout(self.timeout, child).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ReloadError::Io {
                    command: cmd.to_string(),
                    source,
                })
            }
            Err(_) => {
                return Err(ReloadError::Timeout {
                    command: cmd.to_string(),
                    seconds: self.timeout.as_secs(),
                })
            }
        };

        if output.status.success() {
            Ok(())
        } else {
            Err(ReloadError::Rejected {
                command: cmd.to_string(),
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }
}

#[async_trait]
impl ReloadSignal for CommandReload {
    async fn trigger_reload(&self) -> Result<(), ReloadError> {
        if let Some(validate) = &self.validate_command {
            self.run(validate).await?;
        }
        self.run(&self.reload_command).await?;
        tracing::info!(command = %self.reload_command, "Proxy reloaded");
        Ok(())
    }
}
