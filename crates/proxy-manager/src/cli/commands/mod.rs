pub mod cert;
pub mod config;
pub mod host;

use anyhow::Result;

use crate::cli::{output::print_item, OutputFormat};
use crate::server::commands::CommandHandler;
use crate::server::proxy::{ReconcileError, ReconcileReport};

pub async fn reload(handler: &CommandHandler, format: OutputFormat, quiet: bool) -> Result<()> {
    let report = handler.reload().await?;
    if !quiet {
        print_item(&report, format);
    }
    Ok(())
}

/// Warn when a saved change did not reach the proxy
pub(crate) fn warn_unreconciled(reconcile: &Result<ReconcileReport, ReconcileError>) {
    if let Err(e) = reconcile {
        if e.rolled_back() {
            eprintln!(
                "Warning: change saved, but the proxy rejected the new config and the previous one was restored: {}",
                e
            );
        } else {
            eprintln!("Warning: change saved, but the proxy was not updated: {}", e);
        }
    }
}
