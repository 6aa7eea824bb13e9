//! proxy-manager library crate
//!
//! Exposes the engine and CLI behind the `proxy-manager` binary so they can
//! be driven from integration tests.

pub mod cli;
pub mod server;

#[cfg(test)]
pub mod test_utils;

use anyhow::Result;
use std::process::ExitCode;

/// Main entry point for proxy-manager.
pub async fn run() -> Result<ExitCode> {
    cli::run().await
}
