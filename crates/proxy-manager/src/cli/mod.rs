//! Command-line surface for proxy-manager
//!
//! `serve` runs the long-lived engine. Every other subcommand opens the same
//! record store, performs one command (reconciling the proxy if it changed
//! anything) and exits.

mod commands;
mod error;
mod output;

pub use error::{exit_code_for_error, format_command_error, EXIT_CONFLICT, EXIT_ERROR, EXIT_USAGE};
pub use output::{print_item, print_items, write_items, TableDisplay};

use crate::server::commands::CommandError;
use crate::server::config::{Config, ConfigError, DEFAULT_CONFIG_PATH};
use crate::server::{self, tracing_setup, Engine};
use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use proxy_manager_storage::CertificateProvider;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
pub enum OutputFormat {
    #[default]
    Table,
    Json,
    Csv,
}

#[derive(Debug, Clone, Copy, ValueEnum, PartialEq, Eq)]
pub enum ProviderArg {
    Letsencrypt,
    SelfSigned,
}

impl From<ProviderArg> for CertificateProvider {
    fn from(arg: ProviderArg) -> Self {
        match arg {
            ProviderArg::Letsencrypt => CertificateProvider::LetsEncrypt,
            ProviderArg::SelfSigned => CertificateProvider::SelfSigned,
        }
    }
}

#[derive(Parser)]
#[command(name = "proxy-manager")]
#[command(about = "Reverse-proxy route and TLS certificate manager for nginx", long_about = None)]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format
    #[arg(long, global = true, default_value = "table")]
    pub format: OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the manager: reconcile, renew certificates, handle signals
    Serve,
    /// Rewrite the proxy config and reload the proxy
    Reload,
    /// Manage proxy hosts
    Host(HostArgs),
    /// Manage TLS certificates
    Cert(CertArgs),
    /// Show effective configuration
    Config,
}

#[derive(Args)]
pub struct HostArgs {
    #[command(subcommand)]
    pub command: HostCommand,
}

#[derive(Subcommand)]
pub enum HostCommand {
    /// List all proxy hosts
    List,
    /// Get a proxy host by ID
    Get {
        /// Proxy host ID
        id: i64,
    },
    /// Add a proxy host
    Add {
        /// Domain to serve
        #[arg(long)]
        domain: String,
        /// Upstream URL, e.g. http://127.0.0.1:3000
        #[arg(long)]
        target: String,
        /// Serve over TLS once a certificate is attached
        #[arg(long)]
        ssl: bool,
        /// Certificate to attach
        #[arg(long)]
        certificate_id: Option<i64>,
        /// Create the host disabled
        #[arg(long)]
        disabled: bool,
    },
    /// Update a proxy host
    Update {
        /// Proxy host ID
        id: i64,
        #[arg(long)]
        domain: Option<String>,
        #[arg(long)]
        target: Option<String>,
        #[arg(long, conflicts_with = "disable")]
        enable: bool,
        #[arg(long)]
        disable: bool,
        /// Turn TLS on or off
        #[arg(long)]
        ssl: Option<bool>,
        #[arg(long, conflicts_with = "clear_certificate")]
        certificate_id: Option<i64>,
        /// Detach the current certificate
        #[arg(long)]
        clear_certificate: bool,
    },
    /// Delete a proxy host
    Delete {
        /// Proxy host ID
        id: i64,
    },
}

#[derive(Args)]
pub struct CertArgs {
    #[command(subcommand)]
    pub command: CertCommand,
}

#[derive(Subcommand)]
pub enum CertCommand {
    /// List all certificates
    List,
    /// Get a certificate by ID
    Get {
        /// Certificate ID
        id: i64,
    },
    /// Issue a certificate, or show the existing one
    Request {
        domain: String,
        #[arg(long, value_enum, default_value = "letsencrypt")]
        provider: ProviderArg,
        /// ACME account email (defaults to acme.email)
        #[arg(long)]
        email: Option<String>,
    },
    /// Renew a certificate now
    Renew { domain: String },
    /// Detach, revoke and delete a certificate
    Delete { domain: String },
}

/// Load the explicit config file, else the default one if present, else defaults
pub fn load_config(explicit: Option<&Path>) -> Result<(Config, Option<PathBuf>), ConfigError> {
    let path = match explicit {
        Some(path) => Some(path.to_path_buf()),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_PATH);
            default.exists().then_some(default)
        }
    };

    match path {
        Some(path) => Ok((Config::from_file(&path)?, Some(path))),
        None => {
            let config = Config::default();
            config.validate()?;
            Ok((config, None))
        }
    }
}

pub async fn run() -> Result<ExitCode> {
    let cli = Cli::parse();

    if matches!(cli.command, Commands::Serve) {
        tracing_setup::init();
    } else {
        tracing_setup::init_cli(cli.verbose);
    }

    let (config, source) = match load_config(cli.config.as_deref()) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return Ok(ExitCode::from(EXIT_USAGE as u8));
        }
    };

    match cli.command {
        Commands::Config => {
            commands::config::show(&config, source.as_deref());
            return Ok(ExitCode::SUCCESS);
        }
        Commands::Serve => {
            server::serve(config)
                .await
                .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;
            return Ok(ExitCode::SUCCESS);
        }
        _ => {}
    }

    let engine = match Engine::open(&config).await {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("Startup error: {}", e);
            return Ok(ExitCode::from(EXIT_ERROR as u8));
        }
    };
    let handler = engine.handler();

    let result = match cli.command {
        Commands::Reload => commands::reload(&handler, cli.format, cli.quiet).await,
        Commands::Host(args) => {
            commands::host::handle(&handler, args.command, cli.format, cli.quiet).await
        }
        Commands::Cert(args) => {
            commands::cert::handle(&handler, args.command, cli.format, cli.quiet).await
        }
        Commands::Serve | Commands::Config => unreachable!(), // Handled above
    };

    drop(handler);
    if let Err(e) = engine.shutdown().await {
        tracing::warn!(error = %e, "Shutdown did not complete cleanly");
    }

    match result {
        Ok(()) => Ok(ExitCode::SUCCESS),
        Err(e) => {
            if let Some(err) = e.downcast_ref::<CommandError>() {
                eprintln!("{}", format_command_error(err));
                Ok(ExitCode::from(exit_code_for_error(err) as u8))
            } else {
                eprintln!("Error: {}", e);
                Ok(ExitCode::from(EXIT_ERROR as u8))
            }
        }
    }
}
