use anyhow::Result;

use super::warn_unreconciled;
use crate::cli::{
    output::{print_item, print_items},
    CertCommand, OutputFormat,
};
use crate::server::certs::{CleanupStatus, RenewOutcome};
use crate::server::commands::CommandHandler;

pub async fn handle(
    handler: &CommandHandler,
    command: CertCommand,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    match command {
        CertCommand::List => {
            let certificates = handler.list_certificates().await?;
            print_items(&certificates, format);
        }

        CertCommand::Get { id } => {
            let certificate = handler.get_certificate(id).await?;
            print_item(&certificate, format);
        }

        CertCommand::Request {
            domain,
            provider,
            email,
        } => {
            let mutation = handler
                .request_certificate(&domain, provider.into(), email.as_deref())
                .await?;
            warn_unreconciled(&mutation.reconcile);
            if !quiet {
                print_item(&mutation.value, format);
            }
        }

        CertCommand::Renew { domain } => {
            let mutation = handler.renew_certificate(&domain).await?;
            warn_unreconciled(&mutation.reconcile);
            match mutation.value {
                RenewOutcome::Renewed(certificate) => {
                    if !quiet {
                        print_item(&certificate, format);
                    }
                }
                RenewOutcome::Unchanged { reason, .. } => {
                    anyhow::bail!("renewal of {} failed, certificate unchanged: {}", domain, reason);
                }
            }
        }

        CertCommand::Delete { domain } => {
            let mutation = handler.delete_certificate(&domain).await?;
            warn_unreconciled(&mutation.reconcile);
            let deletion = mutation.value;
            if let CleanupStatus::Failed(reason) = &deletion.file_cleanup {
                eprintln!(
                    "Warning: record deleted, but certificate files were not removed: {}",
                    reason
                );
            }
            if !quiet {
                eprintln!(
                    "Deleted certificate for {} ({} host(s) detached)",
                    deletion.certificate.domain,
                    deletion.detached_hosts.len()
                );
            }
        }
    }

    Ok(())
}
