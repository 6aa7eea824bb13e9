use anyhow::Result;
use proxy_manager_storage::{NewProxyHost, ProxyHostUpdate};

use super::warn_unreconciled;
use crate::cli::{
    output::{print_item, print_items},
    HostCommand, OutputFormat,
};
use crate::server::commands::CommandHandler;

pub async fn handle(
    handler: &CommandHandler,
    command: HostCommand,
    format: OutputFormat,
    quiet: bool,
) -> Result<()> {
    match command {
        HostCommand::List => {
            let hosts = handler.list_hosts().await?;
            print_items(&hosts, format);
        }

        HostCommand::Get { id } => {
            let host = handler.get_host(id).await?;
            print_item(&host, format);
        }

        HostCommand::Add {
            domain,
            target,
            ssl,
            certificate_id,
            disabled,
        } => {
            let new = NewProxyHost {
                enabled: !disabled,
                ssl_enabled: ssl,
                certificate_id,
                ..NewProxyHost::new(domain, target)
            };
            let mutation = handler.create_host(new).await?;
            warn_unreconciled(&mutation.reconcile);
            if !quiet {
                print_item(&mutation.value, format);
            }
        }

        HostCommand::Update {
            id,
            domain,
            target,
            enable,
            disable,
            ssl,
            certificate_id,
            clear_certificate,
        } => {
            let update = ProxyHostUpdate {
                domain,
                target_url: target,
                enabled: toggle(enable, disable),
                ssl_enabled: ssl,
                certificate_id: if clear_certificate {
                    Some(None)
                } else {
                    certificate_id.map(Some)
                },
            };
            if update.is_empty() {
                anyhow::bail!("nothing to update");
            }
            let mutation = handler.update_host(id, update).await?;
            warn_unreconciled(&mutation.reconcile);
            if !quiet {
                print_item(&mutation.value, format);
            }
        }

        HostCommand::Delete { id } => {
            let mutation = handler.delete_host(id).await?;
            warn_unreconciled(&mutation.reconcile);
            if !quiet {
                eprintln!("Deleted {} ({})", mutation.value.domain, id);
            }
        }
    }

    Ok(())
}

fn toggle(on: bool, off: bool) -> Option<bool> {
    match (on, off) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}
