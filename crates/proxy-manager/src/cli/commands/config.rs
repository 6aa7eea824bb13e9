use std::path::Path;

use crate::server::config::Config;

pub fn show(config: &Config, source: Option<&Path>) {
    match source {
        Some(path) => println!("Config file: {}", path.display()),
        None => println!("Config file: (defaults)"),
    }
    println!("Database: {}", config.database.url);
    println!("Proxy config: {}", config.proxy.config_path.display());
    if let Some(validate) = &config.proxy.validate_command {
        println!("Validate command: {}", validate);
    }
    println!("Reload command: {}", config.proxy.reload_command);
    println!("Webroot: {}", config.acme.webroot.display());
    println!("Certbot: {}", config.acme.certbot_path.display());
    println!("Certbot config dir: {}", config.acme.config_dir.display());
    println!("Self-signed dir: {}", config.acme.self_signed_dir.display());
    if config.renewal.enabled {
        println!(
            "Renewal: {} days before expiry",
            config.renewal.days_before_expiry
        );
    } else {
        println!("Renewal: disabled");
    }
}
