//! nginx configuration synthesis
//!
//! Pure function of the host and certificate records: no clock, no store
//! access. Identical records render byte-identical output, which is what lets
//! the reconciler skip a reload when nothing changed.

use proxy_manager_storage::{Certificate, CertificateId, ProxyHost};
use std::collections::HashMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};

const HEADER: &str = "# Managed by proxy-manager. Manual edits are overwritten.\n";

/// Backs `Connection $connection_upgrade` in every proxy location
const UPGRADE_MAP: &str = "\nmap $http_upgrade $connection_upgrade {\n    default upgrade;\n    ''      close;\n}\n";

/// Renders proxy host records into an nginx `server` block set
#[derive(Debug, Clone)]
pub struct ConfigSynthesizer {
    webroot: PathBuf,
}

impl ConfigSynthesizer {
    /// `webroot` is served at `/.well-known/acme-challenge/` on every port-80 block
    pub fn new(webroot: impl Into<PathBuf>) -> Self {
        Self {
            webroot: webroot.into(),
        }
    }

    pub fn webroot(&self) -> &Path {
        &self.webroot
    }

    /// Render using the real filesystem to check certificate files
    pub fn render(&self, hosts: &[ProxyHost], certificates: &[Certificate]) -> String {
        self.render_with(hosts, certificates, |path| path.is_file())
    }

    /// Render with an explicit file-existence predicate
    pub fn render_with<F>(
        &self,
        hosts: &[ProxyHost],
        certificates: &[Certificate],
        exists: F,
    ) -> String
    where
        F: Fn(&Path) -> bool,
    {
        let certs_by_id: HashMap<CertificateId, &Certificate> =
            certificates.iter().map(|c| (c.id, c)).collect();

        let mut enabled: Vec<&ProxyHost> = hosts.iter().filter(|h| h.enabled).collect();
        enabled.sort_by(|a, b| a.domain.cmp(&b.domain).then(a.id.cmp(&b.id)));

        let mut out = String::from(HEADER);
        if enabled.is_empty() {
            out.push_str("# No enabled proxy hosts.\n");
            return out;
        }
        out.push_str(UPGRADE_MAP);

        for host in enabled {
            out.push('\n');
            match usable_certificate(host, &certs_by_id, &exists) {
                Some(cert) => self.write_tls_blocks(&mut out, host, cert),
                None => self.write_plain_block(&mut out, host),
            }
        }

        out
    }

    // `write!` into a String cannot fail
    fn write_plain_block(&self, out: &mut String, host: &ProxyHost) {
        let _ = writeln!(out, "# {} (id {})", host.domain, host.id);
        out.push_str("server {\n");
        out.push_str("    listen 80;\n");
        out.push_str("    listen [::]:80;\n");
        let _ = writeln!(out, "    server_name {};", host.domain);
        out.push('\n');
        self.write_acme_location(out);
        out.push('\n');
        write_proxy_location(out, &host.target_url);
        out.push_str("}\n");
    }

    fn write_tls_blocks(&self, out: &mut String, host: &ProxyHost, cert: &Certificate) {
        let _ = writeln!(out, "# {} (id {}, certificate {})", host.domain, host.id, cert.id);
        out.push_str("server {\n");
        out.push_str("    listen 80;\n");
        out.push_str("    listen [::]:80;\n");
        let _ = writeln!(out, "    server_name {};", host.domain);
        out.push('\n');
        self.write_acme_location(out);
        out.push('\n');
        out.push_str("    location / {\n");
        out.push_str("        return 301 https://$host$request_uri;\n");
        out.push_str("    }\n");
        out.push_str("}\n\n");

        out.push_str("server {\n");
        out.push_str("    listen 443 ssl;\n");
        out.push_str("    listen [::]:443 ssl;\n");
        let _ = writeln!(out, "    server_name {};", host.domain);
        out.push('\n');
        let _ = writeln!(out, "    ssl_certificate {};", cert.cert_path.display());
        let _ = writeln!(out, "    ssl_certificate_key {};", cert.key_path.display());
        out.push_str("    ssl_protocols TLSv1.2 TLSv1.3;\n");
        out.push('\n');
        write_proxy_location(out, &host.target_url);
        out.push_str("}\n");
    }

    fn write_acme_location(&self, out: &mut String) {
        out.push_str("    location /.well-known/acme-challenge/ {\n");
        let _ = writeln!(out, "        root {};", self.webroot.display());
        out.push_str("    }\n");
    }
}

/// The certificate a host may terminate TLS with, if any
///
/// An unresolved reference or missing key material degrades to plain HTTP.
fn usable_certificate<'a, F>(
    host: &ProxyHost,
    certs_by_id: &HashMap<CertificateId, &'a Certificate>,
    exists: &F,
) -> Option<&'a Certificate>
where
    F: Fn(&Path) -> bool,
{
    if !host.ssl_enabled {
        return None;
    }
    let cert = certs_by_id.get(&host.certificate_id?)?;
    (exists(&cert.cert_path) && exists(&cert.key_path)).then_some(*cert)
}

fn write_proxy_location(out: &mut String, target_url: &str) {
    out.push_str("    location / {\n");
    let _ = writeln!(out, "        proxy_pass {};", target_url);
    out.push_str("        proxy_http_version 1.1;\n");
    out.push_str("        proxy_set_header Host $host;\n");
    out.push_str("        proxy_set_header X-Real-IP $remote_addr;\n");
    out.push_str("        proxy_set_header X-Forwarded-For $proxy_add_x_forwarded_for;\n");
    out.push_str("        proxy_set_header X-Forwarded-Proto $scheme;\n");
    out.push_str("        proxy_set_header Upgrade $http_upgrade;\n");
    out.push_str("        proxy_set_header Connection $connection_upgrade;\n");
    out.push_str("    }\n");
}
