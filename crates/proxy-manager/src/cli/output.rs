use crate::server::proxy::ReconcileReport;
use chrono::Utc;
use proxy_manager_storage::{Certificate, ProxyHost};
use serde::Serialize;
use std::io::{self, Write};

use super::OutputFormat;

/// Trait for types that can be displayed in table format
pub trait TableDisplay {
    fn headers() -> Vec<&'static str>;
    fn row(&self) -> Vec<String>;
}

impl TableDisplay for ProxyHost {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "DOMAIN", "TARGET", "ENABLED", "SSL", "CERT"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.domain.clone(),
            self.target_url.clone(),
            yes_no(self.enabled),
            yes_no(self.ssl_enabled),
            self.certificate_id
                .map(|id| id.to_string())
                .unwrap_or_default(),
        ]
    }
}

impl TableDisplay for Certificate {
    fn headers() -> Vec<&'static str> {
        vec!["ID", "DOMAIN", "PROVIDER", "EXPIRES", "DAYS LEFT"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.id.to_string(),
            self.domain.clone(),
            self.provider.to_string(),
            self.expires_at.format("%Y-%m-%d %H:%M").to_string(),
            self.days_until_expiry(Utc::now()).to_string(),
        ]
    }
}

impl TableDisplay for ReconcileReport {
    fn headers() -> Vec<&'static str> {
        vec!["HOSTS", "CHANGED", "RELOADED", "FORCED"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.host_count.to_string(),
            yes_no(self.changed),
            yes_no(self.reloaded),
            yes_no(self.forced),
        ]
    }
}

fn yes_no(value: bool) -> String {
    if value { "yes" } else { "no" }.to_string()
}

/// Print items in the specified format
pub fn print_items<T>(items: &[T], format: OutputFormat)
where
    T: TableDisplay + Serialize,
{
    let stdout = io::stdout();
    if let Err(e) = write_items(&mut stdout.lock(), items, format) {
        eprintln!("Error writing output: {}", e);
    }
}

/// Print a single item
pub fn print_item<T>(item: &T, format: OutputFormat)
where
    T: TableDisplay + Serialize,
{
    print_items(std::slice::from_ref(item), format);
}

pub fn write_items<T, W>(out: &mut W, items: &[T], format: OutputFormat) -> io::Result<()>
where
    T: TableDisplay + Serialize,
    W: Write,
{
    match format {
        OutputFormat::Table => write_table(out, items),
        OutputFormat::Json => write_json(out, items),
        OutputFormat::Csv => write_csv(out, items),
    }
}

fn write_table<T: TableDisplay, W: Write>(out: &mut W, items: &[T]) -> io::Result<()> {
    if items.is_empty() {
        return Ok(());
    }

    let headers = T::headers();
    let rows: Vec<Vec<String>> = items.iter().map(|i| i.row()).collect();

    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in &rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let header_line: Vec<String> = headers
        .iter()
        .enumerate()
        .map(|(i, h)| format!("{:width$}", h, width = widths[i]))
        .collect();
    writeln!(out, "{}", header_line.join("  ").trim_end())?;

    for row in rows {
        let line: Vec<String> = row
            .iter()
            .enumerate()
            .map(|(i, cell)| {
                let width = widths.get(i).copied().unwrap_or(0);
                format!("{:width$}", cell, width = width)
            })
            .collect();
        writeln!(out, "{}", line.join("  ").trim_end())?;
    }
    Ok(())
}

fn write_json<T: Serialize, W: Write>(out: &mut W, items: &[T]) -> io::Result<()> {
    serde_json::to_writer_pretty(&mut *out, items)?;
    writeln!(out)
}

fn write_csv<T: TableDisplay, W: Write>(out: &mut W, items: &[T]) -> io::Result<()> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(T::headers())?;
    for item in items {
        writer.write_record(item.row())?;
    }
    writer.flush()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{certificate, host};

    fn render<T: TableDisplay + Serialize>(items: &[T], format: OutputFormat) -> String {
        let mut buf = Vec::new();
        write_items(&mut buf, items, format).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn test_host_row() {
        let mut h = host(3, "app.example.com", "http://127.0.0.1:3000");
        h.ssl_enabled = true;
        h.certificate_id = Some(9);

        let row = h.row();
        assert_eq!(row[0], "3");
        assert_eq!(row[1], "app.example.com");
        assert_eq!(row[2], "http://127.0.0.1:3000");
        assert_eq!(row[3], "yes");
        assert_eq!(row[4], "yes");
        assert_eq!(row[5], "9");
    }

    #[test]
    fn test_host_row_without_certificate() {
        let row = host(1, "a.test", "http://localhost").row();
        assert_eq!(row[4], "no");
        assert_eq!(row[5], "");
    }

    #[test]
    fn test_certificate_row() {
        let cert = certificate(2, "b.test", "/etc/letsencrypt/live/b.test");
        let row = cert.row();
        assert_eq!(row[1], "b.test");
        assert_eq!(row[2], "letsencrypt");
        // 90 days minus the few microseconds since construction
        assert_eq!(row[4], "89");
    }

    #[test]
    fn test_table_aligns_columns() {
        let hosts = vec![
            host(1, "a.test", "http://localhost:1"),
            host(22, "longer.example.test", "http://localhost:2"),
        ];
        let out = render(&hosts, OutputFormat::Table);
        let lines: Vec<&str> = out.lines().collect();

        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("ID  DOMAIN"));
        let col = lines[0].find("TARGET").unwrap();
        assert_eq!(&lines[1][col..col + 18], "http://localhost:1");
        assert_eq!(&lines[2][col..col + 18], "http://localhost:2");
    }

    #[test]
    fn test_empty_table_prints_nothing() {
        let hosts: Vec<ProxyHost> = Vec::new();
        assert_eq!(render(&hosts, OutputFormat::Table), "");
    }

    #[test]
    fn test_json_output() {
        let out = render(&[host(1, "a.test", "http://localhost")], OutputFormat::Json);
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed[0]["domain"], "a.test");
        assert_eq!(parsed[0]["enabled"], true);
    }

    #[test]
    fn test_csv_escaping() {
        let h = host(1, "a.test", "http://localhost/a,b");
        let out = render(&[h], OutputFormat::Csv);
        let mut lines = out.lines();
        assert_eq!(lines.next(), Some("ID,DOMAIN,TARGET,ENABLED,SSL,CERT"));
        assert_eq!(lines.next(), Some("1,a.test,\"http://localhost/a,b\",yes,no,"));
    }
}
