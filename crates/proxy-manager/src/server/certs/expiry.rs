//! Certificate expiry from PEM chains

use chrono::{DateTime, Duration, Utc};
use std::path::Path;

/// Assumed lifetime when no exact expiry can be determined
pub const ESTIMATED_LIFETIME_DAYS: i64 = 90;

/// Expiry (`notAfter`) of the leaf certificate in a PEM chain
///
/// Only the first certificate is read; intermediates outlive the leaf.
pub fn parse_chain_expiry(pem_bytes: &[u8]) -> Result<DateTime<Utc>, String> {
    let (_, pem) = x509_parser::pem::parse_x509_pem(pem_bytes)
        .map_err(|e| format!("failed to parse PEM: {:?}", e))?;

    let cert = pem
        .parse_x509()
        .map_err(|e| format!("failed to parse X509: {:?}", e))?;

    let not_after = cert.validity().not_after.timestamp();
    DateTime::<Utc>::from_timestamp(not_after, 0)
        .ok_or_else(|| format!("certificate expiry out of range: {}", not_after))
}

pub async fn read_chain_expiry(path: &Path) -> Result<DateTime<Utc>, String> {
    let pem = tokio::fs::read(path)
        .await
        .map_err(|e| format!("failed to read {}: {}", path.display(), e))?;
    parse_chain_expiry(&pem)
}

pub fn estimated_expiry(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::days(ESTIMATED_LIFETIME_DAYS)
}
