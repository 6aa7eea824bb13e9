use regex::Regex;
use std::sync::LazyLock;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Invalid domain: {0}")]
    InvalidDomain(String),

    #[error("Invalid target URL: {0}")]
    InvalidTargetUrl(String),
}

pub type ValidationResult<T> = Result<T, ValidationError>;

// DNS label regex: alphanumeric and hyphens, 1-63 chars, no leading/trailing hyphen
static LABEL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?$").unwrap());

/// Characters that would let a value escape its directive in the generated
/// proxy configuration.
const CONFIG_METACHARACTERS: &[char] = &[';', '{', '}', '"', '\'', '$', '\\', '#'];

/// Lower-case and trim a domain without validating it.
pub fn normalize_domain(domain: &str) -> String {
    domain.trim().to_ascii_lowercase()
}

/// Validates a DNS domain and returns its normalized (lower-case) form.
///
/// Rules:
/// - Total length: 1-253 characters (RFC 1035)
/// - Labels separated by dots
/// - Each label: 1-63 chars, alphanumeric and hyphens
/// - Cannot start or end with hyphen
/// - Cannot start or end with dot
pub fn validate_domain(domain: &str) -> ValidationResult<String> {
    let domain = normalize_domain(domain);

    if domain.is_empty() {
        return Err(ValidationError::InvalidDomain(
            "domain cannot be empty".to_string(),
        ));
    }

    if domain.len() > 253 {
        return Err(ValidationError::InvalidDomain(
            "domain exceeds maximum length of 253 characters".to_string(),
        ));
    }

    if domain.starts_with('.') || domain.ends_with('.') {
        return Err(ValidationError::InvalidDomain(
            "domain cannot start or end with dot".to_string(),
        ));
    }

    if domain.starts_with('-') || domain.ends_with('-') {
        return Err(ValidationError::InvalidDomain(
            "domain cannot start or end with hyphen".to_string(),
        ));
    }

    for label in domain.split('.') {
        if !LABEL_REGEX.is_match(label) {
            return Err(ValidationError::InvalidDomain(format!(
                "invalid label '{}' in domain",
                label
            )));
        }
    }

    Ok(domain)
}

/// Validates an upstream target URL.
///
/// The URL must be absolute `http` or `https` with a host. The trimmed input
/// is returned as given (not re-serialized) because a trailing slash changes
/// how the proxy rewrites request paths.
pub fn validate_target_url(target: &str) -> ValidationResult<String> {
    let target = target.trim();

    if target.is_empty() {
        return Err(ValidationError::InvalidTargetUrl(
            "target URL cannot be empty".to_string(),
        ));
    }

    if target.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::InvalidTargetUrl(format!(
            "'{}' contains whitespace",
            target
        )));
    }

    if let Some(c) = target.chars().find(|c| CONFIG_METACHARACTERS.contains(c)) {
        return Err(ValidationError::InvalidTargetUrl(format!(
            "'{}' contains forbidden character '{}'",
            target, c
        )));
    }

    let parsed = Url::parse(target)
        .map_err(|e| ValidationError::InvalidTargetUrl(format!("'{}': {}", target, e)))?;

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return Err(ValidationError::InvalidTargetUrl(format!(
                "unsupported scheme '{}' (expected http or https)",
                other
            )))
        }
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return Err(ValidationError::InvalidTargetUrl(format!(
            "'{}' has no host",
            target
        )));
    }

    Ok(target.to_string())
}
