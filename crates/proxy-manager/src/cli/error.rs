use crate::server::commands::CommandError;

/// Exit codes following Unix conventions
pub const EXIT_ERROR: i32 = 1;
pub const EXIT_USAGE: i32 = 2;
pub const EXIT_CONFLICT: i32 = 3;

/// Convert a command error to a user-friendly message
pub fn format_command_error(err: &CommandError) -> String {
    match err {
        CommandError::Validation(msg) => format!("Invalid input: {}", msg),
        CommandError::NotFound(msg) => format!("Not found: {}", msg),
        CommandError::Conflict(msg) => format!("Already exists: {}", msg),
        CommandError::CertificateIssuance(msg) => format!("Certificate issuance failed: {}", msg),
        CommandError::CertificateArtifactMissing(msg) => {
            format!("Certificate files missing: {}", msg)
        }
        CommandError::Storage(e) => format!("Storage error: {}", e),
        CommandError::Internal(msg) => format!("Internal error: {}", msg),
    }
}

pub fn exit_code_for_error(err: &CommandError) -> i32 {
    match err {
        CommandError::Validation(_) => EXIT_USAGE,
        CommandError::Conflict(_) => EXIT_CONFLICT,
        _ => EXIT_ERROR,
    }
}
