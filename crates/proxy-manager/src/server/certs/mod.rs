//! TLS certificate lifecycle
//!
//! - `authority`: the agent trait plus the shared command runner
//! - `certbot` / `self_signed`: the two agents
//! - `manager`: request, renew and delete with per-domain locking
//! - `renewal`: the daily background pass

pub mod authority;
pub mod cert_writer;
pub mod certbot;
pub mod expiry;
pub mod locks;
pub mod manager;
pub mod renewal;
pub mod self_signed;

pub use authority::{ArtifactPaths, Authorities, AuthorityError, CertificateAuthority};
pub use certbot::Certbot;
pub use manager::{
    CertificateDeletion, CertificateError, CertificateManager, CleanupStatus, RenewOutcome,
};
pub use renewal::{RenewalHandle, RenewalLoop, RenewalPass};
pub use self_signed::SelfSignedAuthority;
