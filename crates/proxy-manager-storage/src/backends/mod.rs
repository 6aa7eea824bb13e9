//! Storage backend implementations
//!
//! At least one backend must be enabled via feature flags.

#[cfg(feature = "sqlite")]
pub mod sqlite;
