//! Shared test harness for storage backends
//!
//! Generic test functions that verify a backend honors the storage traits.
//! Every test uses its own domains, so the suites can share one database.
//!
//! # Usage
//!
//! ```ignore
//! use proxy_manager_storage::backends::sqlite::SqliteStorage;
//!
//! #[tokio::test]
//! async fn sqlite_passes_all_tests() {
//!     let storage = SqliteStorage::new(":memory:").await.unwrap();
//!     storage.initialize().await.unwrap();
//!     common::run_all_tests(&storage).await;
//! }
//! ```

pub mod certificate_store_tests;
pub mod host_store_tests;

use proxy_manager_storage::Storage;

/// Run all storage trait tests
pub async fn run_all_tests<S: Storage>(storage: &S) {
    println!("Running HostStore tests...");
    host_store_tests::run_all(storage).await;

    println!("Running CertificateStore tests...");
    certificate_store_tests::run_all(storage).await;

    println!("All storage tests passed!");
}

/// Run only HostStore trait tests
pub async fn run_host_store_tests<S: Storage>(storage: &S) {
    host_store_tests::run_all(storage).await;
}

/// Run only CertificateStore trait tests
pub async fn run_certificate_store_tests<S: Storage>(storage: &S) {
    certificate_store_tests::run_all(storage).await;
}
