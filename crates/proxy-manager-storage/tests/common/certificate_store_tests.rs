//! CertificateStore trait test suite

use chrono::{Duration, Utc};
use proxy_manager_storage::{
    Certificate, CertificateProvider, NewCertificate, Storage, StorageError,
};
use std::path::{Path, PathBuf};

/// Run all CertificateStore tests
pub async fn run_all<S: Storage>(storage: &S) {
    test_create_and_get(storage).await;
    test_get_by_domain(storage).await;
    test_duplicate_domain_rejected(storage).await;
    test_list_sorted_by_domain(storage).await;
    test_update_expiry(storage).await;
    test_update_expiry_missing(storage).await;
    test_delete(storage).await;
}

async fn create<S: Storage>(
    storage: &S,
    domain: &str,
    provider: CertificateProvider,
) -> Result<Certificate, StorageError> {
    let dir = PathBuf::from("/etc/letsencrypt/live").join(domain);
    storage
        .create_certificate(
            NewCertificate {
                domain: domain.to_string(),
                provider,
            },
            &dir.join("fullchain.pem"),
            &dir.join("privkey.pem"),
            Utc::now() + Duration::days(90),
        )
        .await
}

pub async fn test_create_and_get<S: Storage>(storage: &S) {
    let created = create(storage, "create.certs.test", CertificateProvider::LetsEncrypt)
        .await
        .expect("create should succeed");

    assert!(created.id > 0);
    assert_eq!(created.provider, CertificateProvider::LetsEncrypt);
    assert_eq!(
        created.cert_path,
        Path::new("/etc/letsencrypt/live/create.certs.test/fullchain.pem")
    );
    assert_eq!(created.days_until_expiry(Utc::now()), 89);

    let fetched = storage
        .get_certificate(created.id)
        .await
        .unwrap()
        .expect("certificate should exist");
    assert_eq!(fetched, created);

    assert!(storage.get_certificate(i64::MAX).await.unwrap().is_none());
}

pub async fn test_get_by_domain<S: Storage>(storage: &S) {
    let created = create(storage, "lookup.certs.test", CertificateProvider::SelfSigned)
        .await
        .unwrap();

    let found = storage
        .get_certificate_by_domain("lookup.certs.test")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, created.id);
    assert_eq!(found.provider, CertificateProvider::SelfSigned);

    assert!(storage
        .get_certificate_by_domain("missing.certs.test")
        .await
        .unwrap()
        .is_none());
}

pub async fn test_duplicate_domain_rejected<S: Storage>(storage: &S) {
    create(storage, "dup.certs.test", CertificateProvider::LetsEncrypt)
        .await
        .unwrap();

    let err = create(storage, "dup.certs.test", CertificateProvider::SelfSigned)
        .await
        .expect_err("second certificate for a domain must fail");
    assert!(matches!(
        err,
        StorageError::DuplicateDomain {
            entity_type: "certificate",
            ..
        }
    ));
}

pub async fn test_list_sorted_by_domain<S: Storage>(storage: &S) {
    for domain in ["c.sorted.certs.test", "a.sorted.certs.test", "b.sorted.certs.test"] {
        create(storage, domain, CertificateProvider::LetsEncrypt)
            .await
            .unwrap();
    }

    let domains: Vec<String> = storage
        .list_certificates()
        .await
        .unwrap()
        .into_iter()
        .map(|c| c.domain)
        .filter(|d| d.ends_with(".sorted.certs.test"))
        .collect();
    assert_eq!(
        domains,
        vec![
            "a.sorted.certs.test",
            "b.sorted.certs.test",
            "c.sorted.certs.test"
        ]
    );
}

pub async fn test_update_expiry<S: Storage>(storage: &S) {
    let created = create(storage, "renew.certs.test", CertificateProvider::LetsEncrypt)
        .await
        .unwrap();

    let new_expiry = Utc::now() + Duration::days(180);
    let updated = storage
        .update_certificate_expiry(created.id, new_expiry)
        .await
        .unwrap();

    assert_eq!(updated.id, created.id);
    assert_eq!(updated.expires_at.timestamp(), new_expiry.timestamp());
    assert_eq!(updated.created_at, created.created_at);
}

pub async fn test_update_expiry_missing<S: Storage>(storage: &S) {
    let err = storage
        .update_certificate_expiry(i64::MAX, Utc::now())
        .await
        .expect_err("missing certificate must fail");
    assert!(matches!(err, StorageError::NotFound { .. }));
}

pub async fn test_delete<S: Storage>(storage: &S) {
    let created = create(storage, "delete.certs.test", CertificateProvider::LetsEncrypt)
        .await
        .unwrap();

    assert!(storage.delete_certificate(created.id).await.unwrap());
    assert!(storage.get_certificate(created.id).await.unwrap().is_none());
    assert!(!storage.delete_certificate(created.id).await.unwrap());
}
