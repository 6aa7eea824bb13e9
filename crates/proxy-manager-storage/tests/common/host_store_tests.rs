//! HostStore trait test suite

use chrono::{Duration, Utc};
use proxy_manager_storage::{
    CertificateProvider, NewCertificate, NewProxyHost, ProxyHostUpdate, Storage, StorageError,
};
use std::path::Path;

/// Run all HostStore tests
pub async fn run_all<S: Storage>(storage: &S) {
    test_create_and_get(storage).await;
    test_get_missing_returns_none(storage).await;
    test_get_by_domain(storage).await;
    test_duplicate_domain_rejected(storage).await;
    test_list_sorted_by_domain(storage).await;
    test_partial_update(storage).await;
    test_empty_update_keeps_timestamp(storage).await;
    test_update_to_taken_domain_rejected(storage).await;
    test_update_missing_returns_none(storage).await;
    test_clear_certificate_reference(storage).await;
    test_delete(storage).await;
    test_detach_certificate(storage).await;
}

pub async fn test_create_and_get<S: Storage>(storage: &S) {
    let created = storage
        .create_host(NewProxyHost::new("create.hosts.test", "http://localhost:9000"))
        .await
        .expect("create should succeed");

    assert!(created.id > 0);
    assert!(created.enabled);
    assert!(!created.ssl_enabled);
    assert_eq!(created.certificate_id, None);
    assert_eq!(created.created_at, created.updated_at);

    let fetched = storage
        .get_host(created.id)
        .await
        .expect("get should succeed")
        .expect("host should exist");
    assert_eq!(fetched, created);
}

pub async fn test_get_missing_returns_none<S: Storage>(storage: &S) {
    let result = storage.get_host(i64::MAX).await.expect("get should succeed");
    assert!(result.is_none());
}

pub async fn test_get_by_domain<S: Storage>(storage: &S) {
    let created = storage
        .create_host(NewProxyHost::new("by-domain.hosts.test", "http://10.0.0.2:80"))
        .await
        .unwrap();

    let found = storage
        .get_host_by_domain("by-domain.hosts.test")
        .await
        .unwrap()
        .expect("lookup by domain should find the host");
    assert_eq!(found.id, created.id);

    assert!(storage
        .get_host_by_domain("absent.hosts.test")
        .await
        .unwrap()
        .is_none());
}

pub async fn test_duplicate_domain_rejected<S: Storage>(storage: &S) {
    storage
        .create_host(NewProxyHost::new("dup.hosts.test", "http://localhost:1"))
        .await
        .unwrap();

    let err = storage
        .create_host(NewProxyHost::new("dup.hosts.test", "http://localhost:2"))
        .await
        .expect_err("second host with the same domain must fail");

    match err {
        StorageError::DuplicateDomain {
            entity_type,
            domain,
        } => {
            assert_eq!(entity_type, "proxy host");
            assert_eq!(domain, "dup.hosts.test");
        }
        other => panic!("expected DuplicateDomain, got {:?}", other),
    }
}

pub async fn test_list_sorted_by_domain<S: Storage>(storage: &S) {
    for domain in ["zz.sort.test", "aa.sort.test", "mm.sort.test"] {
        storage
            .create_host(NewProxyHost::new(domain, "http://localhost:9000"))
            .await
            .unwrap();
    }

    let domains: Vec<String> = storage
        .list_hosts()
        .await
        .unwrap()
        .into_iter()
        .map(|h| h.domain)
        .filter(|d| d.ends_with(".sort.test"))
        .collect();
    assert_eq!(domains, vec!["aa.sort.test", "mm.sort.test", "zz.sort.test"]);
}

pub async fn test_partial_update<S: Storage>(storage: &S) {
    let created = storage
        .create_host(NewProxyHost::new("update.hosts.test", "http://localhost:9000"))
        .await
        .unwrap();

    tokio::time::sleep(std::time::Duration::from_millis(5)).await;

    let updated = storage
        .update_host(
            created.id,
            ProxyHostUpdate {
                target_url: Some("http://localhost:9001".to_string()),
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .expect("host should exist");

    assert_eq!(updated.domain, "update.hosts.test");
    assert_eq!(updated.target_url, "http://localhost:9001");
    assert!(!updated.enabled);
    assert_eq!(updated.created_at, created.created_at);
    assert!(updated.updated_at > created.updated_at);

    let fetched = storage.get_host(created.id).await.unwrap().unwrap();
    assert_eq!(fetched, updated);
}

pub async fn test_empty_update_keeps_timestamp<S: Storage>(storage: &S) {
    let created = storage
        .create_host(NewProxyHost::new("noop.hosts.test", "http://localhost:9000"))
        .await
        .unwrap();

    let same = storage
        .update_host(created.id, ProxyHostUpdate::default())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(same, created);
}

pub async fn test_update_to_taken_domain_rejected<S: Storage>(storage: &S) {
    storage
        .create_host(NewProxyHost::new("taken.hosts.test", "http://localhost:1"))
        .await
        .unwrap();
    let other = storage
        .create_host(NewProxyHost::new("mover.hosts.test", "http://localhost:2"))
        .await
        .unwrap();

    let err = storage
        .update_host(
            other.id,
            ProxyHostUpdate {
                domain: Some("taken.hosts.test".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect_err("renaming onto an existing domain must fail");
    assert!(err.is_duplicate());

    let unchanged = storage.get_host(other.id).await.unwrap().unwrap();
    assert_eq!(unchanged.domain, "mover.hosts.test");
}

pub async fn test_update_missing_returns_none<S: Storage>(storage: &S) {
    let result = storage
        .update_host(
            i64::MAX,
            ProxyHostUpdate {
                enabled: Some(false),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert!(result.is_none());
}

async fn create_cert<S: Storage>(storage: &S, domain: &str) -> i64 {
    storage
        .create_certificate(
            NewCertificate {
                domain: domain.to_string(),
                provider: CertificateProvider::SelfSigned,
            },
            Path::new("/tmp/proxy-manager-tests/fullchain.pem"),
            Path::new("/tmp/proxy-manager-tests/privkey.pem"),
            Utc::now() + Duration::days(90),
        )
        .await
        .expect("create certificate should succeed")
        .id
}

pub async fn test_clear_certificate_reference<S: Storage>(storage: &S) {
    let cert_id = create_cert(storage, "clear-ref.hosts.test").await;
    let host = storage
        .create_host(NewProxyHost {
            ssl_enabled: true,
            certificate_id: Some(cert_id),
            ..NewProxyHost::new("clear-ref.hosts.test", "http://localhost:9000")
        })
        .await
        .unwrap();
    assert_eq!(host.certificate_id, Some(cert_id));

    let updated = storage
        .update_host(
            host.id,
            ProxyHostUpdate {
                certificate_id: Some(None),
                ..Default::default()
            },
        )
        .await
        .unwrap()
        .unwrap();
    assert_eq!(updated.certificate_id, None);
    assert!(updated.ssl_enabled);
}

pub async fn test_delete<S: Storage>(storage: &S) {
    let host = storage
        .create_host(NewProxyHost::new("delete.hosts.test", "http://localhost:9000"))
        .await
        .unwrap();

    assert!(storage.delete_host(host.id).await.unwrap());
    assert!(storage.get_host(host.id).await.unwrap().is_none());
    assert!(!storage.delete_host(host.id).await.unwrap());
}

pub async fn test_detach_certificate<S: Storage>(storage: &S) {
    let cert_id = create_cert(storage, "detach.hosts.test").await;

    let mut attached = Vec::new();
    for domain in ["detach.hosts.test", "www.detach.hosts.test"] {
        let host = storage
            .create_host(NewProxyHost {
                ssl_enabled: true,
                certificate_id: Some(cert_id),
                ..NewProxyHost::new(domain, "http://localhost:9000")
            })
            .await
            .unwrap();
        attached.push(host.id);
    }
    let bystander = storage
        .create_host(NewProxyHost::new("bystander.hosts.test", "http://localhost:9000"))
        .await
        .unwrap();

    let detached = storage.detach_certificate(cert_id).await.unwrap();
    assert_eq!(detached, attached);

    for id in attached {
        let host = storage.get_host(id).await.unwrap().unwrap();
        assert_eq!(host.certificate_id, None);
        assert!(host.ssl_enabled, "ssl flag is left as configured");
    }
    let bystander = storage.get_host(bystander.id).await.unwrap().unwrap();
    assert_eq!(bystander.certificate_id, None);

    // Nothing left to detach
    assert!(storage.detach_certificate(cert_id).await.unwrap().is_empty());
}
