//! Secure value store against PostgreSQL.
//!
//! Requires `STRONGBOX_TEST_POSTGRES_URL` and
//! `cargo test --features postgres_tests`. Every test works in its own
//! namespace so runs against a shared database do not collide.

#![cfg(feature = "postgres_tests")]

mod common;

use common::{cx, secure_value, test_store};
use strongbox::config::DatabaseConfig;
use strongbox::domain::{HistoryOperation, SecureValue};
use strongbox::errors::ErrorKind;
use strongbox::storage::{create_pool, get_migration_version, validate_migrations, Database};
use strongbox::store::{ListOptions, SecureValueStore};

async fn postgres() -> Database {
    let url = std::env::var("STRONGBOX_TEST_POSTGRES_URL")
        .expect("STRONGBOX_TEST_POSTGRES_URL must be set for postgres tests");
    let config = DatabaseConfig {
        url,
        max_connections: 5,
        min_connections: 0,
        auto_migrate: true,
        ..Default::default()
    };
    create_pool(&config).await.expect("connect to postgres")
}

fn scoped(namespace: &str, mut object: SecureValue) -> SecureValue {
    object.metadata.namespace = namespace.to_string();
    object
}

fn unique_namespace() -> String {
    format!("pg-{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
}

#[tokio::test]
async fn migrations_apply_on_postgres() {
    let database = postgres().await;
    assert!(validate_migrations(&database).await.unwrap());
    assert_eq!(get_migration_version(&database).await.unwrap(), 20250101000002);
}

#[tokio::test]
async fn lifecycle_on_postgres() {
    let store = test_store(postgres().await);
    let ns = unique_namespace();
    let alice = cx("alice");

    let created = store
        .create(&alice, scoped(&ns, secure_value("pg-secret", "pg-value", &["alice"])))
        .await
        .unwrap();

    let err = store
        .create(&alice, scoped(&ns, secure_value("pg-secret", "again", &[])))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let mut changed = created.clone();
    changed.spec.value = Some("rotated".into());
    let updated = store.update(&alice, changed).await.unwrap();
    assert!(
        updated.metadata.resource_version.parse::<i64>().unwrap()
            > created.metadata.resource_version.parse::<i64>().unwrap()
    );

    let err = store.update(&alice, created).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Conflict);

    let decrypted = store.decrypt(&alice, &ns, "pg-secret").await.unwrap();
    assert_eq!(decrypted.spec.value.as_ref().map(|v| v.expose()), Some("rotated"));

    let listed = store.list(&alice, &ns, &ListOptions::default()).await.unwrap();
    assert_eq!(listed.len(), 1);

    store.delete(&alice, &ns, "pg-secret").await.unwrap();
    assert_eq!(store.read(&alice, &ns, "pg-secret").await.unwrap_err().kind(), ErrorKind::NotFound);

    let history = store.history(&alice, &ns, "pg-secret", None).await.unwrap();
    let operations: Vec<HistoryOperation> = history.items.iter().map(|r| r.operation).collect();
    assert_eq!(
        operations,
        vec![HistoryOperation::Delete, HistoryOperation::Update, HistoryOperation::Create]
    );
}
