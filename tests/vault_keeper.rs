//! Vault transit keeper against a mocked transit engine.
//!
//! The mock "encrypts" by prefixing the submitted plaintext with `vault:v1:`
//! and decrypts by stripping the prefix, which is enough to exercise the
//! request/response plumbing and the salt binding.

mod common;

use common::{cx, secure_value, store_with_keeper, TestDatabase, NAMESPACE};
use serde_json::{json, Value};
use std::sync::Arc;
use strongbox::config::VaultTransitConfig;
use strongbox::domain::SecretValue;
use strongbox::errors::ErrorKind;
use strongbox::keeper::{Keeper, KeeperRegistry, VaultTransitKeeper};
use strongbox::store::SecureValueStore;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

const CIPHERTEXT_PREFIX: &str = "vault:v1:";

fn envelope(data: Value) -> Value {
    json!({
        "request_id": "00000000-0000-0000-0000-000000000000",
        "lease_id": "",
        "renewable": false,
        "lease_duration": 0,
        "data": data,
        "wrap_info": null,
        "warnings": null,
        "auth": null
    })
}

fn body_field(req: &Request, field: &str) -> String {
    let body: Value = req.body_json().unwrap_or(Value::Null);
    body.get(field).and_then(Value::as_str).unwrap_or_default().to_string()
}

async fn start_transit() -> MockServer {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/v1/transit/encrypt/strongbox"))
        .respond_with(|req: &Request| {
            let plaintext = body_field(req, "plaintext");
            ResponseTemplate::new(200).set_body_json(envelope(json!({
                "ciphertext": format!("{}{}", CIPHERTEXT_PREFIX, plaintext),
                "key_version": 1
            })))
        })
        .mount(&server)
        .await;

    Mock::given(method("POST"))
        .and(path("/v1/transit/decrypt/strongbox"))
        .respond_with(|req: &Request| {
            let ciphertext = body_field(req, "ciphertext");
            match ciphertext.strip_prefix(CIPHERTEXT_PREFIX) {
                Some(plaintext) => ResponseTemplate::new(200)
                    .set_body_json(envelope(json!({ "plaintext": plaintext }))),
                None => ResponseTemplate::new(400)
                    .set_body_json(json!({ "errors": ["invalid ciphertext: no prefix"] })),
            }
        })
        .mount(&server)
        .await;

    server
}

fn transit_config(address: &str) -> VaultTransitConfig {
    VaultTransitConfig {
        keeper_id: "vault-transit".to_string(),
        address: address.to_string(),
        token: Some("test-token".to_string()),
        namespace: None,
        mount: "transit".to_string(),
        key_name: "strongbox".to_string(),
    }
}

#[tokio::test]
async fn transit_keeper_round_trips_through_vault() {
    let server = start_transit().await;
    let keeper = VaultTransitKeeper::new(&transit_config(&server.uri())).await.unwrap();
    let cx = cx("alice");

    let encoded = keeper.encode(&cx, &SecretValue::new("s3cr3t"), "abcdefghij").await.unwrap();
    assert!(encoded.starts_with(CIPHERTEXT_PREFIX));
    assert!(!encoded.contains("s3cr3t"));

    let decoded = keeper
        .decode(&cx, &encoded, "abcdefghij", "vault-transit", &server.uri())
        .await
        .unwrap();
    assert_eq!(decoded.expose(), "s3cr3t");
}

#[tokio::test]
async fn transit_keeper_rejects_foreign_salt_and_keeper() {
    let server = start_transit().await;
    let keeper = VaultTransitKeeper::new(&transit_config(&server.uri())).await.unwrap();
    let cx = cx("alice");

    let encoded = keeper.encode(&cx, &SecretValue::new("s3cr3t"), "abcdefghij").await.unwrap();

    let err = keeper
        .decode(&cx, &encoded, "0123456789", "vault-transit", &server.uri())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);

    let err = keeper.decode(&cx, &encoded, "abcdefghij", "local", &server.uri()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[tokio::test]
async fn transit_errors_surface_as_keeper_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(500).set_body_json(json!({ "errors": ["internal error"] })),
        )
        .mount(&server)
        .await;

    let keeper = VaultTransitKeeper::new(&transit_config(&server.uri())).await.unwrap();
    let err = keeper.encode(&cx("alice"), &SecretValue::new("x"), "abcdefghij").await.unwrap_err();
    assert!(matches!(err, strongbox::StrongboxError::Keeper { .. }));
    assert_eq!(err.kind(), ErrorKind::Internal);
}

#[tokio::test]
async fn store_encrypts_with_vault_default_keeper() {
    let server = start_transit().await;
    let db = TestDatabase::new("vault_store").await;

    let vault: Arc<dyn Keeper> =
        Arc::new(VaultTransitKeeper::new(&transit_config(&server.uri())).await.unwrap());
    let mut registry = KeeperRegistry::new(vault);
    registry.register(common::local_keeper("local", 7)).unwrap();
    let store = store_with_keeper(db.database(), Arc::new(registry), 50);

    store.create(&cx("alice"), secure_value("vaulted", "from-vault", &["alice"])).await.unwrap();

    let (keeper, addr, value): (String, String, String) = sqlx::query_as(
        "SELECT keeper, addr, value FROM secure_value WHERE namespace = ? AND name = ?",
    )
    .bind(NAMESPACE)
    .bind("vaulted")
    .fetch_one(db.database.pool())
    .await
    .unwrap();
    assert_eq!(keeper, "vault-transit");
    assert_eq!(addr, server.uri());
    assert!(value.starts_with(CIPHERTEXT_PREFIX));

    let decrypted = store.decrypt(&cx("alice"), NAMESPACE, "vaulted").await.unwrap();
    assert_eq!(decrypted.spec.value.as_ref().map(|v| v.expose()), Some("from-vault"));
}
