//! Common test utilities for all integration tests.
//!
//! Provides the shared test database plus helpers for building stores,
//! request contexts and secure values.

#![allow(dead_code)]
#![allow(clippy::duplicate_mod)]

pub mod test_db;

use base64::Engine;
use std::collections::BTreeMap;
use std::sync::Arc;
use strongbox::auth::{Identity, RequestContext};
use strongbox::config::{LocalKeyConfig, StoreConfig};
use strongbox::domain::{SecureValue, SecureValueSpec};
use strongbox::keeper::{Keeper, KeeperRegistry, LocalKeeper};
use strongbox::observability::StoreMetrics;
use strongbox::storage::Database;
use strongbox::store::SqlSecureValueStore;

pub use test_db::TestDatabase;

pub const NAMESPACE: &str = "default";

pub fn local_key(key_id: &str, byte: u8) -> LocalKeyConfig {
    LocalKeyConfig {
        key_id: key_id.to_string(),
        master_key_base64: base64::engine::general_purpose::STANDARD.encode([byte; 32]),
    }
}

pub fn local_keeper(key_id: &str, byte: u8) -> Arc<dyn Keeper> {
    Arc::new(LocalKeeper::new(&local_key(key_id, byte)).expect("create local keeper"))
}

pub fn store_with_keeper(
    database: Database,
    keeper: Arc<dyn Keeper>,
    history_page_size: u32,
) -> SqlSecureValueStore {
    let config = StoreConfig { history_page_size, ..Default::default() };
    SqlSecureValueStore::new(database, keeper, config, StoreMetrics::disabled())
        .expect("create secure value store")
}

/// Store backed by a registry holding a single local keeper `local`
pub fn test_store(database: Database) -> SqlSecureValueStore {
    let registry = KeeperRegistry::new(local_keeper("local", 7));
    store_with_keeper(database, Arc::new(registry), 50)
}

pub fn cx(subject: &str) -> RequestContext {
    RequestContext::new(Identity::new(subject))
}

pub fn app_cx(subject: &str, app: &str) -> RequestContext {
    RequestContext::new(Identity::new(subject).with_app(app))
}

pub fn secure_value(name: &str, value: &str, apis: &[&str]) -> SecureValue {
    SecureValue::new(
        NAMESPACE,
        name,
        SecureValueSpec {
            title: format!("{} title", name),
            value: Some(value.into()),
            apis: apis.iter().map(|s| s.to_string()).collect(),
        },
    )
}

pub fn labelled(mut object: SecureValue, labels: &[(&str, &str)]) -> SecureValue {
    object.metadata.labels =
        labels.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect::<BTreeMap<_, _>>();
    object
}
