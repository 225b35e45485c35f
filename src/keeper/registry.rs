//! Keeper registry
//!
//! Holds every configured keeper by id. New values are encoded by the default
//! keeper; stored values are decoded by the keeper recorded on their row, so
//! changing the default never strands existing secrets.

use super::backend::Keeper;
use super::local::LocalKeeper;
use super::vault::VaultTransitKeeper;
use crate::auth::RequestContext;
use crate::config::KeeperConfig;
use crate::domain::SecretValue;
use crate::errors::{Result, StrongboxError};
use crate::observability::StoreMetrics;
use async_trait::async_trait;
use futures::future::try_join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, Instrument};

pub struct KeeperRegistry {
    keepers: HashMap<String, Arc<dyn Keeper>>,
    default: Arc<dyn Keeper>,
    metrics: StoreMetrics,
}

impl std::fmt::Debug for KeeperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.keepers.keys().collect();
        ids.sort();
        f.debug_struct("KeeperRegistry")
            .field("keepers", &ids)
            .field("default", &self.default.keeper_id())
            .finish()
    }
}

impl KeeperRegistry {
    /// Create a registry whose default keeper is `default`
    pub fn new(default: Arc<dyn Keeper>) -> Self {
        let mut keepers = HashMap::new();
        keepers.insert(default.keeper_id().to_string(), default.clone());
        Self { keepers, default, metrics: StoreMetrics::disabled() }
    }

    pub fn with_metrics(mut self, metrics: StoreMetrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Register an additional keeper usable for decoding
    ///
    /// Fails if the id is already taken.
    pub fn register(&mut self, keeper: Arc<dyn Keeper>) -> Result<()> {
        let id = keeper.keeper_id().to_string();
        if self.keepers.contains_key(&id) {
            return Err(StrongboxError::config(format!("Duplicate keeper id '{}'", id)));
        }
        info!(keeper = %id, address = %keeper.address(), "Registering keeper");
        self.keepers.insert(id, keeper);
        Ok(())
    }

    /// Build every keeper named in configuration
    pub async fn from_config(config: &KeeperConfig) -> Result<Self> {
        let mut keepers: Vec<Arc<dyn Keeper>> = Vec::new();

        for key in &config.local_keys {
            keepers.push(Arc::new(LocalKeeper::new(key)?));
        }

        if let Some(vault) = &config.vault {
            keepers.push(Arc::new(VaultTransitKeeper::new(vault).await?));
        }

        let position = keepers
            .iter()
            .position(|k| k.keeper_id() == config.default_keeper)
            .ok_or_else(|| {
                StrongboxError::config(format!(
                    "Default keeper '{}' is not configured",
                    config.default_keeper
                ))
            })?;

        let mut registry = Self::new(keepers.remove(position));
        for keeper in keepers {
            registry.register(keeper)?;
        }

        info!(
            default_keeper = %config.default_keeper,
            keepers = registry.keepers.len(),
            "Keeper registry initialized"
        );
        Ok(registry)
    }

    pub fn has_keeper(&self, keeper_id: &str) -> bool {
        self.keepers.contains_key(keeper_id)
    }

    pub fn registered_keepers(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.keepers.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn default_keeper(&self) -> &Arc<dyn Keeper> {
        &self.default
    }
}

#[async_trait]
impl Keeper for KeeperRegistry {
    fn keeper_id(&self) -> &str {
        self.default.keeper_id()
    }

    fn address(&self) -> &str {
        self.default.address()
    }

    async fn encode(
        &self,
        cx: &RequestContext,
        plaintext: &SecretValue,
        salt: &str,
    ) -> Result<String> {
        let keeper_id = self.default.keeper_id();
        let result = self
            .default
            .encode(cx, plaintext, salt)
            .instrument(crate::keeper_span!("encode", keeper_id))
            .await;
        self.metrics.record_keeper_call(keeper_id, "encode", result.is_ok());
        result
    }

    async fn decode(
        &self,
        cx: &RequestContext,
        encoded: &str,
        salt: &str,
        keeper_id: &str,
        address: &str,
    ) -> Result<SecretValue> {
        let keeper = self.keepers.get(keeper_id).ok_or_else(|| {
            StrongboxError::internal(format!("No keeper registered with id '{}'", keeper_id))
        })?;

        let result = keeper
            .decode(cx, encoded, salt, keeper_id, address)
            .instrument(crate::keeper_span!("decode", keeper_id))
            .await;
        self.metrics.record_keeper_call(keeper_id, "decode", result.is_ok());
        result
    }

    async fn health_check(&self) -> Result<()> {
        try_join_all(self.keepers.values().map(|keeper| keeper.health_check())).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Identity;
    use crate::config::LocalKeyConfig;
    use crate::errors::ErrorKind;
    use base64::Engine;

    fn local(key_id: &str, byte: u8) -> LocalKeyConfig {
        LocalKeyConfig {
            key_id: key_id.to_string(),
            master_key_base64: base64::engine::general_purpose::STANDARD.encode([byte; 32]),
        }
    }

    fn cx() -> RequestContext {
        RequestContext::new(Identity::new("tester"))
    }

    #[tokio::test]
    async fn test_from_config_selects_default() {
        let config = KeeperConfig {
            default_keeper: "v2".to_string(),
            local_keys: vec![local("v1", 1), local("v2", 2)],
            vault: None,
        };
        let registry = KeeperRegistry::from_config(&config).await.unwrap();
        assert_eq!(registry.keeper_id(), "v2");
        assert_eq!(registry.registered_keepers(), vec!["v1".to_string(), "v2".to_string()]);
    }

    #[tokio::test]
    async fn test_missing_default_is_config_error() {
        let config = KeeperConfig {
            default_keeper: "v9".to_string(),
            local_keys: vec![local("v1", 1)],
            vault: None,
        };
        assert!(KeeperRegistry::from_config(&config).await.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_keeper_id_rejected() {
        let mut registry =
            KeeperRegistry::new(Arc::new(LocalKeeper::new(&local("v1", 1)).unwrap()));
        let result = registry.register(Arc::new(LocalKeeper::new(&local("v1", 2)).unwrap()));
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_rotation_keeps_old_values_readable() {
        let old = KeeperRegistry::new(Arc::new(LocalKeeper::new(&local("v1", 1)).unwrap()));
        let salt = "abcdefghij";
        let encoded = old.encode(&cx(), &SecretValue::new("s3cr3t"), salt).await.unwrap();

        let mut rotated =
            KeeperRegistry::new(Arc::new(LocalKeeper::new(&local("v2", 2)).unwrap()));
        rotated.register(Arc::new(LocalKeeper::new(&local("v1", 1)).unwrap())).unwrap();

        assert_eq!(rotated.keeper_id(), "v2");
        let decoded = rotated.decode(&cx(), &encoded, salt, "v1", "local").await.unwrap();
        assert_eq!(decoded.expose(), "s3cr3t");
    }

    #[tokio::test]
    async fn test_unknown_keeper_is_internal() {
        let registry = KeeperRegistry::new(Arc::new(LocalKeeper::new(&local("v1", 1)).unwrap()));
        let err = registry.decode(&cx(), "AAAA", "salt", "gone", "local").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Internal);
    }

    #[tokio::test]
    async fn test_health_check_all() {
        let mut registry =
            KeeperRegistry::new(Arc::new(LocalKeeper::new(&local("v1", 1)).unwrap()));
        registry.register(Arc::new(LocalKeeper::new(&local("v2", 2)).unwrap())).unwrap();
        assert!(registry.health_check().await.is_ok());
        assert!(registry.has_keeper("v2"));
    }
}
