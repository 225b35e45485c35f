//! Vault transit keeper
//!
//! Delegates encryption to the HashiCorp Vault transit engine. The payload
//! sent to Vault is `base64(salt || 0x00 || plaintext)`; decode checks the salt
//! prefix so a ciphertext moved to another row is rejected.

use super::backend::Keeper;
use crate::auth::RequestContext;
use crate::config::VaultTransitConfig;
use crate::domain::SecretValue;
use crate::errors::{Result, StrongboxError};
use async_trait::async_trait;
use base64::Engine;
use tracing::{debug, error, info, instrument, warn};
use vaultrs::client::{VaultClient, VaultClientSettingsBuilder};
use vaultrs::transit;
use zeroize::Zeroizing;

const SALT_SEPARATOR: u8 = 0x00;

/// Keeper backed by a Vault transit key
pub struct VaultTransitKeeper {
    client: VaultClient,
    keeper_id: String,
    address: String,
    mount: String,
    key_name: String,
}

impl std::fmt::Debug for VaultTransitKeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultTransitKeeper")
            .field("keeper_id", &self.keeper_id)
            .field("address", &self.address)
            .field("mount", &self.mount)
            .field("key_name", &self.key_name)
            .field("client", &"[VaultClient]")
            .finish()
    }
}

impl VaultTransitKeeper {
    /// Create a new transit keeper with the given configuration
    pub async fn new(config: &VaultTransitConfig) -> Result<Self> {
        let mut settings_builder = VaultClientSettingsBuilder::default();
        settings_builder.address(&config.address);

        if let Some(ref token) = config.token {
            settings_builder.token(token);
        }

        if let Some(ref namespace) = config.namespace {
            settings_builder.namespace(Some(namespace.clone()));
        }

        let settings = settings_builder.build().map_err(|e| {
            StrongboxError::config(format!("Invalid Vault transit configuration: {}", e))
        })?;

        let client = VaultClient::new(settings)
            .map_err(|e| StrongboxError::config(format!("Failed to create Vault client: {}", e)))?;

        info!(
            keeper = %config.keeper_id,
            address = %config.address,
            mount = %config.mount,
            key = %config.key_name,
            "Initialized Vault transit keeper"
        );

        Ok(Self {
            client,
            keeper_id: config.keeper_id.clone(),
            address: config.address.clone(),
            mount: config.mount.clone(),
            key_name: config.key_name.clone(),
        })
    }

    fn wrap(plaintext: &SecretValue, salt: &str) -> String {
        let capacity = salt.len() + 1 + plaintext.expose().len();
        let mut payload = Zeroizing::new(Vec::with_capacity(capacity));
        payload.extend_from_slice(salt.as_bytes());
        payload.push(SALT_SEPARATOR);
        payload.extend_from_slice(plaintext.expose().as_bytes());
        base64::engine::general_purpose::STANDARD.encode(&*payload)
    }

    fn unwrap_payload(&self, payload_base64: &str, salt: &str) -> Result<SecretValue> {
        let payload = Zeroizing::new(
            base64::engine::general_purpose::STANDARD.decode(payload_base64).map_err(|e| {
                StrongboxError::keeper(
                    &self.keeper_id,
                    format!("Vault returned invalid base64: {}", e),
                )
            })?,
        );

        let separator = payload.iter().position(|b| *b == SALT_SEPARATOR).ok_or_else(|| {
            StrongboxError::keeper(&self.keeper_id, "Decrypted payload has no salt prefix")
        })?;

        let (stored_salt, rest) = payload.split_at(separator);
        if stored_salt != salt.as_bytes() {
            return Err(StrongboxError::keeper(
                &self.keeper_id,
                "Decrypted payload does not belong to this value",
            ));
        }

        let text = std::str::from_utf8(&rest[1..]).map_err(|_| {
            StrongboxError::keeper(&self.keeper_id, "Decrypted value is not valid UTF-8")
        })?;
        Ok(SecretValue::new(text))
    }
}

#[async_trait]
impl Keeper for VaultTransitKeeper {
    fn keeper_id(&self) -> &str {
        &self.keeper_id
    }

    fn address(&self) -> &str {
        &self.address
    }

    #[instrument(skip(self, _cx, plaintext, salt), fields(keeper = %self.keeper_id))]
    async fn encode(
        &self,
        _cx: &RequestContext,
        plaintext: &SecretValue,
        salt: &str,
    ) -> Result<String> {
        let payload = Zeroizing::new(Self::wrap(plaintext, salt));

        let response =
            transit::data::encrypt(&self.client, &self.mount, &self.key_name, &payload, None)
                .await
                .map_err(|e| {
                    error!(keeper = %self.keeper_id, error = %e, "Vault transit encrypt failed");
                    StrongboxError::keeper_with_source(
                        &self.keeper_id,
                        "Vault transit encrypt failed",
                        Box::new(e),
                    )
                })?;

        debug!(keeper = %self.keeper_id, "Encrypted value with Vault transit");
        Ok(response.ciphertext)
    }

    #[instrument(skip(self, _cx, encoded, salt), fields(keeper = %self.keeper_id))]
    async fn decode(
        &self,
        _cx: &RequestContext,
        encoded: &str,
        salt: &str,
        keeper_id: &str,
        address: &str,
    ) -> Result<SecretValue> {
        if keeper_id != self.keeper_id {
            return Err(StrongboxError::keeper(
                &self.keeper_id,
                format!("Value was encoded by keeper '{}'", keeper_id),
            ));
        }
        if address != self.address {
            warn!(
                stored_address = %address,
                configured_address = %self.address,
                "Vault address changed since the value was encoded"
            );
        }

        let response =
            transit::data::decrypt(&self.client, &self.mount, &self.key_name, encoded, None)
                .await
                .map_err(|e| {
                    error!(keeper = %self.keeper_id, error = %e, "Vault transit decrypt failed");
                    StrongboxError::keeper_with_source(
                        &self.keeper_id,
                        "Vault transit decrypt failed",
                        Box::new(e),
                    )
                })?;

        let payload = Zeroizing::new(response.plaintext);
        self.unwrap_payload(&payload, salt)
    }

    async fn health_check(&self) -> Result<()> {
        vaultrs::sys::health(&self.client).await.map_err(|e| {
            StrongboxError::keeper(&self.keeper_id, format!("Vault health check failed: {}", e))
        })?;
        Ok(())
    }
}
