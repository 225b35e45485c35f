//! Local keeper using AES-256-GCM
//!
//! Values are sealed with a key derived from the configured master key and the
//! value's salt (HKDF-SHA256, key id as info). The salt is also bound as
//! associated data, so a ciphertext copied onto another row fails to open.
//!
//! Encoded form: `base64(nonce || ciphertext || tag)`.
//!
//! ## Key Rotation
//!
//! Each key has its own keeper id. Register retired keys alongside the new
//! default and rows encoded under them stay decryptable.

use super::backend::Keeper;
use crate::auth::RequestContext;
use crate::config::LocalKeyConfig;
use crate::domain::SecretValue;
use crate::errors::{Result, StrongboxError};
use async_trait::async_trait;
use base64::Engine;
use ring::aead::{self, Aad, BoundKey, Nonce, NonceSequence, UnboundKey, AES_256_GCM};
use ring::hkdf;
use ring::rand::{SecureRandom, SystemRandom};
use std::sync::Arc;
use tracing::{debug, error, instrument};
use zeroize::Zeroizing;

/// Size of AES-256-GCM nonce in bytes
const NONCE_SIZE: usize = 12;

/// Size of AES-256-GCM tag in bytes
const TAG_SIZE: usize = 16;

const KEY_SIZE: usize = 32;

/// Address recorded for rows sealed by a local keeper
pub const LOCAL_ADDRESS: &str = "local";

/// Single-use nonce sequence for AES-GCM
struct SingleNonce {
    nonce: Option<[u8; NONCE_SIZE]>,
}

impl SingleNonce {
    fn new(nonce_bytes: [u8; NONCE_SIZE]) -> Self {
        Self { nonce: Some(nonce_bytes) }
    }
}

impl NonceSequence for SingleNonce {
    fn advance(&mut self) -> std::result::Result<Nonce, ring::error::Unspecified> {
        self.nonce.take().map(Nonce::assume_unique_for_key).ok_or(ring::error::Unspecified)
    }
}

/// Keeper backed by a process-local master key
#[derive(Clone)]
pub struct LocalKeeper {
    key_id: String,
    master_key: Arc<Zeroizing<[u8; KEY_SIZE]>>,
    rng: Arc<SystemRandom>,
}

impl std::fmt::Debug for LocalKeeper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeeper")
            .field("key_id", &self.key_id)
            .field("master_key", &"[REDACTED]")
            .finish()
    }
}

impl LocalKeeper {
    /// Create a keeper from a base64-encoded 32-byte key
    pub fn new(config: &LocalKeyConfig) -> Result<Self> {
        let key_bytes = Zeroizing::new(
            base64::engine::general_purpose::STANDARD.decode(&config.master_key_base64).map_err(
                |e| {
                    StrongboxError::config(format!(
                        "Invalid base64 master key for keeper '{}': {}",
                        config.key_id, e
                    ))
                },
            )?,
        );

        if key_bytes.len() != KEY_SIZE {
            return Err(StrongboxError::config(format!(
                "Master key for keeper '{}' must be 32 bytes (256 bits), got {} bytes",
                config.key_id,
                key_bytes.len()
            )));
        }

        let mut key_array = Zeroizing::new([0u8; KEY_SIZE]);
        key_array.copy_from_slice(&key_bytes);

        debug!(key_id = %config.key_id, "Local keeper initialized");

        Ok(Self {
            key_id: config.key_id.clone(),
            master_key: Arc::new(key_array),
            rng: Arc::new(SystemRandom::new()),
        })
    }

    /// Derive the AES key for one salt
    fn derive_key(&self, salt: &str) -> Result<UnboundKey> {
        let prk = hkdf::Salt::new(hkdf::HKDF_SHA256, salt.as_bytes()).extract(&**self.master_key);
        let info = [self.key_id.as_bytes()];
        let okm = prk.expand(&info, &AES_256_GCM).map_err(|_| {
            error!(key_id = %self.key_id, "Key derivation failed");
            StrongboxError::keeper(&self.key_id, "Failed to derive value key")
        })?;
        Ok(UnboundKey::from(okm))
    }

    fn seal(&self, plaintext: &[u8], salt: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        self.rng.fill(&mut nonce_bytes).map_err(|_| {
            error!("Failed to generate random nonce");
            StrongboxError::keeper(&self.key_id, "Failed to generate random nonce")
        })?;

        let mut sealing_key =
            aead::SealingKey::new(self.derive_key(salt)?, SingleNonce::new(nonce_bytes));

        let mut buffer = Zeroizing::new(Vec::with_capacity(plaintext.len() + TAG_SIZE));
        buffer.extend_from_slice(plaintext);
        sealing_key
            .seal_in_place_append_tag(Aad::from(salt.as_bytes()), &mut *buffer)
            .map_err(|_| {
                error!(key_id = %self.key_id, "Encryption failed");
                StrongboxError::keeper(&self.key_id, "Failed to encrypt value")
            })?;

        let mut out = Vec::with_capacity(NONCE_SIZE + buffer.len());
        out.extend_from_slice(&nonce_bytes);
        out.extend_from_slice(&buffer);
        Ok(base64::engine::general_purpose::STANDARD.encode(out))
    }

    fn open(&self, encoded: &str, salt: &str) -> Result<SecretValue> {
        let raw = base64::engine::general_purpose::STANDARD.decode(encoded).map_err(|e| {
            StrongboxError::keeper(&self.key_id, format!("Encoded value is not base64: {}", e))
        })?;

        if raw.len() < NONCE_SIZE + TAG_SIZE {
            return Err(StrongboxError::keeper(&self.key_id, "Encoded value too short"));
        }

        let (nonce, sealed) = raw.split_at(NONCE_SIZE);
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        nonce_bytes.copy_from_slice(nonce);

        let mut opening_key =
            aead::OpeningKey::new(self.derive_key(salt)?, SingleNonce::new(nonce_bytes));

        let mut buffer = Zeroizing::new(sealed.to_vec());
        let plaintext =
            opening_key.open_in_place(Aad::from(salt.as_bytes()), &mut buffer[..]).map_err(|_| {
                error!(key_id = %self.key_id, "Decryption failed");
                StrongboxError::keeper(
                    &self.key_id,
                    "Failed to decrypt value (wrong key, salt, or tampered data)",
                )
            })?;

        let text = std::str::from_utf8(plaintext).map_err(|_| {
            StrongboxError::keeper(&self.key_id, "Decrypted value is not valid UTF-8")
        })?;
        Ok(SecretValue::new(text))
    }
}

#[async_trait]
impl Keeper for LocalKeeper {
    fn keeper_id(&self) -> &str {
        &self.key_id
    }

    fn address(&self) -> &str {
        LOCAL_ADDRESS
    }

    #[instrument(skip(self, _cx, plaintext, salt), fields(keeper = %self.key_id))]
    async fn encode(
        &self,
        _cx: &RequestContext,
        plaintext: &SecretValue,
        salt: &str,
    ) -> Result<String> {
        self.seal(plaintext.expose().as_bytes(), salt)
    }

    #[instrument(skip(self, _cx, encoded, salt, address), fields(keeper = %self.key_id))]
    async fn decode(
        &self,
        _cx: &RequestContext,
        encoded: &str,
        salt: &str,
        keeper_id: &str,
        address: &str,
    ) -> Result<SecretValue> {
        if keeper_id != self.key_id || address != LOCAL_ADDRESS {
            return Err(StrongboxError::keeper(
                &self.key_id,
                format!("Value was encoded by keeper '{}' at '{}'", keeper_id, address),
            ));
        }
        self.open(encoded, salt)
    }

    async fn health_check(&self) -> Result<()> {
        let probe = self.seal(b"health", "health-check")?;
        self.open(&probe, "health-check").map(|_| ())
    }
}
