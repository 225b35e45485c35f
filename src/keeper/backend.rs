//! Keeper trait
//!
//! Defines the interface for pluggable encryption backends.

use crate::auth::RequestContext;
use crate::domain::SecretValue;
use crate::errors::Result;
use async_trait::async_trait;

/// Encryption backend for secure values
///
/// Implementations must be Send + Sync for use in async contexts. Remote
/// keepers may be slow or fail transiently; the store drives every call
/// under the request's deadline and cancellation.
#[async_trait]
pub trait Keeper: Send + Sync + std::fmt::Debug {
    /// Identifier persisted next to every value this keeper encodes
    fn keeper_id(&self) -> &str;

    /// Backend address persisted next to every value this keeper encodes
    fn address(&self) -> &str;

    /// Encrypt `plaintext`, binding it to `salt`
    async fn encode(
        &self,
        cx: &RequestContext,
        plaintext: &SecretValue,
        salt: &str,
    ) -> Result<String>;

    /// Recover the plaintext of a value encoded by `keeper_id` at `address`
    async fn decode(
        &self,
        cx: &RequestContext,
        encoded: &str,
        salt: &str,
        keeper_id: &str,
        address: &str,
    ) -> Result<SecretValue>;

    /// Check that the backend is reachable and usable
    async fn health_check(&self) -> Result<()>;
}
