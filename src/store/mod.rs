//! # Secure Value Store
//!
//! The [`SecureValueStore`] trait is the public surface of the crate:
//! namespaced CRUD over [`SecureValue`] resources whose plaintext is encrypted
//! by a [`Keeper`](crate::keeper::Keeper) before it reaches the database, plus
//! authorized decryption and an append-only mutation history.
//!
//! [`SqlSecureValueStore`] implements it over SQLite or PostgreSQL.

pub mod codec;
pub(crate) mod requests;
pub mod selector;
pub mod sql_store;

pub use codec::{HistoryRow, SecureValueRow};
pub use selector::LabelSelector;
pub use sql_store::SqlSecureValueStore;

use crate::auth::RequestContext;
use crate::domain::{HistoryPage, SecureValue};
use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Options for [`SecureValueStore::list`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOptions {
    /// Kubernetes-style label selector, e.g. `team=a,env in (prod)`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_selector: Option<String>,
}

impl ListOptions {
    pub fn with_label_selector<S: Into<String>>(selector: S) -> Self {
        Self { label_selector: Some(selector.into()) }
    }
}

/// Encrypted, namespaced secure value storage
///
/// Every operation runs under the deadline and cancellation token of `cx`.
/// Returned objects never carry the plaintext value except from
/// [`decrypt`](SecureValueStore::decrypt).
#[async_trait]
pub trait SecureValueStore: Send + Sync {
    /// Store a new value. The name must be supplied and the value non-empty.
    async fn create(&self, cx: &RequestContext, object: SecureValue) -> Result<SecureValue>;

    async fn read(&self, cx: &RequestContext, namespace: &str, name: &str) -> Result<SecureValue>;

    /// Update an existing value in place; an object without a UID is created.
    ///
    /// A non-empty `metadata.resourceVersion` must match the stored version.
    async fn update(&self, cx: &RequestContext, object: SecureValue) -> Result<SecureValue>;

    /// Remove a value, returning its last known state
    async fn delete(
        &self,
        cx: &RequestContext,
        namespace: &str,
        name: &str,
    ) -> Result<(SecureValue, bool)>;

    /// Values in a namespace, oldest first, filtered by label selector
    async fn list(
        &self,
        cx: &RequestContext,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<Vec<SecureValue>>;

    /// Read a value including its plaintext. The caller must be listed in `spec.apis`.
    async fn decrypt(&self, cx: &RequestContext, namespace: &str, name: &str)
        -> Result<SecureValue>;

    /// Mutation history, newest first, one page at a time
    async fn history(
        &self,
        cx: &RequestContext,
        namespace: &str,
        name: &str,
        continue_token: Option<&str>,
    ) -> Result<HistoryPage>;
}
