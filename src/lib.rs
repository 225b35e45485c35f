//! # Strongbox
//!
//! Encrypted secure value store. Secrets are namespaced resources whose
//! plaintext is encrypted by a pluggable keeper before it is persisted to
//! SQLite or PostgreSQL, and is only ever returned to callers listed on the
//! value itself.
//!
//! ## Architecture
//!
//! ```text
//! SecureValueStore ──► Row Codec ──► SQL Templates ──► sqlx AnyPool
//!        │
//!        └──► KeeperRegistry ──► LocalKeeper | VaultTransitKeeper
//! ```
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use strongbox::auth::{Identity, RequestContext};
//! use strongbox::config::AppConfig;
//! use strongbox::domain::{SecureValue, SecureValueSpec};
//! use strongbox::observability::StoreMetrics;
//! use strongbox::store::{SecureValueStore, SqlSecureValueStore};
//!
//! #[tokio::main]
//! async fn main() -> strongbox::Result<()> {
//!     let config = AppConfig::load(None)?;
//!     let store = SqlSecureValueStore::from_config(&config, StoreMetrics::disabled()).await?;
//!
//!     let cx = RequestContext::new(Identity::new("alice").with_app("billing"));
//!     let spec = SecureValueSpec {
//!         title: "Billing DB password".into(),
//!         value: Some("hunter2".into()),
//!         apis: vec!["billing".into()],
//!     };
//!     store.create(&cx, SecureValue::new("default", "billing-db", spec)).await?;
//!
//!     let decrypted = store.decrypt(&cx, "default", "billing-db").await?;
//!     assert!(decrypted.spec.value.is_some());
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod keeper;
pub mod observability;
pub mod sqltemplate;
pub mod storage;
pub mod store;

// Re-export commonly used types and traits
pub use config::AppConfig;
pub use errors::{ErrorKind, Result, StrongboxError};
pub use store::{SecureValueStore, SqlSecureValueStore};

/// Application version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name from Cargo.toml
pub const APP_NAME: &str = env!("CARGO_PKG_NAME");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_available() {
        assert!(!VERSION.is_empty());
        assert_eq!(APP_NAME, "strongbox");
    }
}
