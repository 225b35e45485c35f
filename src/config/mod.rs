//! # Configuration Management
//!
//! Configuration for the secure value store: database, keepers, store
//! behaviour and observability. See [`settings::AppConfig::load`].

pub mod settings;

pub use settings::{
    AppConfig, DatabaseConfig, KeeperConfig, LocalKeyConfig, ObservabilityConfig, StoreConfig,
    VaultTransitConfig, ENV_PREFIX,
};
