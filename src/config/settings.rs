//! # Configuration Settings
//!
//! Defines the configuration structure for the secure value store.

use crate::errors::{Result, StrongboxError};
use crate::sqltemplate::Dialect;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use validator::Validate;

/// Prefix for environment overrides, e.g. `STRONGBOX__DATABASE__URL`
pub const ENV_PREFIX: &str = "STRONGBOX";

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate, Default)]
#[serde(default)]
pub struct AppConfig {
    /// Database configuration
    #[validate(nested)]
    pub database: DatabaseConfig,

    /// Keeper (encryption backend) configuration
    #[validate(nested)]
    pub keeper: KeeperConfig,

    /// Store behaviour
    #[validate(nested)]
    pub store: StoreConfig,

    /// Logging and metrics configuration
    #[validate(nested)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from an optional TOML file and `STRONGBOX__*` environment variables.
    ///
    /// Environment values take precedence over the file.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(StrongboxError::config(format!(
                    "Configuration file not found: {}",
                    path.display()
                )));
            }
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix(ENV_PREFIX).separator("__").try_parsing(true),
        );

        let config: AppConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> Result<()> {
        Validate::validate(self).map_err(StrongboxError::from)?;
        self.validate_custom()?;
        Ok(())
    }

    /// Cross-field checks the validator derive cannot express
    fn validate_custom(&self) -> Result<()> {
        self.database.dialect()?;

        if self.database.min_connections > self.database.max_connections {
            return Err(StrongboxError::validation(
                "min_connections cannot be greater than max_connections",
            ));
        }

        let default_id = &self.keeper.default_keeper;
        let local_match = self.keeper.local_keys.iter().any(|k| &k.key_id == default_id);
        let vault_match = self.keeper.vault.as_ref().is_some_and(|v| &v.keeper_id == default_id);
        if !local_match && !vault_match {
            return Err(StrongboxError::validation_field(
                format!("Default keeper '{}' is not configured", default_id),
                "keeper.default_keeper",
            ));
        }

        Ok(())
    }
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct DatabaseConfig {
    /// Database connection URL (`sqlite:` or `postgres(ql)://`)
    #[validate(length(min = 1, message = "Database URL cannot be empty"))]
    pub url: String,

    /// Maximum number of connections in the pool
    #[validate(range(min = 1, max = 100, message = "Max connections must be between 1 and 100"))]
    pub max_connections: u32,

    /// Minimum number of connections in the pool
    #[validate(range(min = 0, max = 50, message = "Min connections must be between 0 and 50"))]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[validate(range(
        min = 1,
        max = 60,
        message = "Connect timeout must be between 1 and 60 seconds"
    ))]
    pub connect_timeout_seconds: u64,

    /// Idle timeout in seconds (0 = no timeout)
    pub idle_timeout_seconds: u64,

    /// Apply pending migrations when the pool is created
    pub auto_migrate: bool,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://./data/strongbox.db?mode=rwc".to_string(),
            max_connections: 10,
            min_connections: 0,
            connect_timeout_seconds: 10,
            idle_timeout_seconds: 600,
            auto_migrate: true,
        }
    }
}

impl DatabaseConfig {
    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    /// Get idle timeout as Duration (None if 0)
    pub fn idle_timeout(&self) -> Option<Duration> {
        if self.idle_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.idle_timeout_seconds))
        }
    }

    /// Check if this is a SQLite configuration
    pub fn is_sqlite(&self) -> bool {
        self.url.starts_with("sqlite:")
    }

    /// Check if this is a PostgreSQL configuration
    pub fn is_postgresql(&self) -> bool {
        self.url.starts_with("postgresql://") || self.url.starts_with("postgres://")
    }

    /// SQL dialect implied by the URL scheme
    pub fn dialect(&self) -> Result<Dialect> {
        Dialect::from_url(&self.url)
    }
}

/// A process-local AES key used by a local keeper
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct LocalKeyConfig {
    /// Keeper id recorded in rows encrypted with this key
    #[validate(length(min = 1, max = 64, message = "Key id must be 1-64 characters"))]
    pub key_id: String,

    /// Base64-encoded 32-byte master key
    #[serde(skip_serializing)]
    #[validate(length(min = 1, message = "Master key cannot be empty"))]
    pub master_key_base64: String,
}

impl std::fmt::Debug for LocalKeyConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalKeyConfig")
            .field("key_id", &self.key_id)
            .field("master_key_base64", &"[REDACTED]")
            .finish()
    }
}

/// HashiCorp Vault transit engine settings
#[derive(Clone, Serialize, Deserialize, Validate)]
pub struct VaultTransitConfig {
    /// Keeper id recorded in rows encrypted through Vault
    #[serde(default = "default_vault_keeper_id")]
    #[validate(length(min = 1, max = 64, message = "Keeper id must be 1-64 characters"))]
    pub keeper_id: String,

    /// Vault server address
    #[validate(url(message = "Vault address must be a valid URL"))]
    pub address: String,

    /// Vault authentication token
    #[serde(skip_serializing)]
    pub token: Option<String>,

    /// Vault namespace (for Enterprise)
    pub namespace: Option<String>,

    /// Transit engine mount path
    #[serde(default = "default_transit_mount")]
    pub mount: String,

    /// Transit key name
    #[validate(length(min = 1, message = "Transit key name cannot be empty"))]
    pub key_name: String,
}

fn default_vault_keeper_id() -> String {
    "vault-transit".to_string()
}

fn default_transit_mount() -> String {
    "transit".to_string()
}

impl std::fmt::Debug for VaultTransitConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VaultTransitConfig")
            .field("keeper_id", &self.keeper_id)
            .field("address", &self.address)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .field("namespace", &self.namespace)
            .field("mount", &self.mount)
            .field("key_name", &self.key_name)
            .finish()
    }
}

/// Keeper configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct KeeperConfig {
    /// Keeper id used to encrypt new values
    #[validate(length(min = 1, message = "Default keeper cannot be empty"))]
    pub default_keeper: String,

    /// Local AES keys; retired keys stay listed so old rows remain decryptable
    #[validate(nested)]
    pub local_keys: Vec<LocalKeyConfig>,

    /// Optional Vault transit keeper
    #[validate(nested)]
    pub vault: Option<VaultTransitConfig>,
}

impl Default for KeeperConfig {
    fn default() -> Self {
        Self { default_keeper: "local".to_string(), local_keys: Vec::new(), vault: None }
    }
}

/// Store behaviour
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct StoreConfig {
    /// Maximum number of history records per page
    #[validate(range(min = 1, max = 1000, message = "History page size must be 1-1000"))]
    pub history_page_size: u32,

    /// Deadline applied to operations whose context has none (0 = none)
    #[validate(range(max = 600, message = "Operation timeout must be at most 600 seconds"))]
    pub operation_timeout_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { history_page_size: 50, operation_timeout_seconds: 30 }
    }
}

impl StoreConfig {
    /// Default operation deadline (None if 0)
    pub fn operation_timeout(&self) -> Option<Duration> {
        if self.operation_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(self.operation_timeout_seconds))
        }
    }
}

/// Logging and metrics configuration
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Tracing service name
    #[validate(length(min = 1, message = "Service name cannot be empty"))]
    pub service_name: String,

    /// Log level or filter directive (used when RUST_LOG is unset)
    #[validate(length(min = 1, message = "Log level cannot be empty"))]
    pub log_level: String,

    /// Enable JSON structured logging
    pub json_logging: bool,

    /// Record store metrics through the `metrics` facade
    pub enable_metrics: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "strongbox".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
            enable_metrics: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn local_key() -> LocalKeyConfig {
        LocalKeyConfig {
            key_id: "local".to_string(),
            master_key_base64: "QkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkI=".to_string(),
        }
    }

    fn valid_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.keeper.local_keys.push(local_key());
        config
    }

    #[test]
    fn test_valid_config() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_default_keeper_must_exist() {
        let config = AppConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("Default keeper 'local'"));
    }

    #[test]
    fn test_database_config_timeouts() {
        let config = DatabaseConfig {
            connect_timeout_seconds: 15,
            idle_timeout_seconds: 300,
            ..Default::default()
        };
        assert_eq!(config.connect_timeout(), Duration::from_secs(15));
        assert_eq!(config.idle_timeout(), Some(Duration::from_secs(300)));

        let config_no_idle = DatabaseConfig { idle_timeout_seconds: 0, ..Default::default() };
        assert_eq!(config_no_idle.idle_timeout(), None);
    }

    #[test]
    fn test_database_config_type_detection() {
        let sqlite_config =
            DatabaseConfig { url: "sqlite://./test.db".to_string(), ..Default::default() };
        assert!(sqlite_config.is_sqlite());
        assert_eq!(sqlite_config.dialect().unwrap(), Dialect::Sqlite);

        let pg_config =
            DatabaseConfig { url: "postgres://localhost/test".to_string(), ..Default::default() };
        assert!(pg_config.is_postgresql());
        assert_eq!(pg_config.dialect().unwrap(), Dialect::Postgres);
    }

    #[test]
    fn test_config_validation_errors() {
        let mut config = valid_config();
        config.database.url = "mysql://localhost/test".to_string();
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.database.max_connections = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.database.max_connections = 2;
        config.database.min_connections = 5;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config.store.history_page_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_vault_keeper_can_be_default() {
        let mut config = AppConfig::default();
        config.keeper.default_keeper = "vault-transit".to_string();
        config.keeper.vault = Some(VaultTransitConfig {
            keeper_id: default_vault_keeper_id(),
            address: "http://127.0.0.1:8200".to_string(),
            token: Some("root".to_string()),
            namespace: None,
            mount: default_transit_mount(),
            key_name: "strongbox".to_string(),
        });
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_debug_redacts_key_material() {
        let debug = format!("{:?}", local_key());
        assert!(debug.contains("[REDACTED]"));
        assert!(!debug.contains("QkJC"));
    }

    #[test]
    fn test_load_from_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[database]
url = "sqlite://./data/from-file.db"
max_connections = 4

[keeper]
default_keeper = "k1"

[[keeper.local_keys]]
key_id = "k1"
master_key_base64 = "QkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkI="

[store]
history_page_size = 10
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.database.url, "sqlite://./data/from-file.db");
        assert_eq!(config.database.max_connections, 4);
        assert_eq!(config.keeper.default_keeper, "k1");
        assert_eq!(config.keeper.local_keys.len(), 1);
        assert_eq!(config.store.history_page_size, 10);
        assert_eq!(config.store.operation_timeout_seconds, 30);
    }

    #[test]
    fn test_load_missing_file() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/strongbox.toml")));
        assert!(result.is_err());
    }
}
