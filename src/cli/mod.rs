//! # Command Line Interface
//!
//! Administrative access to a secure value store: schema migrations and the
//! store operations, acting as the identity given with `--as`/`--app`.

pub mod output;
pub mod secure_values;

use crate::auth::{Identity, RequestContext};
use crate::config::AppConfig;
use crate::observability::{init_observability, log_config_info};
use crate::storage::{
    create_pool, get_migration_version, list_applied_migrations, run_migrations,
    validate_migrations,
};
use crate::store::SqlSecureValueStore;
use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "strongbox")]
#[command(about = "Encrypted secure value store")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to a TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Database URL override
    #[arg(long, global = true)]
    pub database_url: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subject to act as (defaults to $USER)
    #[arg(long = "as", global = true, value_name = "SUBJECT")]
    pub subject: Option<String>,

    /// Application identity to act as
    #[arg(long, global = true)]
    pub app: Option<String>,

    /// Namespace of the secure values
    #[arg(short, long, global = true, default_value = "default")]
    pub namespace: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run pending migrations
    Migrate {
        /// Show applied migrations instead of running pending ones
        #[arg(long)]
        status: bool,
    },

    #[command(flatten)]
    SecureValue(secure_values::SecureValueCommands),
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config =
        AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    if let Some(url) = cli.database_url {
        config.database.url = url;
    }
    if cli.verbose {
        config.observability.log_level = "debug".to_string();
    }

    let metrics = init_observability(&config.observability)?;
    log_config_info(&config);

    match cli.command {
        Commands::Migrate { status } => handle_migrate(&config, status).await?,
        Commands::SecureValue(command) => {
            let cx = request_context(cli.subject, cli.app);
            let store = SqlSecureValueStore::from_config(&config, metrics)
                .await
                .context("Failed to open secure value store")?;
            secure_values::handle_command(command, &store, &cx, &cli.namespace).await?;
            store.database().close().await;
        }
    }

    Ok(())
}

fn request_context(subject: Option<String>, app: Option<String>) -> RequestContext {
    let Some(subject) = subject.or_else(|| std::env::var("USER").ok()) else {
        return RequestContext::anonymous();
    };
    let identity = match app {
        Some(app) => Identity::new(subject).with_app(app),
        None => Identity::new(subject),
    };
    RequestContext::new(identity)
}

async fn handle_migrate(config: &AppConfig, status: bool) -> anyhow::Result<()> {
    let mut database_config = config.database.clone();
    database_config.auto_migrate = false;
    let database = create_pool(&database_config).await.context("Failed to connect to database")?;

    if !status {
        run_migrations(&database).await.context("Failed to run migrations")?;
    }

    let applied = list_applied_migrations(&database).await?;
    let report = json!({
        "version": get_migration_version(&database).await?,
        "valid": validate_migrations(&database).await?,
        "applied": applied,
    });
    output::print_json(&report)?;

    database.close().await;
    Ok(())
}
