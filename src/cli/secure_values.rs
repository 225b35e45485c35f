//! Secure value commands

use super::output::print_json;
use crate::auth::RequestContext;
use crate::domain::{SecretValue, SecureValue, SecureValueSpec};
use crate::store::{ListOptions, SecureValueStore};
use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use serde_json::json;
use std::collections::BTreeMap;
use std::path::PathBuf;
use zeroize::Zeroizing;

#[derive(Subcommand)]
pub enum SecureValueCommands {
    /// Create a secure value
    Create(CreateArgs),

    /// Show a secure value (without its plaintext)
    Get { name: String },

    /// List secure values in the namespace
    List {
        /// Label selector, e.g. `team=a,env in (prod)`
        #[arg(short = 'l', long)]
        selector: Option<String>,
    },

    /// Update a secure value
    Update(UpdateArgs),

    /// Delete a secure value
    Delete { name: String },

    /// Show a secure value including its plaintext
    Decrypt { name: String },

    /// Show the mutation history of a secure value
    History {
        name: String,

        /// Continue token from a previous page
        #[arg(long = "continue")]
        continue_token: Option<String>,
    },
}

#[derive(Args)]
pub struct ValueSource {
    /// Plaintext value
    #[arg(long, conflicts_with = "value_file")]
    pub value: Option<String>,

    /// Read the plaintext value from a file (trailing newline removed)
    #[arg(long)]
    pub value_file: Option<PathBuf>,
}

impl ValueSource {
    fn read(&self) -> Result<Option<SecretValue>> {
        if let Some(value) = &self.value {
            return Ok(Some(SecretValue::new(value.as_str())));
        }
        let Some(path) = &self.value_file else {
            return Ok(None);
        };
        let contents = Zeroizing::new(
            std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read value file {}", path.display()))?,
        );
        let trimmed = contents.strip_suffix('\n').unwrap_or(&contents);
        Ok(Some(SecretValue::new(trimmed.strip_suffix('\r').unwrap_or(trimmed))))
    }
}

#[derive(Args)]
pub struct CreateArgs {
    pub name: String,

    #[command(flatten)]
    pub source: ValueSource,

    /// Display title
    #[arg(long, default_value = "")]
    pub title: String,

    /// Label as key=value (repeatable)
    #[arg(long = "label", value_parser = parse_key_value)]
    pub labels: Vec<(String, String)>,

    /// Annotation as key=value (repeatable)
    #[arg(long = "annotation", value_parser = parse_key_value)]
    pub annotations: Vec<(String, String)>,

    /// Identity allowed to decrypt (repeatable)
    #[arg(long = "api")]
    pub apis: Vec<String>,
}

#[derive(Args)]
pub struct UpdateArgs {
    pub name: String,

    #[command(flatten)]
    pub source: ValueSource,

    /// New display title
    #[arg(long)]
    pub title: Option<String>,

    /// Replace labels with these key=value pairs
    #[arg(long = "label", value_parser = parse_key_value)]
    pub labels: Vec<(String, String)>,

    /// Replace user annotations with these key=value pairs
    #[arg(long = "annotation", value_parser = parse_key_value)]
    pub annotations: Vec<(String, String)>,

    /// Replace the identities allowed to decrypt
    #[arg(long = "api")]
    pub apis: Vec<String>,

    /// Fail unless the stored resource version matches
    #[arg(long)]
    pub resource_version: Option<String>,
}

fn parse_key_value(raw: &str) -> std::result::Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got '{}'", raw)),
    }
}

fn to_map(pairs: Vec<(String, String)>) -> BTreeMap<String, String> {
    pairs.into_iter().collect()
}

pub async fn handle_command(
    command: SecureValueCommands,
    store: &dyn SecureValueStore,
    cx: &RequestContext,
    namespace: &str,
) -> Result<()> {
    match command {
        SecureValueCommands::Create(args) => {
            let spec = SecureValueSpec {
                title: args.title,
                value: args.source.read()?,
                apis: args.apis,
            };
            let mut object = SecureValue::new(namespace, args.name, spec);
            object.metadata.labels = to_map(args.labels);
            object.metadata.annotations = to_map(args.annotations);
            print_json(&store.create(cx, object).await?)?;
        }
        SecureValueCommands::Get { name } => {
            print_json(&store.read(cx, namespace, &name).await?)?;
        }
        SecureValueCommands::List { selector } => {
            let options = ListOptions { label_selector: selector };
            print_json(&store.list(cx, namespace, &options).await?)?;
        }
        SecureValueCommands::Update(args) => {
            let mut object = store.read(cx, namespace, &args.name).await?;
            if let Some(title) = args.title {
                object.spec.title = title;
            }
            if !args.labels.is_empty() {
                object.metadata.labels = to_map(args.labels);
            }
            if !args.annotations.is_empty() {
                object.metadata.annotations = to_map(args.annotations);
            }
            if !args.apis.is_empty() {
                object.spec.apis = args.apis;
            }
            if let Some(resource_version) = args.resource_version {
                object.metadata.resource_version = resource_version;
            }
            object.spec.value = args.source.read()?;
            print_json(&store.update(cx, object).await?)?;
        }
        SecureValueCommands::Delete { name } => {
            let (object, deleted) = store.delete(cx, namespace, &name).await?;
            print_json(&json!({ "deleted": deleted, "object": object }))?;
        }
        SecureValueCommands::Decrypt { name } => {
            print_json(&store.decrypt(cx, namespace, &name).await?)?;
        }
        SecureValueCommands::History { name, continue_token } => {
            let page = store.history(cx, namespace, &name, continue_token.as_deref()).await?;
            print_json(&page)?;
        }
    }

    Ok(())
}
