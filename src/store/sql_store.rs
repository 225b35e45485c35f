//! SQL-backed secure value store.
//!
//! Mutations run as one transaction holding the conditional write and its
//! history record. The read preceding an update or delete happens outside the
//! transaction; the write only matches while `updated` still holds the value
//! that read returned, so interleaved writers get `Conflict` instead of a lost
//! update.

use crate::auth::{Identity, RequestContext};
use crate::config::{AppConfig, StoreConfig};
use crate::domain::{
    validate_name, validate_namespace, HistoryId, HistoryOperation, HistoryPage, HistoryRecord,
    SecretValue, SecureValue, SecureValueUid,
};
use crate::errors::{ErrorContext, Result, StrongboxError};
use crate::keeper::{generate_salt, Keeper, KeeperRegistry};
use crate::observability::StoreMetrics;
use crate::sqltemplate::{RenderedQuery, TemplateRegistry};
use crate::storage::{create_pool, Database};
use crate::store::codec::{self, HistoryRow, SecureValueRow};
use crate::store::requests::{
    CreateHistoryRecord, CreateSecureValue, DeleteSecureValue, ListHistory, ListSecureValues,
    ReadSecureValue, UpdateSecureValue, CREATE, DELETE, HISTORY_CREATE, HISTORY_LIST, LIST, READ,
    REQUIRED_TEMPLATES, UPDATE,
};
use crate::store::{LabelSelector, ListOptions, SecureValueStore};
use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::Utc;
use sqlx::any::AnyRow;
use sqlx::{Any, FromRow, Transaction};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn, Instrument};
use validator::Validate;

const RESOURCE_TYPE: &str = "SecureValue";

pub struct SqlSecureValueStore {
    database: Database,
    keeper: Arc<dyn Keeper>,
    templates: TemplateRegistry,
    config: StoreConfig,
    metrics: StoreMetrics,
}

impl std::fmt::Debug for SqlSecureValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlSecureValueStore")
            .field("dialect", &self.database.dialect())
            .field("keeper", &self.keeper)
            .field("config", &self.config)
            .finish()
    }
}

impl SqlSecureValueStore {
    /// Build a store over an already migrated database.
    ///
    /// Fails if `config` is out of range or any SQL template is missing or
    /// malformed.
    pub fn new(
        database: Database,
        keeper: Arc<dyn Keeper>,
        config: StoreConfig,
        metrics: StoreMetrics,
    ) -> Result<Self> {
        config.validate().map_err(|e| {
            StrongboxError::config(format!("Invalid store configuration: {}", e))
        })?;
        let templates = TemplateRegistry::new(database.dialect())?;
        templates.require(REQUIRED_TEMPLATES)?;

        info!(
            dialect = %database.dialect(),
            keeper = %keeper.keeper_id(),
            history_page_size = config.history_page_size,
            "Secure value store initialized"
        );

        Ok(Self { database, keeper, templates, config, metrics })
    }

    /// Connect, migrate (when `database.auto_migrate` is set) and build every keeper
    pub async fn from_config(config: &AppConfig, metrics: StoreMetrics) -> Result<Self> {
        let database = create_pool(&config.database).await?;
        let keepers =
            KeeperRegistry::from_config(&config.keeper).await?.with_metrics(metrics.clone());
        Self::new(database, Arc::new(keepers), config.store.clone(), metrics)
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn keeper(&self) -> &Arc<dyn Keeper> {
        &self.keeper
    }

    /// Run `fut` under the context's deadline and record the outcome
    async fn observe<T, F>(&self, cx: &RequestContext, operation: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let start = Instant::now();
        let result = cx.run(operation, self.config.operation_timeout(), fut).await;
        let outcome = match &result {
            Ok(_) => "ok".to_string(),
            Err(StrongboxError::Timeout { .. }) => "timeout".to_string(),
            Err(StrongboxError::Cancelled { .. }) => "cancelled".to_string(),
            Err(e) => e.kind().to_string(),
        };
        self.metrics.record_operation(operation, &outcome, start.elapsed());
        result
    }

    async fn create_value(&self, cx: &RequestContext, object: SecureValue) -> Result<SecureValue> {
        let identity = cx.require_identity()?;
        validate_namespace(object.namespace())?;
        validate_name(object.name())?;
        let value = require_value(object.spec.value.as_ref())?;

        let uid = SecureValueUid::new();
        let now = Utc::now();
        let mut row = codec::to_row(&object, &uid, identity.subject(), now.timestamp_millis())?;
        self.seal(cx, &mut row, value).await?;

        let record = HistoryRecord {
            id: HistoryId::new(),
            namespace: row.namespace.clone(),
            name: row.name.clone(),
            uid: uid.clone(),
            actor: identity.subject().to_string(),
            timestamp: now,
            operation: HistoryOperation::Create,
            previous_resource_version: None,
            resource_version: row.resource_version(),
        };

        let insert = self.templates.render(CREATE, &CreateSecureValue { row: &row })?;
        let history = self.templates.render(HISTORY_CREATE, &CreateHistoryRecord { record: &record })?;

        let mut tx = self.begin().await?;
        insert.query().execute(&mut *tx).await.map_err(|e| {
            if is_unique_violation(&e) {
                StrongboxError::conflict(
                    format!("secure value '{}' already exists", object.key()),
                    RESOURCE_TYPE,
                )
            } else {
                tracing::error!(error = %e, key = %object.key(), "Failed to insert secure value");
                StrongboxError::database(e, format!("Failed to create secure value '{}'", object.key()))
            }
        })?;
        self.append_history(&mut tx, &history).await?;
        commit(tx).await?;

        info!(
            uid = %uid,
            keeper = %row.keeper,
            resource_version = %row.updated,
            "Created secure value"
        );

        codec::to_object(&row)
    }

    async fn update_value(&self, cx: &RequestContext, object: SecureValue) -> Result<SecureValue> {
        let Some(uid) = object.metadata.uid.clone() else {
            return self.create_value(cx, object).await;
        };
        let identity = cx.require_identity()?;
        validate_namespace(object.namespace())?;
        validate_name(object.name())?;
        let expected_version = object.metadata.resource_version_millis()?;

        let current = self.require_row(object.namespace(), object.name()).await?;
        if current.guid != uid.as_str() {
            return Err(StrongboxError::conflict(
                format!("uid {} does not match stored secure value '{}'", uid, object.key()),
                RESOURCE_TYPE,
            ));
        }
        if let Some(expected) = expected_version {
            if expected != current.updated {
                return Err(stale(&object.key(), expected, current.updated));
            }
        }

        if !may_change_apis(identity, &current, &object)? {
            warn!(
                target: "strongbox::audit",
                namespace = %object.namespace(),
                name = %object.name(),
                subject = %identity.subject(),
                app = identity.app().unwrap_or(""),
                "Secure value apis change denied"
            );
            return Err(StrongboxError::permission_denied(format!(
                "caller '{}' may not change the apis of '{}'",
                caller_name(identity),
                object.key()
            )));
        }

        let mut next = current.clone();
        next.apply_spec(&object)?;
        if let Some(value) = object.spec.value.as_ref() {
            let value = require_value(Some(value))?;
            let stored = self.open(cx, &current).await?;
            if stored != *value {
                self.seal(cx, &mut next, value).await?;
            }
        }

        let now = Utc::now();
        next.updated = now.timestamp_millis().max(current.updated + 1);
        next.updated_by = identity.subject().to_string();

        let record = HistoryRecord {
            id: HistoryId::new(),
            namespace: next.namespace.clone(),
            name: next.name.clone(),
            uid,
            actor: identity.subject().to_string(),
            timestamp: now,
            operation: HistoryOperation::Update,
            previous_resource_version: Some(current.resource_version()),
            resource_version: next.resource_version(),
        };

        let update = self
            .templates
            .render(UPDATE, &UpdateSecureValue { row: &next, expected_updated: current.updated })?;
        let history = self.templates.render(HISTORY_CREATE, &CreateHistoryRecord { record: &record })?;

        let mut tx = self.begin().await?;
        let result = update.query().execute(&mut *tx).await.map_err(|e| {
            tracing::error!(error = %e, key = %object.key(), "Failed to update secure value");
            StrongboxError::database(e, format!("Failed to update secure value '{}'", object.key()))
        })?;
        if result.rows_affected() == 0 {
            return Err(StrongboxError::conflict(
                format!("secure value '{}' was modified concurrently", object.key()),
                RESOURCE_TYPE,
            ));
        }
        self.append_history(&mut tx, &history).await?;
        commit(tx).await?;

        info!(
            previous_resource_version = %current.updated,
            resource_version = %next.updated,
            reencrypted = next.salt != current.salt,
            "Updated secure value"
        );

        codec::to_object(&next)
    }

    async fn delete_value(
        &self,
        cx: &RequestContext,
        namespace: &str,
        name: &str,
    ) -> Result<(SecureValue, bool)> {
        let identity = cx.require_identity()?;
        validate_namespace(namespace)?;
        validate_name(name)?;

        let current = self.require_row(namespace, name).await?;
        let object = codec::to_object(&current)?;

        let now = Utc::now();
        let record = HistoryRecord {
            id: HistoryId::new(),
            namespace: current.namespace.clone(),
            name: current.name.clone(),
            uid: SecureValueUid::from_string(current.guid.clone()),
            actor: identity.subject().to_string(),
            timestamp: now,
            operation: HistoryOperation::Delete,
            previous_resource_version: Some(current.resource_version()),
            resource_version: now.timestamp_millis().max(current.updated + 1).to_string(),
        };

        let delete = self.templates.render(
            DELETE,
            &DeleteSecureValue {
                namespace,
                name,
                guid: &current.guid,
                expected_updated: current.updated,
            },
        )?;
        let history = self.templates.render(HISTORY_CREATE, &CreateHistoryRecord { record: &record })?;

        let key = object.key();
        let mut tx = self.begin().await?;
        let result = delete.query().execute(&mut *tx).await.map_err(|e| {
            tracing::error!(error = %e, key = %key, "Failed to delete secure value");
            StrongboxError::database(e, format!("Failed to delete secure value '{}'", key))
        })?;
        if result.rows_affected() == 0 {
            return Err(StrongboxError::conflict(
                format!("secure value '{}' was modified concurrently", key),
                RESOURCE_TYPE,
            ));
        }
        self.append_history(&mut tx, &history).await?;
        commit(tx).await?;

        info!(uid = %current.guid, resource_version = %current.updated, "Deleted secure value");
        Ok((object, true))
    }

    async fn list_values(
        &self,
        cx: &RequestContext,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<Vec<SecureValue>> {
        cx.require_identity()?;
        validate_namespace(namespace)?;
        let selector = LabelSelector::parse(options.label_selector.as_deref().unwrap_or(""))?;

        let rendered = self.templates.render(LIST, &ListSecureValues { namespace })?;
        let rows = retry_read("list", || self.fetch_all(&rendered)).await?;
        let total = rows.len();

        let mut items = Vec::with_capacity(total);
        for row in rows {
            let row = SecureValueRow::from_row(&row).map_err(|e| {
                StrongboxError::database(e, "Failed to decode secure value row")
            })?;
            let object = codec::to_object(&row)
                .context(format!("secure value '{}/{}'", row.namespace, row.name))?;
            if selector.matches(&object.metadata.labels) {
                items.push(object);
            }
        }

        tracing::debug!(total = total, matched = items.len(), "Listed secure values");
        Ok(items)
    }

    async fn decrypt_value(
        &self,
        cx: &RequestContext,
        namespace: &str,
        name: &str,
    ) -> Result<SecureValue> {
        let identity = cx.require_identity()?;
        validate_namespace(namespace)?;
        validate_name(name)?;

        let row = self.require_row(namespace, name).await?;
        let mut object = codec::to_object(&row)?;

        if !identity.is_authorized_for(&object.spec.apis) {
            audit_decrypt(identity, &object, false);
            return Err(StrongboxError::permission_denied(format!(
                "caller '{}' may not decrypt '{}'",
                caller_name(identity),
                object.key()
            )));
        }

        let value = self.open(cx, &row).await?;
        audit_decrypt(identity, &object, true);
        object.spec.value = Some(value);
        Ok(object)
    }

    async fn history_page(
        &self,
        cx: &RequestContext,
        namespace: &str,
        name: &str,
        continue_token: Option<&str>,
    ) -> Result<HistoryPage> {
        cx.require_identity()?;
        let offset = match continue_token {
            Some(token) => decode_continue_token(token)?,
            None => 0,
        };
        let page_size = i64::from(self.config.history_page_size);

        // one extra row tells us whether another page exists
        let request = ListHistory { namespace, name, limit: page_size + 1, offset };
        let rendered = self.templates.render(HISTORY_LIST, &request)?;
        let rows = retry_read("history", || self.fetch_all(&rendered)).await?;

        let mut items = rows
            .iter()
            .map(|row| {
                let row = HistoryRow::from_row(row)
                    .map_err(|e| StrongboxError::database(e, "Failed to decode history row"))?;
                HistoryRecord::try_from(row)
            })
            .collect::<Result<Vec<_>>>()?;

        let continue_token = if items.len() as i64 > page_size {
            items.truncate(page_size as usize);
            Some(encode_continue_token(offset + page_size))
        } else {
            None
        };

        Ok(HistoryPage { items, continue_token })
    }

    /// Encrypt `value` under a fresh salt with the default keeper
    async fn seal(
        &self,
        cx: &RequestContext,
        row: &mut SecureValueRow,
        value: &SecretValue,
    ) -> Result<()> {
        let salt = generate_salt();
        row.value = self.keeper.encode(cx, value, &salt).await?;
        row.salt = salt;
        row.keeper = self.keeper.keeper_id().to_string();
        row.addr = self.keeper.address().to_string();
        Ok(())
    }

    /// Decrypt a stored row with the keeper recorded on it
    async fn open(&self, cx: &RequestContext, row: &SecureValueRow) -> Result<SecretValue> {
        self.keeper.decode(cx, &row.value, &row.salt, &row.keeper, &row.addr).await
    }

    async fn require_row(&self, namespace: &str, name: &str) -> Result<SecureValueRow> {
        let rendered = self.templates.render(READ, &ReadSecureValue { namespace, name })?;
        let row = retry_read("read", || self.fetch_optional(&rendered))
            .await?
            .ok_or_else(|| {
                StrongboxError::not_found(RESOURCE_TYPE, format!("{}/{}", namespace, name))
            })?;
        SecureValueRow::from_row(&row)
            .map_err(|e| StrongboxError::database(e, "Failed to decode secure value row"))
    }

    async fn fetch_optional(&self, rendered: &RenderedQuery) -> Result<Option<AnyRow>> {
        rendered
            .query()
            .fetch_optional(self.database.pool())
            .instrument(crate::db_span!("fetch_optional"))
            .await
            .map_err(|e| StrongboxError::database(e, "Failed to read secure value"))
    }

    async fn fetch_all(&self, rendered: &RenderedQuery) -> Result<Vec<AnyRow>> {
        rendered
            .query()
            .fetch_all(self.database.pool())
            .instrument(crate::db_span!("fetch_all"))
            .await
            .map_err(|e| StrongboxError::database(e, "Failed to fetch rows"))
    }

    async fn begin(&self) -> Result<Transaction<'static, Any>> {
        self.database
            .pool()
            .begin()
            .await
            .map_err(|e| StrongboxError::database(e, "Failed to begin transaction"))
    }

    async fn append_history(
        &self,
        tx: &mut Transaction<'static, Any>,
        history: &RenderedQuery,
    ) -> Result<()> {
        history
            .query()
            .execute(&mut **tx)
            .instrument(crate::db_span!("insert_history"))
            .await
            .map_err(|e| StrongboxError::database(e, "Failed to append history record"))?;
        Ok(())
    }
}

#[async_trait]
impl SecureValueStore for SqlSecureValueStore {
    #[instrument(
        skip(self, cx, object),
        fields(namespace = %object.metadata.namespace, name = %object.metadata.name),
        name = "store_create"
    )]
    async fn create(&self, cx: &RequestContext, object: SecureValue) -> Result<SecureValue> {
        self.observe(cx, "create", self.create_value(cx, object)).await
    }

    #[instrument(skip(self, cx), name = "store_read")]
    async fn read(&self, cx: &RequestContext, namespace: &str, name: &str) -> Result<SecureValue> {
        self.observe(cx, "read", async {
            cx.require_identity()?;
            validate_namespace(namespace)?;
            validate_name(name)?;
            let row = self.require_row(namespace, name).await?;
            codec::to_object(&row)
        })
        .await
    }

    #[instrument(
        skip(self, cx, object),
        fields(namespace = %object.metadata.namespace, name = %object.metadata.name),
        name = "store_update"
    )]
    async fn update(&self, cx: &RequestContext, object: SecureValue) -> Result<SecureValue> {
        self.observe(cx, "update", self.update_value(cx, object)).await
    }

    #[instrument(skip(self, cx), name = "store_delete")]
    async fn delete(
        &self,
        cx: &RequestContext,
        namespace: &str,
        name: &str,
    ) -> Result<(SecureValue, bool)> {
        self.observe(cx, "delete", self.delete_value(cx, namespace, name)).await
    }

    #[instrument(skip(self, cx, options), fields(selector = ?options.label_selector), name = "store_list")]
    async fn list(
        &self,
        cx: &RequestContext,
        namespace: &str,
        options: &ListOptions,
    ) -> Result<Vec<SecureValue>> {
        self.observe(cx, "list", self.list_values(cx, namespace, options)).await
    }

    #[instrument(skip(self, cx), name = "store_decrypt")]
    async fn decrypt(
        &self,
        cx: &RequestContext,
        namespace: &str,
        name: &str,
    ) -> Result<SecureValue> {
        self.observe(cx, "decrypt", self.decrypt_value(cx, namespace, name)).await
    }

    #[instrument(skip(self, cx, continue_token), name = "store_history")]
    async fn history(
        &self,
        cx: &RequestContext,
        namespace: &str,
        name: &str,
        continue_token: Option<&str>,
    ) -> Result<HistoryPage> {
        self.observe(cx, "history", self.history_page(cx, namespace, name, continue_token)).await
    }
}

/// Run an idempotent read, retrying once on a retryable storage error
async fn retry_read<T, F, Fut>(operation: &'static str, mut attempt: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    match attempt().await {
        Err(e) if e.is_retryable() => {
            warn!(operation = operation, error = %e, "Retrying read after transient error");
            attempt().await
        }
        other => other,
    }
}

async fn commit(tx: Transaction<'static, Any>) -> Result<()> {
    tx.commit().await.map_err(|e| StrongboxError::database(e, "Failed to commit transaction"))
}

fn require_value(value: Option<&SecretValue>) -> Result<&SecretValue> {
    value.filter(|v| !v.is_empty()).ok_or_else(|| {
        StrongboxError::validation_field("a non-empty value is required", "spec.value")
    })
}

fn stale(key: &str, expected: i64, actual: i64) -> StrongboxError {
    StrongboxError::conflict(
        format!(
            "secure value '{}' has been modified (expected resource version {}, found {})",
            key, expected, actual
        ),
        RESOURCE_TYPE,
    )
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    error.as_database_error().is_some_and(|db| db.is_unique_violation())
}

/// Only the creator or a caller already allowed to decrypt may edit `apis`
fn may_change_apis(
    identity: &Identity,
    current: &SecureValueRow,
    object: &SecureValue,
) -> Result<bool> {
    let stored = codec::to_object(current)?;
    Ok(object.spec.apis == stored.spec.apis
        || current.created_by == identity.subject()
        || identity.is_authorized_for(&stored.spec.apis))
}

fn caller_name(identity: &Identity) -> &str {
    identity.app().unwrap_or_else(|| identity.subject())
}

fn audit_decrypt(identity: &Identity, object: &SecureValue, granted: bool) {
    if granted {
        info!(
            target: "strongbox::audit",
            namespace = %object.namespace(),
            name = %object.name(),
            subject = %identity.subject(),
            app = identity.app().unwrap_or(""),
            granted = true,
            "Secure value decrypted"
        );
    } else {
        warn!(
            target: "strongbox::audit",
            namespace = %object.namespace(),
            name = %object.name(),
            subject = %identity.subject(),
            app = identity.app().unwrap_or(""),
            granted = false,
            "Secure value decrypt denied"
        );
    }
}

fn encode_continue_token(offset: i64) -> String {
    URL_SAFE_NO_PAD.encode(offset.to_string())
}

fn decode_continue_token(token: &str) -> Result<i64> {
    let invalid = || StrongboxError::validation_field("invalid continue token", "continue");
    let bytes = URL_SAFE_NO_PAD.decode(token).map_err(|_| invalid())?;
    let offset = std::str::from_utf8(&bytes)
        .ok()
        .and_then(|s| s.parse::<i64>().ok())
        .filter(|offset| *offset >= 0)
        .ok_or_else(invalid)?;
    Ok(offset)
}
