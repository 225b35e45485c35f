//! Secure value resource model.
//!
//! A [`SecureValue`] is the namespaced object exchanged with callers. System
//! metadata (who created/updated it and when it was last updated) is carried
//! in annotations under [`SYSTEM_ANNOTATION_PREFIX`] and accessed through
//! [`ObjectMeta`] helpers; callers cannot persist those keys themselves.

use crate::domain::id::{HistoryId, SecureValueUid};
use crate::errors::{Result, StrongboxError};
use chrono::{DateTime, SecondsFormat, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use zeroize::{Zeroize, ZeroizeOnDrop};

/// Annotation keys with this prefix are owned by the store
pub const SYSTEM_ANNOTATION_PREFIX: &str = "strongbox.dev/";
pub const ANNOTATION_CREATED_BY: &str = "strongbox.dev/createdBy";
pub const ANNOTATION_UPDATED_BY: &str = "strongbox.dev/updatedBy";
pub const ANNOTATION_UPDATED_TIMESTAMP: &str = "strongbox.dev/updatedTimestamp";

pub const MAX_NAME_LENGTH: usize = 253;
pub const MAX_NAMESPACE_LENGTH: usize = 63;

static DNS_SUBDOMAIN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
        .expect("valid DNS subdomain regex")
});

static DNS_LABEL: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("valid DNS label regex"));

/// Plaintext secret. Zeroed on drop and never printed by `Debug`.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
#[serde(transparent)]
pub struct SecretValue(String);

impl SecretValue {
    pub fn new<S: Into<String>>(value: S) -> Self {
        Self(value.into())
    }

    /// Borrow the plaintext
    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SecretValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecretValue([REDACTED])")
    }
}

impl From<String> for SecretValue {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for SecretValue {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Standard object metadata
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectMeta {
    pub name: String,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<SecureValueUid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<DateTime<Utc>>,
    /// Update time in milliseconds since the epoch, as a decimal string
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub resource_version: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

impl ObjectMeta {
    pub fn new<N: Into<String>, S: Into<String>>(namespace: N, name: S) -> Self {
        Self { namespace: namespace.into(), name: name.into(), ..Default::default() }
    }

    pub fn created_by(&self) -> Option<&str> {
        self.annotations.get(ANNOTATION_CREATED_BY).map(String::as_str)
    }

    pub fn set_created_by<S: Into<String>>(&mut self, actor: S) {
        self.annotations.insert(ANNOTATION_CREATED_BY.to_string(), actor.into());
    }

    pub fn updated_by(&self) -> Option<&str> {
        self.annotations.get(ANNOTATION_UPDATED_BY).map(String::as_str)
    }

    pub fn set_updated_by<S: Into<String>>(&mut self, actor: S) {
        self.annotations.insert(ANNOTATION_UPDATED_BY.to_string(), actor.into());
    }

    pub fn updated_timestamp(&self) -> Option<DateTime<Utc>> {
        self.annotations
            .get(ANNOTATION_UPDATED_TIMESTAMP)
            .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
            .map(|ts| ts.with_timezone(&Utc))
    }

    pub fn set_updated_timestamp(&mut self, ts: DateTime<Utc>) {
        self.annotations.insert(
            ANNOTATION_UPDATED_TIMESTAMP.to_string(),
            ts.to_rfc3339_opts(SecondsFormat::Millis, true),
        );
    }

    /// Parsed resource version; `None` when the caller did not supply one
    pub fn resource_version_millis(&self) -> Result<Option<i64>> {
        if self.resource_version.is_empty() {
            return Ok(None);
        }
        self.resource_version.parse::<i64>().map(Some).map_err(|_| {
            StrongboxError::validation_field(
                format!("invalid resource version '{}'", self.resource_version),
                "metadata.resourceVersion",
            )
        })
    }

    /// Annotations a caller is allowed to persist
    pub fn user_annotations(&self) -> BTreeMap<String, String> {
        self.annotations
            .iter()
            .filter(|(key, _)| !key.starts_with(SYSTEM_ANNOTATION_PREFIX))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureValueSpec {
    /// Human readable display name
    #[serde(default)]
    pub title: String,

    /// Plaintext; present only in create/update input and decrypt output
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<SecretValue>,

    /// Caller identities (apps or subjects) allowed to decrypt
    #[serde(default)]
    pub apis: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecureValue {
    pub metadata: ObjectMeta,
    pub spec: SecureValueSpec,
}

impl SecureValue {
    pub fn new<N, S>(namespace: N, name: S, spec: SecureValueSpec) -> Self
    where
        N: Into<String>,
        S: Into<String>,
    {
        Self { metadata: ObjectMeta::new(namespace, name), spec }
    }

    pub fn namespace(&self) -> &str {
        &self.metadata.namespace
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// `namespace/name`
    pub fn key(&self) -> String {
        format!("{}/{}", self.metadata.namespace, self.metadata.name)
    }
}

pub fn validate_namespace(namespace: &str) -> Result<()> {
    if namespace.is_empty() {
        return Err(StrongboxError::validation_field(
            "namespace is required",
            "metadata.namespace",
        ));
    }
    if namespace.len() > MAX_NAMESPACE_LENGTH || !DNS_LABEL.is_match(namespace) {
        return Err(StrongboxError::validation_field(
            format!("namespace '{}' must be a DNS label", namespace),
            "metadata.namespace",
        ));
    }
    Ok(())
}

pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(StrongboxError::validation_field("name is required", "metadata.name"));
    }
    if name.len() > MAX_NAME_LENGTH || !DNS_SUBDOMAIN.is_match(name) {
        return Err(StrongboxError::validation_field(
            format!("name '{}' must be a DNS subdomain", name),
            "metadata.name",
        ));
    }
    Ok(())
}

/// Kind of mutation a history record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryOperation {
    Create,
    Update,
    Delete,
}

impl HistoryOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            HistoryOperation::Create => "create",
            HistoryOperation::Update => "update",
            HistoryOperation::Delete => "delete",
        }
    }
}

impl fmt::Display for HistoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HistoryOperation {
    type Err = StrongboxError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "create" => Ok(HistoryOperation::Create),
            "update" => Ok(HistoryOperation::Update),
            "delete" => Ok(HistoryOperation::Delete),
            other => Err(StrongboxError::internal(format!("unknown history operation '{}'", other))),
        }
    }
}

/// Immutable audit entry appended by every create/update/delete
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: HistoryId,
    pub namespace: String,
    pub name: String,
    pub uid: SecureValueUid,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
    pub operation: HistoryOperation,
    /// Resource version before the mutation; `None` for creates
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_resource_version: Option<String>,
    pub resource_version: String,
}

/// One page of history, newest first
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryPage {
    pub items: Vec<HistoryRecord>,
    /// Opaque token for the next page; absent on the last page
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub continue_token: Option<String>,
}
