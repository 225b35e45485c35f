//! Row codec
//!
//! Translation between the [`SecureValue`] resource and its persisted row.
//! Labels, user annotations and APIs are stored as JSON text; an empty
//! collection is stored as an empty string.

use crate::domain::{
    HistoryId, HistoryOperation, HistoryRecord, ObjectMeta, SecureValue, SecureValueSpec,
    SecureValueUid,
};
use crate::errors::{Result, StrongboxError};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::FromRow;
use std::collections::BTreeMap;

/// Database row for the `secure_value` table
#[derive(Debug, Clone, PartialEq, Eq, Default, FromRow)]
pub struct SecureValueRow {
    pub guid: String,
    pub namespace: String,
    pub name: String,
    pub title: String,
    pub salt: String,
    /// Keeper output; never plaintext
    pub value: String,
    pub keeper: String,
    pub addr: String,
    pub created: i64,
    pub created_by: String,
    pub updated: i64,
    pub updated_by: String,
    pub annotations: String,
    pub labels: String,
    pub apis: String,
}

impl SecureValueRow {
    /// Resource version this row is served at
    pub fn resource_version(&self) -> String {
        self.updated.to_string()
    }

    /// Copy the caller-editable fields of `object` onto this row
    pub fn apply_spec(&mut self, object: &SecureValue) -> Result<()> {
        self.title = object.spec.title.clone();
        self.labels = encode_json(&object.metadata.labels, "labels")?;
        self.annotations = encode_json(&object.metadata.user_annotations(), "annotations")?;
        self.apis = encode_json(&object.spec.apis, "apis")?;
        Ok(())
    }
}

/// Build a new row for `object` created by `actor` at `now_ms`.
///
/// Encryption fields (`salt`, `value`, `keeper`, `addr`) are left empty for the
/// store to fill. Reserved annotations supplied by the caller are dropped.
pub fn to_row(
    object: &SecureValue,
    uid: &SecureValueUid,
    actor: &str,
    now_ms: i64,
) -> Result<SecureValueRow> {
    let mut row = SecureValueRow {
        guid: uid.to_string(),
        namespace: object.metadata.namespace.clone(),
        name: object.metadata.name.clone(),
        created: now_ms,
        created_by: actor.to_string(),
        updated: now_ms,
        updated_by: actor.to_string(),
        ..Default::default()
    };
    row.apply_spec(object)?;
    Ok(row)
}

/// Rebuild the resource from a stored row. The value is never populated.
pub fn to_object(row: &SecureValueRow) -> Result<SecureValue> {
    let labels: BTreeMap<String, String> = decode_json(&row.labels, "labels")?;
    let annotations: BTreeMap<String, String> = decode_json(&row.annotations, "annotations")?;
    let apis: Vec<String> = decode_json(&row.apis, "apis")?;

    let mut metadata = ObjectMeta {
        name: row.name.clone(),
        namespace: row.namespace.clone(),
        uid: Some(SecureValueUid::from_string(row.guid.clone())),
        creation_timestamp: Some(millis_to_datetime(row.created)?),
        resource_version: row.resource_version(),
        labels,
        annotations,
    };

    metadata.set_created_by(row.created_by.as_str());
    if row.updated != row.created {
        metadata.set_updated_by(row.updated_by.as_str());
        metadata.set_updated_timestamp(millis_to_datetime(row.updated)?);
    }

    Ok(SecureValue {
        metadata,
        spec: SecureValueSpec { title: row.title.clone(), value: None, apis },
    })
}

/// Database row for the `secure_value_history` table
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct HistoryRow {
    pub id: String,
    pub namespace: String,
    pub name: String,
    pub uid: String,
    pub actor: String,
    pub created: i64,
    pub operation: String,
    pub previous_resource_version: Option<i64>,
    pub resource_version: i64,
}

impl TryFrom<HistoryRow> for HistoryRecord {
    type Error = StrongboxError;

    fn try_from(row: HistoryRow) -> Result<Self> {
        Ok(Self {
            id: HistoryId::from_string(row.id),
            namespace: row.namespace,
            name: row.name,
            uid: SecureValueUid::from_string(row.uid),
            actor: row.actor,
            timestamp: millis_to_datetime(row.created)?,
            operation: row.operation.parse::<HistoryOperation>()?,
            previous_resource_version: row.previous_resource_version.map(|rv| rv.to_string()),
            resource_version: row.resource_version.to_string(),
        })
    }
}

pub(crate) fn millis_to_datetime(ms: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp_millis(ms)
        .ok_or_else(|| StrongboxError::internal(format!("stored timestamp {} is out of range", ms)))
}

fn encode_json<T>(value: &T, field: &str) -> Result<String>
where
    T: Serialize + IsEmpty,
{
    if value.is_empty() {
        return Ok(String::new());
    }
    serde_json::to_string(value)
        .map_err(|e| StrongboxError::serialization(e, format!("Failed to encode {}", field)))
}

fn decode_json<T>(raw: &str, field: &str) -> Result<T>
where
    T: DeserializeOwned + Default,
{
    if raw.is_empty() {
        return Ok(T::default());
    }
    serde_json::from_str(raw)
        .map_err(|e| StrongboxError::serialization(e, format!("Failed to decode stored {}", field)))
}

trait IsEmpty {
    fn is_empty(&self) -> bool;
}

impl<K, V> IsEmpty for BTreeMap<K, V> {
    fn is_empty(&self) -> bool {
        BTreeMap::is_empty(self)
    }
}

impl<T> IsEmpty for Vec<T> {
    fn is_empty(&self) -> bool {
        Vec::is_empty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ANNOTATION_CREATED_BY, ANNOTATION_UPDATED_BY, SYSTEM_ANNOTATION_PREFIX};
    use proptest::prelude::*;

    fn sample() -> SecureValue {
        let mut sv = SecureValue::new(
            "default",
            "db-pass",
            SecureValueSpec {
                title: "Database password".into(),
                value: Some("hunter2".into()),
                apis: vec!["billing".into(), "reports".into()],
            },
        );
        sv.metadata.labels.insert("team".into(), "a".into());
        sv.metadata.annotations.insert("note".into(), "rotated monthly".into());
        sv.metadata.annotations.insert(ANNOTATION_CREATED_BY.into(), "mallory".into());
        sv
    }

    #[test]
    fn test_to_row_strips_reserved_annotations() {
        let uid = SecureValueUid::new();
        let row = to_row(&sample(), &uid, "alice", 1_000).unwrap();

        assert_eq!(row.guid, uid.as_str());
        assert_eq!(row.created_by, "alice");
        assert_eq!(row.updated, 1_000);
        assert!(!row.annotations.contains(SYSTEM_ANNOTATION_PREFIX));
        assert!(row.annotations.contains("rotated monthly"));
        assert!(row.value.is_empty());
        assert!(row.salt.is_empty());
    }

    #[test]
    fn test_empty_collections_stored_as_empty_strings() {
        let sv = SecureValue::new("default", "empty", SecureValueSpec::default());
        let row = to_row(&sv, &SecureValueUid::new(), "alice", 1).unwrap();
        assert_eq!(row.labels, "");
        assert_eq!(row.annotations, "");
        assert_eq!(row.apis, "");

        let back = to_object(&row).unwrap();
        assert!(back.metadata.labels.is_empty());
        assert!(back.spec.apis.is_empty());
    }

    #[test]
    fn test_to_object_system_metadata() {
        let uid = SecureValueUid::new();
        let mut row = to_row(&sample(), &uid, "alice", 1_700_000_000_000).unwrap();

        let created = to_object(&row).unwrap();
        assert_eq!(created.metadata.created_by(), Some("alice"));
        assert_eq!(created.metadata.updated_by(), None);
        assert_eq!(created.metadata.updated_timestamp(), None);
        assert_eq!(created.metadata.resource_version, "1700000000000");
        assert_eq!(created.metadata.uid.as_ref(), Some(&uid));
        assert!(created.spec.value.is_none());

        row.updated = 1_700_000_000_500;
        row.updated_by = "bob".into();
        let updated = to_object(&row).unwrap();
        assert_eq!(updated.metadata.annotations.get(ANNOTATION_UPDATED_BY).unwrap(), "bob");
        assert_eq!(
            updated.metadata.updated_timestamp().map(|ts| ts.timestamp_millis()),
            Some(1_700_000_000_500)
        );
        assert_eq!(updated.metadata.resource_version, "1700000000500");
    }

    #[test]
    fn test_history_row_conversion() {
        let row = HistoryRow {
            id: HistoryId::new().into_string(),
            namespace: "default".into(),
            name: "db-pass".into(),
            uid: SecureValueUid::new().into_string(),
            actor: "alice".into(),
            created: 1_700_000_000_000,
            operation: "update".into(),
            previous_resource_version: Some(1_699_999_999_000),
            resource_version: 1_700_000_000_000,
        };
        let record = HistoryRecord::try_from(row.clone()).unwrap();
        assert_eq!(record.operation, HistoryOperation::Update);
        assert_eq!(record.previous_resource_version.as_deref(), Some("1699999999000"));
        assert_eq!(record.timestamp.timestamp_millis(), 1_700_000_000_000);

        let bad = HistoryRow { operation: "rename".into(), ..row };
        assert!(HistoryRecord::try_from(bad).is_err());
    }

    #[test]
    fn test_invalid_json_is_internal() {
        let row = SecureValueRow { labels: "{not json".into(), ..Default::default() };
        let err = to_object(&row).unwrap_err();
        assert_eq!(err.kind(), crate::errors::ErrorKind::Internal);
    }

    fn label_map() -> impl Strategy<Value = BTreeMap<String, String>> {
        prop::collection::btree_map("[a-z][a-z0-9./-]{0,12}", ".{0,16}", 0..5)
    }

    proptest! {
        #[test]
        fn prop_row_round_trip(
            title in ".{0,32}",
            labels in label_map(),
            annotations in label_map(),
            apis in prop::collection::vec("[a-z][a-z0-9-]{0,12}", 0..4),
        ) {
            let mut sv = SecureValue::new(
                "ns",
                "name",
                SecureValueSpec { title: title.clone(), value: None, apis: apis.clone() },
            );
            sv.metadata.labels = labels.clone();
            sv.metadata.annotations = annotations;
            let expected_annotations = sv.metadata.user_annotations();

            let row = to_row(&sv, &SecureValueUid::new(), "alice", 42).unwrap();
            let back = to_object(&row).unwrap();

            prop_assert_eq!(back.metadata.namespace.as_str(), "ns");
            prop_assert_eq!(back.metadata.name.as_str(), "name");
            prop_assert_eq!(&back.spec.title, &title);
            prop_assert_eq!(&back.spec.apis, &apis);
            prop_assert_eq!(&back.metadata.labels, &labels);
            prop_assert_eq!(back.metadata.user_annotations(), expected_annotations);
        }
    }
}
