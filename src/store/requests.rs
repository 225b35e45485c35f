//! Typed template requests for the secure value SQL.

use crate::domain::{validate_name, validate_namespace, HistoryRecord};
use crate::errors::{Result, StrongboxError};
use crate::sqltemplate::{SqlArg, TemplateRequest};
use crate::storage::{HISTORY_TABLE, SECURE_VALUE_TABLE};
use crate::store::codec::SecureValueRow;

pub(crate) const CREATE: &str = "secure_value_create";
pub(crate) const READ: &str = "secure_value_read";
pub(crate) const LIST: &str = "secure_value_list";
pub(crate) const UPDATE: &str = "secure_value_update";
pub(crate) const DELETE: &str = "secure_value_delete";
pub(crate) const HISTORY_CREATE: &str = "secure_value_history_create";
pub(crate) const HISTORY_LIST: &str = "secure_value_history_list";

/// Every template the store renders
pub(crate) const REQUIRED_TEMPLATES: &[&str] =
    &[CREATE, READ, LIST, UPDATE, DELETE, HISTORY_CREATE, HISTORY_LIST];

fn table_ident(name: &str) -> Option<&'static str> {
    match name {
        "secure_value_table" => Some(SECURE_VALUE_TABLE),
        "history_table" => Some(HISTORY_TABLE),
        _ => None,
    }
}

fn validate_key(namespace: &str, name: &str) -> Result<()> {
    validate_namespace(namespace)?;
    validate_name(name)
}

fn validate_row(row: &SecureValueRow) -> Result<()> {
    validate_key(&row.namespace, &row.name)?;
    if row.guid.is_empty() {
        return Err(StrongboxError::internal("secure value row has no uid"));
    }
    if row.value.is_empty() || row.salt.is_empty() || row.keeper.is_empty() {
        return Err(StrongboxError::internal("secure value row is missing encryption metadata"));
    }
    Ok(())
}

fn row_arg(row: &SecureValueRow, name: &str) -> Option<SqlArg> {
    let arg = match name {
        "guid" => SqlArg::from(row.guid.as_str()),
        "namespace" => SqlArg::from(row.namespace.as_str()),
        "name" => SqlArg::from(row.name.as_str()),
        "title" => SqlArg::from(row.title.as_str()),
        "salt" => SqlArg::from(row.salt.as_str()),
        "value" => SqlArg::from(row.value.as_str()),
        "keeper" => SqlArg::from(row.keeper.as_str()),
        "addr" => SqlArg::from(row.addr.as_str()),
        "created" => SqlArg::from(row.created),
        "created_by" => SqlArg::from(row.created_by.as_str()),
        "updated" => SqlArg::from(row.updated),
        "updated_by" => SqlArg::from(row.updated_by.as_str()),
        "annotations" => SqlArg::from(row.annotations.as_str()),
        "labels" => SqlArg::from(row.labels.as_str()),
        "apis" => SqlArg::from(row.apis.as_str()),
        _ => return None,
    };
    Some(arg)
}

pub(crate) struct CreateSecureValue<'a> {
    pub row: &'a SecureValueRow,
}

impl TemplateRequest for CreateSecureValue<'_> {
    fn validate(&self) -> Result<()> {
        validate_row(self.row)
    }

    fn arg(&self, name: &str) -> Option<SqlArg> {
        row_arg(self.row, name)
    }

    fn ident(&self, name: &str) -> Option<&str> {
        table_ident(name)
    }
}

pub(crate) struct ReadSecureValue<'a> {
    pub namespace: &'a str,
    pub name: &'a str,
}

impl TemplateRequest for ReadSecureValue<'_> {
    fn validate(&self) -> Result<()> {
        validate_key(self.namespace, self.name)
    }

    fn arg(&self, name: &str) -> Option<SqlArg> {
        match name {
            "namespace" => Some(self.namespace.into()),
            "name" => Some(self.name.into()),
            _ => None,
        }
    }

    fn ident(&self, name: &str) -> Option<&str> {
        table_ident(name)
    }
}

pub(crate) struct ListSecureValues<'a> {
    pub namespace: &'a str,
}

impl TemplateRequest for ListSecureValues<'_> {
    fn validate(&self) -> Result<()> {
        validate_namespace(self.namespace)
    }

    fn arg(&self, name: &str) -> Option<SqlArg> {
        match name {
            "namespace" => Some(self.namespace.into()),
            _ => None,
        }
    }

    fn ident(&self, name: &str) -> Option<&str> {
        table_ident(name)
    }
}

/// Conditional update; matches only while `updated` still equals `expected_updated`
pub(crate) struct UpdateSecureValue<'a> {
    pub row: &'a SecureValueRow,
    pub expected_updated: i64,
}

impl TemplateRequest for UpdateSecureValue<'_> {
    fn validate(&self) -> Result<()> {
        validate_row(self.row)?;
        if self.row.updated <= self.expected_updated {
            return Err(StrongboxError::internal("update must advance the resource version"));
        }
        Ok(())
    }

    fn arg(&self, name: &str) -> Option<SqlArg> {
        match name {
            "expected_updated" => Some(self.expected_updated.into()),
            _ => row_arg(self.row, name),
        }
    }

    fn ident(&self, name: &str) -> Option<&str> {
        table_ident(name)
    }
}

/// Conditional delete; matches only while the row is unchanged since it was read
pub(crate) struct DeleteSecureValue<'a> {
    pub namespace: &'a str,
    pub name: &'a str,
    pub guid: &'a str,
    pub expected_updated: i64,
}

impl TemplateRequest for DeleteSecureValue<'_> {
    fn validate(&self) -> Result<()> {
        validate_key(self.namespace, self.name)
    }

    fn arg(&self, name: &str) -> Option<SqlArg> {
        match name {
            "namespace" => Some(self.namespace.into()),
            "name" => Some(self.name.into()),
            "guid" => Some(self.guid.into()),
            "expected_updated" => Some(self.expected_updated.into()),
            _ => None,
        }
    }

    fn ident(&self, name: &str) -> Option<&str> {
        table_ident(name)
    }
}

pub(crate) struct CreateHistoryRecord<'a> {
    pub record: &'a HistoryRecord,
}

impl TemplateRequest for CreateHistoryRecord<'_> {
    fn validate(&self) -> Result<()> {
        validate_key(&self.record.namespace, &self.record.name)?;
        parse_version(&self.record.resource_version)?;
        if let Some(previous) = &self.record.previous_resource_version {
            parse_version(previous)?;
        }
        Ok(())
    }

    fn arg(&self, name: &str) -> Option<SqlArg> {
        let record = self.record;
        let arg = match name {
            "id" => SqlArg::from(record.id.as_str()),
            "namespace" => SqlArg::from(record.namespace.as_str()),
            "name" => SqlArg::from(record.name.as_str()),
            "uid" => SqlArg::from(record.uid.as_str()),
            "actor" => SqlArg::from(record.actor.as_str()),
            "created" => SqlArg::from(record.timestamp.timestamp_millis()),
            "operation" => SqlArg::from(record.operation.as_str()),
            "previous_resource_version" => SqlArg::from(
                record
                    .previous_resource_version
                    .as_deref()
                    .and_then(|rv| rv.parse::<i64>().ok()),
            ),
            "resource_version" => SqlArg::from(record.resource_version.parse::<i64>().ok()?),
            _ => return None,
        };
        Some(arg)
    }

    fn ident(&self, name: &str) -> Option<&str> {
        table_ident(name)
    }
}

pub(crate) struct ListHistory<'a> {
    pub namespace: &'a str,
    pub name: &'a str,
    pub limit: i64,
    pub offset: i64,
}

impl TemplateRequest for ListHistory<'_> {
    fn validate(&self) -> Result<()> {
        validate_key(self.namespace, self.name)?;
        if self.limit <= 0 || self.offset < 0 {
            return Err(StrongboxError::validation("history page bounds must be positive"));
        }
        Ok(())
    }

    fn arg(&self, name: &str) -> Option<SqlArg> {
        match name {
            "namespace" => Some(self.namespace.into()),
            "name" => Some(self.name.into()),
            "limit" => Some(self.limit.into()),
            "offset" => Some(self.offset.into()),
            _ => None,
        }
    }

    fn ident(&self, name: &str) -> Option<&str> {
        table_ident(name)
    }
}

fn parse_version(raw: &str) -> Result<i64> {
    raw.parse::<i64>()
        .map_err(|_| StrongboxError::internal(format!("invalid resource version '{}'", raw)))
}
