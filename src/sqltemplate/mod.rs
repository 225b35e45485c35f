//! # SQL Templates
//!
//! Dialect-aware SQL rendering. Templates are parsed once into a
//! [`TemplateRegistry`]; typed request structs implementing
//! [`TemplateRequest`] supply validated arguments and identifiers, and
//! rendering yields SQL text plus arguments in bind order.

pub mod dialect;
pub mod registry;
pub mod template;

pub use dialect::Dialect;
pub use registry::{TemplateRegistry, EMBEDDED_TEMPLATES};
pub use template::Template;

use crate::errors::Result;
use sqlx::any::{Any, AnyArguments};
use sqlx::query::Query;

/// A bound argument value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlArg {
    Text(String),
    Int(i64),
    NullableInt(Option<i64>),
}

impl From<&str> for SqlArg {
    fn from(value: &str) -> Self {
        SqlArg::Text(value.to_string())
    }
}

impl From<String> for SqlArg {
    fn from(value: String) -> Self {
        SqlArg::Text(value)
    }
}

impl From<i64> for SqlArg {
    fn from(value: i64) -> Self {
        SqlArg::Int(value)
    }
}

impl From<Option<i64>> for SqlArg {
    fn from(value: Option<i64>) -> Self {
        SqlArg::NullableInt(value)
    }
}

/// Typed input for one template
pub trait TemplateRequest: Send + Sync {
    /// Reject malformed input before any SQL is produced
    fn validate(&self) -> Result<()>;

    /// Value for `{{arg name}}`
    fn arg(&self, name: &str) -> Option<SqlArg>;

    /// Identifier for `{{ident name}}`
    fn ident(&self, _name: &str) -> Option<&str> {
        None
    }
}

/// Rendered SQL with its arguments in bind order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedQuery {
    pub sql: String,
    pub args: Vec<SqlArg>,
}

impl RenderedQuery {
    /// Build a sqlx query with every argument bound
    pub fn query(&self) -> Query<'_, Any, AnyArguments<'_>> {
        let mut query = sqlx::query(&self.sql);
        for arg in &self.args {
            query = match arg {
                SqlArg::Text(value) => query.bind(value.as_str()),
                SqlArg::Int(value) => query.bind(*value),
                SqlArg::NullableInt(value) => query.bind(*value),
            };
        }
        query
    }
}
