//! Immutable set of parsed templates, built once per store.

use super::dialect::Dialect;
use super::template::{Segment, Template};
use super::{RenderedQuery, TemplateRequest};
use crate::errors::{Result, StrongboxError};
use std::collections::HashMap;
use tracing::debug;

/// Templates embedded in the binary, by name
pub const EMBEDDED_TEMPLATES: &[(&str, &str)] = &[
    ("secure_value_create", include_str!("../../sql/secure_value_create.sql")),
    ("secure_value_read", include_str!("../../sql/secure_value_read.sql")),
    ("secure_value_list", include_str!("../../sql/secure_value_list.sql")),
    ("secure_value_update", include_str!("../../sql/secure_value_update.sql")),
    ("secure_value_delete", include_str!("../../sql/secure_value_delete.sql")),
    ("secure_value_history_create", include_str!("../../sql/secure_value_history_create.sql")),
    ("secure_value_history_list", include_str!("../../sql/secure_value_history_list.sql")),
];

#[derive(Debug, Clone)]
pub struct TemplateRegistry {
    dialect: Dialect,
    templates: HashMap<String, Template>,
}

impl TemplateRegistry {
    /// Parse the embedded templates for `dialect`
    pub fn new(dialect: Dialect) -> Result<Self> {
        Self::from_sources(dialect, EMBEDDED_TEMPLATES)
    }

    /// Parse the given templates; any malformed or duplicate template fails construction
    pub fn from_sources(dialect: Dialect, sources: &[(&str, &str)]) -> Result<Self> {
        let mut templates = HashMap::with_capacity(sources.len());
        for (name, source) in sources {
            let template = Template::parse(name, source)?;
            if templates.insert(name.to_string(), template).is_some() {
                return Err(StrongboxError::config(format!("Duplicate template '{}'", name)));
            }
        }
        debug!(dialect = %dialect, templates = templates.len(), "SQL templates loaded");
        Ok(Self { dialect, templates })
    }

    /// Fail unless every name in `required` is registered
    pub fn require(&self, required: &[&str]) -> Result<()> {
        match required.iter().find(|name| !self.templates.contains_key(**name)) {
            Some(missing) => {
                Err(StrongboxError::config(format!("SQL template '{}' not found", missing)))
            }
            None => Ok(()),
        }
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    pub fn get(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    /// Render `name` with arguments and identifiers from `request`
    pub fn render(&self, name: &str, request: &dyn TemplateRequest) -> Result<RenderedQuery> {
        let template = self
            .templates
            .get(name)
            .ok_or_else(|| StrongboxError::internal(format!("SQL template '{}' not found", name)))?;

        request.validate()?;

        let mut sql = String::new();
        let mut args = Vec::new();
        for segment in template.segments() {
            match segment {
                Segment::Literal(text) => sql.push_str(text),
                Segment::Arg(arg) => {
                    let value = request.arg(arg).ok_or_else(|| {
                        StrongboxError::internal(format!(
                            "SQL template '{}': request has no argument '{}'",
                            name, arg
                        ))
                    })?;
                    args.push(value);
                    sql.push_str(&self.dialect.placeholder(args.len()));
                }
                Segment::Ident(ident) => {
                    let value = request.ident(ident).ok_or_else(|| {
                        StrongboxError::internal(format!(
                            "SQL template '{}': request has no identifier '{}'",
                            name, ident
                        ))
                    })?;
                    sql.push_str(&self.dialect.quote_ident(value));
                }
            }
        }

        Ok(RenderedQuery { sql: sql.trim().to_string(), args })
    }
}
