//! Template parsing.
//!
//! Template text is plain SQL with two directives:
//!
//! - `{{arg name}}` becomes a bind placeholder for the request's `name` argument
//! - `{{ident name}}` becomes the quoted identifier the request supplies for `name`

use crate::errors::{Result, StrongboxError};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Segment {
    Literal(String),
    Arg(String),
    Ident(String),
}

/// A parsed template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    name: String,
    segments: Vec<Segment>,
}

impl Template {
    pub fn parse(name: &str, source: &str) -> Result<Self> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after = &rest[start + 2..];
            let end = after.find("}}").ok_or_else(|| {
                StrongboxError::config(format!("Template '{}': unclosed '{{{{'", name))
            })?;
            segments.push(parse_directive(name, &after[..end])?);
            rest = &after[end + 2..];
        }

        if rest.contains("}}") {
            return Err(StrongboxError::config(format!("Template '{}': stray '}}}}'", name)));
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }

        if segments.iter().all(|s| matches!(s, Segment::Literal(text) if text.trim().is_empty())) {
            return Err(StrongboxError::config(format!("Template '{}' is empty", name)));
        }

        Ok(Self { name: name.to_string(), segments })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// Argument names in bind order
    pub fn arg_names(&self) -> Vec<&str> {
        self.segments
            .iter()
            .filter_map(|s| match s {
                Segment::Arg(name) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }
}

fn parse_directive(template: &str, body: &str) -> Result<Segment> {
    let mut parts = body.split_whitespace();
    let (kind, ident, extra) = (parts.next(), parts.next(), parts.next());

    let ident = match (ident, extra) {
        (Some(ident), None) if is_valid_name(ident) => ident.to_string(),
        _ => {
            return Err(StrongboxError::config(format!(
                "Template '{}': malformed directive '{{{{{}}}}}'",
                template, body
            )))
        }
    };

    match kind {
        Some("arg") => Ok(Segment::Arg(ident)),
        Some("ident") => Ok(Segment::Ident(ident)),
        _ => Err(StrongboxError::config(format!(
            "Template '{}': unknown directive '{{{{{}}}}}'",
            template, body
        ))),
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_lowercase() || c == '_')
        && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}
