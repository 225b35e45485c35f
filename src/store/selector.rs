//! Kubernetes-style label selectors.
//!
//! Supported requirement forms, joined by commas:
//!
//! - `key=value`, `key==value`, `key!=value`
//! - `key in (a,b)`, `key notin (a,b)`
//! - `key` (exists), `!key` (does not exist)

use crate::errors::{Result, StrongboxError};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Requirement {
    Equals(String, String),
    NotEquals(String, String),
    In(String, BTreeSet<String>),
    NotIn(String, BTreeSet<String>),
    Exists(String),
    DoesNotExist(String),
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equals(key, value) => labels.get(key) == Some(value),
            Requirement::NotEquals(key, value) => labels.get(key) != Some(value),
            Requirement::In(key, values) => labels.get(key).is_some_and(|v| values.contains(v)),
            Requirement::NotIn(key, values) => !labels.get(key).is_some_and(|v| values.contains(v)),
            Requirement::Exists(key) => labels.contains_key(key),
            Requirement::DoesNotExist(key) => !labels.contains_key(key),
        }
    }
}

/// A parsed selector; the empty selector matches everything
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LabelSelector {
    requirements: Vec<Requirement>,
}

impl LabelSelector {
    pub fn parse(input: &str) -> Result<Self> {
        let mut requirements = Vec::new();
        for clause in split_clauses(input)? {
            let clause = clause.trim();
            if clause.is_empty() {
                if input.trim().is_empty() {
                    continue;
                }
                return Err(invalid(input, "empty requirement"));
            }
            requirements.push(parse_requirement(input, clause)?);
        }
        Ok(Self { requirements })
    }

    pub fn is_empty(&self) -> bool {
        self.requirements.is_empty()
    }

    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

/// Split on commas that are not inside a `( ... )` value set
fn split_clauses(input: &str) -> Result<Vec<&str>> {
    let mut clauses = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (idx, ch) in input.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => {
                depth = depth.checked_sub(1).ok_or_else(|| invalid(input, "unbalanced ')'"))?;
            }
            ',' if depth == 0 => {
                clauses.push(&input[start..idx]);
                start = idx + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(invalid(input, "unbalanced '('"));
    }
    clauses.push(&input[start..]);
    Ok(clauses)
}

fn parse_requirement(input: &str, clause: &str) -> Result<Requirement> {
    if let Some(key) = clause.strip_prefix('!') {
        return Ok(Requirement::DoesNotExist(parse_key(input, key)?));
    }
    if let Some((key, value)) = clause.split_once("!=") {
        return Ok(Requirement::NotEquals(parse_key(input, key)?, parse_value(input, value)?));
    }
    if let Some((key, value)) = clause.split_once("==").or_else(|| clause.split_once('=')) {
        return Ok(Requirement::Equals(parse_key(input, key)?, parse_value(input, value)?));
    }

    let mut words = clause.splitn(2, char::is_whitespace);
    let key = words.next().unwrap_or_default();
    match words.next().map(str::trim_start) {
        None => Ok(Requirement::Exists(parse_key(input, key)?)),
        Some(rest) => {
            let (op, set) = rest
                .split_once(|c: char| c.is_whitespace() || c == '(')
                .map(|(op, _)| (op, &rest[op.len()..]))
                .ok_or_else(|| invalid(input, "expected 'in' or 'notin'"))?;
            let values = parse_set(input, set)?;
            let key = parse_key(input, key)?;
            match op {
                "in" => Ok(Requirement::In(key, values)),
                "notin" => Ok(Requirement::NotIn(key, values)),
                _ => Err(invalid(input, format!("unknown operator '{}'", op))),
            }
        }
    }
}

fn parse_set(input: &str, raw: &str) -> Result<BTreeSet<String>> {
    let inner = raw
        .trim()
        .strip_prefix('(')
        .and_then(|s| s.strip_suffix(')'))
        .ok_or_else(|| invalid(input, "value set must be parenthesised"))?;
    let values = inner
        .split(',')
        .map(|v| parse_value(input, v))
        .collect::<Result<BTreeSet<_>>>()?;
    if values.iter().all(String::is_empty) {
        return Err(invalid(input, "value set is empty"));
    }
    Ok(values)
}

fn parse_key(input: &str, raw: &str) -> Result<String> {
    let key = raw.trim();
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };
    let prefix_ok = prefix.map_or(true, |p| {
        !p.is_empty()
            && p.len() <= 253
            && p.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
    });
    if !prefix_ok || !is_label_token(name) || name.is_empty() {
        return Err(invalid(input, format!("invalid label key '{}'", key)));
    }
    Ok(key.to_string())
}

fn parse_value(input: &str, raw: &str) -> Result<String> {
    let value = raw.trim();
    if !is_label_token(value) {
        return Err(invalid(input, format!("invalid label value '{}'", value)));
    }
    Ok(value.to_string())
}

/// Label names and values: up to 63 characters, alphanumeric at both ends, with
/// `-`, `_` and `.` allowed inside. Values may be empty.
fn is_label_token(token: &str) -> bool {
    if token.is_empty() {
        return true;
    }
    let bytes = token.as_bytes();
    token.len() <= 63
        && bytes[0].is_ascii_alphanumeric()
        && bytes[bytes.len() - 1].is_ascii_alphanumeric()
        && bytes.iter().all(|b| b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.'))
}

fn invalid<S: Into<String>>(input: &str, reason: S) -> StrongboxError {
    StrongboxError::validation_field(
        format!("invalid label selector '{}': {}", input, reason.into()),
        "labelSelector",
    )
}
