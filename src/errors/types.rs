//! # Error Types
//!
//! Error types for the Strongbox secure value store using `thiserror`.

use std::fmt;

/// Custom result type for Strongbox operations
pub type Result<T> = std::result::Result<T, StrongboxError>;

/// Main error type for the secure value store
#[derive(thiserror::Error, Debug)]
pub enum StrongboxError {
    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Database and storage errors
    #[error("Database error: {context}")]
    Database {
        #[source]
        source: sqlx::Error,
        context: String,
    },

    /// I/O errors with additional context
    #[error("I/O error: {context}")]
    Io {
        #[source]
        source: std::io::Error,
        context: String,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}")]
    Serialization {
        #[source]
        source: serde_json::Error,
        context: String,
    },

    /// Malformed caller input
    #[error("Validation error: {message}")]
    Validation {
        message: String,
        field: Option<String>,
    },

    /// Authentication and authorization errors
    #[error("Authentication error: {message}")]
    Auth {
        message: String,
        error_type: AuthErrorType,
    },

    /// Keeper (encryption backend) failures
    #[error("Keeper error ({keeper}): {message}")]
    Keeper {
        keeper: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Internal errors
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Resource not found errors
    #[error("Resource not found: {resource_type} '{id}'")]
    NotFound {
        resource_type: String,
        id: String,
    },

    /// Resource conflict errors (already exists, stale resource version)
    #[error("Resource conflict: {message}")]
    Conflict {
        message: String,
        resource_type: String,
    },

    /// Deadline exceeded
    #[error("Operation timed out: {operation} after {duration_ms}ms")]
    Timeout {
        operation: String,
        duration_ms: u64,
    },

    /// Caller cancelled the operation
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },
}

/// Authentication error subtypes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthErrorType {
    /// No identity in the request context
    MissingIdentity,
    /// Identity present but not allowed to perform the operation
    PermissionDenied,
}

impl fmt::Display for AuthErrorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthErrorType::MissingIdentity => write!(f, "missing_identity"),
            AuthErrorType::PermissionDenied => write!(f, "permission_denied"),
        }
    }
}

/// Coarse classification surfaced to callers of the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Unauthenticated,
    InvalidArgument,
    NotFound,
    Conflict,
    PermissionDenied,
    Internal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::NotFound => "not_found",
            ErrorKind::Conflict => "conflict",
            ErrorKind::PermissionDenied => "permission_denied",
            ErrorKind::Internal => "internal",
        };
        f.write_str(s)
    }
}

impl StrongboxError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        Self::Config { message: message.into(), source: None }
    }

    /// Create a configuration error with source
    pub fn config_with_source<S: Into<String>>(
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Config { message: message.into(), source: Some(source) }
    }

    /// Wrap a sqlx error with context
    pub fn database<S: Into<String>>(source: sqlx::Error, context: S) -> Self {
        Self::Database { source, context: context.into() }
    }

    /// Wrap a serde_json error with context
    pub fn serialization<S: Into<String>>(source: serde_json::Error, context: S) -> Self {
        Self::Serialization { source, context: context.into() }
    }

    /// Create a validation error
    pub fn validation<S: Into<String>>(message: S) -> Self {
        Self::Validation { message: message.into(), field: None }
    }

    /// Create a validation error with field information
    pub fn validation_field<S: Into<String>, F: Into<String>>(message: S, field: F) -> Self {
        Self::Validation { message: message.into(), field: Some(field.into()) }
    }

    /// No authenticated identity was supplied
    pub fn unauthenticated<S: Into<String>>(message: S) -> Self {
        Self::Auth { message: message.into(), error_type: AuthErrorType::MissingIdentity }
    }

    /// The identity is not allowed to perform the operation
    pub fn permission_denied<S: Into<String>>(message: S) -> Self {
        Self::Auth { message: message.into(), error_type: AuthErrorType::PermissionDenied }
    }

    /// Create a keeper error
    pub fn keeper<K: Into<String>, S: Into<String>>(keeper: K, message: S) -> Self {
        Self::Keeper { keeper: keeper.into(), message: message.into(), source: None }
    }

    /// Create a keeper error with source
    pub fn keeper_with_source<K: Into<String>, S: Into<String>>(
        keeper: K,
        message: S,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        Self::Keeper { keeper: keeper.into(), message: message.into(), source: Some(source) }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal { message: message.into(), source: None }
    }

    /// Create a not found error
    pub fn not_found<R: Into<String>, I: Into<String>>(resource_type: R, id: I) -> Self {
        Self::NotFound { resource_type: resource_type.into(), id: id.into() }
    }

    /// Create a conflict error
    pub fn conflict<M: Into<String>, R: Into<String>>(message: M, resource_type: R) -> Self {
        Self::Conflict { message: message.into(), resource_type: resource_type.into() }
    }

    /// Create a timeout error
    pub fn timeout<S: Into<String>>(operation: S, duration_ms: u64) -> Self {
        Self::Timeout { operation: operation.into(), duration_ms }
    }

    /// Create a cancellation error
    pub fn cancelled<S: Into<String>>(operation: S) -> Self {
        Self::Cancelled { operation: operation.into() }
    }

    /// Classify the error for callers
    pub fn kind(&self) -> ErrorKind {
        match self {
            StrongboxError::Validation { .. } => ErrorKind::InvalidArgument,
            StrongboxError::Auth { error_type: AuthErrorType::MissingIdentity, .. } => {
                ErrorKind::Unauthenticated
            }
            StrongboxError::Auth { error_type: AuthErrorType::PermissionDenied, .. } => {
                ErrorKind::PermissionDenied
            }
            StrongboxError::NotFound { .. } => ErrorKind::NotFound,
            StrongboxError::Conflict { .. } => ErrorKind::Conflict,
            StrongboxError::Config { .. }
            | StrongboxError::Database { .. }
            | StrongboxError::Io { .. }
            | StrongboxError::Serialization { .. }
            | StrongboxError::Keeper { .. }
            | StrongboxError::Internal { .. }
            | StrongboxError::Timeout { .. }
            | StrongboxError::Cancelled { .. } => ErrorKind::Internal,
        }
    }

    /// Add context to an error
    pub(crate) fn add_context(&mut self, context: String) {
        match self {
            StrongboxError::Io { context: ref mut ctx, .. }
            | StrongboxError::Database { context: ref mut ctx, .. }
            | StrongboxError::Serialization { context: ref mut ctx, .. } => {
                *ctx = format!("{}: {}", context, ctx);
            }
            _ => {}
        }
    }

    /// Get the HTTP status code an adaptation layer should return for this error
    pub fn status_code(&self) -> u16 {
        match self {
            StrongboxError::Config { .. } => 500,
            StrongboxError::Database { .. } => 500,
            StrongboxError::Io { .. } => 500,
            StrongboxError::Serialization { .. } => 500,
            StrongboxError::Validation { .. } => 400,
            StrongboxError::Auth { error_type: AuthErrorType::MissingIdentity, .. } => 401,
            StrongboxError::Auth { error_type: AuthErrorType::PermissionDenied, .. } => 403,
            StrongboxError::Keeper { .. } => 502,
            StrongboxError::Internal { .. } => 500,
            StrongboxError::NotFound { .. } => 404,
            StrongboxError::Conflict { .. } => 409,
            StrongboxError::Timeout { .. } => 504,
            StrongboxError::Cancelled { .. } => 499,
        }
    }

    /// Check if a read that failed with this error may be retried once.
    ///
    /// Writes are never retried by the store regardless of this value.
    pub fn is_retryable(&self) -> bool {
        match self {
            StrongboxError::Database { source, .. } => matches!(
                source,
                sqlx::Error::Io(_)
                    | sqlx::Error::PoolTimedOut
                    | sqlx::Error::PoolClosed
                    | sqlx::Error::WorkerCrashed
            ),
            StrongboxError::Io { .. } => true,
            _ => false,
        }
    }
}

// Error conversions for common external error types
impl From<sqlx::Error> for StrongboxError {
    fn from(error: sqlx::Error) -> Self {
        Self::Database { source: error, context: "Database operation failed".to_string() }
    }
}

impl From<std::io::Error> for StrongboxError {
    fn from(error: std::io::Error) -> Self {
        Self::Io { source: error, context: "I/O operation failed".to_string() }
    }
}

impl From<serde_json::Error> for StrongboxError {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization { source: error, context: "JSON serialization failed".to_string() }
    }
}

impl From<config::ConfigError> for StrongboxError {
    fn from(error: config::ConfigError) -> Self {
        Self::config_with_source("Configuration loading failed", Box::new(error))
    }
}

impl From<validator::ValidationErrors> for StrongboxError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let message = errors
            .field_errors()
            .iter()
            .map(|(field, field_errors)| {
                let error_messages: Vec<String> = field_errors
                    .iter()
                    .map(|e| {
                        e.message.as_ref().map_or("Invalid value".to_string(), |m| m.to_string())
                    })
                    .collect();
                format!("{}: {}", field, error_messages.join(", "))
            })
            .collect::<Vec<_>>()
            .join("; ");

        Self::validation(format!("Validation failed: {}", message))
    }
}
