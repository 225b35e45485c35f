//! # Error Handling
//!
//! Error handling for the secure value store. All fallible operations return
//! [`Result`], and every error carries an [`ErrorKind`] classification.

pub mod types;

pub use types::{AuthErrorType, ErrorKind, Result, StrongboxError};

/// Extension trait for attaching context to storage/serialization errors
pub trait ErrorContext<T> {
    fn context<S: Into<String>>(self, context: S) -> Result<T>;
}

impl<T> ErrorContext<T> for Result<T> {
    fn context<S: Into<String>>(self, context: S) -> Result<T> {
        self.map_err(|mut e| {
            e.add_context(context.into());
            e
        })
    }
}
