//! Domain layer
//!
//! Pure domain entities with no storage or keeper dependencies: the
//! [`SecureValue`] resource, its metadata conventions and history records.
//!
//! ## Module Organization
//!
//! - `id`: Type-safe identifiers with the NewType pattern
//! - `secure_value`: Resource model, system annotations and name validation

pub mod id;
pub mod secure_value;

pub use id::{HistoryId, SecureValueUid};
pub use secure_value::{
    validate_name, validate_namespace, HistoryOperation, HistoryPage, HistoryRecord, ObjectMeta,
    SecretValue, SecureValue, SecureValueSpec, ANNOTATION_CREATED_BY, ANNOTATION_UPDATED_BY,
    ANNOTATION_UPDATED_TIMESTAMP, SYSTEM_ANNOTATION_PREFIX,
};
