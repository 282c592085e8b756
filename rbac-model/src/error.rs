//! Error types for payload construction and model invariants.

use thiserror::Error;

use crate::entities::{EntityKind, EntityState};

/// Errors raised while building or checking RBAC model values.
///
/// Every variant describes a request that is malformed on its face; none of
/// them can be fixed by retrying.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ModelError {
    /// A public key is not base58 text of a 32-byte Ed25519 key.
    #[error("Invalid public key '{key}': {reason}")]
    InvalidPublicKey {
        /// The offending key text.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A namespace or type name segment is empty or contains whitespace.
    #[error("Invalid namespace '{0}'")]
    InvalidNamespace(String),

    /// A type name is empty or contains a namespace separator.
    #[error("Invalid type name '{0}'")]
    InvalidTypeName(String),

    /// A typed field was supplied through the free-form field map.
    #[error("Field '{0}' is reserved and must be set through its typed setter")]
    ReservedField(String),

    /// A payload that must be a JSON object was something else.
    #[error("Payload must be a JSON object: {0}")]
    NotAnObject(String),

    /// The entity kind requires a `link` reference.
    #[error("{0} records require a link to their parent")]
    MissingLink(EntityKind),

    /// The entity kind requires a namespace identifier.
    #[error("{0} records require a namespace identifier")]
    MissingNamespace(EntityKind),

    /// A `can_link` key list or owner set had no keys.
    #[error("{0} must contain at least one public key")]
    EmptyKeySet(&'static str),

    /// A lifecycle transition that the model does not allow.
    #[error("{kind} cannot move from {from} to {to}")]
    InvalidTransition {
        /// Entity kind being transitioned.
        kind: EntityKind,
        /// Current state.
        from: EntityState,
        /// Requested state.
        to: EntityState,
    },
}

/// Result type for model operations.
pub type ModelResult<T> = Result<T, ModelError>;
