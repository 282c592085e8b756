//! Registry error types.

use rbac_ledger::LedgerError;
use rbac_ledger::RejectionReason;
use rbac_model::{AssetId, ModelError, PublicKey, UserRef};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Broad classes of registry failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Ledger unreachable or too slow.
    Connectivity,
    /// The ledger refused the signer.
    Authorization,
    /// The request itself is wrong.
    Validation,
    /// A multi-step operation stopped halfway.
    PartialFailure,
}

/// Errors returned by registry operations.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Ledger unreachable, transport failure or server-side error.
    #[error("{operation}: ledger unreachable: {message}")]
    Connectivity {
        operation: &'static str,
        message: String,
    },

    /// A ledger call did not finish in time. Its effect is unknown.
    #[error("{operation}: no ledger response within {}ms", .after.as_millis())]
    Timeout {
        operation: &'static str,
        after: Duration,
    },

    /// The signer is not a member of the parent's `can_link`.
    #[error("Not authorized: {message}")]
    Authorization {
        /// Key that signed the rejected transaction.
        signer: Option<PublicKey>,
        /// Parent the record tried to link under.
        link: Option<AssetId>,
        message: String,
    },

    /// Malformed payload, unresolvable reference, duplicate or spent input.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The user record exists but still belongs to the admin.
    #[error("User {user} created but not transferred to {user_public_key}: {source}")]
    PartialFailure {
        user: UserRef,
        user_public_key: PublicKey,
        source: Box<RegistryError>,
    },
}

impl RegistryError {
    /// Map a ledger failure observed during `operation`.
    pub fn from_ledger(operation: &'static str, err: LedgerError) -> Self {
        match err {
            LedgerError::Connectivity(message) | LedgerError::InvalidResponse(message) => {
                RegistryError::Connectivity { operation, message }
            }
            LedgerError::Timeout { timeout_ms } => RegistryError::Timeout {
                operation,
                after: Duration::from_millis(timeout_ms),
            },
            LedgerError::Rejected {
                reason: RejectionReason::Unauthorized,
                message,
            } => RegistryError::Authorization {
                signer: None,
                link: None,
                message,
            },
            LedgerError::Rejected { reason, message } => {
                RegistryError::Validation(format!("{operation}: rejected ({reason}): {message}"))
            }
            LedgerError::NotFound(id) => RegistryError::Validation(format!("{operation}: {id} not found")),
            LedgerError::InvalidTransaction(message) | LedgerError::Signing(message) => {
                RegistryError::Validation(format!("{operation}: {message}"))
            }
            LedgerError::Model(e) => RegistryError::Validation(e.to_string()),
        }
    }

    /// Fill in who tried to link where, for authorization failures.
    pub fn with_link_context(self, signer: PublicKey, link: Option<AssetId>) -> Self {
        match self {
            RegistryError::Authorization { message, .. } => RegistryError::Authorization {
                signer: Some(signer),
                link,
                message,
            },
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            RegistryError::Connectivity { .. } | RegistryError::Timeout { .. } => ErrorKind::Connectivity,
            RegistryError::Authorization { .. } => ErrorKind::Authorization,
            RegistryError::Validation(_) => ErrorKind::Validation,
            RegistryError::PartialFailure { .. } => ErrorKind::PartialFailure,
        }
    }

    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Connectivity
    }

    /// Whether a follow-up operation can finish the job
    /// (`complete_user_transfer` for a partial user creation).
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RegistryError::PartialFailure { .. })
    }

    /// The user left behind by a partial creation.
    pub fn created_user(&self) -> Option<&UserRef> {
        match self {
            RegistryError::PartialFailure { user, .. } => Some(user),
            _ => None,
        }
    }

    /// Get error code for API responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            RegistryError::Connectivity { .. } => "LEDGER_UNREACHABLE",
            RegistryError::Timeout { .. } => "LEDGER_TIMEOUT",
            RegistryError::Authorization { .. } => "UNAUTHORIZED",
            RegistryError::Validation(_) => "VALIDATION_FAILED",
            RegistryError::PartialFailure { .. } => "PARTIAL_FAILURE",
        }
    }
}

impl From<ModelError> for RegistryError {
    fn from(err: ModelError) -> Self {
        RegistryError::Validation(err.to_string())
    }
}

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;
