//! Ledger client errors.

use rbac_model::ModelError;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Why the ledger refused a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectionReason {
    /// The signer is not allowed by the parent's `can_link`.
    Unauthorized,
    /// Malformed body, bad signature or id mismatch.
    InvalidTransaction,
    /// A TRANSFER spends an output that does not exist.
    InputNotFound,
    /// A TRANSFER spends an output that was already spent.
    DoubleSpend,
    /// The transaction id was already committed.
    Duplicate,
}

impl RejectionReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            RejectionReason::Unauthorized => "unauthorized",
            RejectionReason::InvalidTransaction => "invalid_transaction",
            RejectionReason::InputNotFound => "input_not_found",
            RejectionReason::DoubleSpend => "double_spend",
            RejectionReason::Duplicate => "duplicate",
        }
    }

    /// Classify a node's rejection message.
    ///
    /// # Example
    ///
    /// ```
    /// use rbac_ledger::RejectionReason;
    ///
    /// assert_eq!(
    ///     RejectionReason::classify("Signer is not a member of can_link"),
    ///     RejectionReason::Unauthorized
    /// );
    /// assert_eq!(
    ///     RejectionReason::classify("DoubleSpend: output already spent"),
    ///     RejectionReason::DoubleSpend
    /// );
    /// ```
    pub fn classify(message: &str) -> Self {
        let m = message.to_lowercase();
        if m.contains("can_link") || m.contains("unauthorized") || m.contains("not authorized") {
            RejectionReason::Unauthorized
        } else if m.contains("doublespend") || m.contains("double spend") || m.contains("already spent") {
            RejectionReason::DoubleSpend
        } else if m.contains("inputdoesnotexist") || m.contains("input does not exist") || m.contains("input not found") {
            RejectionReason::InputNotFound
        } else if m.contains("duplicate") || m.contains("already exists") {
            RejectionReason::Duplicate
        } else {
            RejectionReason::InvalidTransaction
        }
    }
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors from talking to the ledger.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Node unreachable, transport failure or server-side error.
    #[error("Ledger unreachable: {0}")]
    Connectivity(String),

    /// The HTTP call exceeded its deadline.
    #[error("Ledger call timed out after {timeout_ms}ms")]
    Timeout {
        /// Deadline in milliseconds.
        timeout_ms: u64,
    },

    /// The node refused the transaction.
    #[error("Transaction rejected ({reason}): {message}")]
    Rejected {
        /// Classified cause.
        reason: RejectionReason,
        /// Message returned by the node.
        message: String,
    },

    /// Requested transaction or asset does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A transaction could not be built from the request.
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// An input could not be signed with the supplied keys.
    #[error("Signing failed: {0}")]
    Signing(String),

    /// The node answered with something unparseable.
    #[error("Invalid ledger response: {0}")]
    InvalidResponse(String),

    /// Payload or key validation failed.
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl LedgerError {
    /// Shorthand for a rejection classified from its message.
    pub fn rejected(message: impl Into<String>) -> Self {
        let message = message.into();
        LedgerError::Rejected {
            reason: RejectionReason::classify(&message),
            message,
        }
    }

    /// Whether repeating the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, LedgerError::Connectivity(_) | LedgerError::Timeout { .. })
    }

    /// Whether the node refused the signer under `can_link`.
    pub fn is_authorization(&self) -> bool {
        matches!(
            self,
            LedgerError::Rejected {
                reason: RejectionReason::Unauthorized,
                ..
            }
        )
    }
}

/// Result type for ledger operations.
pub type LedgerResult<T> = Result<T, LedgerError>;
