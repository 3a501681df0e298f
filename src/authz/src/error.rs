//! Error types for the role resolution engine

use thiserror::Error;

/// Stable error classification surfaced to callers
///
/// Callers map these onto their own API error representation; `code()`
/// returns the numeric code used by numbered-error APIs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Principal lacks standing in a space or create capability for a class
    OperationForbidden,
    /// Data-store or cache failure reported by a collaborator
    Database,
    /// Malformed input at the data-store boundary
    InvalidInput,
    /// Internal failure (e.g. a resolution task panicked)
    Internal,
}

impl ErrorKind {
    /// Numeric API error code
    pub fn code(&self) -> u32 {
        match self {
            ErrorKind::OperationForbidden => 119,
            ErrorKind::Database => 100,
            ErrorKind::InvalidInput => 102,
            ErrorKind::Internal => 1,
        }
    }
}

/// Role resolution errors
///
/// `Clone` so a single in-flight resolution outcome can be handed to every
/// caller awaiting it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthzError {
    /// The principal is not permitted to perform the operation
    #[error("Operation forbidden: {0}")]
    OperationForbidden(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AuthzError {
    /// Build a forbidden error naming the user and the class or space involved
    pub fn forbidden(user_id: &str, target: impl std::fmt::Display) -> Self {
        AuthzError::OperationForbidden(format!(
            "Permission denied for user {} on {}",
            user_id, target
        ))
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthzError::OperationForbidden(_) => ErrorKind::OperationForbidden,
            AuthzError::Database(_) => ErrorKind::Database,
            AuthzError::InvalidInput(_) => ErrorKind::InvalidInput,
            AuthzError::Internal(_) => ErrorKind::Internal,
        }
    }

    /// True for `OperationForbidden`
    pub fn is_forbidden(&self) -> bool {
        self.kind() == ErrorKind::OperationForbidden
    }
}

/// Result type for role resolution operations
pub type Result<T> = std::result::Result<T, AuthzError>;
