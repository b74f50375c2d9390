//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures. Storage
/// concerns are mapped into it at the infrastructure boundary.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed input, rejected before any persistence attempt.
    #[error("validation failed on '{field}': {message}")]
    Validation { field: String, message: String },

    /// A direct decrement asked for more than the product holds.
    #[error("insufficient stock for {product}: requested {requested}, available {available}")]
    InsufficientStock {
        product: String,
        requested: u32,
        available: u32,
    },

    /// The requested state change is not part of the order lifecycle.
    #[error("invalid transition from '{from}' to '{to}'")]
    InvalidTransition { from: String, to: String },

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// The entity is still referenced and cannot be removed.
    #[error("still referenced: {0}")]
    Referenced(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found.
    #[error("not found")]
    NotFound,

    /// Contention on shared rows; the whole operation may be retried.
    #[error("concurrency conflict: {0}")]
    Conflict(String),

    /// The actor lacks the role for the requested operation.
    #[error("unauthorized: {0}")]
    Unauthorized(String),
}

impl DomainError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn referenced(msg: impl Into<String>) -> Self {
        Self::Referenced(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::Unauthorized(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Transient failures that a caller may retry unchanged.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_names_field() {
        let err = DomainError::validation("quantity", "must be positive");
        assert_eq!(
            err.to_string(),
            "validation failed on 'quantity': must be positive"
        );
    }

    #[test]
    fn only_conflicts_are_transient() {
        assert!(DomainError::conflict("stale").is_transient());
        assert!(!DomainError::not_found().is_transient());
        assert!(!DomainError::unauthorized("no").is_transient());
    }
}
