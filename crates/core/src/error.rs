//! Domain error model.
//!
//! Domain errors represent **business logic failures** - validation errors,
//! shortage conditions, illegal state transitions, conflicts. They are
//! deterministic: the same input against the same state always produces the
//! same error. Infrastructure concerns (network failures, database errors)
//! belong to the infra layer's error types.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error (business logic failures).
///
/// Mapping guidance for callers:
/// - `Validation` / `InvalidId` - malformed input, surface with field detail
/// - `InsufficientStock` / `InsufficientReserved` / `NegativeResult` -
///   business shortage, surface with the shortfall; on event-driven paths
///   this becomes a `reservation_failed` outcome rather than a crash
/// - `Conflict` - optimistic-lock collision, retryable
/// - `InvalidState` - illegal state-machine transition, never retried
/// - `InvariantViolation` - should be unreachable at commit time; log and abort
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested resource was not found (domain-level).
    #[error("not found")]
    NotFound,

    /// A conflict occurred (e.g. stale version / optimistic concurrency).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Available stock cannot cover the requested quantity.
    #[error("insufficient stock: requested {requested}, available {available}")]
    InsufficientStock { requested: i64, available: i64 },

    /// Reserved stock cannot cover the requested quantity.
    #[error("insufficient reserved stock: requested {requested}, reserved {reserved}")]
    InsufficientReserved { requested: i64, reserved: i64 },

    /// An adjustment would drive a counter negative or strand reserved stock.
    #[error("adjustment of {delta} would leave on-hand {on_hand} inconsistent")]
    NegativeResult { on_hand: i64, delta: i64 },

    /// An illegal state-machine transition was attempted.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    /// Whether a caller may retry the failed operation as-is.
    ///
    /// Only lock/version conflicts qualify; every other domain error is
    /// deterministic and will fail again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, DomainError::Conflict(_))
    }
}
