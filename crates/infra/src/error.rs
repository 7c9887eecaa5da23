//! Infrastructure error model and SQLx error mapping.
//!
//! ## Error Mapping
//!
//! SQLx errors are mapped as follows:
//!
//! | PostgreSQL Error Code | Mapped to | Scenario |
//! |----------------------|-----------|----------|
//! | `23505` (unique violation) | `Domain(Conflict)` | Concurrent insert on a unique key |
//! | `40001` (serialization failure) | `Domain(Conflict)` | Transaction serialization conflict |
//! | `40P01` (deadlock detected) | `Domain(Conflict)` | Lock ordering violated by a peer |
//! | `55P03` (lock not available) | `Domain(Conflict)` | `NOWAIT`/timeout on a row lock |
//! | other | `Database` | Connection failures, syntax, etc. |
//!
//! `Domain(Conflict)` is the retryable class; everything in `Database` is
//! transient from the caller's perspective and is retried only on
//! background loops.

use thiserror::Error;

use stockflow_core::DomainError;

/// Result type used across the infra layer.
pub type InfraResult<T> = Result<T, InfraError>;

/// Infrastructure-level error.
#[derive(Debug, Error)]
pub enum InfraError {
    /// A business failure surfaced from the domain layer.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Database / connection failure.
    #[error("database error in {operation}: {message}")]
    Database { operation: String, message: String },

    /// Payload (de)serialization failure - permanent for a given message.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Message bus failure - transient.
    #[error("message bus error: {0}")]
    Bus(String),

    /// The caller's deadline or the shutdown signal aborted the operation.
    #[error("operation cancelled")]
    Cancelled,
}

impl InfraError {
    /// Whether retrying the same operation can succeed.
    ///
    /// Conflicts retry after backoff; database and bus failures retry on
    /// background paths. Serialization failures and non-conflict domain
    /// errors are deterministic.
    pub fn is_transient(&self) -> bool {
        match self {
            InfraError::Domain(e) => e.is_retryable(),
            InfraError::Database { .. } | InfraError::Bus(_) => true,
            InfraError::Serialization(_) | InfraError::Cancelled => false,
        }
    }
}

impl From<serde_json::Error> for InfraError {
    fn from(err: serde_json::Error) -> Self {
        InfraError::Serialization(err.to_string())
    }
}

/// Map a SQLx error to an `InfraError`, tagging the failed operation.
pub(crate) fn map_sqlx(operation: &str, err: sqlx::Error) -> InfraError {
    match &err {
        sqlx::Error::Database(db_err) => {
            if let Some(code) = db_err.code() {
                match code.as_ref() {
                    // Unique violation, serialization failure, deadlock,
                    // lock not available: all retryable conflicts.
                    "23505" | "40001" | "40P01" | "55P03" => {
                        return InfraError::Domain(DomainError::conflict(format!(
                            "{operation}: {}",
                            db_err.message()
                        )));
                    }
                    _ => {}
                }
            }
            InfraError::Database {
                operation: operation.to_string(),
                message: db_err.message().to_string(),
            }
        }
        sqlx::Error::RowNotFound => InfraError::Domain(DomainError::not_found()),
        _ => InfraError::Database {
            operation: operation.to_string(),
            message: err.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_is_transient() {
        let err = InfraError::Domain(DomainError::conflict("version moved"));
        assert!(err.is_transient());
    }

    #[test]
    fn shortage_is_not_transient() {
        let err = InfraError::Domain(DomainError::InsufficientStock {
            requested: 5,
            available: 2,
        });
        assert!(!err.is_transient());
    }

    #[test]
    fn serialization_is_permanent() {
        let err: InfraError = serde_json::from_str::<serde_json::Value>("{oops")
            .unwrap_err()
            .into();
        assert!(!err.is_transient());
    }

    #[test]
    fn database_and_bus_are_transient() {
        let db = InfraError::Database {
            operation: "select".to_string(),
            message: "connection reset".to_string(),
        };
        assert!(db.is_transient());
        assert!(InfraError::Bus("broker down".to_string()).is_transient());
    }
}
