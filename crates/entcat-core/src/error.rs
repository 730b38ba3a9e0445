//! Core error types.

use sled::transaction::TransactionError;
use thiserror::Error;
use uuid::Uuid;

/// Core catalog errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// A storage-level constraint was violated.
    #[error("constraint violation: {0}")]
    Constraint(#[from] ConstraintError),

    /// Field-tagged validation error, reported to clients.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// Row not found.
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of row looked up.
        entity: &'static str,
        /// Identifier that was looked up.
        id: String,
    },

    /// The catalog has no catalog query to sync or check against.
    #[error("enterprise catalog {0} has no catalog query")]
    MissingCatalogQuery(Uuid),

    /// None of the required request parameters were supplied.
    #[error("at least one of the following parameters is required: {}", .0.join(", "))]
    MissingParameters(Vec<&'static str>),

    /// The content discovery collaborator failed.
    #[error("discovery error: {0}")]
    Discovery(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Invalid data format.
    #[error("invalid data: {0}")]
    InvalidData(String),
}

impl Error {
    /// Whether this error belongs to the client-error status class.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Validation(_) | Error::MissingParameters(_))
    }

    /// Returns the unique violation carried by this error, if any.
    pub fn unique_violation(&self) -> Option<&ConstraintError> {
        match self {
            Error::Constraint(err @ ConstraintError::UniqueViolation { .. }) => Some(err),
            _ => None,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<TransactionError<Error>> for Error {
    fn from(err: TransactionError<Error>) -> Self {
        match err {
            TransactionError::Abort(err) => err,
            TransactionError::Storage(err) => Error::Storage(err),
        }
    }
}

/// Storage constraint violations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConstraintError {
    /// Another row already owns the unique value.
    #[error("unique constraint '{constraint}' violated on {fields:?}: {value}")]
    UniqueViolation {
        /// Constraint name.
        constraint: String,
        /// Fields covered by the constraint.
        fields: Vec<String>,
        /// The duplicated value(s).
        value: String,
    },
}

/// A field-tagged validation error.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    /// Name of the offending field.
    pub field: String,
    /// Human-readable description.
    pub message: String,
}

impl ValidationError {
    /// Create a validation error for the given field.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_error_class() {
        let err: Error = ValidationError::new("catalog_query", "not unique").into();
        assert!(err.is_client_error());
        assert!(Error::MissingParameters(vec!["course_run_ids"]).is_client_error());
        assert!(!Error::InvalidData("x".into()).is_client_error());
    }

    #[test]
    fn test_transaction_abort_unwraps() {
        let violation = ConstraintError::UniqueViolation {
            constraint: "c".into(),
            fields: vec!["f".into()],
            value: "v".into(),
        };
        let err: Error = TransactionError::Abort(Error::Constraint(violation.clone())).into();
        assert_eq!(err.unique_violation(), Some(&violation));
    }

    #[test]
    fn test_missing_parameters_message() {
        let err = Error::MissingParameters(vec!["course_run_ids", "program_uuids"]);
        assert_eq!(
            err.to_string(),
            "at least one of the following parameters is required: course_run_ids, program_uuids"
        );
    }
}
