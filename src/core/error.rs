//! Controller error types

use thiserror::Error;

/// Errors produced while turning a model reply into a `ControllerAction`
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ActionError {
    /// The reply could not be decoded into any action variant
    #[error("Invalid controller output: {0}")]
    Parse(String),

    /// The reply decoded but violates the step payload invariant
    #[error("{message}")]
    Validation {
        /// Effective step type, if one could be determined
        step_type: Option<String>,
        /// Human-readable description of the violation
        message: String,
    },
}

impl ActionError {
    /// Create a parse error
    pub fn parse(msg: impl Into<String>) -> Self {
        ActionError::Parse(msg.into())
    }

    /// Create a validation error for a known step type
    pub fn validation(step_type: Option<&str>, msg: impl Into<String>) -> Self {
        ActionError::Validation {
            step_type: step_type.map(str::to_string),
            message: msg.into(),
        }
    }

    /// Whether this failure came from the validation pass
    pub fn is_validation(&self) -> bool {
        matches!(self, ActionError::Validation { .. })
    }
}

/// Errors from the output store
#[derive(Error, Debug)]
pub enum StoreError {
    /// No record exists for the id (never written, or evicted)
    #[error("Stored output not found: {0}")]
    NotFound(String),

    /// A record with this id already exists; stored outputs are write-once
    #[error("Stored output already exists: {0}")]
    AlreadyExists(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors returned by traversal operations
///
/// These never affect controller state; they are returned to whoever invoked
/// the operation (usually the model, through a failed tool result).
#[derive(Error, Debug)]
pub enum TraversalError {
    /// No stored output exists for the id
    #[error("Unknown stored output id '{0}'")]
    UnknownId(String),

    /// The path expression does not compile
    #[error("Invalid path expression '{path}': {message}")]
    InvalidPath { path: String, message: String },

    /// The path resolved to a value of the wrong kind for the operation
    #[error("Path '{path}' resolved to {found}, expected {expected}")]
    TypeMismatch {
        path: String,
        expected: &'static str,
        found: &'static str,
    },

    /// The path matched nothing where a value is required
    #[error("Path '{0}' did not match any value")]
    NoMatch(String),

    /// The request itself is malformed
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Underlying store failure other than a missing record
    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for TraversalError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => TraversalError::UnknownId(id),
            other => TraversalError::Store(other),
        }
    }
}

/// Errors from misusing the controller loop API
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ControllerError {
    /// `resume` was called while the loop was not suspended on a user question
    #[error("Controller is not awaiting user input (state: {0})")]
    NotAwaitingUser(String),

    /// A transition out of a terminal state was attempted
    #[error("Invalid state transition: {from} -> {to}")]
    InvalidTransition { from: String, to: String },
}

/// Result type alias for traversal operations
pub type TraversalResult<T> = Result<T, TraversalError>;

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ActionError::validation(
            Some("tool"),
            "next_step type=tool requires non-empty 'tool' field",
        );
        assert_eq!(
            err.to_string(),
            "next_step type=tool requires non-empty 'tool' field"
        );
        assert!(err.is_validation());

        let err = StoreError::NotFound("abc123".into());
        assert_eq!(err.to_string(), "Stored output not found: abc123");
    }

    #[test]
    fn test_store_not_found_maps_to_unknown_id() {
        let err: TraversalError = StoreError::NotFound("abc".into()).into();
        assert!(matches!(err, TraversalError::UnknownId(id) if id == "abc"));

        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: TraversalError = StoreError::from(io_err).into();
        assert!(matches!(err, TraversalError::Store(StoreError::Io(_))));
    }
}
