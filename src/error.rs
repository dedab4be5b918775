use std::fmt;
use thiserror::Error;

use crate::checkpoints::CheckpointAction;
use crate::repository::RepositoryError;
use crate::work_orders::CheckpointStatus;

/// Typed outcome of a rejected engine call.
///
/// Every variant is an ordinary, expected result of multi-actor workflows;
/// none of them leave partial state behind.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{entity} '{id}' not found")]
    NotFound { entity: &'static str, id: String },

    #[error("Only members of department '{department}' or an administrator may act on this checkpoint")]
    Forbidden { department: String },

    #[error("Unknown action '{action}': expected one of start, complete, return, problem")]
    InvalidAction { action: String },

    #[error("Cannot {action} a checkpoint whose status is {status}")]
    InvalidTransition {
        action: CheckpointAction,
        status: CheckpointStatus,
    },

    #[error("Checkpoint cannot start before '{predecessor}' is completed")]
    SequenceViolation { predecessor: String },

    #[error("Operation '{operation}' timed out after {duration_ms}ms")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("Service unavailable: {reason}")]
    Unavailable { reason: String },
}

/// Stable classification of an [`EngineError`] for callers that map errors
/// onto their own responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Forbidden,
    InvalidAction,
    InvalidTransition,
    SequenceViolation,
    Timeout,
    Unavailable,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::Forbidden => "forbidden",
            ErrorKind::InvalidAction => "invalid_action",
            ErrorKind::InvalidTransition => "invalid_transition",
            ErrorKind::SequenceViolation => "sequence_violation",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::Forbidden { .. } => ErrorKind::Forbidden,
            EngineError::InvalidAction { .. } => ErrorKind::InvalidAction,
            EngineError::InvalidTransition { .. } => ErrorKind::InvalidTransition,
            EngineError::SequenceViolation { .. } => ErrorKind::SequenceViolation,
            EngineError::Timeout { .. } => ErrorKind::Timeout,
            EngineError::Unavailable { .. } => ErrorKind::Unavailable,
        }
    }

    pub(crate) fn not_found(entity: &'static str, id: impl fmt::Display) -> Self {
        EngineError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<RepositoryError> for EngineError {
    fn from(err: RepositoryError) -> Self {
        EngineError::Unavailable {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages_name_the_blocking_detail() {
        let forbidden = EngineError::Forbidden {
            department: "Finance".to_string(),
        };
        assert!(forbidden.to_string().contains("Finance"));

        let invalid = EngineError::InvalidTransition {
            action: CheckpointAction::Start,
            status: CheckpointStatus::Completed,
        };
        assert!(invalid.to_string().contains("COMPLETED"));

        let sequence = EngineError::SequenceViolation {
            predecessor: "Review".to_string(),
        };
        assert!(sequence.to_string().contains("Review"));
    }

    #[test]
    fn test_repository_errors_become_unavailable() {
        let err: EngineError = RepositoryError::Unavailable("connection reset".to_string()).into();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
        assert!(err.to_string().contains("connection reset"));
    }
}
