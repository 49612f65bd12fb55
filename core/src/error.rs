//! Errors returned by queue operations.
//!
//! Every operation on the slot, appointments or seats is fallible. The view
//! layer decides whether to retry, show a message or ignore; nothing in this
//! workspace swallows a failure on its behalf.

use crate::types::AppointmentId;
use thiserror::Error;

/// Errors that can occur while driving the serving queue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueueError {
    /// The slot or a referenced record does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Kind of record ("slot", "appointment", "seat")
        entity: &'static str,
        /// Identifier that was looked up
        id: String,
    },

    /// The requested transition is not legal from the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// The persistence collaborator failed to read or write
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// A guarded slot write found a different appointment than expected
    #[error("Conflict: expected appointment {expected:?}, found {actual:?}")]
    Conflict {
        /// Appointment the writer believed was being served
        expected: Option<AppointmentId>,
        /// Appointment actually persisted
        actual: Option<AppointmentId>,
    },
}

impl QueueError {
    /// Shorthand for a missing record
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            id: id.into(),
        }
    }

    /// Stable label used in logs and metrics
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not_found",
            Self::InvalidState(_) => "invalid_state",
            Self::Persistence(_) => "persistence",
            Self::Conflict { .. } => "conflict",
        }
    }
}

/// Result alias for queue operations
pub type Result<T> = std::result::Result<T, QueueError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_record() {
        let err = QueueError::not_found("appointment", "A9");
        assert_eq!(err.to_string(), "appointment not found: A9");
        assert_eq!(err.kind(), "not_found");
    }

    #[test]
    fn conflict_reports_both_sides() {
        let err = QueueError::Conflict {
            expected: Some(AppointmentId::new("A1")),
            actual: None,
        };
        assert!(err.to_string().contains("A1"));
        assert_eq!(err.kind(), "conflict");
    }
}
