use thiserror::Error;

use crate::types::{ManagerId, TicketGuid};

/// Assignment engine errors
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssignmentError {
    /// The reference data holds no offices at all. Fatal for a batch.
    #[error("No offices configured")]
    NoOfficesConfigured,

    /// No manager could be selected. Drives escalation inside the engine
    /// and is never returned from `assign`.
    #[error("No eligible manager: {0}")]
    NoEligibleManager(String),

    /// Storage failure (connection, query, transaction)
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// An assignment for this ticket already exists
    #[error("Duplicate assignment for ticket {0}")]
    DuplicateGuid(TicketGuid),

    /// The manager's load moved between read and increment
    #[error("Load conflict on manager {manager_id}: expected {expected}, found {actual}")]
    LoadConflict {
        manager_id: ManagerId,
        expected: u32,
        actual: u32,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AssignmentError {
    /// Create a new NoEligibleManager error
    pub fn no_eligible_manager<S: Into<String>>(msg: S) -> Self {
        Self::NoEligibleManager(msg.into())
    }

    /// Create a new Persistence error
    pub fn persistence<S: Into<String>>(msg: S) -> Self {
        Self::Persistence(msg.into())
    }

    /// Create a new Configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a new InvalidInput error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new NotFound error
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new Internal error
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Transient failures that a caller may retry with backoff
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence(_) | Self::LoadConflict { .. })
    }

    /// Failures that make every further ticket in a batch pointless
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::NoOfficesConfigured | Self::Configuration(_))
    }
}

impl From<sqlx::Error> for AssignmentError {
    fn from(err: sqlx::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for AssignmentError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        Self::Persistence(format!("Failed to run migrations: {}", err))
    }
}

impl From<serde_json::Error> for AssignmentError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("Serialization error: {}", err))
    }
}

impl From<config::ConfigError> for AssignmentError {
    fn from(err: config::ConfigError) -> Self {
        Self::Configuration(err.to_string())
    }
}

impl From<anyhow::Error> for AssignmentError {
    fn from(err: anyhow::Error) -> Self {
        Self::Internal(err.to_string())
    }
}

/// Result type for assignment operations
pub type Result<T> = std::result::Result<T, AssignmentError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(AssignmentError::persistence("disk full").is_retryable());
        assert!(AssignmentError::LoadConflict {
            manager_id: ManagerId::from("m-1"),
            expected: 1,
            actual: 2,
        }
        .is_retryable());
        assert!(!AssignmentError::NoOfficesConfigured.is_retryable());
        assert!(!AssignmentError::DuplicateGuid(TicketGuid::from("t-1")).is_retryable());
        assert!(AssignmentError::NoOfficesConfigured.is_fatal());
    }

    #[test]
    fn test_sqlx_maps_to_persistence() {
        let err: AssignmentError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, AssignmentError::Persistence(_)));
    }
}
