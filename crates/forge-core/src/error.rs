//! Error types for forge-core.

use thiserror::Error;

/// Result type alias using forge-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error types for forge operations
#[derive(Error, Debug)]
pub enum Error {
    // Database errors
    #[cfg(feature = "db")]
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    // Curriculum errors
    #[error("Invalid curriculum graph: {reason}")]
    InvalidCurriculumGraph { reason: String },

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid curriculum graph error
    pub fn invalid_graph(reason: impl Into<String>) -> Self {
        Self::InvalidCurriculumGraph {
            reason: reason.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// Check if this error is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl<T> From<std::sync::PoisonError<T>> for Error {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::LockPoisoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = Error::not_found("CurriculumTask", "t1");
        assert!(err.is_not_found());
        assert!(err.to_string().contains("t1"));

        let err = Error::invalid_graph("cycle: a -> b -> a");
        assert!(err.to_string().contains("cycle"));
        assert!(!err.is_not_found());
    }
}
