//! SDK Error Types
//!
//! Only [`ForgeError::GenerationFailure`] ever reaches a caller as a failed
//! result. Every other kind stays inside its subsystem and is logged.

use thiserror::Error;

/// SDK Result type alias
pub type ForgeResult<T> = Result<T, ForgeError>;

/// SDK errors
#[derive(Debug, Error)]
pub enum ForgeError {
    /// Generation failed or timed out; terminal for the request
    #[error("{message}")]
    GenerationFailure { message: String },

    /// Review errored or timed out; the request proceeds unreviewed
    #[error("review unavailable: {message}")]
    ReviewUnavailable { message: String },

    /// Tag/snippet extraction failed; isolated to the extraction job
    #[error("pattern extraction error: {message}")]
    PatternExtraction { message: String },

    /// A consolidation pass failed; retried on the next pass
    #[error("memory consolidation error: {message}")]
    MemoryConsolidation { message: String },

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(#[from] crate::config::ConfigValidationError),

    /// Core error (store, curriculum graph, stats)
    #[error(transparent)]
    Core(#[from] forge_core::Error),

    /// Timeout error
    #[error("operation timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Request cancelled by the caller
    #[error("cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// TOML parse error
    #[error("config parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl ForgeError {
    /// Create a generation failure
    pub fn generation(message: impl Into<String>) -> Self {
        Self::GenerationFailure {
            message: message.into(),
        }
    }

    /// Create a review-unavailable error
    pub fn review_unavailable(message: impl Into<String>) -> Self {
        Self::ReviewUnavailable {
            message: message.into(),
        }
    }

    /// Create a pattern extraction error
    pub fn pattern_extraction(message: impl Into<String>) -> Self {
        Self::PatternExtraction {
            message: message.into(),
        }
    }

    /// Create a memory consolidation error
    pub fn consolidation(message: impl Into<String>) -> Self {
        Self::MemoryConsolidation {
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    /// Check if this error ends a request
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::GenerationFailure { .. } | Self::Cancelled)
    }

    /// Check if this error is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Check if this error is an invalid curriculum graph
    pub fn is_invalid_curriculum(&self) -> bool {
        matches!(
            self,
            Self::Core(forge_core::Error::InvalidCurriculumGraph { .. })
        )
    }
}
