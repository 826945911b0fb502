//! Error types for the elenchus-rs library.
//!
//! Every core API returns [`Result`] with a structured [`ElenchusError`].
//! Validation and state errors short-circuit with no state mutation;
//! external-tool errors degrade gracefully at their call sites.

use std::io;

use thiserror::Error;

/// Main result type for elenchus operations.
pub type Result<T> = std::result::Result<T, ElenchusError>;

/// Comprehensive error type for all elenchus operations.
#[derive(Error, Debug)]
pub enum ElenchusError {
    /// Invalid input supplied by the caller
    #[error("Validation error: {message}")]
    Validation {
        /// Error description
        message: String,
        /// Field or input that failed validation
        field: Option<String>,
    },

    /// Unknown session, issue, round, or resource
    #[error("Not found: {message}")]
    NotFound {
        /// Error description
        message: String,
        /// Kind of entity that was looked up
        entity: Option<String>,
    },

    /// Illegal transition: wrong role, terminated session, missing prerequisite
    #[error("State error: {message}")]
    State {
        /// Error description
        message: String,
        /// Session the violation occurred in
        session_id: Option<String>,
    },

    /// Persisted state failed schema validation on load
    #[error("Integrity error: {message}")]
    Integrity {
        /// Error description
        message: String,
        /// Path of the offending record
        path: Option<String>,
    },

    /// VCS or parser invocation failed
    #[error("External tool error ({tool}): {message}")]
    ExternalTool {
        /// Tool that failed (e.g. "git")
        tool: String,
        /// Error description
        message: String,
    },

    /// Token ceiling reached while the pipeline wanted to continue
    #[error("Budget exceeded: {message}")]
    BudgetExceeded {
        /// Error description
        message: String,
        /// Tokens used when the ceiling was hit
        tokens_used: Option<u64>,
    },

    /// Request was cancelled before completion; no partial state persisted
    #[error("Cancelled: {message}")]
    Cancelled {
        /// Error description
        message: String,
    },

    /// I/O related errors (file operations, persistence)
    #[error("I/O error: {message}")]
    Io {
        /// Human-readable error message
        message: String,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Parsing and language processing errors
    #[error("Parse error in {language}: {message}")]
    Parse {
        /// Programming language being parsed
        language: String,
        /// Error description
        message: String,
        /// File path where error occurred
        file_path: Option<String>,
    },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization {
        /// Error description
        message: String,
        /// Underlying serialization error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    Config {
        /// Error description
        message: String,
        /// Configuration field that caused the error
        field: Option<String>,
    },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal {
        /// Error description
        message: String,
    },
}

impl ElenchusError {
    /// Create a new validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new validation error with field context
    pub fn validation_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new not-found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            entity: None,
        }
    }

    /// Create a new not-found error naming the entity kind
    pub fn not_found_entity(message: impl Into<String>, entity: impl Into<String>) -> Self {
        Self::NotFound {
            message: message.into(),
            entity: Some(entity.into()),
        }
    }

    /// Create a new state error
    pub fn state(message: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
            session_id: None,
        }
    }

    /// Create a new state error scoped to a session
    pub fn state_in_session(message: impl Into<String>, session_id: impl Into<String>) -> Self {
        Self::State {
            message: message.into(),
            session_id: Some(session_id.into()),
        }
    }

    /// Create a new integrity error
    pub fn integrity(message: impl Into<String>, path: Option<String>) -> Self {
        Self::Integrity {
            message: message.into(),
            path,
        }
    }

    /// Create a new external-tool error
    pub fn external_tool(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ExternalTool {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a new budget-exceeded error
    pub fn budget_exceeded(message: impl Into<String>, tokens_used: Option<u64>) -> Self {
        Self::BudgetExceeded {
            message: message.into(),
            tokens_used,
        }
    }

    /// Create a new cancellation error
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::Cancelled {
            message: message.into(),
        }
    }

    /// Create a new I/O error with context
    pub fn io(message: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a new parse error
    pub fn parse(language: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            language: language.into(),
            message: message.into(),
            file_path: None,
        }
    }

    /// Create a new parse error with file context
    pub fn parse_in_file(
        language: impl Into<String>,
        message: impl Into<String>,
        file_path: impl Into<String>,
    ) -> Self {
        Self::Parse {
            language: language.into(),
            message: message.into(),
            file_path: Some(file_path.into()),
        }
    }

    /// Create a new configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            field: None,
        }
    }

    /// Create a new configuration error with field context
    pub fn config_field(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Create a new internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Protocol-facing error type tag used by the dispatcher payloads.
    pub fn error_type(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "ValidationError",
            Self::NotFound { .. } => "NotFound",
            Self::State { .. } => "StateError",
            Self::Integrity { .. } => "IntegrityError",
            Self::ExternalTool { .. } => "ExternalToolError",
            Self::BudgetExceeded { .. } => "BudgetExceeded",
            Self::Cancelled { .. } => "Cancelled",
            Self::Io { .. } => "IOError",
            Self::Parse { .. } => "ExternalToolError",
            Self::Serialization { .. } => "IntegrityError",
            Self::Config { .. } => "ValidationError",
            Self::Internal { .. } => "InternalError",
        }
    }

    /// True for error kinds the dispatcher reports as invalid input.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. } | Self::Config { .. })
    }
}

impl From<io::Error> for ElenchusError {
    fn from(err: io::Error) -> Self {
        Self::io("I/O operation failed", err)
    }
}

impl From<serde_json::Error> for ElenchusError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: format!("JSON serialization failed: {err}"),
            source: Some(Box::new(err)),
        }
    }
}

impl From<serde_yaml::Error> for ElenchusError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization {
            message: format!("YAML serialization failed: {err}"),
            source: Some(Box::new(err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ElenchusError::validation("bad input");
        assert!(matches!(err, ElenchusError::Validation { .. }));
        assert_eq!(err.error_type(), "ValidationError");

        let err = ElenchusError::state_in_session("wrong role", "2025-01-01_demo_abc123");
        assert!(matches!(err, ElenchusError::State { .. }));
        assert_eq!(err.error_type(), "StateError");
    }

    #[test]
    fn test_validation_classification() {
        assert!(ElenchusError::validation("x").is_validation());
        assert!(ElenchusError::config("x").is_validation());
        assert!(!ElenchusError::not_found("x").is_validation());
        assert!(!ElenchusError::internal("x").is_validation());
    }

    #[test]
    fn test_error_type_tags() {
        let err = ElenchusError::budget_exceeded("over ceiling", Some(600));
        assert_eq!(err.error_type(), "BudgetExceeded");

        let err = ElenchusError::external_tool("git", "binary missing");
        assert_eq!(err.error_type(), "ExternalToolError");
    }
}
