//! Error types for the tool sandbox
//!
//! Every layer returns `Result<T, SandboxError>`. The executor is the only
//! place that turns errors into failed results; nothing escapes `execute`.

use thiserror::Error;

/// Main error type for sandboxed tool execution
#[derive(Error, Debug)]
pub enum SandboxError {
    /// Parameters do not match the tool's declared schema
    #[error("Validation error: {0}")]
    Validation(String),

    /// Path uses `..` (or an encoded/obfuscated equivalent) to leave the allowed roots
    #[error("Path traversal detected: {path}")]
    PathTraversal { path: String },

    /// Normalized path lies outside every allowed root
    #[error("Path not allowed: {path} is outside permitted directories")]
    PathNotAllowed { path: String },

    /// Path is unusable before any confinement check (null byte, empty, bad encoding)
    #[error("Invalid path: {0}")]
    InvalidPath(String),

    /// Unknown tool id
    #[error("Tool not found: {0}")]
    ToolNotFound(String),

    /// Duplicate registration
    #[error("Tool already registered: {0}")]
    ToolAlreadyRegistered(String),

    /// Execution exceeded its time bound
    #[error("Tool execution timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// The tool's own operation failed
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Raw input that looks like a JSON object but does not parse
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Execution phase machine errors
    #[error("Invalid phase transition from {from} via {event}")]
    InvalidTransition { from: String, event: String },
}

impl SandboxError {
    /// Errors raised before any tool behavior runs
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            SandboxError::Validation(_)
                | SandboxError::PathTraversal { .. }
                | SandboxError::PathNotAllowed { .. }
                | SandboxError::InvalidPath(_)
                | SandboxError::ToolNotFound(_)
                | SandboxError::Serialization(_)
        )
    }

    /// Errors produced by the path confinement layer
    pub fn is_path_violation(&self) -> bool {
        matches!(
            self,
            SandboxError::PathTraversal { .. }
                | SandboxError::PathNotAllowed { .. }
                | SandboxError::InvalidPath(_)
        )
    }
}

/// Result type alias for sandbox operations
pub type Result<T> = std::result::Result<T, SandboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SandboxError::PathNotAllowed {
            path: "/etc/passwd".to_string(),
        };
        assert!(err.to_string().contains("not allowed"));
        assert!(err.to_string().contains("/etc/passwd"));

        let err = SandboxError::PathTraversal {
            path: "/tmp/../../etc".to_string(),
        };
        assert!(err.to_string().contains("traversal"));

        let err = SandboxError::ToolNotFound("nonexistent".to_string());
        assert!(err.to_string().contains("not found"));

        let err = SandboxError::Timeout { duration_ms: 50 };
        assert!(err.to_string().contains("timed out"));
        assert!(err.to_string().contains("50ms"));
    }

    #[test]
    fn test_rejection_classification() {
        assert!(SandboxError::Validation("x".into()).is_rejection());
        assert!(SandboxError::ToolNotFound("x".into()).is_rejection());
        assert!(SandboxError::InvalidPath("x".into()).is_path_violation());
        assert!(!SandboxError::Timeout { duration_ms: 1 }.is_rejection());
        assert!(!SandboxError::Execution("disk".into()).is_rejection());
        assert!(!SandboxError::ToolNotFound("x".into()).is_path_violation());

        let malformed = serde_json::from_str::<serde_json::Value>("{oops").unwrap_err();
        assert!(SandboxError::from(malformed).is_rejection());
    }
}
