//! Execution context, result and audit record types
//!
//! These are the values crossing the sandbox boundary: a context comes in
//! with each request, a `ToolExecutionResult` goes back to the caller and an
//! `ExecutionRecord` goes into the audit log.

use crate::tools::state::ExecutionPhase;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Deployment environment the caller runs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Environment::Development => write!(f, "development"),
            Environment::Staging => write!(f, "staging"),
            Environment::Production => write!(f, "production"),
        }
    }
}

/// Per-request execution context, never mutated by the sandbox
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionContext {
    /// Session the request belongs to
    pub session_id: String,

    /// Optional user id
    pub user_id: Option<String>,

    /// Optional project id
    pub project_id: Option<String>,

    /// Caller environment
    pub environment: Environment,
}

impl ExecutionContext {
    /// Create context for a session
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            user_id: None,
            project_id: None,
            environment: Environment::default(),
        }
    }

    pub fn with_user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn with_project(mut self, project_id: impl Into<String>) -> Self {
        self.project_id = Some(project_id.into());
        self
    }

    pub fn with_environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }
}

/// Outcome of one execution attempt
///
/// `success == true` means no validation or execution error occurred;
/// `success == false` always carries an `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolExecutionResult {
    /// Whether execution was successful
    pub success: bool,

    /// Tool output
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,

    /// Error message if failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Execution duration in milliseconds
    pub execution_time_ms: u64,
}

impl ToolExecutionResult {
    /// Create successful result
    pub fn success(data: serde_json::Value, duration: Duration) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            execution_time_ms: duration.as_millis() as u64,
        }
    }

    /// Create failed result
    pub fn failure(error: impl Into<String>, duration: Duration) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            execution_time_ms: duration.as_millis() as u64,
        }
    }
}

/// Audit status of an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Failure,
}

/// Immutable audit entry describing one execution attempt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    /// Unique record id
    pub id: Uuid,

    /// Tool that was invoked
    pub tool_id: String,

    /// Rendered input as supplied by the caller
    pub input: String,

    /// Success or failure
    pub status: ExecutionStatus,

    /// Terminal phase reached
    pub outcome: ExecutionPhase,

    /// Error message if failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// Session that issued the call
    pub session_id: String,

    /// Completion time
    pub timestamp: DateTime<Utc>,

    /// Execution duration in milliseconds
    pub duration_ms: u64,
}

impl ExecutionRecord {
    /// Build a record from a finished execution
    pub fn from_result(
        tool_id: impl Into<String>,
        input: impl Into<String>,
        context: &ExecutionContext,
        outcome: ExecutionPhase,
        result: &ToolExecutionResult,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            tool_id: tool_id.into(),
            input: input.into(),
            status: if result.success {
                ExecutionStatus::Success
            } else {
                ExecutionStatus::Failure
            },
            outcome,
            error: result.error.clone(),
            session_id: context.session_id.clone(),
            timestamp: Utc::now(),
            duration_ms: result.execution_time_ms,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_result_success() {
        let result = ToolExecutionResult::success(json!({"ok": true}), Duration::from_millis(12));
        assert!(result.success);
        assert!(result.error.is_none());
        assert_eq!(result.execution_time_ms, 12);
    }

    #[test]
    fn test_result_failure_carries_error() {
        let result = ToolExecutionResult::failure("boom", Duration::from_millis(3));
        assert!(!result.success);
        assert_eq!(result.error.as_deref(), Some("boom"));
        assert!(result.data.is_none());
    }

    #[test]
    fn test_context_builder() {
        let ctx = ExecutionContext::new("s1")
            .with_user("u1")
            .with_project("p1")
            .with_environment(Environment::Production);

        assert_eq!(ctx.session_id, "s1");
        assert_eq!(ctx.user_id.as_deref(), Some("u1"));
        assert_eq!(ctx.project_id.as_deref(), Some("p1"));
        assert_eq!(ctx.environment.to_string(), "production");
    }

    #[test]
    fn test_record_from_failed_result() {
        let ctx = ExecutionContext::new("s1");
        let result = ToolExecutionResult::failure("denied", Duration::from_millis(1));
        let record = ExecutionRecord::from_result(
            "file-read",
            "/etc/passwd",
            &ctx,
            ExecutionPhase::Rejected,
            &result,
        );

        assert_eq!(record.status, ExecutionStatus::Failure);
        assert_eq!(record.outcome, ExecutionPhase::Rejected);
        assert_eq!(record.error.as_deref(), Some("denied"));
        assert_eq!(record.session_id, "s1");

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["status"], "failure");
    }
}
