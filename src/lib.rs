//! SandboxBuddy - Tool Execution Sandbox
//!
//! Runs registered tools on behalf of an autonomous agent while confining
//! every filesystem operation to a fixed set of allowed roots.
//!
//! # Architecture
//!
//! - **PathValidator**: path normalization and root confinement
//! - **ToolRegistry**: tool catalogue and parameter shape checks
//! - **SafeExecutor**: validation, dispatch, timeouts and audit history

pub mod errors;
pub mod types;
pub mod tools;
pub mod config;
pub mod cli;

// Re-export commonly used types
pub use config::SandboxConfig;
pub use errors::{Result, SandboxError};
pub use tools::{PathValidator, SafeExecutor, ToolDefinition, ToolRegistry};
pub use types::{ExecutionContext, ExecutionRecord, ToolExecutionResult};
