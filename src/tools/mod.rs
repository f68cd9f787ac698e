//! Tool execution sandbox
//!
//! Provides confined tool execution with:
//! - Path validation against allowed roots (traversal and symlink escapes)
//! - Tool registry with parameter shape checks
//! - Safe executor (timeouts, per-tool audit history)
//! - Built-in filesystem tools (read, write, list)

pub mod types;
pub mod state;
pub mod registry;
pub mod security;
pub mod audit;
pub mod executor;
pub mod implementations;

// Re-export commonly used types
pub use audit::{AuditLog, ToolStats, MAX_HISTORY_ENTRIES, MAX_TRACKED_TOOLS};
pub use executor::SafeExecutor;
pub use registry::{handler_fn, ToolHandler, ToolHandlerRef, ToolRegistry};
pub use security::{PathValidationResult, PathValidator};
pub use state::{ExecutionPhase, PhaseEvent};
pub use types::{
    ParamValue, ParameterType, ToolDefinition, ToolInput, ToolParameter, ToolParams,
};
