//! Types crossing the sandbox boundary

pub mod execution;

pub use execution::{
    Environment, ExecutionContext, ExecutionRecord, ExecutionStatus, ToolExecutionResult,
};
