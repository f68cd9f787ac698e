//! Tool registry with parameter schemas
//!
//! Owns the catalogue of invocable tools and checks call shape before
//! dispatch. Built-in tools (metadata only; behavior is bound by the executor):
//! - file-read: Read file contents
//! - file-write: Write content to a file
//! - list-dir: List directory contents

use crate::errors::{Result, SandboxError};
use crate::tools::types::{
    params_to_json, ParameterType, ToolDefinition, ToolParameter, ToolParams, FILESYSTEM_CATEGORY,
    PATH_PARAMETER, PERMISSION_FS_READ, PERMISSION_FS_WRITE,
};
use crate::types::{ExecutionContext, ToolExecutionResult};
use async_trait::async_trait;
use serde_json::json;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Built-in tool ids
pub const FILE_READ: &str = "file-read";
pub const FILE_WRITE: &str = "file-write";
pub const LIST_DIR: &str = "list-dir";

/// Behavior bound to a tool id
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool with already-validated parameters
    async fn call(
        &self,
        context: &ExecutionContext,
        params: &ToolParams,
    ) -> Result<serde_json::Value>;
}

/// Shared handler reference
pub type ToolHandlerRef = Arc<dyn ToolHandler>;

/// Adapter turning an async closure into a `ToolHandler`
pub struct FnHandler<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> ToolHandler for FnHandler<F>
where
    F: Fn(ExecutionContext, ToolParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
{
    async fn call(
        &self,
        context: &ExecutionContext,
        params: &ToolParams,
    ) -> Result<serde_json::Value> {
        (self.f)(context.clone(), params.clone()).await
    }
}

/// Wrap an async closure as a handler
pub fn handler_fn<F, Fut>(f: F) -> ToolHandlerRef
where
    F: Fn(ExecutionContext, ToolParams) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<serde_json::Value>> + Send + 'static,
{
    Arc::new(FnHandler { f })
}

/// Tool registry
#[derive(Clone)]
pub struct ToolRegistry {
    /// Map of tool id to definition
    tools: HashMap<String, ToolDefinition>,

    /// Map of tool id to bound behavior
    handlers: HashMap<String, ToolHandlerRef>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut handlers: Vec<&String> = self.handlers.keys().collect();
        handlers.sort();
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tool_ids())
            .field("handlers", &handlers)
            .finish()
    }
}

impl ToolRegistry {
    /// Create registry with the built-in tool definitions
    pub fn new() -> Self {
        let mut registry = Self::empty();

        for definition in builtin_definitions() {
            let id = definition.id.clone();
            if let Err(e) = registry.register_tool(definition, None) {
                warn!(tool_id = %id, error = %e, "Built-in tool failed to register");
            }
        }

        registry
    }

    /// Create registry without any tools
    pub fn empty() -> Self {
        Self {
            tools: HashMap::new(),
            handlers: HashMap::new(),
        }
    }

    /// Register a tool definition and, optionally, its behavior.
    ///
    /// Fails if the id is taken; the existing definition is left untouched.
    pub fn register_tool(
        &mut self,
        definition: ToolDefinition,
        handler: Option<ToolHandlerRef>,
    ) -> Result<()> {
        if self.tools.contains_key(&definition.id) {
            return Err(SandboxError::ToolAlreadyRegistered(definition.id));
        }

        check_definition(&definition)?;

        debug!(
            tool_id = %definition.id,
            category = %definition.category,
            has_handler = handler.is_some(),
            "Registering tool"
        );

        if let Some(handler) = handler {
            self.handlers.insert(definition.id.clone(), handler);
        }
        self.tools.insert(definition.id.clone(), definition);

        Ok(())
    }

    /// Get tool definition by id
    pub fn get_tool(&self, id: &str) -> Option<&ToolDefinition> {
        self.tools.get(id)
    }

    /// Check if tool exists
    pub fn contains(&self, id: &str) -> bool {
        self.tools.contains_key(id)
    }

    /// Get bound behavior for a tool
    pub fn handler(&self, id: &str) -> Option<ToolHandlerRef> {
        self.handlers.get(id).cloned()
    }

    pub fn has_handler(&self, id: &str) -> bool {
        self.handlers.contains_key(id)
    }

    /// All definitions, ordered by id
    pub fn list_tools(&self) -> Vec<&ToolDefinition> {
        let mut tools: Vec<&ToolDefinition> = self.tools.values().collect();
        tools.sort_by(|a, b| a.id.cmp(&b.id));
        tools
    }

    /// Definitions in one category, ordered by id
    pub fn list_tools_by_category(&self, category: &str) -> Vec<&ToolDefinition> {
        self.list_tools()
            .into_iter()
            .filter(|t| t.category == category)
            .collect()
    }

    /// All tool ids, sorted
    pub fn tool_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.tools.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Shape check of `params` against the tool's declared schema.
    ///
    /// Knows nothing about path semantics.
    pub fn validate_tool_parameters(&self, tool_id: &str, params: &ToolParams) -> Result<()> {
        let definition = self
            .get_tool(tool_id)
            .ok_or_else(|| SandboxError::Validation(format!("Unknown tool '{}'", tool_id)))?;

        for parameter in &definition.parameters {
            match params.get(&parameter.name) {
                None if parameter.required => {
                    return Err(SandboxError::Validation(format!(
                        "Missing required parameter '{}' for tool '{}'",
                        parameter.name, tool_id
                    )));
                }
                None => {}
                Some(value) if value.param_type() != parameter.param_type => {
                    return Err(SandboxError::Validation(format!(
                        "Parameter '{}' for tool '{}' expects {}, got {}",
                        parameter.name,
                        tool_id,
                        parameter.param_type,
                        value.param_type()
                    )));
                }
                Some(_) => {}
            }
        }

        Ok(())
    }

    /// Validate `params` and fill declared defaults for absent optional parameters
    pub fn resolve_parameters(&self, tool_id: &str, mut params: ToolParams) -> Result<ToolParams> {
        self.validate_tool_parameters(tool_id, &params)?;

        if let Some(definition) = self.get_tool(tool_id) {
            for parameter in &definition.parameters {
                if let Some(default) = &parameter.default {
                    params
                        .entry(parameter.name.clone())
                        .or_insert_with(|| default.clone());
                }
            }
        }

        Ok(params)
    }

    /// Validate and dispatch a call.
    ///
    /// Never fails with an error: unknown tools, invalid parameters and
    /// handler errors all come back as failed results. Filesystem tools are
    /// refused here; they only run behind path confinement.
    pub async fn execute_tool(
        &self,
        tool_id: &str,
        context: &ExecutionContext,
        params: &ToolParams,
    ) -> ToolExecutionResult {
        let start = Instant::now();

        let fail = |e: SandboxError| {
            if e.is_rejection() {
                warn!(tool_id = %tool_id, session_id = %context.session_id, error = %e, "Call rejected");
            }
            ToolExecutionResult::failure(e.to_string(), start.elapsed())
        };

        let Some(definition) = self.get_tool(tool_id) else {
            return fail(SandboxError::ToolNotFound(tool_id.to_string()));
        };

        if definition.is_filesystem_affecting() {
            return ToolExecutionResult::failure(
                format!(
                    "Filesystem tool '{}' must be executed through the sandbox executor",
                    tool_id
                ),
                start.elapsed(),
            );
        }

        let params = match self.resolve_parameters(tool_id, params.clone()) {
            Ok(params) => params,
            Err(e) => return fail(e),
        };

        match self.dispatch(tool_id, context, &params).await {
            Ok(data) => ToolExecutionResult::success(data, start.elapsed()),
            Err(e) => fail(e),
        }
    }

    /// Run the bound handler, or describe what would have run.
    ///
    /// Parameters must already be validated. A tool without a handler yields a
    /// stub description, except filesystem tools, which fail instead.
    pub(crate) async fn dispatch(
        &self,
        tool_id: &str,
        context: &ExecutionContext,
        params: &ToolParams,
    ) -> Result<serde_json::Value> {
        let definition = self
            .get_tool(tool_id)
            .ok_or_else(|| SandboxError::ToolNotFound(tool_id.to_string()))?;

        match self.handler(tool_id) {
            Some(handler) => handler.call(context, params).await,
            None if definition.is_filesystem_affecting() => Err(SandboxError::Execution(format!(
                "No executor bound for filesystem tool '{}'",
                tool_id
            ))),
            None => {
                info!(tool_id = %tool_id, session_id = %context.session_id, "Returning stub result for tool without executor");
                Ok(json!({
                    "stub": true,
                    "tool": tool_id,
                    "version": definition.version,
                    "message": format!("Tool '{}' has no executor yet; would run with the given parameters", definition.name),
                    "parameters": params_to_json(params),
                }))
            }
        }
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Reject definitions that could never be called correctly
fn check_definition(definition: &ToolDefinition) -> Result<()> {
    if definition.id.trim().is_empty() {
        return Err(SandboxError::Validation(
            "Tool id must not be empty".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for parameter in &definition.parameters {
        if !seen.insert(parameter.name.as_str()) {
            return Err(SandboxError::Validation(format!(
                "Duplicate parameter '{}' in tool '{}'",
                parameter.name, definition.id
            )));
        }

        if let Some(default) = &parameter.default {
            if default.param_type() != parameter.param_type {
                return Err(SandboxError::Validation(format!(
                    "Default for parameter '{}' in tool '{}' is {}, declared {}",
                    parameter.name,
                    definition.id,
                    default.param_type(),
                    parameter.param_type
                )));
            }
        }
    }

    if definition.is_filesystem_affecting() {
        check_path_parameters(definition)?;
    }

    Ok(())
}

/// Every path a filesystem tool receives must be a single string that is
/// present on each call, so the executor can confine it.
fn check_path_parameters(definition: &ToolDefinition) -> Result<()> {
    let mut declared = false;

    for parameter in definition.path_parameters() {
        declared = true;

        if parameter.param_type != ParameterType::String {
            return Err(SandboxError::Validation(format!(
                "Path parameter '{}' in filesystem tool '{}' must be a string, declared {}",
                parameter.name, definition.id, parameter.param_type
            )));
        }

        if !parameter.required && parameter.default.is_none() {
            return Err(SandboxError::Validation(format!(
                "Path parameter '{}' in filesystem tool '{}' must be required or have a default",
                parameter.name, definition.id
            )));
        }
    }

    if !declared {
        return Err(SandboxError::Validation(format!(
            "Filesystem tool '{}' declares no path parameter",
            definition.id
        )));
    }

    Ok(())
}

/// Definitions of the built-in filesystem tools
pub fn builtin_definitions() -> Vec<ToolDefinition> {
    vec![
        file_read_definition(),
        file_write_definition(),
        list_dir_definition(),
    ]
}

fn file_read_definition() -> ToolDefinition {
    ToolDefinition::new(FILE_READ, "Read File", "Read contents of a file")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_category(FILESYSTEM_CATEGORY)
        .with_permission(PERMISSION_FS_READ)
        .with_parameter(ToolParameter::required(
            PATH_PARAMETER,
            ParameterType::String,
            "File path to read",
        ))
        .with_example(r#"{"path": "notes/todo.md"}"#)
}

fn file_write_definition() -> ToolDefinition {
    ToolDefinition::new(FILE_WRITE, "Write File", "Write content to a file")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_category(FILESYSTEM_CATEGORY)
        .with_permission(PERMISSION_FS_WRITE)
        .with_parameter(ToolParameter::required(
            PATH_PARAMETER,
            ParameterType::String,
            "File path to write",
        ))
        .with_parameter(ToolParameter::required(
            "content",
            ParameterType::String,
            "Content to write to the file",
        ))
        .with_parameter(
            ToolParameter::optional(
                "append",
                ParameterType::Boolean,
                "Append instead of overwriting",
            )
            .with_default(false),
        )
        .with_parameter(
            ToolParameter::optional(
                "create_dirs",
                ParameterType::Boolean,
                "Create missing parent directories",
            )
            .with_default(false),
        )
        .with_example(r#"{"path": "out/report.txt", "content": "done"}"#)
}

fn list_dir_definition() -> ToolDefinition {
    ToolDefinition::new(LIST_DIR, "List Directory", "List contents of a directory")
        .with_version(env!("CARGO_PKG_VERSION"))
        .with_category(FILESYSTEM_CATEGORY)
        .with_permission(PERMISSION_FS_READ)
        .with_parameter(ToolParameter::required(
            PATH_PARAMETER,
            ParameterType::String,
            "Directory path to list",
        ))
        .with_parameter(
            ToolParameter::optional(
                "recursive",
                ParameterType::Boolean,
                "Whether to list recursively",
            )
            .with_default(false),
        )
        .with_example(r#"{"path": ".", "recursive": false}"#)
}
