//! Sandboxed tool executor
//!
//! The enforcement point where registry metadata, path confinement, time
//! bounds and audit logging meet:
//! 1. Resolve the tool in the registry
//! 2. Shape-check parameters and fill defaults
//! 3. Confine every path-bearing parameter of filesystem tools
//! 4. Run the behavior under a timeout
//! 5. Append an audit record
//!
//! `execute` never fails with an error; every failure mode is encoded in the
//! returned `ToolExecutionResult`.

use crate::config::SandboxConfig;
use crate::errors::{Result, SandboxError};
use crate::tools::audit::{AuditLog, ToolStats};
use crate::tools::implementations::filesystem_handlers;
use crate::tools::registry::{ToolHandlerRef, ToolRegistry};
use crate::tools::security::PathValidator;
use crate::tools::state::{ExecutionPhase, PhaseEvent};
use crate::tools::types::{ParamValue, ToolDefinition, ToolInput, ToolParams};
use crate::types::{ExecutionContext, ExecutionRecord, ToolExecutionResult};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Executor enforcing path confinement, timeouts and auditing
pub struct SafeExecutor {
    /// Tool catalogue, registered before concurrent use begins
    registry: Arc<ToolRegistry>,

    /// Path confinement for filesystem tools
    validator: PathValidator,

    /// Behaviors of the built-in filesystem tools
    filesystem: HashMap<String, ToolHandlerRef>,

    /// Per-tool execution history
    audit: AuditLog,

    /// Timeouts and limits
    config: SandboxConfig,
}

impl SafeExecutor {
    /// Create executor from configuration and a registry
    pub fn new(config: SandboxConfig, registry: Arc<ToolRegistry>) -> Result<Self> {
        let working_dir = config.effective_working_dir().ok_or_else(|| {
            SandboxError::ConfigError("At least one allowed root is required".to_string())
        })?;
        let validator = PathValidator::new(&config.allowed_roots, working_dir)?;

        info!(
            roots = ?validator.allowed_roots(),
            tools = registry.len(),
            default_timeout_ms = config.default_timeout_ms,
            "Sandbox executor ready"
        );

        Ok(Self {
            registry,
            validator,
            filesystem: filesystem_handlers(config.max_output_size),
            audit: AuditLog::with_limits(config.max_history_entries, config.max_tracked_tools),
            config,
        })
    }

    /// Create executor over the built-in tools with default settings
    pub fn with_allowed_roots<I, P>(allowed_roots: I) -> Result<Self>
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let config = allowed_roots
            .into_iter()
            .fold(SandboxConfig::default(), |config, root| {
                config.with_allowed_root(root)
            });
        Self::new(config, Arc::new(ToolRegistry::new()))
    }

    /// Execute a tool with the configured time bound
    pub async fn execute(
        &self,
        tool_id: &str,
        input: impl Into<ToolInput>,
        context: &ExecutionContext,
    ) -> ToolExecutionResult {
        self.execute_with_timeout(tool_id, input, context, None)
            .await
    }

    /// Execute a tool, optionally overriding its time bound for this call
    pub async fn execute_with_timeout(
        &self,
        tool_id: &str,
        input: impl Into<ToolInput>,
        context: &ExecutionContext,
        timeout: Option<Duration>,
    ) -> ToolExecutionResult {
        let input = input.into();
        let rendered_input = input.render();
        let start = Instant::now();
        let mut phase = ExecutionPhase::Pending;

        advance(&mut phase, PhaseEvent::Begin, tool_id);

        let outcome = self
            .run(tool_id, input, context, timeout, &mut phase)
            .await;

        let result = match outcome {
            Ok(data) => {
                advance(&mut phase, PhaseEvent::Complete, tool_id);
                ToolExecutionResult::success(data, start.elapsed())
            }
            Err(e) => {
                let event = phase.failure_event(&e);
                advance(&mut phase, event, tool_id);
                if phase == ExecutionPhase::Rejected {
                    warn!(
                        tool_id = %tool_id,
                        session_id = %context.session_id,
                        error = %e,
                        path_violation = e.is_path_violation(),
                        "Execution rejected"
                    );
                }
                ToolExecutionResult::failure(e.to_string(), start.elapsed())
            }
        };

        self.audit.record(ExecutionRecord::from_result(
            tool_id,
            rendered_input,
            context,
            phase,
            &result,
        ));

        info!(
            tool_id = %tool_id,
            session_id = %context.session_id,
            outcome = ?phase,
            duration_ms = result.execution_time_ms,
            "Tool execution finished"
        );

        result
    }

    async fn run(
        &self,
        tool_id: &str,
        input: ToolInput,
        context: &ExecutionContext,
        timeout: Option<Duration>,
        phase: &mut ExecutionPhase,
    ) -> Result<serde_json::Value> {
        let definition = self
            .registry
            .get_tool(tool_id)
            .ok_or_else(|| SandboxError::ToolNotFound(tool_id.to_string()))?;

        let params = input.into_params(definition)?;
        let mut params = self.registry.resolve_parameters(tool_id, params)?;

        if definition.is_filesystem_affecting() {
            self.confine_paths(definition, &mut params)?;
        }

        advance(phase, PhaseEvent::Authorize, tool_id);

        let handler = self.handler_for(definition);
        let limit = self.config.timeout_for(tool_id, timeout);

        advance(phase, PhaseEvent::Dispatch, tool_id);

        let work = async {
            match handler {
                Some(handler) => handler.call(context, &params).await,
                None => self.registry.dispatch(tool_id, context, &params).await,
            }
        };

        // Dropping `work` on expiry abandons the operation; blocking I/O
        // already handed to the runtime may still finish, its result is discarded.
        match tokio::time::timeout(limit, work).await {
            Ok(result) => result,
            Err(_) => Err(SandboxError::Timeout {
                duration_ms: limit.as_millis() as u64,
            }),
        }
    }

    /// Replace every path-bearing parameter with its confined absolute form.
    ///
    /// Registration already guarantees string-typed, always-present path
    /// parameters; anything else reaching this point is refused rather than
    /// handed to the tool unchecked.
    fn confine_paths(&self, definition: &ToolDefinition, params: &mut ToolParams) -> Result<()> {
        let mut confined_any = false;

        for parameter in definition.path_parameters() {
            let raw = match params.get(&parameter.name) {
                Some(ParamValue::String(raw)) => raw,
                Some(other) => {
                    return Err(SandboxError::Validation(format!(
                        "Path parameter '{}' for tool '{}' must be a string, got {}",
                        parameter.name,
                        definition.id,
                        other.param_type()
                    )));
                }
                None => {
                    return Err(SandboxError::Validation(format!(
                        "Missing path parameter '{}' for tool '{}'",
                        parameter.name, definition.id
                    )));
                }
            };

            let confined = self.validator.check(raw)?;
            self.validator.check_real_path(&confined)?;

            debug!(tool_id = %definition.id, parameter = %parameter.name, path = %confined.display(), "Path authorized");
            params.insert(
                parameter.name.clone(),
                ParamValue::String(confined.to_string_lossy().into_owned()),
            );
            confined_any = true;
        }

        if !confined_any {
            return Err(SandboxError::Validation(format!(
                "Filesystem tool '{}' declares no path parameter",
                definition.id
            )));
        }

        Ok(())
    }

    /// Registry-bound behavior first; built-in filesystem behavior only for
    /// filesystem tools, whose paths have been confined.
    fn handler_for(&self, definition: &ToolDefinition) -> Option<ToolHandlerRef> {
        self.registry.handler(&definition.id).or_else(|| {
            if definition.is_filesystem_affecting() {
                self.filesystem.get(&definition.id).cloned()
            } else {
                None
            }
        })
    }

    /// Audit history of a tool, oldest first; empty if never called
    pub fn get_execution_history(&self, tool_id: &str) -> Vec<ExecutionRecord> {
        self.audit.history(tool_id)
    }

    /// Statistics over the retained history of a tool
    pub fn execution_stats(&self, tool_id: &str) -> ToolStats {
        self.audit.stats(tool_id)
    }

    pub fn audit_log(&self) -> &AuditLog {
        &self.audit
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    pub fn validator(&self) -> &PathValidator {
        &self.validator
    }

    pub fn config(&self) -> &SandboxConfig {
        &self.config
    }
}

fn advance(phase: &mut ExecutionPhase, event: PhaseEvent, tool_id: &str) {
    match phase.transition(event) {
        Ok(next) => {
            debug!(tool_id = %tool_id, from = ?phase, to = ?next, "Execution phase");
            *phase = next;
        }
        Err(e) => warn!(tool_id = %tool_id, error = %e, "Ignoring invalid phase transition"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::registry::{handler_fn, FILE_READ, FILE_WRITE, LIST_DIR};
    use crate::tools::types::{ParameterType, ToolParameter, FILESYSTEM_CATEGORY};
    use crate::types::ExecutionStatus;
    use serde_json::json;
    use tempfile::TempDir;

    fn ctx() -> ExecutionContext {
        ExecutionContext::new("s1")
    }

    fn fixed_roots_executor() -> SafeExecutor {
        SafeExecutor::with_allowed_roots(["/tmp", "/home/user"]).unwrap()
    }

    fn setup_executor() -> (SafeExecutor, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let executor = SafeExecutor::with_allowed_roots([temp_dir.path()]).unwrap();
        (executor, temp_dir)
    }

    fn slow_registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        let definition = ToolDefinition::new("slow", "Slow", "Sleeps").with_parameter(
            ToolParameter::optional("ms", ParameterType::Number, "Sleep duration").with_default(500.0),
        );
        let handler = handler_fn(|_ctx, params: ToolParams| async move {
            let ms = params.get("ms").and_then(|v| v.as_f64()).unwrap_or(500.0) as u64;
            tokio::time::sleep(Duration::from_millis(ms)).await;
            Ok(json!({ "slept_ms": ms }))
        });
        registry.register_tool(definition, Some(handler)).unwrap();
        Arc::new(registry)
    }

    #[test]
    fn test_executor_requires_roots() {
        assert!(SafeExecutor::new(SandboxConfig::default(), Arc::new(ToolRegistry::new())).is_err());
        assert!(SafeExecutor::with_allowed_roots(["relative"]).is_err());
    }

    #[tokio::test]
    async fn test_read_outside_roots_not_allowed() {
        let executor = fixed_roots_executor();
        let result = executor.execute(FILE_READ, "/etc/passwd", &ctx()).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("not allowed"));

        let history = executor.get_execution_history(FILE_READ);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].status, ExecutionStatus::Failure);
        assert_eq!(history[0].outcome, ExecutionPhase::Rejected);
        assert_eq!(history[0].input, "/etc/passwd");
    }

    #[tokio::test]
    async fn test_list_dir_traversal_rejected() {
        let executor = fixed_roots_executor();
        let result = executor.execute(LIST_DIR, "/tmp/../../etc", &ctx()).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("traversal"));
    }

    #[tokio::test]
    async fn test_unknown_tool_not_found() {
        let executor = fixed_roots_executor();
        let result = executor.execute("nonexistent", "anything", &ctx()).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("not found"));

        let history = executor.get_execution_history("nonexistent");
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, ExecutionPhase::Rejected);
    }

    #[tokio::test]
    async fn test_history_empty_for_uncalled_tool() {
        let executor = fixed_roots_executor();
        assert!(executor.get_execution_history(FILE_WRITE).is_empty());
    }

    #[tokio::test]
    async fn test_read_file_inside_root() {
        let (executor, temp) = setup_executor();
        std::fs::write(temp.path().join("test.txt"), "test content").unwrap();

        let result = executor.execute(FILE_READ, "test.txt", &ctx()).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(result.data.unwrap()["content"], "test content");

        let history = executor.get_execution_history(FILE_READ);
        assert_eq!(history[0].status, ExecutionStatus::Success);
        assert_eq!(history[0].outcome, ExecutionPhase::Succeeded);
    }

    #[tokio::test]
    async fn test_write_then_list() {
        let (executor, temp) = setup_executor();

        let mut params = ToolParams::new();
        params.insert("path".into(), ParamValue::from("notes/todo.md"));
        params.insert("content".into(), ParamValue::from("- ship it"));
        params.insert("create_dirs".into(), ParamValue::from(true));

        let result = executor.execute(FILE_WRITE, params, &ctx()).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(
            std::fs::read_to_string(temp.path().join("notes/todo.md")).unwrap(),
            "- ship it"
        );

        let listing = executor
            .execute(LIST_DIR, json!({"path": ".", "recursive": true}), &ctx())
            .await;
        assert!(listing.success);
        let entries = listing.data.unwrap()["entries"].clone();
        assert!(entries
            .as_array()
            .unwrap()
            .iter()
            .any(|e| e["name"] == "notes/todo.md"));
    }

    #[tokio::test]
    async fn test_write_requires_content() {
        let (executor, _temp) = setup_executor();
        let result = executor.execute(FILE_WRITE, "out.txt", &ctx()).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("Missing required parameter 'content'"));
    }

    #[tokio::test]
    async fn test_parameter_type_mismatch_rejected() {
        let (executor, _temp) = setup_executor();
        let result = executor
            .execute(LIST_DIR, json!({"path": ".", "recursive": "yes"}), &ctx())
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("expects boolean"));
        assert_eq!(
            executor.get_execution_history(LIST_DIR)[0].outcome,
            ExecutionPhase::Rejected
        );
    }

    #[tokio::test]
    async fn test_missing_file_is_execution_failure() {
        let (executor, _temp) = setup_executor();
        let result = executor.execute(FILE_READ, "absent.txt", &ctx()).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("Execution failed"));
        assert_eq!(
            executor.get_execution_history(FILE_READ)[0].outcome,
            ExecutionPhase::Failed
        );
    }

    #[tokio::test]
    async fn test_timeout_yields_failed_result() {
        let temp = TempDir::new().unwrap();
        let config = SandboxConfig::default().with_allowed_root(temp.path());
        let executor = SafeExecutor::new(config, slow_registry()).unwrap();

        let result = executor
            .execute_with_timeout("slow", ToolParams::new(), &ctx(), Some(Duration::from_millis(20)))
            .await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("timed out"));
        assert_eq!(
            executor.get_execution_history("slow")[0].outcome,
            ExecutionPhase::TimedOut
        );
    }

    #[tokio::test]
    async fn test_per_tool_timeout_from_config() {
        let temp = TempDir::new().unwrap();
        let config = SandboxConfig::default()
            .with_allowed_root(temp.path())
            .with_tool_timeout("slow", Duration::from_millis(20));
        let executor = SafeExecutor::new(config, slow_registry()).unwrap();

        let result = executor.execute("slow", ToolParams::new(), &ctx()).await;
        assert!(!result.success);

        let mut quick = ToolParams::new();
        quick.insert("ms".into(), ParamValue::from(1.0));
        let result = executor.execute("slow", quick, &ctx()).await;
        assert!(result.success, "{:?}", result.error);
    }

    #[tokio::test]
    async fn test_timeout_does_not_affect_other_executions() {
        let temp = TempDir::new().unwrap();
        let config = SandboxConfig::default().with_allowed_root(temp.path());
        let executor = Arc::new(SafeExecutor::new(config, slow_registry()).unwrap());

        let mut short = ToolParams::new();
        short.insert("ms".into(), ParamValue::from(30.0));

        let timed_out = {
            let executor = executor.clone();
            tokio::spawn(async move {
                executor
                    .execute_with_timeout("slow", ToolParams::new(), &ctx(), Some(Duration::from_millis(10)))
                    .await
            })
        };
        let completed = {
            let executor = executor.clone();
            tokio::spawn(async move { executor.execute("slow", short, &ctx()).await })
        };

        assert!(!timed_out.await.unwrap().success);
        assert!(completed.await.unwrap().success);
        assert_eq!(executor.get_execution_history("slow").len(), 2);
    }

    #[tokio::test]
    async fn test_history_capped() {
        let temp = TempDir::new().unwrap();
        let config = SandboxConfig::default()
            .with_allowed_root(temp.path())
            .with_max_history_entries(5);
        let executor = SafeExecutor::new(config, Arc::new(ToolRegistry::new())).unwrap();

        for i in 0..12 {
            executor
                .execute(FILE_READ, format!("missing-{}.txt", i), &ctx())
                .await;
        }

        let history = executor.get_execution_history(FILE_READ);
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].input, "missing-7.txt");
        assert_eq!(history[4].input, "missing-11.txt");
        assert_eq!(executor.execution_stats(FILE_READ).failed_executions, 5);
    }

    #[tokio::test]
    async fn test_custom_filesystem_tool_gets_confined_path() {
        let temp = TempDir::new().unwrap();
        let mut registry = ToolRegistry::new();
        let definition = ToolDefinition::new("stat", "Stat", "Echo the confined path")
            .with_category(FILESYSTEM_CATEGORY)
            .with_parameter(ToolParameter::required("target_path", ParameterType::String, "Target"));
        let handler = handler_fn(|_ctx, params: ToolParams| async move {
            Ok(params["target_path"].to_json())
        });
        registry.register_tool(definition, Some(handler)).unwrap();

        let config = SandboxConfig::default().with_allowed_root(temp.path());
        let executor = SafeExecutor::new(config, Arc::new(registry)).unwrap();

        let result = executor.execute("stat", "a/./b/../c.txt", &ctx()).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(
            result.data.unwrap(),
            json!(temp.path().join("a/c.txt").display().to_string())
        );

        let result = executor.execute("stat", "../../etc/passwd", &ctx()).await;
        assert!(!result.success);
    }

    fn echo_path_handler() -> ToolHandlerRef {
        handler_fn(|_ctx, params: ToolParams| async move {
            Ok(params.get("path").map(|v| v.to_json()).unwrap_or(json!(null)))
        })
    }

    #[tokio::test]
    async fn test_array_path_tool_never_reaches_handler() {
        let temp = TempDir::new().unwrap();
        let mut registry = ToolRegistry::new();
        let bulk = ToolDefinition::new("bulk-read", "Bulk Read", "Read many files")
            .with_category(FILESYSTEM_CATEGORY)
            .with_parameter(ToolParameter::required("path", ParameterType::Array, "Files"));
        assert!(registry.register_tool(bulk, Some(echo_path_handler())).is_err());

        let config = SandboxConfig::default().with_allowed_root(temp.path());
        let executor = SafeExecutor::new(config, Arc::new(registry)).unwrap();

        let result = executor
            .execute(
                "bulk-read",
                json!({"path": ["/etc/passwd", "../../../etc/shadow"]}),
                &ctx(),
            )
            .await;
        assert!(!result.success);
        assert!(result.data.is_none());
        assert!(result.error.unwrap().contains("not found"));
    }

    #[tokio::test]
    async fn test_defaulted_path_is_confined() {
        let temp = TempDir::new().unwrap();
        let mut registry = ToolRegistry::new();
        let here = ToolDefinition::new("here", "Here", "Echo the working path")
            .with_category(FILESYSTEM_CATEGORY)
            .with_parameter(
                ToolParameter::optional("path", ParameterType::String, "Target").with_default("."),
            );
        registry.register_tool(here, Some(echo_path_handler())).unwrap();

        let optional = ToolDefinition::new("opt", "Opt", "Optional path")
            .with_category(FILESYSTEM_CATEGORY)
            .with_parameter(ToolParameter::optional("path", ParameterType::String, "Target"));
        assert!(registry.register_tool(optional, Some(echo_path_handler())).is_err());

        let config = SandboxConfig::default().with_allowed_root(temp.path());
        let executor = SafeExecutor::new(config, Arc::new(registry)).unwrap();

        let result = executor.execute("here", ToolParams::new(), &ctx()).await;
        assert!(result.success, "{:?}", result.error);
        assert_eq!(
            result.data.unwrap(),
            json!(temp.path().display().to_string())
        );

        let result = executor.execute("opt", ToolParams::new(), &ctx()).await;
        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_json_scalar_input_rejected() {
        let (executor, _temp) = setup_executor();
        let result = executor.execute(FILE_READ, json!(42), &ctx()).await;

        assert!(!result.success);
        assert!(result.error.unwrap().contains("must be a JSON object"));
        assert_eq!(
            executor.get_execution_history(FILE_READ)[0].outcome,
            ExecutionPhase::Rejected
        );
    }

    #[tokio::test]
    async fn test_non_filesystem_tool_stub() {
        let temp = TempDir::new().unwrap();
        let mut registry = ToolRegistry::new();
        registry
            .register_tool(
                ToolDefinition::new("summarize", "Summarize", "Not built yet").with_parameter(
                    ToolParameter::required("text", ParameterType::String, "Text"),
                ),
                None,
            )
            .unwrap();

        let config = SandboxConfig::default().with_allowed_root(temp.path());
        let executor = SafeExecutor::new(config, Arc::new(registry)).unwrap();

        let result = executor.execute("summarize", "hello", &ctx()).await;
        assert!(result.success);
        assert_eq!(result.data.unwrap()["stub"], true);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_rejected_before_read() {
        let (executor, temp) = setup_executor();
        let outside = TempDir::new().unwrap();
        std::fs::write(outside.path().join("secret.txt"), "secret").unwrap();
        std::os::unix::fs::symlink(outside.path(), temp.path().join("link")).unwrap();

        let result = executor.execute(FILE_READ, "link/secret.txt", &ctx()).await;
        assert!(!result.success);
        assert!(result.error.unwrap().contains("not allowed"));
    }
}
