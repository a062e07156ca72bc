//! Tool abstraction and registry.
//!
//! The [`Tool`] trait defines what every tool provides: a definition for the
//! model (name, description, JSON schema) and an async `execute` method.
//! Capability probes tell the act dispatcher how to treat a tool:
//!
//! | Probe | Meaning |
//! |-------|---------|
//! | [`Tool::as_form_input`] | Blocks on human input; forces sequential execution |
//! | [`Tool::as_terminable`] | May signal that the whole task is complete |
//! | [`Tool::error_report`] | Reports an error; gets a distinct think/act record |
//!
//! Tools are collected into a [`ToolRegistry`] which handles lookup,
//! definition export, validation, timeouts, and result truncation.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace};

use crate::ToolDef;

/// Maximum size (in bytes) for tool output before truncation.
pub const DEFAULT_MAX_RESULT_BYTES: usize = 30_000;

/// Boxed future returned by [`Tool::execute`].
pub type ToolFuture<'a> = Pin<Box<dyn Future<Output = String> + Send + 'a>>;

// ── Capabilities ───────────────────────────────────────────────────

/// Lifecycle of a form-input tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputState {
    /// No form has been presented yet.
    Idle,
    /// A form is waiting for a human to fill it in.
    AwaitingUserInput,
    InputReceived,
    InputTimeout,
}

/// A stateful tool that blocks on external (human) input.
pub trait FormInput: Send + Sync {
    /// Present the form described by `arguments`, moving the tool to
    /// [`InputState::AwaitingUserInput`]. Returns a short description.
    fn begin(&self, arguments: &str) -> String;

    fn input_state(&self) -> InputState;

    /// Move the tool to [`InputState::InputTimeout`]. Called when the wait
    /// times out or the plan is interrupted.
    fn handle_input_timeout(&self);

    /// Current form contents (and submitted values, if any) as text.
    fn form_state(&self) -> String;
}

/// A tool that can end the task.
pub trait Terminable: Send + Sync {
    /// Whether the last execution asked for the task to end.
    fn can_terminate(&self) -> bool;
}

/// Which error-report flavour a tool implements.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorReportKind {
    /// Reported by the model through an ordinary tool call.
    Tool,
    /// Reported by the engine itself (failure escalation).
    System,
}

// ── Tool trait ─────────────────────────────────────────────────────

/// A tool that a model can invoke via function-calling.
///
/// Errors should be returned as `"Error: ..."` strings rather than panicking;
/// the string goes back to the model as the tool result either way.
///
/// # Example
///
/// ```ignore
/// struct Lookup;
///
/// impl Tool for Lookup {
///     fn definition(&self) -> ToolDef { /* ... */ }
///
///     fn execute(&self, arguments: &str) -> ToolFuture<'_> {
///         let arguments = arguments.to_string();
///         Box::pin(async move { format!("looked up {arguments}") })
///     }
/// }
/// ```
pub trait Tool: Send + Sync {
    /// The tool definition sent to the model.
    fn definition(&self) -> ToolDef;

    /// Execute the tool with the given raw JSON arguments string.
    fn execute(&self, arguments: &str) -> ToolFuture<'_>;

    /// The tool's name (delegates to the definition).
    fn name(&self) -> String {
        self.definition().function.name.clone()
    }

    fn as_form_input(&self) -> Option<&dyn FormInput> {
        None
    }

    fn as_terminable(&self) -> Option<&dyn Terminable> {
        None
    }

    fn error_report(&self) -> Option<ErrorReportKind> {
        None
    }

    /// State rendered into the per-step environment message, if any.
    fn state_string(&self) -> Option<String> {
        None
    }

    /// Release any per-plan resources. Called when a plan fails or is
    /// interrupted.
    fn cleanup(&self, _plan_id: &str) {}
}

// ── ToolRegistry ───────────────────────────────────────────────────

/// Default timeout for tool execution (60 seconds).
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Tools the agent may call, keyed by name.
///
/// Registration order is preserved so definitions and environment data come
/// out in a stable order.
///
/// ```ignore
/// let tools = ToolRegistry::new()
///     .with_arg_validation(true)
///     .with_default_timeout(Some(Duration::from_secs(30)))
///     .with(ThinkTool::new("default"))
///     .with_if(allow_forms, FormInputTool::new("default"));
/// ```
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
    order: Vec<String>,
    max_result_bytes: usize,
    /// Whether to validate tool arguments against JSON Schema before execution.
    validate_args: bool,
    /// `None` disables timeouts.
    default_timeout: Option<Duration>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.order)
            .field("max_result_bytes", &self.max_result_bytes)
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: HashMap::new(),
            order: Vec::new(),
            max_result_bytes: DEFAULT_MAX_RESULT_BYTES,
            validate_args: false,
            default_timeout: None,
        }
    }

    pub fn with_max_result_bytes(mut self, max: usize) -> Self {
        self.max_result_bytes = max;
        self
    }

    pub fn with_arg_validation(mut self, enabled: bool) -> Self {
        self.validate_args = enabled;
        self
    }

    pub fn with_default_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.default_timeout = timeout;
        self
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: impl Tool + 'static) {
        self.register_shared(Arc::new(tool));
    }

    /// Register a tool the caller keeps a handle to.
    pub fn register_shared(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name();
        if self.tools.insert(name.clone(), tool).is_none() {
            self.order.push(name);
        }
    }

    /// Register a tool (builder pattern).
    pub fn with(mut self, tool: impl Tool + 'static) -> Self {
        self.register(tool);
        self
    }

    /// Register a shared tool (builder pattern).
    pub fn with_shared(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register_shared(tool);
        self
    }

    /// Conditionally register a tool (builder pattern).
    pub fn with_if(self, condition: bool, tool: impl Tool + 'static) -> Self {
        if condition { self.with(tool) } else { self }
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Tools in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Tool>> {
        self.order.iter().filter_map(|name| self.tools.get(name))
    }

    /// All tool definitions, in registration order.
    pub fn definitions(&self) -> Vec<ToolDef> {
        self.iter().map(|t| t.definition()).collect()
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Execute a tool call by name, with optional validation, timeout, and
    /// truncation.
    ///
    /// `Err` means the tool could not run: unknown name, invalid arguments,
    /// or timeout. A tool that ran and reported `"Error: ..."` is `Ok`.
    pub async fn execute(&self, name: &str, arguments: &str) -> Result<String, String> {
        let Some(tool) = self.tools.get(name) else {
            return Err(format!("unknown tool '{name}'"));
        };

        if self.validate_args
            && let Some(error) = validate_tool_arguments(tool.as_ref(), arguments)
        {
            return Err(error);
        }

        log_tool_call(name, arguments);
        let start = Instant::now();

        let result = if let Some(limit) = self.default_timeout {
            match tokio::time::timeout(limit, tool.execute(arguments)).await {
                Ok(r) => r,
                Err(_) => {
                    info!(
                        "Tool {name} timed out after {:.1}s (limit: {:.0}s)",
                        start.elapsed().as_secs_f64(),
                        limit.as_secs_f64(),
                    );
                    return Err(format!(
                        "tool '{name}' timed out after {:.0} seconds",
                        limit.as_secs_f64()
                    ));
                }
            }
        } else {
            tool.execute(arguments).await
        };

        debug!(
            "Tool {name} completed in {:.0}ms ({} bytes)",
            start.elapsed().as_secs_f64() * 1000.0,
            result.len()
        );
        trace!(
            "Tool {name} result preview: {}",
            result.chars().take(300).collect::<String>()
        );

        Ok(truncate_result(result, self.max_result_bytes))
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Helpers ────────────────────────────────────────────────────────

/// Validate tool arguments against the tool's declared JSON Schema.
///
/// Returns `None` if valid, or a message listing every violation.
pub fn validate_tool_arguments(tool: &dyn Tool, arguments: &str) -> Option<String> {
    let args_value: serde_json::Value = match serde_json::from_str(arguments) {
        Ok(v) => v,
        Err(e) => {
            return Some(format!(
                "invalid JSON arguments for tool '{}': {e}",
                tool.name()
            ));
        }
    };

    let schema = tool.definition().function.parameters;
    let Ok(validator) = jsonschema::validator_for(&schema) else {
        return None;
    };

    let errors: Vec<String> = validator
        .iter_errors(&args_value)
        .map(|e| format!("  - {}: {e}", e.instance_path()))
        .collect();

    if errors.is_empty() {
        None
    } else {
        Some(format!(
            "argument validation failed for tool '{}':\n{}",
            tool.name(),
            errors.join("\n")
        ))
    }
}

/// Log a tool call at INFO level with a truncated preview of arguments.
pub fn log_tool_call(name: &str, arguments: &str) {
    let args_preview: String = arguments.chars().take(120).collect();
    info!(
        "[tool] {}({args_preview}{})",
        name,
        if arguments.chars().count() > 120 { "..." } else { "" }
    );
    trace!("[tool] {name} arguments: {arguments}");
}

/// Truncate a string to at most `max` bytes (on a char boundary), appending
/// a notice if trimmed.
pub fn truncate_result(s: String, max: usize) -> String {
    if s.len() <= max {
        return s;
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    let total = s.len();
    let mut out = s;
    out.truncate(cut);
    out.push_str(&format!("...\n[truncated: {total} bytes total]"));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    impl Tool for EchoTool {
        fn definition(&self) -> ToolDef {
            ToolDef::new(
                "echo",
                "Echo the input",
                serde_json::json!({
                    "type": "object",
                    "properties": { "text": { "type": "string" } },
                    "required": ["text"]
                }),
            )
        }

        fn execute(&self, arguments: &str) -> ToolFuture<'_> {
            let args: serde_json::Value = serde_json::from_str(arguments).unwrap_or_default();
            let result = args
                .get("text")
                .and_then(|v| v.as_str())
                .map(str::to_string)
                .unwrap_or_else(|| "Error: no text".into());
            Box::pin(async move { result })
        }
    }

    struct SlowTool;

    impl Tool for SlowTool {
        fn definition(&self) -> ToolDef {
            ToolDef::new(
                "slow",
                "Sleeps",
                serde_json::json!({"type": "object", "properties": {}}),
            )
        }

        fn execute(&self, _arguments: &str) -> ToolFuture<'_> {
            Box::pin(async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                "done".into()
            })
        }
    }

    #[test]
    fn default_probes_are_empty() {
        let tool = EchoTool;
        assert_eq!(tool.name(), "echo");
        assert!(tool.as_form_input().is_none());
        assert!(tool.as_terminable().is_none());
        assert!(tool.error_report().is_none());
        assert!(tool.state_string().is_none());
    }

    #[test]
    fn registry_preserves_registration_order() {
        let registry = ToolRegistry::new().with(SlowTool).with(EchoTool);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.names(), &["slow".to_string(), "echo".to_string()]);

        let defs = registry.definitions();
        assert_eq!(defs[0].function.name, "slow");
        assert_eq!(defs[1].function.name, "echo");
    }

    #[test]
    fn re_registering_replaces_without_duplicating() {
        let registry = ToolRegistry::new().with(EchoTool).with(EchoTool);
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.names().len(), 1);
    }

    #[tokio::test]
    async fn execute_known_tool() {
        let registry = ToolRegistry::new().with(EchoTool);
        let result = registry.execute("echo", r#"{"text": "hello"}"#).await;
        assert_eq!(result.unwrap(), "hello");
    }

    #[tokio::test]
    async fn execute_unknown_tool_is_err() {
        let registry = ToolRegistry::new().with(EchoTool);
        let err = registry.execute("nonexistent", "{}").await.unwrap_err();
        assert!(err.contains("unknown tool"));
    }

    #[tokio::test]
    async fn validation_rejects_missing_required_field() {
        let registry = ToolRegistry::new().with_arg_validation(true).with(EchoTool);
        let err = registry.execute("echo", "{}").await.unwrap_err();
        assert!(err.contains("argument validation failed"));

        let err = registry.execute("echo", "not json").await.unwrap_err();
        assert!(err.contains("invalid JSON arguments"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_err() {
        let registry = ToolRegistry::new()
            .with_default_timeout(Some(Duration::from_secs(1)))
            .with(SlowTool);
        let err = registry.execute("slow", "{}").await.unwrap_err();
        assert!(err.contains("timed out"));
    }

    #[tokio::test]
    async fn long_results_are_truncated() {
        let registry = ToolRegistry::new().with_max_result_bytes(10).with(EchoTool);
        let result = registry
            .execute("echo", r#"{"text": "abcdefghijklmnopqrstuvwxyz"}"#)
            .await
            .unwrap();
        assert!(result.starts_with("abcdefghij..."));
        assert!(result.contains("[truncated: 26 bytes total]"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let s = "héllo".to_string();
        let out = truncate_result(s, 2);
        assert!(out.starts_with("h..."));
    }
}
