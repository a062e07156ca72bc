//! Per-cycle execution units.
//!
//! Every act phase turns the model's tool calls into [`ExecutionTask`]s:
//! the call itself, a [`ToolParam`] that records arguments and (once) the
//! result, the [`ToolContext`] capability flags of the resolved tool, and the
//! call's ordinal within the batch. Tasks live for one cycle only.

use std::fmt;
use std::sync::{Arc, OnceLock};

use crate::ToolCall;
use crate::tools::core::{ErrorReportKind, Tool, ToolRegistry};

/// Recorded parameters of one tool call. The result may be set once; clones
/// share the same result cell.
#[derive(Debug, Clone)]
pub struct ToolParam {
    pub tool_name: String,
    /// Normalized JSON arguments.
    pub arguments: String,
    pub tool_call_id: String,
    result: Arc<OnceLock<String>>,
}

impl ToolParam {
    pub fn new(
        tool_name: impl Into<String>,
        arguments: impl Into<String>,
        tool_call_id: impl Into<String>,
    ) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments: arguments.into(),
            tool_call_id: tool_call_id.into(),
            result: Arc::new(OnceLock::new()),
        }
    }

    /// Set the result. Returns `false` (and keeps the first value) if a
    /// result was already recorded.
    pub fn set_result(&self, result: impl Into<String>) -> bool {
        self.result.set(result.into()).is_ok()
    }

    pub fn result(&self) -> Option<&str> {
        self.result.get().map(String::as_str)
    }
}

/// Capability flags of the tool a call resolved to.
///
/// `tool` is `None` when the model named a tool the registry does not know;
/// such calls carry no capabilities and fail in the executor.
#[derive(Clone, Default)]
pub struct ToolContext {
    pub tool: Option<Arc<dyn Tool>>,
    pub is_form_input: bool,
    pub is_terminable: bool,
    pub error_report: Option<ErrorReportKind>,
}

impl ToolContext {
    /// Probe `tool`'s capabilities.
    pub fn for_tool(tool: Arc<dyn Tool>) -> Self {
        Self {
            is_form_input: tool.as_form_input().is_some(),
            is_terminable: tool.as_terminable().is_some(),
            error_report: tool.error_report(),
            tool: Some(tool),
        }
    }

    pub fn resolve(registry: &ToolRegistry, name: &str) -> Self {
        registry.lookup(name).map(Self::for_tool).unwrap_or_default()
    }

    /// Whether the resolved tool reports that the task may end.
    pub fn can_terminate(&self) -> bool {
        self.is_terminable
            && self
                .tool
                .as_ref()
                .and_then(|t| t.as_terminable())
                .is_some_and(|t| t.can_terminate())
    }
}

impl fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolContext")
            .field("tool", &self.tool.as_ref().map(|t| t.name()))
            .field("is_form_input", &self.is_form_input)
            .field("is_terminable", &self.is_terminable)
            .field("error_report", &self.error_report)
            .finish()
    }
}

/// One tool call ready to dispatch.
#[derive(Debug, Clone)]
pub struct ExecutionTask {
    pub tool_call: ToolCall,
    pub param: ToolParam,
    pub context: ToolContext,
    /// Position of the call in the model's response.
    pub ordinal: usize,
}
