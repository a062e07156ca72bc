//! Built-in tools every agent is expected to carry.
//!
//! Names are prefixed with a service group (`"<group>-<tool>"`) so several
//! tool families can coexist in one registry.

use std::sync::atomic::{AtomicBool, Ordering};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::args::parse_tool_args;
use super::core::{ErrorReportKind, Terminable, Tool, ToolFuture};
use crate::ToolDef;

/// A no-op scratchpad tool. The engine also synthesizes calls to it when the
/// model answers with text only, so the act phase always sees a tool call.
pub struct ThinkTool {
    name: String,
}

/// Typed arguments for the think tool.
#[derive(Deserialize, Serialize, JsonSchema)]
pub struct ThinkArgs {
    /// Your reasoning, observations, or plan.
    pub message: String,
}

impl ThinkTool {
    pub fn new(group: &str) -> Self {
        Self {
            name: format!("{group}-think"),
        }
    }
}

impl Tool for ThinkTool {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            &self.name,
            "Record your reasoning before acting. This is a scratchpad: it \
             performs no action and returns your message unchanged.",
            crate::json_schema_for::<ThinkArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let result = match parse_tool_args::<ThinkArgs>(arguments) {
            Ok(args) => args.message,
            Err(_) => "[no reasoning provided]".to_string(),
        };
        Box::pin(async move { result })
    }
}

/// Ends the task. After it runs, [`Terminable::can_terminate`] reports `true`
/// until [`Tool::cleanup`] resets it.
pub struct TerminateTool {
    name: String,
    terminated: AtomicBool,
}

#[derive(Deserialize, JsonSchema)]
pub struct TerminateArgs {
    /// Final answer or summary of the completed work.
    #[serde(default)]
    pub message: String,
}

impl TerminateTool {
    pub fn new(group: &str) -> Self {
        Self {
            name: format!("{group}-terminate"),
            terminated: AtomicBool::new(false),
        }
    }
}

impl Tool for TerminateTool {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            &self.name,
            "Finish the task. Call this once the goal is met, with the final \
             answer as 'message'.",
            crate::json_schema_for::<TerminateArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        // Only a call that parses may end the task.
        self.terminated.store(false, Ordering::SeqCst);
        let parsed = parse_tool_args::<TerminateArgs>(arguments);
        Box::pin(async move {
            match parsed {
                Ok(args) => {
                    self.terminated.store(true, Ordering::SeqCst);
                    if args.message.is_empty() {
                        "Task terminated".to_string()
                    } else {
                        args.message
                    }
                }
                Err(e) => e,
            }
        })
    }

    fn as_terminable(&self) -> Option<&dyn Terminable> {
        Some(self)
    }

    fn cleanup(&self, _plan_id: &str) {
        self.terminated.store(false, Ordering::SeqCst);
    }
}

impl Terminable for TerminateTool {
    fn can_terminate(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }
}

/// Lets the model report an error it cannot work around.
pub struct ErrorReportTool {
    name: String,
}

#[derive(Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ErrorReportArgs {
    /// What went wrong, in one or two sentences.
    pub error_message: String,
}

impl ErrorReportTool {
    pub fn new(group: &str) -> Self {
        Self {
            name: format!("{group}-error-report"),
        }
    }
}

impl Tool for ErrorReportTool {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            &self.name,
            "Report an error that prevents further progress. Use 'errorMessage' \
             to describe the problem.",
            crate::json_schema_for::<ErrorReportArgs>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let result = match parse_tool_args::<ErrorReportArgs>(arguments) {
            Ok(args) => serde_json::json!({
                "status": "reported",
                "errorMessage": args.error_message,
            })
            .to_string(),
            Err(e) => e,
        };
        Box::pin(async move { result })
    }

    fn error_report(&self) -> Option<ErrorReportKind> {
        Some(ErrorReportKind::Tool)
    }
}

/// Reports failures detected by the engine itself. Not meant to be offered
/// to the model; failure escalation calls it directly.
pub struct SystemErrorReportTool {
    name: String,
}

/// Structured diagnostic handed over by failure escalation.
#[derive(Deserialize, Serialize, JsonSchema, Debug, Clone, Default)]
#[serde(rename_all = "camelCase")]
pub struct SystemErrorInput {
    pub error_message: String,
    #[serde(default)]
    pub function_name: String,
    #[serde(default)]
    pub agent_name: String,
    #[serde(default)]
    pub step_number: u32,
    #[serde(default)]
    pub model_name: String,
    #[serde(default)]
    pub input_token_count: Option<usize>,
    #[serde(default)]
    pub prompt_summary: String,
}

impl SystemErrorReportTool {
    pub fn new(group: &str) -> Self {
        Self {
            name: format!("{group}-system-error-report"),
        }
    }
}

impl Tool for SystemErrorReportTool {
    fn definition(&self) -> ToolDef {
        ToolDef::new(
            &self.name,
            "Record a system-level failure (model unreachable, retries exhausted).",
            crate::json_schema_for::<SystemErrorInput>(),
        )
    }

    fn execute(&self, arguments: &str) -> ToolFuture<'_> {
        let result = match parse_tool_args::<SystemErrorInput>(arguments) {
            Ok(input) => serde_json::json!({
                "status": "reported",
                "errorMessage": input.error_message,
                "functionName": input.function_name,
                "agentName": input.agent_name,
                "stepNumber": input.step_number,
                "modelName": input.model_name,
            })
            .to_string(),
            Err(e) => e,
        };
        Box::pin(async move { result })
    }

    fn error_report(&self) -> Option<ErrorReportKind> {
        Some(ErrorReportKind::System)
    }
}
