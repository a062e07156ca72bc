//! Failure escalation after exhausted think retries.
//!
//! The failure is written up as a diagnostic report and run through the
//! system error-report tool, so it is recorded the same way a model-issued
//! error report would be. The step then ends FAILED.

use std::sync::Arc;

use tracing::{error, warn};

use super::engine::ThinkActAgent;
use super::events::{AgentExecResult, AgentState, EngineEvent};
use super::record::ThinkActRecord;
use super::reduce::extract_error_message;
use super::task::ToolParam;
use super::think::ThinkOutcome;
use crate::error::EngineError;
use crate::tools::builtin::{SystemErrorInput, SystemErrorReportTool};
use crate::tools::core::{ErrorReportKind, Tool};
use crate::Message;

const FUNCTION_NAME: &str = "think()";

/// Everything the failure report is built from.
#[derive(Debug)]
pub struct FailureContext<'a> {
    pub function_name: &'a str,
    pub agent_name: &'a str,
    pub step: u32,
    pub model: &'a str,
    pub input_tokens: Option<usize>,
    pub prompt: &'a [Message],
    pub exceptions: &'a [EngineError],
}

/// Render the human-readable failure report.
pub fn failure_message(ctx: &FailureContext<'_>) -> String {
    let Some(latest) = ctx.exceptions.last() else {
        return "Unknown error occurred during LLM call".to_string();
    };
    let model = if ctx.model.is_empty() { "unknown" } else { ctx.model };

    let mut out = String::from("LLM call failed after all retry attempts.\n");
    if !ctx.function_name.is_empty() {
        out.push_str(&format!("Function: {}\n", ctx.function_name));
    }
    if !ctx.agent_name.is_empty() {
        out.push_str(&format!("Agent: {}\n", ctx.agent_name));
    }
    out.push_str(&format!("Step: {}\n", ctx.step));
    out.push_str(&format!("Model: {model}\n"));

    match latest {
        EngineError::TokenLimitExceeded {
            current_tokens,
            limit,
            model_name,
            ..
        } => {
            out.push_str(&format!("Input Tokens: {current_tokens} (Limit: {limit})\n"));
            if model_name != model {
                out.push_str(&format!("Model (from exception): {model_name}\n"));
            }
        }
        _ => {
            if let Some(tokens) = ctx.input_tokens.filter(|t| *t > 0) {
                out.push_str(&format!("Input Tokens: {tokens}\n"));
            }
        }
    }

    let summary = prompt_summary(ctx.prompt);
    if !summary.is_empty() {
        out.push_str(&format!("Prompt Summary: {summary}\n"));
    }

    out.push_str(&format!("Latest error: [{}] {latest}", latest.kind()));
    out.push_str(&format!("\n(Total attempts: {})", ctx.exceptions.len()));
    if let Some(body) = latest.response_body().filter(|b| !b.is_empty()) {
        out.push_str(&format!("\nAPI Response: {body}"));
    }
    out
}

/// Every prompt message as pretty-printed JSON, numbered from 1.
fn prompt_summary(messages: &[Message]) -> String {
    messages
        .iter()
        .enumerate()
        .map(|(i, msg)| {
            let json = serde_json::to_string_pretty(msg)
                .unwrap_or_else(|e| format!("{}: {} (failed to serialize: {e})", msg.role, msg.text()));
            format!("Message {}:\n{json}", i + 1)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

impl ThinkActAgent {
    pub(crate) async fn escalate(&mut self, outcome: &ThinkOutcome) -> AgentExecResult {
        error!("Handling exhausted think retries with a system error report");

        let message = failure_message(&FailureContext {
            function_name: FUNCTION_NAME,
            agent_name: &self.config.agent_name,
            step: self.current_step,
            model: &self.config.model,
            input_tokens: outcome.input_tokens,
            prompt: &self.last_prompt,
            exceptions: &outcome.exceptions,
        });

        let input = SystemErrorInput {
            error_message: message.clone(),
            function_name: FUNCTION_NAME.into(),
            agent_name: self.config.agent_name.clone(),
            step_number: self.current_step,
            model_name: self.config.model.clone(),
            input_token_count: outcome.input_tokens.filter(|t| *t > 0),
            prompt_summary: prompt_summary(&self.last_prompt),
        };
        let arguments = match serde_json::to_string(&input) {
            Ok(arguments) => arguments,
            Err(e) => {
                warn!("Failed to serialize system error report: {e}");
                let fallback = format!("LLM timeout error: {message}");
                self.step_error = Some(fallback.clone());
                return AgentExecResult::new(fallback, AgentState::Failed);
            }
        };

        let tool = self.system_error_tool();
        let output = tool.execute(&arguments).await;

        let param = ToolParam::new(tool.name(), arguments, self.ids.tool_call_id());
        param.set_result(output.clone());
        self.collab
            .records
            .record_action_result(&self.plan.step_id, std::slice::from_ref(&param));

        let step_error = match extract_error_message(&output) {
            extracted if !extracted.is_empty() && extracted != output => extracted,
            _ => message.clone(),
        };
        self.step_error = Some(step_error.clone());

        let mut record = ThinkActRecord::new(self.ids.think_act_id(), &self.plan.step_id);
        record.think_input = format!("LLM timeout after {} retries", self.config.retry.max_attempts);
        record.think_output = "SystemErrorReportTool called to report LLM timeout error".into();
        record.error_message = Some(step_error);
        record.input_tokens = outcome.input_tokens.unwrap_or(0);
        record.context_limit = self.collab.context_limits.context_limit(&self.config.model);
        record.tool_params = vec![param];
        self.collab.records.record_think_act(record);

        self.emit(EngineEvent::Escalated { message: &message });
        AgentExecResult::new(output, AgentState::Failed)
    }

    fn system_error_tool(&self) -> Arc<dyn Tool> {
        match self
            .tools
            .iter()
            .find(|t| t.error_report() == Some(ErrorReportKind::System))
        {
            Some(tool) => tool.clone(),
            None => Arc::new(SystemErrorReportTool::new("default")),
        }
    }
}
