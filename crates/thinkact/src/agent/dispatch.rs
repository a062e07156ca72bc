//! Act dispatch: turn a decision into execution tasks and run them.
//!
//! A batch containing any form-input tool runs strictly in order, one task
//! at a time, because the form blocks on a human. Every other batch goes to
//! the parallel executor in one call. Both paths hand their results to the
//! reducer.

use tracing::{error, info, warn};

use super::engine::{Decision, ThinkActAgent};
use super::events::{AgentExecResult, EngineEvent};
use super::task::{ExecutionTask, ToolContext};
use crate::tools::core::InputState;
use crate::tools::parallel::{ExecutionRequest, ExecutionResult};
use crate::Message;

impl ThinkActAgent {
    pub(crate) async fn dispatch(&mut self, decision: Decision) -> AgentExecResult {
        if decision.params.len() != decision.tool_calls.len() {
            let message = format!(
                "Size mismatch: recorded {} tool param(s) but the model returned {} tool call(s). \
                 Tool call tracking is inconsistent.",
                decision.params.len(),
                decision.tool_calls.len()
            );
            error!("{message}");
            return AgentExecResult::in_progress(message);
        }

        let tasks = self.build_tasks(&decision);
        let sequential = tasks.iter().any(|t| t.context.is_form_input);
        info!(
            "Executing {} tool call(s) {}",
            tasks.len(),
            if sequential { "sequentially (form input present)" } else { "in parallel" }
        );
        self.emit(EngineEvent::ExecutionStrategy {
            sequential,
            tasks: tasks.len(),
        });

        let results = if sequential {
            self.execute_sequential(&tasks).await
        } else {
            self.execute_parallel(&tasks).await
        };

        self.reduce(decision, tasks, results).await
    }

    fn build_tasks(&self, decision: &Decision) -> Vec<ExecutionTask> {
        decision
            .tool_calls
            .iter()
            .zip(&decision.params)
            .enumerate()
            .map(|(ordinal, (call, param))| ExecutionTask {
                tool_call: call.clone(),
                param: param.clone(),
                context: ToolContext::resolve(&self.tools, call.name()),
                ordinal,
            })
            .collect()
    }

    async fn execute_parallel(&self, tasks: &[ExecutionTask]) -> Vec<ExecutionResult> {
        let requests = tasks.iter().map(request_for).collect();
        self.collab.executor.execute_many(requests, &self.plan).await
    }

    /// Run tasks one at a time in ordinal order. An interruption marks the
    /// remaining tasks interrupted without stopping the fold.
    async fn execute_sequential(&mut self, tasks: &[ExecutionTask]) -> Vec<ExecutionResult> {
        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            if !self.continue_allowed() {
                info!(
                    "Sequential execution interrupted before task {} ({})",
                    task.ordinal,
                    task.tool_call.name()
                );
                results.push(ExecutionResult::interrupted(task.ordinal));
                continue;
            }

            let result = if task.context.is_form_input {
                self.execute_form_input(task).await
            } else {
                self.collab
                    .executor
                    .execute_one(request_for(task), &self.plan)
                    .await
            };
            results.push(result);
        }
        results
    }

    /// Form handshake: begin, register exclusively for the root plan, then
    /// wait on the dedicated pool for input, timeout, or interruption.
    async fn execute_form_input(&mut self, task: &ExecutionTask) -> ExecutionResult {
        let name = task.tool_call.name();
        let Some(tool) = task.context.tool.clone() else {
            return ExecutionResult::error(task.ordinal, format!("Tool not found: {name}"));
        };
        let Some(form) = tool.as_form_input() else {
            return ExecutionResult::error(task.ordinal, format!("{name} is not a form input tool"));
        };

        let prompt = form.begin(&task.param.arguments);
        if form.input_state() != InputState::AwaitingUserInput {
            warn!("Form {name} did not enter the awaiting state: {prompt}");
            return ExecutionResult::error(task.ordinal, prompt);
        }

        let root_plan_id = self.plan.root_plan_id.clone();
        self.emit(EngineEvent::FormAwaiting {
            tool: name,
            root_plan_id: &root_plan_id,
        });

        let stored = self
            .collab
            .form_registry
            .store_exclusive(&root_plan_id, tool.clone(), &self.plan.current_plan_id)
            .await;
        if !stored {
            error!(
                "Failed to store form for plan {} under root {root_plan_id}",
                self.plan.current_plan_id
            );
            return ExecutionResult::success(
                task.ordinal,
                "Failed to store form due to system timeout",
            );
        }

        let state = self
            .form_pool
            .wait(
                tool.clone(),
                self.form_wait_settings(),
                self.collab.interruption.clone(),
                root_plan_id.clone(),
            )
            .await;
        self.emit(EngineEvent::FormResolved { tool: name, state });

        match state {
            InputState::InputReceived => {
                let form_state = tool
                    .as_form_input()
                    .map(|f| f.form_state())
                    .unwrap_or_default();
                info!(
                    "User input received for root plan {root_plan_id} from plan {}",
                    self.plan.current_plan_id
                );
                self.memory.push(Message::user(format!(
                    "User input received for form: {form_state}"
                )));
                // Answered forms no longer hold the root plan's slot.
                self.collab.form_registry.remove(&root_plan_id);
                ExecutionResult::success(task.ordinal, form_state)
            }
            InputState::InputTimeout => {
                warn!(
                    "Input timeout occurred for {name} (root plan {root_plan_id}, plan {})",
                    self.plan.current_plan_id
                );
                self.memory
                    .push(Message::user("Input timeout occurred for form: "));
                ExecutionResult::success(task.ordinal, "Input timeout occurred")
            }
            other => ExecutionResult::error(
                task.ordinal,
                format!("Form {name} ended in unexpected state {other:?}"),
            ),
        }
    }
}

fn request_for(task: &ExecutionTask) -> ExecutionRequest {
    ExecutionRequest {
        tool_name: task.tool_call.name().to_string(),
        arguments: task.param.arguments.clone(),
        tool_call_id: task.param.tool_call_id.clone(),
        index: task.ordinal,
    }
}
