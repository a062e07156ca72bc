//! Folding tool results back into the agent.
//!
//! After a batch runs, every result is written once onto its tool param,
//! terminable and error-report tools get their special handling, and memory
//! is rebuilt as the filtered history plus the assistant tool-call turn and
//! one tool response per call. Single-call batches also feed the repeat
//! window that detects tool-call loops.

use std::collections::VecDeque;

use tracing::{debug, error, info, warn};

use super::engine::{Decision, ThinkActAgent};
use super::events::{AgentExecResult, AgentState, EngineEvent};
use super::record::ThinkActRecord;
use super::task::{ExecutionTask, ToolParam};
use crate::tools::core::ErrorReportKind;
use crate::tools::parallel::{ExecutionResult, ExecutionStatus};
use crate::{Message, MessageRole};

/// The most recent single-tool results. A full window of identical results
/// means the agent is looping.
#[derive(Debug, Clone)]
pub(crate) struct RepeatWindow {
    size: usize,
    recent: VecDeque<String>,
}

impl RepeatWindow {
    /// `size == 0` disables loop detection.
    pub(crate) fn new(size: usize) -> Self {
        Self {
            size,
            recent: VecDeque::with_capacity(size),
        }
    }

    /// Record `result`. Returns `true` (and empties the window) once `size`
    /// identical results arrived in a row. Blank results are ignored.
    pub(crate) fn push(&mut self, result: &str) -> bool {
        if self.size == 0 || result.trim().is_empty() {
            return false;
        }
        if self.recent.back().is_some_and(|last| last != result) {
            self.recent.clear();
        }
        self.recent.push_back(result.to_string());
        if self.recent.len() >= self.size {
            self.recent.clear();
            return true;
        }
        false
    }

    pub(crate) fn clear(&mut self) {
        self.recent.clear();
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.recent.len()
    }
}

/// Drop the per-cycle system and user messages from memory. Compression
/// summaries are the only user messages that survive.
pub fn filter_memory(messages: Vec<Message>) -> Vec<Message> {
    messages
        .into_iter()
        .filter(|m| match m.role {
            MessageRole::System => false,
            MessageRole::User => m.compression_summary,
            MessageRole::Assistant | MessageRole::Tool => true,
        })
        .collect()
}

/// `errorMessage` of a JSON error-report result, or the whole text.
pub(crate) fn extract_error_message(result: &str) -> String {
    serde_json::from_str::<serde_json::Value>(result)
        .ok()
        .and_then(|v| v.get("errorMessage").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| result.to_string())
}

impl ThinkActAgent {
    pub(crate) async fn reduce(
        &mut self,
        decision: Decision,
        tasks: Vec<ExecutionTask>,
        mut results: Vec<ExecutionResult>,
    ) -> AgentExecResult {
        if results.len() != tasks.len() {
            let message = format!(
                "Result count mismatch: expected {}, got {}",
                tasks.len(),
                results.len()
            );
            error!("{message}");
            return AgentExecResult::in_progress(message);
        }

        results.sort_by_key(|r| r.index);
        if let Some((task, result)) = tasks
            .iter()
            .zip(&results)
            .find(|(task, result)| task.ordinal != result.index)
        {
            let message = format!(
                "Error executing tools: no result for task {} ({}), got index {}",
                task.ordinal,
                task.tool_call.name(),
                result.index
            );
            error!("{message}");
            return AgentExecResult::in_progress(message);
        }

        let mut should_terminate = false;
        let mut interrupted = false;
        let mut outputs = Vec::with_capacity(tasks.len());
        let mut responses = Vec::with_capacity(tasks.len());

        for (task, result) in tasks.iter().zip(&results) {
            let text = result.result_text();
            if !task.param.set_result(text.clone()) {
                warn!("Result for {} was already recorded", task.param.tool_call_id);
            }
            interrupted |= result.status == ExecutionStatus::Interrupted;

            if task.context.can_terminate() {
                info!("Tool {} signalled termination", task.tool_call.name());
                should_terminate = true;
                self.collab.form_registry.remove(&self.plan.root_plan_id);
            }
            if let Some(kind) = task.context.error_report {
                self.record_error_report(kind, &task.param, &text);
            }

            self.emit(EngineEvent::ToolResult {
                name: task.tool_call.name(),
                call_id: &task.tool_call.id,
                result: &text,
            });
            responses.push(Message::tool_result(task.tool_call.id.clone(), text.clone()));
            outputs.push(text);
        }

        if let [only] = outputs.as_slice()
            && self.repeats.push(only)
        {
            warn!(
                "Same result returned {} times in a row; forcing memory compaction",
                self.config.repeat_window
            );
            self.emit(EngineEvent::LoopDetected { result: only });
            let (before, after) = self
                .collab
                .compactor(self.config.compression_threshold)
                .force_compact(&mut self.memory)
                .await;
            debug!("Loop compaction: {before} -> {after} tokens");
        }

        let params: Vec<ToolParam> = tasks.iter().map(|t| t.param.clone()).collect();
        self.collab
            .records
            .record_action_result(&self.plan.step_id, &params);

        let mut memory = filter_memory(std::mem::take(&mut self.memory));
        memory.push(Message::assistant_tool_calls(
            Some(decision.text),
            decision.tool_calls,
        ));
        memory.extend(responses);
        self.memory = memory;

        let text = match outputs.as_slice() {
            [only] => only.clone(),
            many => format!("[{}]", many.join(", ")),
        };
        let state = if should_terminate {
            AgentState::Completed
        } else if interrupted {
            AgentState::Interrupted
        } else {
            AgentState::InProgress
        };
        AgentExecResult::new(text, state)
    }

    /// File a distinct record for an error-report call and keep its message
    /// as the step's error.
    fn record_error_report(&mut self, kind: ErrorReportKind, param: &ToolParam, result: &str) {
        let message = extract_error_message(result);
        let (think_input, think_output) = match kind {
            ErrorReportKind::Tool => (
                "Error occurred during execution",
                "ErrorReportTool called to report error",
            ),
            ErrorReportKind::System => (
                "System error occurred during execution",
                "SystemErrorReportTool called to report system error",
            ),
        };

        let mut record = ThinkActRecord::new(self.ids.think_act_id(), &self.plan.step_id);
        record.think_input = think_input.into();
        record.think_output = think_output.into();
        record.error_message = Some(message.clone());
        record.context_limit = self.collab.context_limits.context_limit(&self.config.model);
        record.tool_params = vec![param.clone()];
        self.collab.records.record_think_act(record);

        info!("Recorded {kind:?} error report: {message}");
        self.step_error = Some(message);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    use futures::FutureExt;
    use futures::future::BoxFuture;

    use super::*;
    use crate::agent::config::{EngineConfig, PlanContext};
    use crate::agent::engine::Collaborators;
    use crate::agent::record::MemoryRecordSink;
    use crate::agent::task::ToolContext;
    use crate::api::scripted::ScriptedModelClient;
    use crate::context::compactor::MemoryCompressor;
    use crate::form::registry::{FormRegistry, InMemoryFormRegistry};
    use crate::tools::{
        ErrorReportTool, FormInputTool, SystemErrorReportTool, TerminateTool, ThinkTool, Tool,
        ToolRegistry,
    };
    use crate::ToolCall;

    #[derive(Default)]
    struct CountingCompressor {
        calls: AtomicU32,
    }

    impl MemoryCompressor for CountingCompressor {
        fn compress<'a>(
            &'a self,
            messages: Vec<Message>,
            _aggressive: bool,
        ) -> BoxFuture<'a, Vec<Message>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            async move { messages }.boxed()
        }
    }

    struct Fixture {
        agent: ThinkActAgent,
        tools: Arc<ToolRegistry>,
        compressor: Arc<CountingCompressor>,
        records: Arc<MemoryRecordSink>,
        registry: Arc<InMemoryFormRegistry>,
    }

    fn fixture() -> Fixture {
        let tools = Arc::new(
            ToolRegistry::new()
                .with(ThinkTool::new("default"))
                .with(TerminateTool::new("default"))
                .with(ErrorReportTool::new("default")),
        );
        let compressor = Arc::new(CountingCompressor::default());
        let records = Arc::new(MemoryRecordSink::new());
        let registry = Arc::new(InMemoryFormRegistry::default());
        let config = EngineConfig::new("m", "a");
        let collaborators =
            Collaborators::with_defaults(Arc::new(ScriptedModelClient::new()), tools.clone(), &config)
                .with_compressor(compressor.clone())
                .with_records(records.clone())
                .with_form_registry(registry.clone());
        let agent =
            ThinkActAgent::new(config, PlanContext::root("root"), tools.clone(), collaborators)
                .unwrap();
        Fixture {
            agent,
            tools,
            compressor,
            records,
            registry,
        }
    }

    fn batch(tools: &ToolRegistry, names: &[&str]) -> (Decision, Vec<ExecutionTask>) {
        let tool_calls: Vec<ToolCall> = names
            .iter()
            .enumerate()
            .map(|(i, name)| ToolCall::function(format!("c{i}"), *name, "{}"))
            .collect();
        let params: Vec<ToolParam> = tool_calls
            .iter()
            .map(|c| ToolParam::new(c.name(), "{}", c.id.clone()))
            .collect();
        let tasks = tool_calls
            .iter()
            .zip(&params)
            .enumerate()
            .map(|(ordinal, (call, param))| ExecutionTask {
                tool_call: call.clone(),
                param: param.clone(),
                context: ToolContext::resolve(tools, call.name()),
                ordinal,
            })
            .collect();
        let decision = Decision {
            text: "working".into(),
            tool_calls,
            params,
        };
        (decision, tasks)
    }

    #[test]
    fn window_detects_three_identical_results() {
        let mut window = RepeatWindow::new(3);
        assert!(!window.push("same"));
        assert!(!window.push("same"));
        assert!(window.push("same"));
        assert_eq!(window.len(), 0);
    }

    #[test]
    fn window_resets_on_different_result() {
        let mut window = RepeatWindow::new(3);
        window.push("a");
        window.push("a");
        assert!(!window.push("b"));
        assert_eq!(window.len(), 1);
        assert!(!window.push("   "));
        assert_eq!(window.len(), 1);
    }

    #[test]
    fn filter_keeps_only_durable_messages() {
        let kept = filter_memory(vec![
            Message::system("sys"),
            Message::user("env"),
            Message::compression_summary("summary"),
            Message::assistant_text("thinking"),
            Message::tool_result("c1", "out"),
        ]);
        let roles: Vec<_> = kept.iter().map(|m| m.role.clone()).collect();
        assert_eq!(
            roles,
            vec![MessageRole::User, MessageRole::Assistant, MessageRole::Tool]
        );
        assert!(kept[0].compression_summary);
    }

    #[test]
    fn error_message_extraction() {
        assert_eq!(extract_error_message(r#"{"errorMessage": "disk full"}"#), "disk full");
        assert_eq!(extract_error_message("plain failure"), "plain failure");
    }

    #[tokio::test]
    async fn memory_is_rebuilt_with_tool_turn() {
        let mut f = fixture();
        f.agent.memory = vec![
            Message::compression_summary("earlier"),
            Message::user("User input received for form: {}"),
        ];
        let (decision, tasks) = batch(&f.tools, &["default-think", "default-think"]);
        let results = vec![
            ExecutionResult::success(1, "second"),
            ExecutionResult::success(0, ""),
        ];

        let result = f.agent.reduce(decision, tasks, results).await;
        assert_eq!(result.state, AgentState::InProgress);
        assert_eq!(result.text, "[No output, second]");

        let memory = f.agent.memory();
        assert_eq!(memory.len(), 4);
        assert!(memory[0].compression_summary);
        assert_eq!(memory[1].tool_calls.as_ref().unwrap().len(), 2);
        assert_eq!(memory[1].text(), "working");
        assert_eq!(memory[2].tool_call_id.as_deref(), Some("c0"));
        assert_eq!(memory[3].text(), "second");

        let actions = f.records.action_results();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].1[0].result(), Some("No output"));
        assert_eq!(actions[0].1[1].result(), Some("second"));
    }

    #[tokio::test]
    async fn third_identical_result_forces_one_compaction() {
        let mut f = fixture();
        for round in 1..=4 {
            let (decision, tasks) = batch(&f.tools, &["default-think"]);
            f.agent
                .reduce(decision, tasks, vec![ExecutionResult::success(0, "same")])
                .await;
            let expected = if round >= 3 { 1 } else { 0 };
            assert_eq!(f.compressor.calls.load(Ordering::SeqCst), expected, "round {round}");
        }
        assert_eq!(f.agent.repeats.len(), 1);
    }

    #[tokio::test]
    async fn multi_task_batches_skip_loop_detection() {
        let mut f = fixture();
        for _ in 0..3 {
            let (decision, tasks) = batch(&f.tools, &["default-think", "default-think"]);
            let results = vec![
                ExecutionResult::success(0, "same"),
                ExecutionResult::success(1, "same"),
            ];
            f.agent.reduce(decision, tasks, results).await;
        }
        assert_eq!(f.compressor.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn terminate_completes_and_releases_form() {
        let mut f = fixture();
        let form: Arc<dyn Tool> = Arc::new(FormInputTool::new("default"));
        assert!(f.registry.store_exclusive("root", form, "root").await);

        f.tools
            .execute("default-terminate", r#"{"message": "all done"}"#)
            .await
            .unwrap();
        let (decision, tasks) = batch(&f.tools, &["default-terminate"]);
        let result = f
            .agent
            .reduce(decision, tasks, vec![ExecutionResult::success(0, "all done")])
            .await;

        assert_eq!(result.state, AgentState::Completed);
        assert_eq!(result.text, "all done");
        assert!(f.registry.pending("root").is_none());
    }

    #[tokio::test]
    async fn error_report_is_recorded_separately() {
        let mut f = fixture();
        let (decision, tasks) = batch(&f.tools, &["default-error-report"]);
        f.agent
            .reduce(
                decision,
                tasks,
                vec![ExecutionResult::success(0, r#"{"errorMessage": "page missing"}"#)],
            )
            .await;

        assert_eq!(f.agent.step_error_message(), Some("page missing"));
        let records = f.records.think_acts();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].think_input, "Error occurred during execution");
        assert_eq!(records[0].error_message.as_deref(), Some("page missing"));
        assert_eq!(records[0].context_limit, 128_000);
    }

    #[tokio::test]
    async fn system_error_report_has_its_own_record_texts() {
        let mut f = fixture();
        let tools = ToolRegistry::new().with(SystemErrorReportTool::new("default"));
        let (decision, tasks) = batch(&tools, &["default-system-error-report"]);
        f.agent
            .reduce(
                decision,
                tasks,
                vec![ExecutionResult::success(0, r#"{"errorMessage": "disk full"}"#)],
            )
            .await;

        let records = f.records.think_acts();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].think_input, "System error occurred during execution");
        assert_eq!(
            records[0].think_output,
            "SystemErrorReportTool called to report system error"
        );
        assert_eq!(f.agent.step_error_message(), Some("disk full"));
    }

    #[tokio::test]
    async fn results_reach_every_copy_of_the_params() {
        let mut f = fixture();
        let (decision, tasks) = batch(&f.tools, &["default-think"]);
        let recorded = decision.params.clone();
        f.agent
            .reduce(decision, tasks, vec![ExecutionResult::success(0, "noted")])
            .await;

        assert_eq!(recorded[0].result(), Some("noted"));
        let actions = f.records.action_results();
        assert_eq!(actions[0].1[0].result(), Some("noted"));
    }

    #[tokio::test]
    async fn interrupted_task_interrupts_batch() {
        let mut f = fixture();
        let (decision, tasks) = batch(&f.tools, &["default-think", "default-think"]);
        let results = vec![ExecutionResult::success(0, "ok"), ExecutionResult::interrupted(1)];
        let result = f.agent.reduce(decision, tasks, results).await;
        assert_eq!(result.state, AgentState::Interrupted);
        assert_eq!(result.text, "[ok, Error: Execution interrupted]");
    }

    #[tokio::test]
    async fn result_count_mismatch() {
        let mut f = fixture();
        let (decision, tasks) = batch(&f.tools, &["default-think", "default-think"]);
        let result = f
            .agent
            .reduce(decision, tasks, vec![ExecutionResult::success(0, "ok")])
            .await;
        assert_eq!(result.text, "Result count mismatch: expected 2, got 1");
    }

    #[tokio::test]
    async fn duplicate_indices_are_rejected() {
        let mut f = fixture();
        let (decision, tasks) = batch(&f.tools, &["default-think", "default-think"]);
        let results = vec![ExecutionResult::success(0, "a"), ExecutionResult::success(0, "b")];
        let result = f.agent.reduce(decision, tasks, results).await;
        assert!(result.text.starts_with("Error executing tools:"));
    }
}
