//! The think-act agent: one `step()` is a think (retrying model call) followed
//! by an act (tool dispatch and result reduction).
//!
//! `ThinkActAgent` owns the conversation memory and everything scoped to one
//! plan execution. Every external service is reached through the
//! [`Collaborators`] bundle, so each can be swapped for a fake in tests.

use std::sync::Arc;

use tracing::{info, warn};

use super::config::{EngineConfig, PlanContext};
use super::events::{AgentExecResult, AgentState, EngineEvent, EventHandler, NoopHandler};
use super::ids::IdGenerator;
use super::interrupt::{InterruptionChecker, StopFlag};
use super::record::{MemoryRecordSink, RecordSink};
use super::reduce::RepeatWindow;
use super::task::ToolParam;
use crate::api::model::{ModelClient, ModelRequest};
use crate::context::budget::{EstimatingTokenCounter, StaticContextLimits};
use crate::context::compactor::{Compactor, ContextLimits, MemoryCompressor, TokenCounter};
use crate::context::summarizer::SummarizingCompressor;
use crate::error::EngineError;
use crate::form::pool::{FormWaitPool, FormWaitSettings};
use crate::form::registry::{FormRegistry, InMemoryFormRegistry};
use crate::tools::core::ToolRegistry;
use crate::tools::parallel::{LocalParallelExecutor, ParallelExecutor};
use crate::{Message, ToolCall};

const FINAL_SUMMARY_PROMPT: &str = "\
Based on the completed steps, try to answer the user's original request.
If the current steps are insufficient to support answering the original request,
simply describe that the step limit has been reached and please try again.
";

/// External services the engine talks to.
///
/// ```ignore
/// let collaborators = Collaborators::with_defaults(model, tools.clone(), &config)
///     .with_interruption(stop_flag.clone())
///     .with_events(Arc::new(LoggingHandler));
/// ```
#[derive(Clone)]
pub struct Collaborators {
    pub model: Arc<dyn ModelClient>,
    pub executor: Arc<dyn ParallelExecutor>,
    pub token_counter: Arc<dyn TokenCounter>,
    pub context_limits: Arc<dyn ContextLimits>,
    pub compressor: Arc<dyn MemoryCompressor>,
    pub form_registry: Arc<dyn FormRegistry>,
    pub interruption: Arc<dyn InterruptionChecker>,
    pub records: Arc<dyn RecordSink>,
    pub events: Arc<dyn EventHandler>,
}

impl Collaborators {
    /// In-process defaults: tools run through a [`LocalParallelExecutor`],
    /// tokens are estimated, memory is summarized by the same model, forms
    /// are registered in memory, nothing interrupts, records stay in memory.
    pub fn with_defaults(
        model: Arc<dyn ModelClient>,
        tools: Arc<ToolRegistry>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            compressor: Arc::new(SummarizingCompressor::new(model.clone(), config.model.clone())),
            model,
            executor: Arc::new(LocalParallelExecutor::new(tools)),
            token_counter: Arc::new(EstimatingTokenCounter::new()),
            context_limits: Arc::new(StaticContextLimits::new()),
            form_registry: Arc::new(InMemoryFormRegistry::new(config.form_store_timeout)),
            interruption: Arc::new(StopFlag::new()),
            records: Arc::new(MemoryRecordSink::new()),
            events: Arc::new(NoopHandler),
        }
    }

    pub fn with_executor(mut self, executor: Arc<dyn ParallelExecutor>) -> Self {
        self.executor = executor;
        self
    }

    pub fn with_token_counter(mut self, counter: Arc<dyn TokenCounter>) -> Self {
        self.token_counter = counter;
        self
    }

    pub fn with_context_limits(mut self, limits: Arc<dyn ContextLimits>) -> Self {
        self.context_limits = limits;
        self
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn MemoryCompressor>) -> Self {
        self.compressor = compressor;
        self
    }

    pub fn with_form_registry(mut self, registry: Arc<dyn FormRegistry>) -> Self {
        self.form_registry = registry;
        self
    }

    pub fn with_interruption(mut self, checker: Arc<dyn InterruptionChecker>) -> Self {
        self.interruption = checker;
        self
    }

    pub fn with_records(mut self, records: Arc<dyn RecordSink>) -> Self {
        self.records = records;
        self
    }

    pub fn with_events(mut self, events: Arc<dyn EventHandler>) -> Self {
        self.events = events;
        self
    }

    pub(crate) fn compactor(&self, threshold: f64) -> Compactor<'_> {
        Compactor {
            token_counter: self.token_counter.as_ref(),
            context_limits: self.context_limits.as_ref(),
            compressor: self.compressor.as_ref(),
            events: self.events.as_ref(),
            threshold,
        }
    }
}

/// The model's decision from the last successful think, waiting for act.
#[derive(Debug, Clone)]
pub(crate) struct Decision {
    pub text: String,
    pub tool_calls: Vec<ToolCall>,
    pub params: Vec<ToolParam>,
}

/// A single agent executing one plan.
pub struct ThinkActAgent {
    pub(crate) config: EngineConfig,
    pub(crate) plan: PlanContext,
    pub(crate) tools: Arc<ToolRegistry>,
    pub(crate) collab: Collaborators,
    pub(crate) form_pool: FormWaitPool,
    pub(crate) ids: IdGenerator,
    pub(crate) memory: Vec<Message>,
    pub(crate) extra_messages: Vec<Message>,
    pub(crate) current_step: u32,
    pub(crate) decision: Option<Decision>,
    pub(crate) repeats: RepeatWindow,
    pub(crate) step_error: Option<String>,
    /// Prompt of the most recent model call, kept for failure reports.
    pub(crate) last_prompt: Vec<Message>,
}

impl ThinkActAgent {
    /// Create an agent. Fails only if the form wait pool cannot start.
    pub fn new(
        config: EngineConfig,
        plan: PlanContext,
        tools: Arc<ToolRegistry>,
        collaborators: Collaborators,
    ) -> Result<Self, EngineError> {
        let form_pool = FormWaitPool::new(config.form_pool_size)?;
        Ok(Self {
            repeats: RepeatWindow::new(config.repeat_window),
            config,
            plan,
            tools,
            collab: collaborators,
            form_pool,
            ids: IdGenerator,
            memory: Vec::new(),
            extra_messages: Vec::new(),
            current_step: 0,
            decision: None,
            step_error: None,
            last_prompt: Vec::new(),
        })
    }

    /// Messages merged at the front of memory on the first step (e.g. an
    /// earlier conversation).
    pub fn with_extra_messages(mut self, messages: Vec<Message>) -> Self {
        self.extra_messages = messages;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn plan(&self) -> &PlanContext {
        &self.plan
    }

    /// Conversation memory carried between cycles.
    pub fn memory(&self) -> &[Message] {
        &self.memory
    }

    /// 1-indexed number of the step in progress (0 before the first step).
    pub fn current_step(&self) -> u32 {
        self.current_step
    }

    /// Error message reported for this agent's plan step, if any.
    pub fn step_error_message(&self) -> Option<&str> {
        self.step_error.as_deref()
    }

    /// Run one think/act cycle.
    pub async fn step(&mut self) -> AgentExecResult {
        self.current_step += 1;
        self.emit(EngineEvent::StepStart {
            step: self.current_step,
        });

        let outcome = match self.think().await {
            Ok(outcome) => outcome,
            Err(EngineError::Interrupted(reason)) => {
                info!("Agent {} interrupted: {reason}", self.config.agent_name);
                return AgentExecResult::interrupted(format!(
                    "Agent execution interrupted: {reason}"
                ));
            }
            Err(e) => {
                warn!("Unexpected error in step(): {e}");
                let outcome = super::think::ThinkOutcome {
                    exceptions: vec![e],
                    ..Default::default()
                };
                return self.escalate(&outcome).await;
            }
        };

        if !outcome.tools_selected {
            if outcome.latest_exception().is_some() {
                warn!(
                    "Agent {} thinking failed after all retries; reporting system error",
                    self.config.agent_name
                );
                return self.escalate(&outcome).await;
            }
            warn!(
                "Agent {} did not select any tools after all retries",
                self.config.agent_name
            );
            return AgentExecResult::in_progress(
                "No tools were selected. You must select and call at least one tool to \
                 proceed. Please retry with tool calls.",
            );
        }

        self.act().await
    }

    /// Execute the tool calls selected by the last successful think.
    pub async fn act(&mut self) -> AgentExecResult {
        if !self.continue_allowed() {
            info!(
                "Agent {} action interrupted for root plan {}",
                self.config.agent_name, self.plan.root_plan_id
            );
            return AgentExecResult::interrupted("Action interrupted by user");
        }

        match self.decision.take() {
            Some(decision) if !decision.tool_calls.is_empty() => self.dispatch(decision).await,
            _ => AgentExecResult::in_progress("tool call is empty, please retry"),
        }
    }

    /// Step until a terminal state or the step cap.
    ///
    /// At the cap the model is asked for a final answer from memory and the
    /// run completes with it. Failed and interrupted runs release tool and
    /// form resources via [`clear_up`](Self::clear_up); completed runs reset
    /// terminable tools.
    pub async fn run(&mut self) -> AgentExecResult {
        let result = loop {
            if let Some(max_steps) = self.config.max_steps
                && self.current_step >= max_steps
            {
                self.emit(EngineEvent::StepLimitReached { max_steps });
                let summary = self.final_summary(max_steps).await;
                break AgentExecResult::new(summary, AgentState::Completed);
            }

            let result = self.step().await;
            if result.state.is_terminal() {
                break result;
            }
        };

        let plan_id = self.plan.current_plan_id.clone();
        match result.state {
            AgentState::Failed | AgentState::Interrupted => self.clear_up(&plan_id),
            AgentState::Completed => self.reset_terminable(&plan_id),
            AgentState::InProgress => {}
        }

        self.emit(EngineEvent::Finished {
            state: result.state,
            steps: self.current_step,
        });
        result
    }

    /// Release per-plan tool state and any pending form of the root plan.
    pub fn clear_up(&self, plan_id: &str) {
        for tool in self.tools.iter() {
            tool.cleanup(plan_id);
        }
        self.collab.form_registry.remove(&self.plan.root_plan_id);
        info!("Cleaned up resources for plan {plan_id}");
    }

    /// Re-arm terminable tools so the next plan on the same registry does
    /// not inherit this plan's termination.
    fn reset_terminable(&self, plan_id: &str) {
        for tool in self.tools.iter().filter(|t| t.as_terminable().is_some()) {
            tool.cleanup(plan_id);
        }
    }

    async fn final_summary(&self, max_steps: u32) -> String {
        let fallback = format!(
            "Step limit ({max_steps}) reached before the task was completed. Please try again."
        );
        if self.memory.is_empty() {
            return fallback;
        }

        let mut messages = self.memory.clone();
        messages.push(Message::system(self.config.system_prompt.clone()));
        messages.push(Message::user(self.render_env()));
        messages.push(Message::user(FINAL_SUMMARY_PROMPT));
        let request = ModelRequest {
            model: self.config.model.clone(),
            messages,
            tools: Vec::new(),
        };

        match self.collab.model.complete(&request).await {
            Ok(response) if !response.text.trim().is_empty() => {
                info!("Generated final summary ({} chars)", response.text.len());
                response.text
            }
            Ok(_) => fallback,
            Err(e) => {
                warn!("Failed to generate final summary: {e}");
                fallback
            }
        }
    }

    pub(crate) fn continue_allowed(&self) -> bool {
        self.collab
            .interruption
            .continue_allowed(&self.plan.root_plan_id)
    }

    pub(crate) fn emit(&self, event: EngineEvent<'_>) {
        self.collab.events.on_event(&event);
    }

    pub(crate) fn form_wait_settings(&self) -> FormWaitSettings {
        FormWaitSettings {
            timeout: self.config.form_input_timeout,
            poll_interval: self.config.form_poll_interval,
            interruption_check_interval: self.config.interruption_check_interval,
        }
    }
}
