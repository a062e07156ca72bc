//! The think phase: a retrying model call that yields the next decision.
//!
//! Each attempt renders the prompt (system message, memory, environment
//! message), keeps it under the context limit via the compactor, calls the
//! model, and turns the response into tool calls. Network-type failures are
//! retried with exponential backoff; any other failure ends the loop. The
//! retry counters live in the returned [`ThinkOutcome`], never on the agent.

use tracing::{debug, error, info, warn};

use super::engine::{Decision, ThinkActAgent};
use super::events::EngineEvent;
use super::record::ThinkActRecord;
use super::task::ToolParam;
use crate::api::model::ModelRequest;
use crate::error::EngineError;
use crate::tools::args::normalize_arguments;
use crate::{Message, ToolCall};

/// What one `think()` invocation produced.
#[derive(Debug, Default)]
pub struct ThinkOutcome {
    /// At least one tool call (real or synthesized) is ready for act.
    pub tools_selected: bool,
    /// Attempts in a row that returned no tool calls. Reset on success.
    pub no_tool_selected_count: u32,
    /// Every failed attempt, oldest first.
    pub exceptions: Vec<EngineError>,
    /// Prompt tokens of the most recent budget check, if one completed.
    pub input_tokens: Option<usize>,
}

impl ThinkOutcome {
    pub fn latest_exception(&self) -> Option<&EngineError> {
        self.exceptions.last()
    }
}

enum Attempt {
    Selected,
    NoTools,
}

impl ThinkActAgent {
    /// Obtain the next decision from the model.
    ///
    /// Returns `Err(EngineError::Interrupted)` when the interruption checker
    /// stops the plan, before the first attempt or between attempts. Every
    /// other failure is reported through the outcome's exception list with
    /// `tools_selected == false`.
    pub async fn think(&mut self) -> Result<ThinkOutcome, EngineError> {
        if !self.continue_allowed() {
            return Err(EngineError::Interrupted(format!(
                "Agent thinking interrupted for rootPlanId: {}",
                self.plan.root_plan_id
            )));
        }

        let retry = self.config.retry.clone();
        let max_attempts = retry.max_attempts.max(1);
        let mut outcome = ThinkOutcome::default();

        for attempt in 1..=max_attempts {
            if !self.continue_allowed() {
                info!(
                    "Agent {} retry process interrupted at attempt {attempt}/{max_attempts}",
                    self.config.agent_name
                );
                return Err(EngineError::Interrupted(format!(
                    "Agent thinking interrupted at attempt {attempt}"
                )));
            }

            info!("Attempt {attempt}/{max_attempts}: executing agent thinking");
            self.emit(EngineEvent::ThinkAttempt {
                attempt,
                max_attempts,
            });

            match self.think_once(attempt, &mut outcome).await {
                Ok(Attempt::Selected) => {
                    outcome.no_tool_selected_count = 0;
                    outcome.tools_selected = true;
                    if attempt > 1 && !outcome.exceptions.is_empty() {
                        info!(
                            "Retry successful for plan {}, clearing exception state",
                            self.plan.current_plan_id
                        );
                        self.emit(EngineEvent::ExceptionCleared {
                            plan_id: &self.plan.current_plan_id,
                        });
                    }
                    return Ok(outcome);
                }
                Ok(Attempt::NoTools) => continue,
                Err(e) => {
                    warn!("Attempt {attempt} failed: {e}");
                    let retryable = e.is_retryable();
                    let message = e.to_string();
                    outcome.exceptions.push(e);

                    if !retryable {
                        error!(
                            "Non-retryable error at attempt {attempt}/{max_attempts}: {message}"
                        );
                        break;
                    }
                    if attempt < max_attempts {
                        let delay = retry.delay_for_attempt(attempt);
                        info!("Retrying in {delay:?} due to retryable error: {message}");
                        self.emit(EngineEvent::RetryScheduled {
                            attempt,
                            delay,
                            error: &message,
                        });
                        tokio::time::sleep(delay).await;
                    }
                }
            }
        }

        if let Some(latest) = outcome.latest_exception() {
            error!(
                "All {max_attempts} think attempts failed; {} exception(s) recorded, latest: {latest}",
                outcome.exceptions.len()
            );
        }
        Ok(outcome)
    }

    async fn think_once(
        &mut self,
        attempt: u32,
        outcome: &mut ThinkOutcome,
    ) -> Result<Attempt, EngineError> {
        let system_msg = Message::system(self.config.system_prompt.clone());
        let mut env_text = self.render_env();
        if outcome.no_tool_selected_count > 0 {
            env_text.push_str(&format!(
                "\n\n IMPORTANT: You must call at least one tool to proceed. Previous {} \
                 attempt(s) did not select any tools. Do not provide explanations or \
                 reasoning - call a tool immediately.",
                outcome.no_tool_selected_count
            ));
            debug!(
                "Added tool call directive (no tool selected count: {})",
                outcome.no_tool_selected_count
            );
        }
        let env_msg = Message::user(env_text);
        let think_input =
            serde_json::to_string(&[&system_msg, &env_msg]).unwrap_or_default();

        if self.current_step == 1 && !self.extra_messages.is_empty() {
            let mut merged = std::mem::take(&mut self.extra_messages);
            debug!("Merging {} extra message(s) into memory", merged.len());
            merged.append(&mut self.memory);
            self.memory = merged;
        }

        let report = self
            .collab
            .compactor(self.config.compression_threshold)
            .ensure_within_budget(&self.config.model, &mut self.memory, &system_msg, &env_msg)
            .await?;
        if report.passes > 0 {
            self.repeats.clear();
        }
        if report.input_tokens == 0 {
            return Err(EngineError::InvalidState(
                "Failed to calculate input token count. A token counter and context limit \
                 lookup must be available."
                    .into(),
            ));
        }
        outcome.input_tokens = Some(report.input_tokens);

        let mut messages = Vec::with_capacity(self.memory.len() + 2);
        messages.push(system_msg);
        messages.extend(self.memory.iter().cloned());
        messages.push(env_msg);
        self.last_prompt = messages.clone();

        let cycle_call_id = self.ids.tool_call_id();
        let request = ModelRequest {
            model: self.config.model.clone(),
            messages,
            tools: self.tools.definitions(),
        };
        let response = self.collab.model.complete(&request).await?;

        let input_tokens = if response.input_tokens > 0 {
            response.input_tokens
        } else {
            report.input_tokens
        };
        info!(
            "{} thought: {} ({} tool call(s), {input_tokens} input / {} output tokens)",
            self.config.agent_name,
            response.text,
            response.tool_calls.len(),
            response.output_tokens
        );

        let mut tool_calls = response.tool_calls;
        if tool_calls.is_empty() {
            outcome.no_tool_selected_count += 1;
            warn!(
                "Attempt {attempt}: no tools selected (count: {})",
                outcome.no_tool_selected_count
            );
            self.emit(EngineEvent::NoToolSelected {
                attempt,
                count: outcome.no_tool_selected_count,
            });
            if !self.config.synthesize_think_call {
                return Ok(Attempt::NoTools);
            }
            tool_calls.push(self.synthetic_think_call(&response.text));
        }

        let multiple = tool_calls.len() > 1;
        let mut params = Vec::with_capacity(tool_calls.len());
        for call in &mut tool_calls {
            let arguments = normalize_arguments(call.arguments());
            let call_id = if multiple {
                self.ids.tool_call_id()
            } else {
                cycle_call_id.clone()
            };
            if call.id.is_empty() {
                call.id = call_id.clone();
            }
            call.function.arguments = arguments.clone();
            params.push(ToolParam::new(call.name(), arguments, call_id));
        }

        info!(
            "Tools being prepared: {:?}",
            tool_calls.iter().map(|c| c.name()).collect::<Vec<_>>()
        );
        self.emit(EngineEvent::ToolCallsReceived {
            count: tool_calls.len(),
        });

        let mut record = ThinkActRecord::new(self.ids.think_act_id(), &self.plan.step_id);
        record.think_input = think_input;
        record.think_output = response.text.clone();
        record.input_tokens = input_tokens;
        record.output_tokens = response.output_tokens;
        record.context_limit = report.context_limit;
        record.tool_params = params.clone();
        self.collab.records.record_think_act(record);

        self.decision = Some(Decision {
            text: response.text,
            tool_calls,
            params,
        });
        Ok(Attempt::Selected)
    }

    /// Per-step environment message: the next-step prompt followed by the
    /// state strings of tools that expose one.
    pub(crate) fn render_env(&self) -> String {
        let mut env = format!(
            "{}\n- Current step environment information:\n",
            self.config.next_step_prompt
        );
        let mut seen = std::collections::HashSet::new();
        for tool in self.tools.iter() {
            let name = tool.name();
            let Some(state) = tool.state_string() else {
                continue;
            };
            if state.trim().is_empty() || !seen.insert(name.clone()) {
                continue;
            }
            env.push_str(&format!("{name} context information:\n    {state}\n"));
        }
        env
    }

    fn synthetic_think_call(&self, text: &str) -> ToolCall {
        let message = if text.is_empty() {
            "No response from LLM"
        } else {
            text
        };
        let arguments = serde_json::json!({ "message": message }).to_string();
        debug!("Wrapping text-only response in a {} call", self.config.think_tool_name);
        ToolCall::function(
            self.ids.tool_call_id(),
            self.config.think_tool_name.clone(),
            arguments,
        )
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;
    use crate::agent::config::{EngineConfig, PlanContext};
    use crate::agent::engine::Collaborators;
    use crate::agent::events::{AgentState, FnEventHandler};
    use crate::agent::interrupt::StopFlag;
    use crate::agent::record::MemoryRecordSink;
    use crate::api::model::ModelResponse;
    use crate::api::scripted::ScriptedModelClient;
    use crate::context::budget::StaticContextLimits;
    use crate::error::ModelError;
    use crate::tools::{TerminateTool, ThinkTool, ToolRegistry};

    struct Harness {
        agent: ThinkActAgent,
        model: Arc<ScriptedModelClient>,
        records: Arc<MemoryRecordSink>,
    }

    fn harness(model: ScriptedModelClient, config: EngineConfig) -> Harness {
        harness_with(model, config, |c| c)
    }

    fn harness_with(
        model: ScriptedModelClient,
        config: EngineConfig,
        customize: impl FnOnce(Collaborators) -> Collaborators,
    ) -> Harness {
        let model = Arc::new(model);
        let records = Arc::new(MemoryRecordSink::new());
        let tools = Arc::new(
            ToolRegistry::new()
                .with(ThinkTool::new("default"))
                .with(TerminateTool::new("default")),
        );
        let collaborators = customize(
            Collaborators::with_defaults(model.clone(), tools.clone(), &config)
                .with_records(records.clone()),
        );
        let mut agent =
            ThinkActAgent::new(config, PlanContext::root("plan-1"), tools, collaborators).unwrap();
        agent.current_step = 1;
        Harness {
            agent,
            model,
            records,
        }
    }

    fn network_error() -> ModelError {
        ModelError::new("WebClientRequestException", "connection refused")
    }

    fn think_call(id: &str) -> ModelResponse {
        ModelResponse::tool_calls(vec![ToolCall::function(
            id,
            "default-think",
            r#"{"message": "planning"}"#,
        )])
    }

    #[tokio::test]
    async fn single_call_gets_cycle_id_and_is_recorded() {
        let model = ScriptedModelClient::new().respond(
            ModelResponse::tool_calls(vec![ToolCall::function("", "default-think", " {\"message\": \"x\"} trailing")])
                .with_usage(120, 8),
        );
        let mut h = harness(model, EngineConfig::new("m", "a"));

        let outcome = h.agent.think().await.unwrap();
        assert!(outcome.tools_selected);
        assert!(outcome.exceptions.is_empty());

        let decision = h.agent.decision.as_ref().unwrap();
        assert_eq!(decision.tool_calls.len(), 1);
        assert_eq!(decision.tool_calls[0].id, decision.params[0].tool_call_id);
        assert_eq!(decision.params[0].arguments, r#"{"message": "x"}"#);

        let records = h.records.think_acts();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].input_tokens, 120);
        assert_eq!(records[0].output_tokens, 8);
        assert_eq!(records[0].step_id, "plan-1-step");
        assert_eq!(records[0].tool_params.len(), 1);
    }

    #[tokio::test]
    async fn multiple_calls_get_distinct_ids() {
        let model = ScriptedModelClient::new().respond(ModelResponse::tool_calls(vec![
            ToolCall::function("a", "default-think", "{}"),
            ToolCall::function("b", "default-think", "{}"),
        ]));
        let mut h = harness(model, EngineConfig::new("m", "a"));
        h.agent.think().await.unwrap();

        let params = &h.agent.decision.as_ref().unwrap().params;
        assert_eq!(params.len(), 2);
        assert_ne!(params[0].tool_call_id, params[1].tool_call_id);
    }

    #[tokio::test]
    async fn text_only_response_becomes_think_call() {
        let model = ScriptedModelClient::new().respond(ModelResponse::text("I should look first."));
        let mut h = harness(model, EngineConfig::new("m", "a"));

        let outcome = h.agent.think().await.unwrap();
        assert!(outcome.tools_selected);
        assert_eq!(outcome.no_tool_selected_count, 0);

        let call = &h.agent.decision.as_ref().unwrap().tool_calls[0];
        assert_eq!(call.name(), "default-think");
        let args: serde_json::Value = serde_json::from_str(call.arguments()).unwrap();
        assert_eq!(args["message"], "I should look first.");
        assert_eq!(h.model.call_count(), 1);
    }

    #[tokio::test]
    async fn empty_response_synthesizes_placeholder_message() {
        let model = ScriptedModelClient::new().respond(ModelResponse::default());
        let mut h = harness(model, EngineConfig::new("m", "a"));
        h.agent.think().await.unwrap();

        let call = &h.agent.decision.as_ref().unwrap().tool_calls[0];
        assert!(call.arguments().contains("No response from LLM"));
    }

    #[tokio::test]
    async fn zero_calls_twice_then_tool_call_adds_directive() {
        let model = ScriptedModelClient::new()
            .respond(ModelResponse::text("thinking"))
            .respond(ModelResponse::text("still thinking"))
            .respond(think_call("c1"));
        let config = EngineConfig::new("m", "a").with_synthesize_think_call(false);
        let mut h = harness(model, config);

        let outcome = h.agent.think().await.unwrap();
        assert!(outcome.tools_selected);
        assert_eq!(outcome.no_tool_selected_count, 0);
        assert!(outcome.exceptions.is_empty());

        let requests = h.model.requests();
        assert_eq!(requests.len(), 3);
        let env_text = |i: usize| requests[i].messages.last().unwrap().text().to_string();
        assert!(!env_text(0).contains("IMPORTANT"));
        assert!(env_text(1).contains("Previous 1 attempt(s)"));
        assert!(env_text(2).contains("Previous 2 attempt(s)"));

        let records = h.records.think_acts();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].tool_params.len(), 1);
    }

    #[tokio::test]
    async fn zero_calls_every_attempt_is_not_an_exception() {
        let model = ScriptedModelClient::new()
            .respond(ModelResponse::text("a"))
            .respond(ModelResponse::text("b"))
            .respond(ModelResponse::text("c"));
        let config = EngineConfig::new("m", "a").with_synthesize_think_call(false);
        let mut h = harness(model, config);

        let outcome = h.agent.think().await.unwrap();
        assert!(!outcome.tools_selected);
        assert_eq!(outcome.no_tool_selected_count, 3);
        assert!(outcome.latest_exception().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn retryable_failures_back_off_exponentially() {
        let model = ScriptedModelClient::new()
            .fail(network_error())
            .fail(network_error())
            .fail(network_error());
        let delays = Arc::new(std::sync::Mutex::new(Vec::new()));
        let sink = delays.clone();
        let mut h = harness_with(model, EngineConfig::new("m", "a"), |c| {
            c.with_events(Arc::new(FnEventHandler::new(move |event| {
                if let EngineEvent::RetryScheduled { delay, .. } = event {
                    sink.lock().unwrap().push(*delay);
                }
            })))
        });

        let start = tokio::time::Instant::now();
        let outcome = h.agent.think().await.unwrap();
        assert!(!outcome.tools_selected);
        assert_eq!(outcome.exceptions.len(), 3);
        assert!(outcome.latest_exception().unwrap().is_retryable());
        assert_eq!(
            *delays.lock().unwrap(),
            vec![Duration::from_millis(2000), Duration::from_millis(4000)]
        );
        assert_eq!(start.elapsed(), Duration::from_millis(6000));
    }

    #[tokio::test(start_paused = true)]
    async fn success_after_retry_clears_exception() {
        let model = ScriptedModelClient::new()
            .fail(network_error())
            .respond(think_call("c1"));
        let cleared = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = cleared.clone();
        let mut h = harness_with(model, EngineConfig::new("m", "a"), |c| {
            c.with_events(Arc::new(FnEventHandler::new(move |event| {
                if let EngineEvent::ExceptionCleared { .. } = event {
                    flag.store(true, std::sync::atomic::Ordering::SeqCst);
                }
            })))
        });

        let outcome = h.agent.think().await.unwrap();
        assert!(outcome.tools_selected);
        assert_eq!(outcome.exceptions.len(), 1);
        assert!(cleared.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn fatal_error_ends_loop_immediately() {
        let model = ScriptedModelClient::new()
            .fail(ModelError::new("ApiError", "HTTP 400 bad request"))
            .respond(think_call("c1"));
        let mut h = harness(model, EngineConfig::new("m", "a"));

        let outcome = h.agent.think().await.unwrap();
        assert!(!outcome.tools_selected);
        assert_eq!(outcome.exceptions.len(), 1);
        assert_eq!(h.model.call_count(), 1);
    }

    #[tokio::test]
    async fn token_limit_is_fatal() {
        let model = ScriptedModelClient::new().respond(think_call("c1"));
        let mut h = harness_with(model, EngineConfig::new("m", "a"), |c| {
            c.with_context_limits(Arc::new(StaticContextLimits::new().with_default(5)))
        });
        h.agent.memory = vec![Message::assistant_text("x".repeat(400))];

        let outcome = h.agent.think().await.unwrap();
        assert!(!outcome.tools_selected);
        assert!(matches!(
            outcome.latest_exception(),
            Some(EngineError::TokenLimitExceeded { limit: 5, .. })
        ));
        assert_eq!(h.model.call_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn interruption_between_attempts_interrupts_step() {
        let model = ScriptedModelClient::new()
            .fail(network_error())
            .respond(think_call("c1"));
        let stop = Arc::new(StopFlag::new());
        let trigger = stop.clone();
        let mut h = harness_with(model, EngineConfig::new("m", "a"), |c| {
            c.with_interruption(stop.clone())
                .with_events(Arc::new(FnEventHandler::new(move |event| {
                    if let EngineEvent::RetryScheduled { .. } = event {
                        trigger.stop_plan("plan-1");
                    }
                })))
        });
        h.agent.current_step = 0;

        let result = h.agent.step().await;
        assert_eq!(result.state, AgentState::Interrupted);
        assert!(result.text.contains("interrupted at attempt 2"));
        assert_eq!(h.model.call_count(), 1);
    }

    #[tokio::test]
    async fn interruption_before_think_is_an_error() {
        let stop = Arc::new(StopFlag::new());
        stop.stop();
        let mut h = harness_with(ScriptedModelClient::new(), EngineConfig::new("m", "a"), |c| {
            c.with_interruption(stop.clone())
        });
        let err = h.agent.think().await.unwrap_err();
        assert!(matches!(err, EngineError::Interrupted(_)));
    }

    #[tokio::test]
    async fn extra_messages_merge_on_first_step() {
        let model = ScriptedModelClient::new().respond(think_call("c1"));
        let mut h = harness(model, EngineConfig::new("m", "a"));
        h.agent.memory = vec![Message::assistant_text("later")];
        h.agent.extra_messages = vec![Message::assistant_text("earlier")];

        h.agent.think().await.unwrap();
        let texts: Vec<_> = h.agent.memory.iter().map(|m| m.text().to_string()).collect();
        assert_eq!(texts, vec!["earlier", "later"]);
        assert!(h.agent.extra_messages.is_empty());

        let prompt = &h.model.requests()[0].messages;
        assert_eq!(prompt.len(), 4);
        assert_eq!(prompt[1].text(), "earlier");
    }

    #[tokio::test]
    async fn env_lists_tool_state() {
        let form = Arc::new(crate::tools::FormInputTool::new("default"));
        let model = Arc::new(ScriptedModelClient::new());
        let config = EngineConfig::new("m", "a").with_next_step_prompt("Do the thing.");
        let tools = Arc::new(ToolRegistry::new().with_shared(form.clone()));
        let collaborators = Collaborators::with_defaults(model, tools.clone(), &config);
        let agent =
            ThinkActAgent::new(config, PlanContext::root("p"), tools, collaborators).unwrap();

        let idle = agent.render_env();
        assert_eq!(idle, "Do the thing.\n- Current step environment information:\n");

        crate::tools::FormInput::begin(form.as_ref(), r#"{"description": "email"}"#);
        let env = agent.render_env();
        assert!(env.starts_with("Do the thing.\n- Current step environment information:\n"));
        assert!(env.contains("default-form-input context information:\n    {"));
    }
}
