//! Events, handlers, and step results for the
//! [`ThinkActAgent`](super::engine::ThinkActAgent).
//!
//! The engine reports what it decided through [`EngineEvent`] variants:
//! think attempts, retries, compaction, dispatch strategy, form waits,
//! escalation. Callers implement [`EventHandler`] to observe them.
//!
//! # Choosing an event handler
//!
//! | Handler | Use case |
//! |---------|----------|
//! | [`NoopHandler`] | Tests or fire-and-forget runs |
//! | [`LoggingHandler`] | Structured logging via `tracing` |
//! | [`FnEventHandler`] | Quick closures for simple callbacks |
//! | [`CompositeEventHandler`] | Compose multiple handlers in order |

use std::fmt;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::tools::core::InputState;

// ── Step results ───────────────────────────────────────────────────

/// Outcome state of a step or a whole run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentState {
    InProgress,
    Completed,
    Failed,
    Interrupted,
}

impl AgentState {
    /// Whether the outer run loop stops on this state.
    pub fn is_terminal(self) -> bool {
        !matches!(self, AgentState::InProgress)
    }
}

impl fmt::Display for AgentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentState::InProgress => write!(f, "IN_PROGRESS"),
            AgentState::Completed => write!(f, "COMPLETED"),
            AgentState::Failed => write!(f, "FAILED"),
            AgentState::Interrupted => write!(f, "INTERRUPTED"),
        }
    }
}

/// Result of one `step()` (or of a whole `run()`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentExecResult {
    pub text: String,
    pub state: AgentState,
}

impl AgentExecResult {
    pub fn new(text: impl Into<String>, state: AgentState) -> Self {
        Self {
            text: text.into(),
            state,
        }
    }

    pub fn in_progress(text: impl Into<String>) -> Self {
        Self::new(text, AgentState::InProgress)
    }

    pub fn interrupted(text: impl Into<String>) -> Self {
        Self::new(text, AgentState::Interrupted)
    }
}

// ── Events ─────────────────────────────────────────────────────────

/// Events emitted by the engine.
#[derive(Debug)]
pub enum EngineEvent<'a> {
    /// A new step is starting (1-indexed).
    StepStart { step: u32 },
    /// A think attempt is about to call the model.
    ThinkAttempt { attempt: u32, max_attempts: u32 },
    /// The model returned no tool calls.
    NoToolSelected { attempt: u32, count: u32 },
    /// A retryable model failure; the next attempt follows after `delay`.
    RetryScheduled {
        attempt: u32,
        delay: Duration,
        error: &'a str,
    },
    /// A think succeeded after at least one failed attempt.
    ExceptionCleared { plan_id: &'a str },
    /// The model selected tools for this step.
    ToolCallsReceived { count: usize },
    /// The act phase chose an execution strategy.
    ExecutionStrategy { sequential: bool, tasks: usize },
    /// A tool finished; `result` is what goes back to the model.
    ToolResult {
        name: &'a str,
        call_id: &'a str,
        result: &'a str,
    },
    /// Memory was compressed.
    Compaction {
        tokens_before: usize,
        tokens_after: usize,
        aggressive: bool,
    },
    /// The same single-tool result came back too many times in a row.
    LoopDetected { result: &'a str },
    /// A form-input tool is waiting for the user.
    FormAwaiting {
        tool: &'a str,
        root_plan_id: &'a str,
    },
    /// A form wait ended.
    FormResolved { tool: &'a str, state: InputState },
    /// Retries were exhausted; a failure report was filed.
    Escalated { message: &'a str },
    /// The run hit its step cap.
    StepLimitReached { max_steps: u32 },
    /// The run ended.
    Finished { state: AgentState, steps: u32 },
}

// ── Handlers ───────────────────────────────────────────────────────

/// Observer for [`EngineEvent`]s.
///
/// ```ignore
/// struct StepCounter(AtomicU32);
///
/// impl EventHandler for StepCounter {
///     fn on_event(&self, event: &EngineEvent<'_>) {
///         if let EngineEvent::StepStart { .. } = event {
///             self.0.fetch_add(1, Ordering::Relaxed);
///         }
///     }
/// }
/// ```
pub trait EventHandler: Send + Sync {
    fn on_event(&self, _event: &EngineEvent<'_>) {}
}

/// A no-op event handler.
pub struct NoopHandler;
impl EventHandler for NoopHandler {}

/// Wrapper that adapts a closure into an [`EventHandler`].
pub struct FnEventHandler<F>(F)
where
    F: Fn(&EngineEvent<'_>) + Send + Sync;

impl<F> FnEventHandler<F>
where
    F: Fn(&EngineEvent<'_>) + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

impl<F> EventHandler for FnEventHandler<F>
where
    F: Fn(&EngineEvent<'_>) + Send + Sync,
{
    fn on_event(&self, event: &EngineEvent<'_>) {
        (self.0)(event)
    }
}

/// Dispatches each event to every inner handler, in order.
pub struct CompositeEventHandler {
    handlers: Vec<Box<dyn EventHandler>>,
}

impl CompositeEventHandler {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
        }
    }

    pub fn with(mut self, handler: impl EventHandler + 'static) -> Self {
        self.handlers.push(Box::new(handler));
        self
    }

    /// Add a handler only when `condition` holds.
    pub fn with_if(self, condition: bool, handler: impl EventHandler + 'static) -> Self {
        if condition { self.with(handler) } else { self }
    }
}

impl Default for CompositeEventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler for CompositeEventHandler {
    fn on_event(&self, event: &EngineEvent<'_>) {
        for handler in &self.handlers {
            handler.on_event(event);
        }
    }
}

/// An event handler that logs events via `tracing`.
pub struct LoggingHandler;

impl EventHandler for LoggingHandler {
    fn on_event(&self, event: &EngineEvent<'_>) {
        match event {
            EngineEvent::StepStart { step } => info!("[step {step}] starting"),
            EngineEvent::ThinkAttempt {
                attempt,
                max_attempts,
            } => debug!("Think attempt {attempt}/{max_attempts}"),
            EngineEvent::NoToolSelected { attempt, count } => {
                warn!("Attempt {attempt}: no tools selected (count: {count})")
            }
            EngineEvent::RetryScheduled {
                attempt,
                delay,
                error,
            } => warn!("Attempt {attempt} failed: {error}. Retrying in {delay:?}"),
            EngineEvent::ExceptionCleared { plan_id } => {
                info!("Retry succeeded for plan {plan_id}")
            }
            EngineEvent::ToolCallsReceived { count } => debug!("{count} tool call(s) selected"),
            EngineEvent::ExecutionStrategy { sequential, tasks } => {
                let mode = if *sequential { "sequential" } else { "parallel" };
                debug!("Executing {tasks} task(s) ({mode})")
            }
            EngineEvent::ToolResult {
                name,
                call_id,
                result,
            } => {
                let preview: String = result.chars().take(200).collect();
                info!("[tool_result] {name} ({call_id}): {preview}")
            }
            EngineEvent::Compaction {
                tokens_before,
                tokens_after,
                aggressive,
            } => info!(
                "Memory compacted{}: {tokens_before} -> {tokens_after} tokens",
                if *aggressive { " (aggressive)" } else { "" }
            ),
            EngineEvent::LoopDetected { result } => {
                let preview: String = result.chars().take(80).collect();
                warn!("Repeated tool result detected: {preview}")
            }
            EngineEvent::FormAwaiting { tool, root_plan_id } => {
                info!("Form {tool} awaiting user input (root plan {root_plan_id})")
            }
            EngineEvent::FormResolved { tool, state } => {
                info!("Form {tool} resolved: {state:?}")
            }
            EngineEvent::Escalated { message } => {
                let first_line = message.lines().next().unwrap_or("");
                warn!("Escalated failure: {first_line}")
            }
            EngineEvent::StepLimitReached { max_steps } => {
                warn!("Step limit reached ({max_steps})")
            }
            EngineEvent::Finished { state, steps } => {
                info!("Run finished: {state} after {steps} step(s)")
            }
        }
    }
}
