//! Configuration types for the [`ThinkActAgent`](super::engine::ThinkActAgent).
//!
//! # Examples
//!
//! Minimal configuration, everything at its default:
//!
//! ```ignore
//! let config = EngineConfig::new("gpt-4o", "researcher");
//! ```
//!
//! Customized with builder methods:
//!
//! ```ignore
//! let config = EngineConfig::new("gpt-4o", "researcher")
//!     .with_system_prompt("You are a careful research agent.")
//!     .with_next_step_prompt("Find the release date.")
//!     .with_retry(RetryConfig::with_attempts(5))
//!     .with_form_input_timeout(Duration::from_secs(600))
//!     .with_max_steps(Some(40));
//! ```

use std::time::Duration;

use crate::api::retry::RetryConfig;

/// Identity of the plan an agent executes.
///
/// Sub-plans share their root's `root_plan_id`; root-scoped resources (the
/// pending-form registry, interruption) are keyed by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanContext {
    pub root_plan_id: String,
    pub current_plan_id: String,
    /// Id of the plan step this agent executes. Records are keyed by it.
    pub step_id: String,
    /// 0 for a root plan, +1 per nesting level.
    pub plan_depth: u32,
}

impl PlanContext {
    /// A top-level plan.
    pub fn root(plan_id: impl Into<String>) -> Self {
        let plan_id = plan_id.into();
        Self {
            step_id: format!("{plan_id}-step"),
            root_plan_id: plan_id.clone(),
            current_plan_id: plan_id,
            plan_depth: 0,
        }
    }

    /// A sub-plan spawned under this plan.
    pub fn sub_plan(&self, plan_id: impl Into<String>) -> Self {
        let plan_id = plan_id.into();
        Self {
            step_id: format!("{plan_id}-step"),
            root_plan_id: self.root_plan_id.clone(),
            current_plan_id: plan_id,
            plan_depth: self.plan_depth + 1,
        }
    }

    pub fn with_step_id(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = step_id.into();
        self
    }
}

/// Engine configuration.
///
/// Fields are public for direct struct-update construction; builder methods
/// cover the common settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Model name handed to the model client and used for the context-limit
    /// lookup.
    pub model: String,
    /// Agent name, used in logs and diagnostics.
    pub agent_name: String,
    /// System message that opens every prompt.
    pub system_prompt: String,
    /// Instruction text that opens the per-step environment message.
    pub next_step_prompt: String,
    /// Think-phase retry policy.
    pub retry: RetryConfig,
    /// Fraction of the model's context limit above which memory is
    /// compressed (default: 0.70).
    pub compression_threshold: f64,
    /// Number of identical single-tool results that force a compaction
    /// (default: 3).
    pub repeat_window: usize,
    /// How long a form-input tool waits for the user (default: 300s).
    pub form_input_timeout: Duration,
    /// Form-input poll interval (default: 500ms).
    pub form_poll_interval: Duration,
    /// How often the form wait consults the interruption checker
    /// (default: 2s).
    pub interruption_check_interval: Duration,
    /// Worker threads in the dedicated form wait pool (default: 5).
    pub form_pool_size: usize,
    /// How long exclusive form registration may wait for another sub-plan's
    /// form to clear (default: 30s).
    pub form_store_timeout: Duration,
    /// Turn a text-only model response into a think tool call on the same
    /// attempt (default: true). When `false` the attempt is retried with an
    /// explicit tool-call directive instead.
    pub synthesize_think_call: bool,
    /// Tool name used for synthesized think calls.
    pub think_tool_name: String,
    /// Step cap for [`run()`](super::engine::ThinkActAgent::run). `None`
    /// runs until a terminal state.
    pub max_steps: Option<u32>,
}

impl EngineConfig {
    /// Create a config with the given model and agent name. All other
    /// settings use defaults.
    pub fn new(model: impl Into<String>, agent_name: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            agent_name: agent_name.into(),
            ..Default::default()
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    pub fn with_next_step_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.next_step_prompt = prompt.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_compression_threshold(mut self, threshold: f64) -> Self {
        self.compression_threshold = threshold.clamp(0.0, 1.0);
        self
    }

    pub fn with_form_input_timeout(mut self, timeout: Duration) -> Self {
        self.form_input_timeout = timeout;
        self
    }

    pub fn with_form_poll_interval(mut self, interval: Duration) -> Self {
        self.form_poll_interval = interval;
        self
    }

    pub fn with_form_pool_size(mut self, size: usize) -> Self {
        self.form_pool_size = size.max(1);
        self
    }

    pub fn with_synthesize_think_call(mut self, enabled: bool) -> Self {
        self.synthesize_think_call = enabled;
        self
    }

    pub fn with_think_tool_name(mut self, name: impl Into<String>) -> Self {
        self.think_tool_name = name.into();
        self
    }

    pub fn with_max_steps(mut self, max_steps: Option<u32>) -> Self {
        self.max_steps = max_steps;
        self
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            agent_name: "agent".into(),
            system_prompt: "You are an autonomous agent. Work towards the goal by calling \
                            the tools available to you, one step at a time."
                .into(),
            next_step_prompt: String::new(),
            retry: RetryConfig::default(),
            compression_threshold: 0.70,
            repeat_window: 3,
            form_input_timeout: Duration::from_secs(300),
            form_poll_interval: Duration::from_millis(500),
            interruption_check_interval: Duration::from_secs(2),
            form_pool_size: 5,
            form_store_timeout: Duration::from_secs(30),
            synthesize_think_call: true,
            think_tool_name: "default-think".into(),
            max_steps: Some(20),
        }
    }
}
