//! Think-act execution engine for tool-calling agents.
//!
//! `thinkact` drives a single agent through repeated think/act cycles: ask a
//! model what to do next, execute the tools it selected, fold the results back
//! into a rolling conversation memory, and repeat until the task completes,
//! fails, or is interrupted. The core abstraction is the
//! [`ThinkActAgent`](agent::engine::ThinkActAgent), whose
//! [`step()`](agent::engine::ThinkActAgent::step) runs one cycle and whose
//! [`run()`](agent::engine::ThinkActAgent::run) loops until a terminal state.
//!
//! Everything outside the cycle itself is a collaborator trait with a
//! default implementation: the model client, the parallel tool executor,
//! token counting, memory compression, the pending-form registry, the
//! interruption checker, and the record sink.
//!
//! # Getting started
//!
//! ```ignore
//! use std::sync::Arc;
//! use thinkact::prelude::*;
//!
//! let tools = Arc::new(
//!     ToolRegistry::new()
//!         .with(ThinkTool::new("default"))
//!         .with(TerminateTool::new("default"))
//!         .with(MyTool),
//! );
//! let model = Arc::new(my_model_client);
//! let collaborators = Collaborators::with_defaults(model, tools.clone(), &config);
//!
//! let config = EngineConfig::new("gpt-4o", "researcher")
//!     .with_next_step_prompt("Find the release date and report it.");
//! let plan = PlanContext::root("plan-1");
//!
//! let mut agent = ThinkActAgent::new(config, plan, tools, collaborators)?;
//! let result = agent.run().await;
//! println!("{:?}: {}", result.state, result.text);
//! ```
//!
//! # Where to find things
//!
//! - **The cycle:** [`agent::engine`] owns `step()`/`think()`/`act()`.
//!   [`agent::think`] is the retrying model call, [`agent::dispatch`] runs
//!   tool batches, [`agent::reduce`] folds results into memory and detects
//!   loops, [`agent::escalation`] builds the failure report.
//!
//! - **Tools:** implement [`Tool`](tools::core::Tool). Capability probes
//!   ([`as_form_input`](tools::core::Tool::as_form_input),
//!   [`as_terminable`](tools::core::Tool::as_terminable),
//!   [`error_report`](tools::core::Tool::error_report)) tell the dispatcher
//!   how to treat a tool without type checks.
//!
//! - **Context pressure:** [`context::compactor`] keeps the prompt under the
//!   model limit; [`context::summarizer`] is the default compressor.
//!
//! - **Human input:** [`form`] holds the pending-form registry and the
//!   dedicated wait pool used by form-input tools.
//!
//! # Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`agent`] | Engine, config, events, think/act/reduce/escalation, records |
//! | [`api`] | Model client trait, scripted client, retry policy |
//! | [`context`] | Token counting, context limits, memory compaction |
//! | [`form`] | Pending-form registry and form wait pool |
//! | [`tools`] | Tool trait, registry, built-in tools, parallel executor |

pub mod agent;
pub mod api;
pub mod context;
pub mod error;
pub mod form;
pub mod prelude;
pub mod tools;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub use error::{EngineError, ModelError};

// ── Schema generation ──────────────────────────────────────────────

/// Generate a JSON Schema `serde_json::Value` from a type that implements
/// `schemars::JsonSchema`.
///
/// # Example
///
/// ```
/// use thinkact::json_schema_for;
/// use schemars::JsonSchema;
/// use serde::Deserialize;
///
/// #[derive(Deserialize, JsonSchema)]
/// struct SearchArgs {
///     query: String,
///     #[serde(default)]
///     limit: Option<u32>,
/// }
///
/// let schema = json_schema_for::<SearchArgs>();
/// assert_eq!(schema["type"], "object");
/// assert!(schema["required"].as_array().unwrap().contains(&"query".into()));
/// ```
pub fn json_schema_for<T: JsonSchema>() -> serde_json::Value {
    let schema = schemars::schema_for!(T);
    serde_json::to_value(schema)
        .unwrap_or_else(|_| serde_json::json!({"type": "object", "properties": {}}))
}

// ── Message types ──────────────────────────────────────────────────

/// Role of a message in the conversation.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
    Tool,
}

impl std::fmt::Display for MessageRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
            MessageRole::Tool => write!(f, "tool"),
        }
    }
}

/// A message in the conversation.
///
/// `compression_summary` marks a user message produced by memory
/// compression. Such messages survive the per-cycle memory rebuild that
/// drops every other system and user message.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Message {
    pub role: MessageRole,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing)]
    pub compression_summary: bool,
}

impl Message {
    fn with_role(role: MessageRole, content: Option<String>) -> Self {
        Self {
            role,
            content,
            tool_calls: None,
            tool_call_id: None,
            compression_summary: false,
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::System, Some(content.into()))
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::User, Some(content.into()))
    }

    pub fn assistant_text(content: impl Into<String>) -> Self {
        Self::with_role(MessageRole::Assistant, Some(content.into()))
    }

    /// Assistant turn carrying the model's tool calls and, optionally, the
    /// free text it produced alongside them.
    pub fn assistant_tool_calls(text: Option<String>, calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: Some(calls),
            ..Self::with_role(MessageRole::Assistant, text.filter(|t| !t.is_empty()))
        }
    }

    pub fn tool_result(call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: Some(call_id.into()),
            ..Self::with_role(MessageRole::Tool, Some(content.into()))
        }
    }

    /// A user message flagged as the output of memory compression.
    pub fn compression_summary(content: impl Into<String>) -> Self {
        Self {
            compression_summary: true,
            ..Self::user(content)
        }
    }

    /// The message text, or `""` when absent.
    pub fn text(&self) -> &str {
        self.content.as_deref().unwrap_or("")
    }
}

// ── Tool types ─────────────────────────────────────────────────────

/// The type of a tool definition. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum ToolType {
    #[serde(rename = "function")]
    Function,
}

/// Tool definition handed to the model (function-calling format).
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ToolDef {
    #[serde(rename = "type")]
    pub tool_type: ToolType,
    pub function: FunctionDef,
}

impl ToolDef {
    /// Create a function-calling tool definition.
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: serde_json::Value,
    ) -> Self {
        Self {
            tool_type: ToolType::Function,
            function: FunctionDef {
                name: name.into(),
                description: description.into(),
                parameters,
            },
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct FunctionDef {
    pub name: String,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The type of a tool call. Currently always `Function`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub enum CallType {
    #[serde(rename = "function")]
    Function,
}

/// A tool call returned by the model.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ToolCall {
    pub id: String,
    #[serde(rename = "type")]
    pub call_type: CallType,
    pub function: FunctionCallData,
}

impl ToolCall {
    pub fn function(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            call_type: CallType::Function,
            function: FunctionCallData {
                name: name.into(),
                arguments: arguments.into(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }

    pub fn arguments(&self) -> &str {
        &self.function.arguments
    }
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct FunctionCallData {
    pub name: String,
    pub arguments: String,
}
