//! Model client boundary.
//!
//! The engine never talks to a model over the wire itself. It hands a
//! [`ModelRequest`] to a [`ModelClient`] and gets back the response text, the
//! tool calls the model selected, and token counts.

use futures::future::BoxFuture;

use crate::error::ModelError;
use crate::{Message, ToolCall, ToolDef};

/// One prompt submission.
#[derive(Debug, Clone)]
pub struct ModelRequest {
    pub model: String,
    pub messages: Vec<Message>,
    pub tools: Vec<ToolDef>,
}

/// What the model decided.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelResponse {
    /// Free text produced by the model (may be empty).
    pub text: String,
    /// Tool calls selected by the model, in the order it produced them.
    pub tool_calls: Vec<ToolCall>,
    /// Input tokens reported by the provider. `0` when unknown.
    pub input_tokens: usize,
    pub output_tokens: usize,
}

impl ModelResponse {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn tool_calls(calls: Vec<ToolCall>) -> Self {
        Self {
            tool_calls: calls,
            ..Default::default()
        }
    }

    pub fn with_usage(mut self, input_tokens: usize, output_tokens: usize) -> Self {
        self.input_tokens = input_tokens;
        self.output_tokens = output_tokens;
        self
    }
}

/// A chat model that can select tools.
///
/// Implementations may stream internally; the engine only sees the
/// assembled response.
pub trait ModelClient: Send + Sync {
    fn complete<'a>(
        &'a self,
        request: &'a ModelRequest,
    ) -> BoxFuture<'a, Result<ModelResponse, ModelError>>;
}
