//! Default token services: a character-based token estimate and a static
//! per-model context limit table.

use std::collections::HashMap;

use super::compactor::{ContextLimits, TokenCounter};
use crate::Message;

/// Default characters per token (conservative estimate for English text).
/// Most tokenizers average 3-4 chars per token; 3.5 sits in the middle.
pub const DEFAULT_CHARS_PER_TOKEN: f64 = 3.5;

/// Context window assumed for models missing from the limit table.
pub const DEFAULT_CONTEXT_LIMIT: usize = 128_000;

/// Estimates token counts from message sizes.
///
/// Counts message text plus tool-call names and arguments, so a memory made
/// mostly of tool calls is not undercounted.
#[derive(Debug, Clone)]
pub struct EstimatingTokenCounter {
    chars_per_token: f64,
}

impl EstimatingTokenCounter {
    pub fn new() -> Self {
        Self {
            chars_per_token: DEFAULT_CHARS_PER_TOKEN,
        }
    }

    /// Use a calibrated chars-per-token ratio. Non-positive values fall back
    /// to the default.
    pub fn with_chars_per_token(mut self, chars_per_token: f64) -> Self {
        if chars_per_token > 0.0 {
            self.chars_per_token = chars_per_token;
        }
        self
    }
}

impl Default for EstimatingTokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCounter for EstimatingTokenCounter {
    fn count_tokens(&self, messages: &[Message]) -> usize {
        let total_chars: usize = messages.iter().map(message_chars).sum();
        (total_chars as f64 / self.chars_per_token).ceil() as usize
    }
}

fn message_chars(msg: &Message) -> usize {
    let calls: usize = msg
        .tool_calls
        .iter()
        .flatten()
        .map(|c| c.name().len() + c.arguments().len())
        .sum();
    msg.text().len() + calls
}

/// Context limits looked up by model name, with a fallback.
///
/// ```ignore
/// let limits = StaticContextLimits::new()
///     .with_model("small-model", 8_000)
///     .with_default(32_000);
/// ```
#[derive(Debug, Clone)]
pub struct StaticContextLimits {
    limits: HashMap<String, usize>,
    default_limit: usize,
}

impl StaticContextLimits {
    pub fn new() -> Self {
        Self {
            limits: HashMap::new(),
            default_limit: DEFAULT_CONTEXT_LIMIT,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>, limit: usize) -> Self {
        self.limits.insert(model.into(), limit);
        self
    }

    pub fn with_default(mut self, limit: usize) -> Self {
        self.default_limit = limit;
        self
    }
}

impl Default for StaticContextLimits {
    fn default() -> Self {
        Self::new()
    }
}

impl ContextLimits for StaticContextLimits {
    fn context_limit(&self, model: &str) -> usize {
        self.limits
            .get(model)
            .copied()
            .unwrap_or(self.default_limit)
    }
}
