//! Keeps the prompt under the model's context limit.
//!
//! Before every think attempt the engine asks the [`Compactor`] to check the
//! full prompt (system message, agent memory, environment message) against
//! the model's context limit:
//!
//! 1. At or below `limit * threshold` nothing happens.
//! 2. Above it, memory goes through the [`MemoryCompressor`] once.
//! 3. Still above the hard limit: one more, aggressive, pass.
//! 4. Still above: [`EngineError::TokenLimitExceeded`].
//!
//! Compressed memory replaces the agent's memory in place and persists into
//! later cycles.

use futures::future::BoxFuture;
use tracing::{debug, info, warn};

use crate::agent::events::{EngineEvent, EventHandler};
use crate::error::EngineError;
use crate::Message;

pub trait TokenCounter: Send + Sync {
    fn count_tokens(&self, messages: &[Message]) -> usize;
}

pub trait ContextLimits: Send + Sync {
    /// Context window of `model`, in tokens.
    fn context_limit(&self, model: &str) -> usize;
}

/// Lossy memory compression.
///
/// Best effort: an implementation that cannot shrink the input returns it
/// unchanged. May be called twice in a row, the second time with
/// `aggressive` set.
pub trait MemoryCompressor: Send + Sync {
    fn compress<'a>(&'a self, messages: Vec<Message>, aggressive: bool)
    -> BoxFuture<'a, Vec<Message>>;
}

/// What a budget check found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BudgetReport {
    /// Prompt tokens after any compression.
    pub input_tokens: usize,
    /// Prompt tokens before compression.
    pub tokens_before: usize,
    pub context_limit: usize,
    /// Number of compression passes run (0, 1 or 2).
    pub passes: u32,
}

/// Borrowed view of the token services used for one check.
pub struct Compactor<'a> {
    pub token_counter: &'a dyn TokenCounter,
    pub context_limits: &'a dyn ContextLimits,
    pub compressor: &'a dyn MemoryCompressor,
    pub events: &'a dyn EventHandler,
    /// Fraction of the limit above which compression starts.
    pub threshold: f64,
}

impl Compactor<'_> {
    /// Ensure `system + memory + env` fits the context limit of `model`,
    /// compressing `memory` in place when needed.
    pub async fn ensure_within_budget(
        &self,
        model: &str,
        memory: &mut Vec<Message>,
        system_msg: &Message,
        env_msg: &Message,
    ) -> Result<BudgetReport, EngineError> {
        let limit = self.context_limits.context_limit(model);
        let tokens_before = self.prompt_tokens(memory, system_msg, env_msg);
        let soft_limit = (limit as f64 * self.threshold) as usize;

        let mut report = BudgetReport {
            input_tokens: tokens_before,
            tokens_before,
            context_limit: limit,
            passes: 0,
        };

        if tokens_before <= soft_limit {
            debug!("Prompt at {tokens_before} tokens (soft limit {soft_limit}, limit {limit})");
            return Ok(report);
        }

        info!(
            "Prompt at {tokens_before} tokens exceeds {:.0}% of {limit}; compressing memory",
            self.threshold * 100.0
        );

        for aggressive in [false, true] {
            let before = report.input_tokens;
            self.compress_in_place(memory, aggressive).await;
            report.passes += 1;
            report.input_tokens = self.prompt_tokens(memory, system_msg, env_msg);
            self.events.on_event(&EngineEvent::Compaction {
                tokens_before: before,
                tokens_after: report.input_tokens,
                aggressive,
            });
            if report.input_tokens <= limit {
                return Ok(report);
            }
            warn!(
                "Still {} tokens after {} compression (limit {limit})",
                report.input_tokens,
                if aggressive { "aggressive" } else { "normal" }
            );
        }

        warn!(
            "Token limit exceeded for {model}: {tokens_before} tokens before compression, {} after (limit {limit})",
            report.input_tokens
        );
        Err(EngineError::TokenLimitExceeded {
            tokens_before,
            current_tokens: report.input_tokens,
            limit,
            model_name: model.to_string(),
        })
    }

    /// Compress `memory` regardless of the threshold. Returns token counts of
    /// the memory before and after.
    pub async fn force_compact(&self, memory: &mut Vec<Message>) -> (usize, usize) {
        let before = self.token_counter.count_tokens(memory);
        self.compress_in_place(memory, false).await;
        let after = self.token_counter.count_tokens(memory);
        self.events.on_event(&EngineEvent::Compaction {
            tokens_before: before,
            tokens_after: after,
            aggressive: false,
        });
        (before, after)
    }

    async fn compress_in_place(&self, memory: &mut Vec<Message>, aggressive: bool) {
        let current = std::mem::take(memory);
        *memory = self.compressor.compress(current, aggressive).await;
    }

    fn prompt_tokens(&self, memory: &[Message], system_msg: &Message, env_msg: &Message) -> usize {
        let mut prompt = Vec::with_capacity(memory.len() + 2);
        prompt.push(system_msg.clone());
        prompt.extend_from_slice(memory);
        prompt.push(env_msg.clone());
        self.token_counter.count_tokens(&prompt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::events::NoopHandler;
    use crate::context::budget::{EstimatingTokenCounter, StaticContextLimits};
    use futures::FutureExt;
    use std::sync::Mutex;

    /// Keeps the last `keep` messages, or `aggressive_keep` when aggressive.
    struct TailCompressor {
        keep: usize,
        aggressive_keep: usize,
        calls: Mutex<Vec<bool>>,
    }

    impl TailCompressor {
        fn new(keep: usize, aggressive_keep: usize) -> Self {
            Self {
                keep,
                aggressive_keep,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl MemoryCompressor for TailCompressor {
        fn compress<'a>(
            &'a self,
            messages: Vec<Message>,
            aggressive: bool,
        ) -> BoxFuture<'a, Vec<Message>> {
            self.calls.lock().unwrap().push(aggressive);
            let keep = if aggressive {
                self.aggressive_keep
            } else {
                self.keep
            };
            let skip = messages.len().saturating_sub(keep);
            async move { messages.into_iter().skip(skip).collect() }.boxed()
        }
    }

    fn memory(n: usize) -> Vec<Message> {
        (0..n).map(|i| Message::user(format!("{i:0>10}"))).collect()
    }

    fn compactor<'a>(
        counter: &'a EstimatingTokenCounter,
        limits: &'a StaticContextLimits,
        compressor: &'a TailCompressor,
    ) -> Compactor<'a> {
        Compactor {
            token_counter: counter,
            context_limits: limits,
            compressor,
            events: &NoopHandler,
            threshold: 0.70,
        }
    }

    #[tokio::test]
    async fn under_threshold_does_nothing() {
        let counter = EstimatingTokenCounter::new().with_chars_per_token(1.0);
        let limits = StaticContextLimits::new().with_default(1_000);
        let compressor = TailCompressor::new(1, 0);
        let mut mem = memory(5);

        let report = compactor(&counter, &limits, &compressor)
            .ensure_within_budget("m", &mut mem, &Message::system("sys"), &Message::user("env"))
            .await
            .unwrap();

        assert_eq!(report.passes, 0);
        assert_eq!(report.input_tokens, 3 + 50 + 3);
        assert_eq!(mem.len(), 5);
        assert!(compressor.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn between_threshold_and_limit_compresses_once() {
        let counter = EstimatingTokenCounter::new().with_chars_per_token(1.0);
        // 10 messages * 10 chars = 100 tokens of memory; threshold at 70.
        let limits = StaticContextLimits::new().with_default(100);
        let compressor = TailCompressor::new(3, 1);
        let mut mem = memory(10);

        let report = compactor(&counter, &limits, &compressor)
            .ensure_within_budget("m", &mut mem, &Message::system(""), &Message::user(""))
            .await
            .unwrap();

        assert_eq!(report.passes, 1);
        assert_eq!(report.tokens_before, 100);
        assert_eq!(report.input_tokens, 30);
        assert_eq!(mem.len(), 3);
        assert_eq!(*compressor.calls.lock().unwrap(), vec![false]);
    }

    #[tokio::test]
    async fn second_aggressive_pass_when_still_over_limit() {
        let counter = EstimatingTokenCounter::new().with_chars_per_token(1.0);
        let limits = StaticContextLimits::new().with_default(50);
        let compressor = TailCompressor::new(8, 2);
        let mut mem = memory(10);

        let report = compactor(&counter, &limits, &compressor)
            .ensure_within_budget("m", &mut mem, &Message::system(""), &Message::user(""))
            .await
            .unwrap();

        assert_eq!(report.passes, 2);
        assert_eq!(report.input_tokens, 20);
        assert!(report.input_tokens <= report.context_limit);
        assert_eq!(*compressor.calls.lock().unwrap(), vec![false, true]);
    }

    #[tokio::test]
    async fn token_limit_exceeded_after_both_passes() {
        let counter = EstimatingTokenCounter::new().with_chars_per_token(1.0);
        let limits = StaticContextLimits::new().with_default(50);
        let compressor = TailCompressor::new(9, 8);
        let mut mem = memory(10);

        let err = compactor(&counter, &limits, &compressor)
            .ensure_within_budget("big-model", &mut mem, &Message::system(""), &Message::user(""))
            .await
            .unwrap_err();

        assert_eq!(
            err,
            EngineError::TokenLimitExceeded {
                tokens_before: 100,
                current_tokens: 80,
                limit: 50,
                model_name: "big-model".into(),
            }
        );
        assert!(!err.is_retryable());
        // Compressed memory is kept even though the check failed.
        assert_eq!(mem.len(), 8);
    }

    #[tokio::test]
    async fn force_compact_ignores_threshold() {
        let counter = EstimatingTokenCounter::new().with_chars_per_token(1.0);
        let limits = StaticContextLimits::new().with_default(1_000_000);
        let compressor = TailCompressor::new(2, 1);
        let mut mem = memory(4);

        let (before, after) = compactor(&counter, &limits, &compressor)
            .force_compact(&mut mem)
            .await;

        assert_eq!((before, after), (40, 20));
        assert_eq!(mem.len(), 2);
    }
}
