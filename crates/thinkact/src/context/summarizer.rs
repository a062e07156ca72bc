//! Model-backed memory compression.
//!
//! Everything except a recency window is summarized in one model call and
//! replaced by a single user message flagged as a compression summary, so
//! the per-cycle memory rebuild keeps it. Earlier summaries are folded into
//! the new one rather than stacked.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, warn};

use super::compactor::MemoryCompressor;
use crate::api::model::{ModelClient, ModelRequest};
use crate::{Message, MessageRole};

const SUMMARIZATION_PROMPT: &str = "\
Summarize the following agent conversation concisely. Focus on:
- The user's original request
- Which tools were called and what they returned
- Key findings and decisions made
- Failed approaches and why they failed
- What remains to be done

Rules:
- Only include facts explicitly stated in the messages. Do not infer.
- Preserve identifiers, file paths, URLs, and error messages verbatim.
- If an existing summary is present, merge the new information into it. The \
  result must be a standalone summary that replaces the existing one.";

/// Messages kept verbatim after a normal pass.
pub const DEFAULT_KEEP_RECENT: usize = 6;
/// Messages kept verbatim after an aggressive pass.
pub const AGGRESSIVE_KEEP_RECENT: usize = 2;

/// Summarizes older memory with a model.
///
/// If the summarization call fails, a normal pass leaves memory unchanged and
/// an aggressive pass drops the older span behind a placeholder.
pub struct SummarizingCompressor {
    client: Arc<dyn ModelClient>,
    model: String,
    keep_recent: usize,
    aggressive_keep_recent: usize,
}

impl SummarizingCompressor {
    pub fn new(client: Arc<dyn ModelClient>, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            keep_recent: DEFAULT_KEEP_RECENT,
            aggressive_keep_recent: AGGRESSIVE_KEEP_RECENT,
        }
    }

    pub fn with_keep_recent(mut self, normal: usize, aggressive: usize) -> Self {
        self.keep_recent = normal;
        self.aggressive_keep_recent = aggressive.min(normal);
        self
    }

    async fn run(&self, messages: Vec<Message>, aggressive: bool) -> Vec<Message> {
        let keep = if aggressive {
            self.aggressive_keep_recent
        } else {
            self.keep_recent
        };
        let boundary = split_point(&messages, keep);
        if boundary == 0 {
            debug!("Nothing older than the recency window; memory left as is");
            return messages;
        }

        let mut messages = messages;
        let recent = messages.split_off(boundary);
        let older = messages;

        let request = ModelRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(SUMMARIZATION_PROMPT),
                Message::user(render_span(&older)),
            ],
            tools: Vec::new(),
        };

        let summary = match self.client.complete(&request).await {
            Ok(response) if !response.text.trim().is_empty() => response.text,
            Ok(_) => {
                warn!("Summarization returned no text");
                return fallback(older, recent, aggressive);
            }
            Err(e) => {
                warn!("Summarization failed: {e}");
                return fallback(older, recent, aggressive);
            }
        };

        debug!(
            "Summarized {} message(s) into {} chars, keeping {}",
            older.len(),
            summary.len(),
            recent.len()
        );
        let mut out = Vec::with_capacity(recent.len() + 1);
        out.push(Message::compression_summary(format!(
            "Summary of earlier conversation:\n{summary}"
        )));
        out.extend(recent);
        out
    }
}

impl MemoryCompressor for SummarizingCompressor {
    fn compress<'a>(
        &'a self,
        messages: Vec<Message>,
        aggressive: bool,
    ) -> BoxFuture<'a, Vec<Message>> {
        self.run(messages, aggressive).boxed()
    }
}

/// Index where the recency window starts. Never leaves a tool response at
/// the head of the window, since it would be orphaned from its tool call.
fn split_point(messages: &[Message], keep: usize) -> usize {
    let mut boundary = messages.len().saturating_sub(keep);
    while boundary > 0
        && messages
            .get(boundary)
            .is_some_and(|m| m.role == MessageRole::Tool)
    {
        boundary -= 1;
    }
    boundary
}

fn render_span(span: &[Message]) -> String {
    let mut content = String::new();
    for msg in span.iter().filter(|m| m.compression_summary) {
        content.push_str("=== EXISTING SUMMARY ===\n");
        content.push_str(msg.text());
        content.push_str("\n\n");
    }
    content.push_str("=== MESSAGES TO SUMMARIZE ===\n");
    for msg in span.iter().filter(|m| !m.compression_summary) {
        let text = msg.content.as_deref().unwrap_or("[no content]");
        content.push_str(&format!("[{}]: {text}\n", msg.role));
        for call in msg.tool_calls.iter().flatten() {
            content.push_str(&format!("  -> {}({})\n", call.name(), call.arguments()));
        }
        content.push('\n');
    }
    content
}

fn fallback(older: Vec<Message>, recent: Vec<Message>, aggressive: bool) -> Vec<Message> {
    if !aggressive {
        let mut all = older;
        all.extend(recent);
        return all;
    }
    let mut out = Vec::with_capacity(recent.len() + 1);
    out.push(Message::compression_summary(format!(
        "[Earlier conversation removed: {} message(s)]",
        older.len()
    )));
    out.extend(recent);
    out
}
