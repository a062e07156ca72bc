//! Append-only recording of think/act decisions.
//!
//! The engine writes one [`ThinkActRecord`] per successful think, one per
//! error-report tool call, and one per escalated failure, plus the action
//! results of every act phase. It never reads them back.

use std::sync::Mutex;

use chrono::{DateTime, Utc};

use super::task::ToolParam;

/// One recorded think/act decision.
#[derive(Debug, Clone)]
pub struct ThinkActRecord {
    pub think_act_id: String,
    pub step_id: String,
    /// Prompt text (or a synthetic description for error reports).
    pub think_input: String,
    pub think_output: String,
    pub error_message: Option<String>,
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub context_limit: usize,
    pub tool_params: Vec<ToolParam>,
    pub created_at: DateTime<Utc>,
}

impl ThinkActRecord {
    pub fn new(think_act_id: impl Into<String>, step_id: impl Into<String>) -> Self {
        Self {
            think_act_id: think_act_id.into(),
            step_id: step_id.into(),
            think_input: String::new(),
            think_output: String::new(),
            error_message: None,
            input_tokens: 0,
            output_tokens: 0,
            context_limit: 0,
            tool_params: Vec::new(),
            created_at: Utc::now(),
        }
    }
}

pub trait RecordSink: Send + Sync {
    fn record_think_act(&self, record: ThinkActRecord);

    /// Tool results of one act phase, keyed by step id.
    fn record_action_result(&self, step_id: &str, params: &[ToolParam]);
}

/// Discards everything.
pub struct NoopRecordSink;

impl RecordSink for NoopRecordSink {
    fn record_think_act(&self, _record: ThinkActRecord) {}
    fn record_action_result(&self, _step_id: &str, _params: &[ToolParam]) {}
}

/// Keeps records in memory. Used by tests and the CLI.
#[derive(Debug, Default)]
pub struct MemoryRecordSink {
    think_acts: Mutex<Vec<ThinkActRecord>>,
    action_results: Mutex<Vec<(String, Vec<ToolParam>)>>,
}

impl MemoryRecordSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn think_acts(&self) -> Vec<ThinkActRecord> {
        self.think_acts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn action_results(&self) -> Vec<(String, Vec<ToolParam>)> {
        self.action_results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

impl RecordSink for MemoryRecordSink {
    fn record_think_act(&self, record: ThinkActRecord) {
        self.think_acts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(record);
    }

    fn record_action_result(&self, step_id: &str, params: &[ToolParam]) {
        self.action_results
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((step_id.to_string(), params.to_vec()));
    }
}
