//! Identifier generation for think/act records and tool calls.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

/// Generates unique ids from a timestamp and a process-wide counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdGenerator;

impl IdGenerator {
    pub fn think_act_id(&self) -> String {
        next_id("ta")
    }

    pub fn tool_call_id(&self) -> String {
        next_id("call")
    }
}

fn next_id(prefix: &str) -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    // The counter keeps ids unique within one clock tick.
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{prefix}-{ts:x}-{count:04x}")
}
