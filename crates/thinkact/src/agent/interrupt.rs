//! Cooperative cancellation.
//!
//! The engine asks an [`InterruptionChecker`] whether a root plan may keep
//! running at the start of think, before each retry attempt, at the start of
//! act, before each task of a sequential batch, and inside form waits.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

pub trait InterruptionChecker: Send + Sync {
    /// `false` means the plan rooted at `root_plan_id` must stop.
    fn continue_allowed(&self, root_plan_id: &str) -> bool;
}

/// Stop switch shared between the agent and whoever cancels it.
///
/// `stop()` halts every plan; `stop_plan()` halts one root plan.
#[derive(Debug, Default)]
pub struct StopFlag {
    all: AtomicBool,
    plans: Mutex<HashSet<String>>,
}

impl StopFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.all.store(true, Ordering::SeqCst);
    }

    pub fn stop_plan(&self, root_plan_id: impl Into<String>) {
        self.plans
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(root_plan_id.into());
    }

    /// Clear every stop request.
    pub fn reset(&self) {
        self.all.store(false, Ordering::SeqCst);
        self.plans.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

impl InterruptionChecker for StopFlag {
    fn continue_allowed(&self, root_plan_id: &str) -> bool {
        if self.all.load(Ordering::SeqCst) {
            return false;
        }
        !self
            .plans
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .contains(root_plan_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stop_all_and_per_plan() {
        let flag = StopFlag::new();
        assert!(flag.continue_allowed("a"));

        flag.stop_plan("a");
        assert!(!flag.continue_allowed("a"));
        assert!(flag.continue_allowed("b"));

        flag.stop();
        assert!(!flag.continue_allowed("b"));

        flag.reset();
        assert!(flag.continue_allowed("a"));
        assert!(flag.continue_allowed("b"));
    }
}
