//! Pending-form registry: at most one form awaiting input per root plan.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::FutureExt;
use futures::future::BoxFuture;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::tools::core::Tool;

/// A registered form.
#[derive(Clone)]
pub struct PendingForm {
    pub tool: Arc<dyn Tool>,
    /// Plan (root or sub-plan) that owns the form.
    pub current_plan_id: String,
}

impl fmt::Debug for PendingForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingForm")
            .field("tool", &self.tool.name())
            .field("current_plan_id", &self.current_plan_id)
            .finish()
    }
}

pub trait FormRegistry: Send + Sync {
    /// Register `tool` as the pending form of `root_plan_id`.
    ///
    /// While another plan under the same root holds a pending form, this
    /// waits for it to be removed. Returns `false` if that does not happen
    /// in time.
    fn store_exclusive<'a>(
        &'a self,
        root_plan_id: &'a str,
        tool: Arc<dyn Tool>,
        current_plan_id: &'a str,
    ) -> BoxFuture<'a, bool>;

    fn remove(&self, root_plan_id: &str);

    fn pending(&self, root_plan_id: &str) -> Option<PendingForm>;
}

/// In-process registry. Waiters are woken whenever a form is removed.
pub struct InMemoryFormRegistry {
    forms: Mutex<HashMap<String, PendingForm>>,
    released: Notify,
    store_timeout: Duration,
}

impl InMemoryFormRegistry {
    pub fn new(store_timeout: Duration) -> Self {
        Self {
            forms: Mutex::new(HashMap::new()),
            released: Notify::new(),
            store_timeout,
        }
    }

    /// Insert unless another plan holds the slot. A plan may replace its own
    /// earlier form (e.g. one left behind by a timeout).
    fn try_insert(&self, root_plan_id: &str, tool: &Arc<dyn Tool>, current_plan_id: &str) -> bool {
        let mut forms = self.forms.lock().unwrap_or_else(|e| e.into_inner());
        match forms.get(root_plan_id) {
            Some(existing) if existing.current_plan_id != current_plan_id => false,
            _ => {
                forms.insert(
                    root_plan_id.to_string(),
                    PendingForm {
                        tool: tool.clone(),
                        current_plan_id: current_plan_id.to_string(),
                    },
                );
                true
            }
        }
    }

    async fn store(&self, root_plan_id: &str, tool: Arc<dyn Tool>, current_plan_id: &str) -> bool {
        let deadline = Instant::now() + self.store_timeout;
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.try_insert(root_plan_id, &tool, current_plan_id) {
                debug!("Stored pending form for root plan {root_plan_id} (plan {current_plan_id})");
                return true;
            }

            debug!("Root plan {root_plan_id} already has a pending form; waiting");
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                warn!(
                    "Timed out after {:?} waiting to store form for root plan {root_plan_id}",
                    self.store_timeout
                );
                return false;
            }
        }
    }
}

impl Default for InMemoryFormRegistry {
    fn default() -> Self {
        Self::new(Duration::from_secs(30))
    }
}

impl FormRegistry for InMemoryFormRegistry {
    fn store_exclusive<'a>(
        &'a self,
        root_plan_id: &'a str,
        tool: Arc<dyn Tool>,
        current_plan_id: &'a str,
    ) -> BoxFuture<'a, bool> {
        self.store(root_plan_id, tool, current_plan_id).boxed()
    }

    fn remove(&self, root_plan_id: &str) {
        let removed = self
            .forms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(root_plan_id);
        if removed.is_some() {
            debug!("Removed pending form for root plan {root_plan_id}");
            self.released.notify_waiters();
        }
    }

    fn pending(&self, root_plan_id: &str) -> Option<PendingForm> {
        self.forms
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(root_plan_id)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::FormInputTool;

    fn form() -> Arc<dyn Tool> {
        Arc::new(FormInputTool::new("default"))
    }

    #[tokio::test]
    async fn store_and_remove() {
        let registry = InMemoryFormRegistry::default();
        assert!(registry.store_exclusive("root", form(), "root").await);
        assert_eq!(registry.pending("root").unwrap().current_plan_id, "root");

        registry.remove("root");
        assert!(registry.pending("root").is_none());
    }

    #[tokio::test]
    async fn same_plan_may_replace_its_form() {
        let registry = InMemoryFormRegistry::new(Duration::from_millis(10));
        assert!(registry.store_exclusive("root", form(), "sub-1").await);
        assert!(registry.store_exclusive("root", form(), "sub-1").await);
    }

    #[tokio::test(start_paused = true)]
    async fn other_plan_times_out_while_slot_is_held() {
        let registry = InMemoryFormRegistry::new(Duration::from_secs(30));
        assert!(registry.store_exclusive("root", form(), "sub-1").await);
        assert!(!registry.store_exclusive("root", form(), "sub-2").await);
        assert!(registry.store_exclusive("other-root", form(), "sub-2").await);
    }

    #[tokio::test]
    async fn waiter_proceeds_once_slot_is_released() {
        let registry = Arc::new(InMemoryFormRegistry::new(Duration::from_secs(5)));
        assert!(registry.store_exclusive("root", form(), "sub-1").await);

        let waiter = {
            let registry = registry.clone();
            tokio::spawn(async move { registry.store_exclusive("root", form(), "sub-2").await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        registry.remove("root");

        assert!(waiter.await.unwrap());
        assert_eq!(registry.pending("root").unwrap().current_plan_id, "sub-2");
    }
}
