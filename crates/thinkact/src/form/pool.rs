//! Dedicated worker pool for form-input waits.
//!
//! A human may take minutes to fill in a form. Those waits run on their own
//! small tokio runtime, bounded by a semaphore, so they never occupy the
//! runtime that drives model calls and tool execution. Each engine owns its
//! pool; dropping the engine shuts the pool down.

use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::{Handle, Runtime};
use tokio::sync::Semaphore;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::agent::interrupt::InterruptionChecker;
use crate::error::EngineError;
use crate::tools::core::{InputState, Tool};

/// Timing of one form wait.
#[derive(Debug, Clone, Copy)]
pub struct FormWaitSettings {
    /// Give up after this long.
    pub timeout: Duration,
    pub poll_interval: Duration,
    /// How often the interruption checker is consulted.
    pub interruption_check_interval: Duration,
}

pub struct FormWaitPool {
    runtime: Option<Runtime>,
    handle: Handle,
    permits: Arc<Semaphore>,
}

impl FormWaitPool {
    /// Start a pool with `size` worker threads and at most `size`
    /// concurrent waits.
    pub fn new(size: usize) -> Result<Self, EngineError> {
        let size = size.max(1);
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(size)
            .thread_name("form-wait")
            .enable_time()
            .build()
            .map_err(|e| EngineError::Execution(format!("failed to start form wait pool: {e}")))?;
        Ok(Self {
            handle: runtime.handle().clone(),
            runtime: Some(runtime),
            permits: Arc::new(Semaphore::new(size)),
        })
    }

    /// Wait until the form-input `tool` leaves the awaiting state.
    ///
    /// Timeout and interruption both end in the tool's own timeout handling;
    /// the returned state is whatever the tool reports afterwards.
    pub async fn wait(
        &self,
        tool: Arc<dyn Tool>,
        settings: FormWaitSettings,
        interruption: Arc<dyn InterruptionChecker>,
        root_plan_id: String,
    ) -> InputState {
        let Ok(permit) = self.permits.clone().acquire_owned().await else {
            return expire(tool.as_ref());
        };

        let waiting_tool = tool.clone();
        let task = self.handle.spawn(async move {
            let _permit = permit;
            poll_until_resolved(waiting_tool.as_ref(), settings, interruption.as_ref(), &root_plan_id)
                .await
        });

        match task.await {
            Ok(state) => state,
            Err(e) => {
                warn!("Form wait task failed: {e}");
                expire(tool.as_ref())
            }
        }
    }
}

impl Drop for FormWaitPool {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn poll_until_resolved(
    tool: &dyn Tool,
    settings: FormWaitSettings,
    interruption: &dyn InterruptionChecker,
    root_plan_id: &str,
) -> InputState {
    let Some(form) = tool.as_form_input() else {
        return InputState::Idle;
    };
    let start = Instant::now();
    let mut last_check = start;

    loop {
        let state = form.input_state();
        if state != InputState::AwaitingUserInput {
            debug!("Form {} resolved after {:?}", tool.name(), start.elapsed());
            return state;
        }

        if start.elapsed() >= settings.timeout {
            info!(
                "Form {} timed out after {:?}",
                tool.name(),
                settings.timeout
            );
            form.handle_input_timeout();
            return form.input_state();
        }

        if last_check.elapsed() >= settings.interruption_check_interval {
            last_check = Instant::now();
            if !interruption.continue_allowed(root_plan_id) {
                info!("Plan {root_plan_id} interrupted while form {} was waiting", tool.name());
                form.handle_input_timeout();
                return form.input_state();
            }
        }

        tokio::time::sleep(settings.poll_interval).await;
    }
}

fn expire(tool: &dyn Tool) -> InputState {
    match tool.as_form_input() {
        Some(form) => {
            form.handle_input_timeout();
            form.input_state()
        }
        None => InputState::Idle,
    }
}
