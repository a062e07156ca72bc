//! Tool execution service.
//!
//! The act dispatcher never runs tools directly (except the form-input
//! handshake). It hands [`ExecutionRequest`]s to a [`ParallelExecutor`] and
//! gets back one [`ExecutionResult`] per request, tagged with the request's
//! ordinal so results can be put back in order.

use std::sync::Arc;

use futures::FutureExt;
use futures::future::{BoxFuture, join_all};
use serde::Serialize;
use tracing::debug;

use super::core::ToolRegistry;
use crate::agent::config::PlanContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExecutionStatus {
    Success,
    Error,
    Interrupted,
}

/// One tool call to run.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionRequest {
    pub tool_name: String,
    /// Normalized JSON arguments.
    pub arguments: String,
    /// Correlation id (the tool call id).
    pub tool_call_id: String,
    /// Ordinal of the call within its batch.
    pub index: usize,
}

/// Outcome of one [`ExecutionRequest`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionResult {
    pub index: usize,
    pub status: ExecutionStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn success(index: usize, output: impl Into<String>) -> Self {
        Self {
            index,
            status: ExecutionStatus::Success,
            output: Some(output.into()),
            error: None,
        }
    }

    pub fn error(index: usize, error: impl Into<String>) -> Self {
        Self {
            index,
            status: ExecutionStatus::Error,
            output: None,
            error: Some(error.into()),
        }
    }

    pub fn interrupted(index: usize) -> Self {
        Self {
            index,
            status: ExecutionStatus::Interrupted,
            output: None,
            error: Some("Execution interrupted".into()),
        }
    }

    /// Text recorded on the tool param and sent back to the model.
    pub fn result_text(&self) -> String {
        match self.status {
            ExecutionStatus::Success => match self.output.as_deref() {
                Some(out) if !out.is_empty() => out.to_string(),
                _ => "No output".to_string(),
            },
            ExecutionStatus::Error | ExecutionStatus::Interrupted => match self.error.as_deref() {
                Some(err) => format!("Error: {err}"),
                None => "Unknown error".to_string(),
            },
        }
    }
}

/// Runs tool calls, either a batch at once or one at a time.
pub trait ParallelExecutor: Send + Sync {
    /// Run all requests. Completion order is unconstrained; the returned
    /// vector holds exactly one result per request.
    fn execute_many<'a>(
        &'a self,
        requests: Vec<ExecutionRequest>,
        plan: &'a PlanContext,
    ) -> BoxFuture<'a, Vec<ExecutionResult>>;

    fn execute_one<'a>(
        &'a self,
        request: ExecutionRequest,
        plan: &'a PlanContext,
    ) -> BoxFuture<'a, ExecutionResult>;
}

/// In-process executor backed by a [`ToolRegistry`].
#[derive(Debug, Clone)]
pub struct LocalParallelExecutor {
    registry: Arc<ToolRegistry>,
}

impl LocalParallelExecutor {
    pub fn new(registry: Arc<ToolRegistry>) -> Self {
        Self { registry }
    }

    async fn run(&self, request: ExecutionRequest) -> ExecutionResult {
        match self
            .registry
            .execute(&request.tool_name, &request.arguments)
            .await
        {
            Ok(output) => ExecutionResult::success(request.index, output),
            Err(e) => ExecutionResult::error(request.index, e),
        }
    }
}

impl ParallelExecutor for LocalParallelExecutor {
    fn execute_many<'a>(
        &'a self,
        requests: Vec<ExecutionRequest>,
        plan: &'a PlanContext,
    ) -> BoxFuture<'a, Vec<ExecutionResult>> {
        async move {
            debug!(
                "Executing {} tool call(s) in parallel for plan {}",
                requests.len(),
                plan.current_plan_id
            );
            let futures: Vec<_> = requests.into_iter().map(|r| self.run(r)).collect();
            join_all(futures).await
        }
        .boxed()
    }

    fn execute_one<'a>(
        &'a self,
        request: ExecutionRequest,
        _plan: &'a PlanContext,
    ) -> BoxFuture<'a, ExecutionResult> {
        self.run(request).boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ToolDef;
    use crate::tools::core::{Tool, ToolFuture};
    use std::time::Duration;

    struct DelayTool;

    impl Tool for DelayTool {
        fn definition(&self) -> ToolDef {
            ToolDef::new(
                "delay",
                "Sleeps then echoes",
                serde_json::json!({"type": "object", "properties": {"ms": {"type": "integer"}}}),
            )
        }

        fn execute(&self, arguments: &str) -> ToolFuture<'_> {
            let args: serde_json::Value = serde_json::from_str(arguments).unwrap_or_default();
            let ms = args["ms"].as_u64().unwrap_or(0);
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(ms)).await;
                format!("slept {ms}")
            })
        }
    }

    fn request(index: usize, name: &str, ms: u64) -> ExecutionRequest {
        ExecutionRequest {
            tool_name: name.into(),
            arguments: format!(r#"{{"ms": {ms}}}"#),
            tool_call_id: format!("call-{index}"),
            index,
        }
    }

    #[test]
    fn result_text_variants() {
        assert_eq!(ExecutionResult::success(0, "ok").result_text(), "ok");
        assert_eq!(ExecutionResult::success(0, "").result_text(), "No output");
        assert_eq!(
            ExecutionResult::error(0, "boom").result_text(),
            "Error: boom"
        );
        assert_eq!(
            ExecutionResult::interrupted(2).result_text(),
            "Error: Execution interrupted"
        );
        let bare = ExecutionResult {
            index: 0,
            status: ExecutionStatus::Error,
            output: None,
            error: None,
        };
        assert_eq!(bare.result_text(), "Unknown error");
    }

    #[tokio::test(start_paused = true)]
    async fn execute_many_returns_one_result_per_request() {
        let registry = Arc::new(ToolRegistry::new().with(DelayTool));
        let executor = LocalParallelExecutor::new(registry);
        let plan = PlanContext::root("plan-1");

        let results = executor
            .execute_many(
                vec![
                    request(0, "delay", 300),
                    request(1, "missing", 0),
                    request(2, "delay", 10),
                ],
                &plan,
            )
            .await;

        assert_eq!(results.len(), 3);
        let by_index = |i: usize| results.iter().find(|r| r.index == i).unwrap();
        assert_eq!(by_index(0).output.as_deref(), Some("slept 300"));
        assert_eq!(by_index(1).status, ExecutionStatus::Error);
        assert_eq!(by_index(2).output.as_deref(), Some("slept 10"));
    }

    #[tokio::test]
    async fn execute_one_runs_single_request() {
        let registry = Arc::new(ToolRegistry::new().with(DelayTool));
        let executor = LocalParallelExecutor::new(registry);
        let plan = PlanContext::root("plan-1");

        let result = executor.execute_one(request(4, "delay", 0), &plan).await;
        assert_eq!(result.index, 4);
        assert_eq!(result.status, ExecutionStatus::Success);
    }
}
