//! Convenience re-exports for building and running an agent.
//!
//! ```ignore
//! use thinkact::prelude::*;
//! ```

pub use crate::agent::{
    AgentExecResult, AgentState, Collaborators, CompositeEventHandler, EngineConfig, EngineEvent,
    EventHandler, FnEventHandler, InterruptionChecker, LoggingHandler, MemoryRecordSink,
    NoopHandler, PlanContext, RecordSink, StopFlag, ThinkActAgent, ThinkActRecord,
};
pub use crate::api::{ModelClient, ModelRequest, ModelResponse, RetryConfig, ScriptedModelClient};
pub use crate::context::{
    ContextLimits, EstimatingTokenCounter, MemoryCompressor, StaticContextLimits,
    SummarizingCompressor, TokenCounter,
};
pub use crate::form::{FormRegistry, InMemoryFormRegistry};
pub use crate::tools::{
    ErrorReportTool, FormInputTool, LocalParallelExecutor, ParallelExecutor,
    SystemErrorReportTool, TerminateTool, ThinkTool, Tool, ToolFuture, ToolRegistry,
};
pub use crate::{EngineError, Message, ModelError, ToolCall, ToolDef};
