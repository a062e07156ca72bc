//! The think-act agent and the types around it.
//!
//! - [`engine`]: [`ThinkActAgent`] and its [`Collaborators`].
//! - [`think`]: the retrying model call.
//! - [`dispatch`]: parallel or sequential tool execution, form-input waits.
//! - [`reduce`]: result folding, memory rebuild, loop detection.
//! - [`escalation`]: the failure report after exhausted retries.

pub mod config;
pub mod dispatch;
pub mod engine;
pub mod escalation;
pub mod events;
pub mod ids;
pub mod interrupt;
pub mod record;
pub mod reduce;
pub mod task;
pub mod think;

pub use config::{EngineConfig, PlanContext};
pub use engine::{Collaborators, ThinkActAgent};
pub use escalation::{FailureContext, failure_message};
pub use events::{
    AgentExecResult, AgentState, CompositeEventHandler, EngineEvent, EventHandler,
    FnEventHandler, LoggingHandler, NoopHandler,
};
pub use ids::IdGenerator;
pub use interrupt::{InterruptionChecker, StopFlag};
pub use record::{MemoryRecordSink, NoopRecordSink, RecordSink, ThinkActRecord};
pub use reduce::filter_memory;
pub use task::{ExecutionTask, ToolContext, ToolParam};
pub use think::ThinkOutcome;
