//! Tools: trait, registry, built-ins, and the execution service.

pub mod args;
pub mod builtin;
pub mod core;
pub mod form_input;
pub mod parallel;

pub use args::{normalize_arguments, parse_tool_args};
pub use builtin::{ErrorReportTool, SystemErrorReportTool, TerminateTool, ThinkTool};
pub use core::{
    ErrorReportKind, FormInput, InputState, Terminable, Tool, ToolFuture, ToolRegistry,
};
pub use form_input::FormInputTool;
pub use parallel::{
    ExecutionRequest, ExecutionResult, ExecutionStatus, LocalParallelExecutor, ParallelExecutor,
};
