//! Model client boundary and retry policy.
//!
//! - **[`model`]**: the [`ModelClient`] trait the think phase calls.
//! - **[`scripted`]**: a transcript-replaying client for tests and the CLI.
//! - **[`retry`]**: backoff schedule and retryable-error classification.

pub mod model;
pub mod retry;
pub mod scripted;

pub use model::{ModelClient, ModelRequest, ModelResponse};
pub use retry::RetryConfig;
pub use scripted::{ScriptedModelClient, ScriptedTurn};
