//! Human-input support for form-input tools.
//!
//! - [`registry`]: the pending-form registry. At most one form per root plan
//!   awaits input at a time; other sub-plans queue behind it.
//! - [`pool`]: the dedicated, bounded pool that form waits run on.

pub mod pool;
pub mod registry;

pub use pool::{FormWaitPool, FormWaitSettings};
pub use registry::{FormRegistry, InMemoryFormRegistry, PendingForm};
