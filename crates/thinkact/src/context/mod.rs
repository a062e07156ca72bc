//! Context window management: token services and memory compaction.
//!
//! 1. **[`compactor`]**: the per-attempt budget check. Compresses agent
//!    memory above 70% of the model limit, retries aggressively, and fails
//!    with `TokenLimitExceeded` when nothing helps.
//!
//! 2. **[`budget`]**: default token services: a chars-per-token estimate
//!    and a static per-model limit table.
//!
//! 3. **[`summarizer`]**: the default [`MemoryCompressor`]: summarizes older
//!    memory with a model call and keeps a recency window verbatim.

pub mod budget;
pub mod compactor;
pub mod summarizer;

pub use budget::{DEFAULT_CHARS_PER_TOKEN, EstimatingTokenCounter, StaticContextLimits};
pub use compactor::{BudgetReport, Compactor, ContextLimits, MemoryCompressor, TokenCounter};
pub use summarizer::SummarizingCompressor;
