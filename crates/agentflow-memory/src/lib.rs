//! # agentflow-memory: memory adapters
//!
//! - [`InMemoryStore`]: a process-local `MemoryPort` for external knowledge
//! - [`WorkingContext`]: execution-local context kept in domain state

mod context;
mod store;

pub use context::{WorkingContext, keep_last};
pub use store::InMemoryStore;
