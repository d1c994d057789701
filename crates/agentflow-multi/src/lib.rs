//! # agentflow-multi: multi-agent combinators
//!
//! Agents over a shared [`MultiState`] that find each other by name through an
//! [`AgentRegistry`] carried in the [`MultiEnv`].
//!
//! ## Module Overview
//!
//! - [`state`]: MultiState and the opt-in `merge_states` helper
//! - [`registry`]: AgentRegistry, MultiEnv, the MultiAgent alias
//! - [`ops`]: handoff, route, emit, concurrent, repeat
//!
//! `concurrent` and `repeat` are generic over state, value and environment
//! and work with any [`Agent`](agentflow_kernel::Agent), not only multi-agents.

pub mod ops;
pub mod registry;
pub mod state;

pub use ops::{concurrent, emit, handoff, repeat, route};
pub use registry::{AgentRegistry, MultiAgent, MultiEnv};
pub use state::{MultiState, merge_states};
