//! # agentflow-kernel: agent composition
//!
//! An [`Agent`] turns `(state, env)` into a `StepResult`. Agents compose with
//! [`Agent::then`], [`Agent::map`], [`Agent::try_map`] and [`Agent::recover`];
//! only a `Continue` with a value lets the next step run, every other control
//! passes through untouched.
//!
//! ## Module Overview
//!
//! - [`agent`]: Agent and its combinators, traced `run`
//! - [`env`]: Environment trait, the default Env and its builder
//! - [`retry`]: step wrapper honoring RetryClean/RetryDirty locally
//! - [`sink`]: CallbackSink and BufferSink

pub mod agent;
pub mod env;
pub mod retry;
pub mod sink;

pub use agent::Agent;
pub use env::{Env, EnvBuilder, Environment};
pub use retry::{RetryPolicy, retry};
pub use sink::{BufferSink, CallbackSink};

pub use agentflow_protocol::{Control, ControlKind, Fault, KernelError, KernelResult, StepResult};
pub use agentflow_trace::{Evidence, Trace};
