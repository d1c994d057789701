//! Error types for the agentflow kernel.

use crate::control::ControlKind;
use thiserror::Error;

/// Errors raised by the kernel itself and by the ports it hands to steps.
///
/// Step failures never surface here: the composition operators turn them into
/// [`Control::Error`](crate::Control::Error). What does surface here travels
/// the kernel error channel and propagates out of `run()` uncaught.
#[derive(Debug, Error)]
pub enum KernelError {
    #[error("no value present (control: {control})")]
    NoValue { control: ControlKind },
    #[error("agent not found in registry: {0}")]
    AgentNotFound(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("model error: {0}")]
    Model(String),
    #[error("tool not found: {0}")]
    ToolNotFound(String),
    #[error("tool error: {0}")]
    Tool(String),
    #[error("memory error: {0}")]
    Memory(String),
    #[error("sink error: {0}")]
    Sink(String),
    #[error("port closed: {0}")]
    Closed(String),
}

/// Convenience result type for kernel operations.
pub type KernelResult<T> = Result<T, KernelError>;
