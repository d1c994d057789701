//! # agentflow-protocol: kernel contracts
//!
//! Shared types and trait interfaces every agentflow crate depends on: the
//! control/result algebra steps report through, the kernel error taxonomy,
//! typed ids and the ports an environment bundles.
//!
//! No async runtime dependency; tokio is only used by the tests.
//!
//! ## Module Overview
//!
//! - [`control`]: Control (five-way directive), ControlKind, Fault
//! - [`result`]: StepResult, the `(state, value, control)` triple
//! - [`ids`]: RunId, CallId, EventId
//! - [`ports`]: ModelPort, ToolPort, MemoryPort, SinkPort
//! - [`error`]: KernelError, KernelResult

pub mod control;
pub mod error;
pub mod ids;
pub mod ports;
pub mod result;

pub use control::{Control, ControlKind, Fault};
pub use error::{KernelError, KernelResult};
pub use ids::{CallId, EventId, RunId};
pub use ports::{MemoryPort, MemoryQuery, ModelPort, SinkPort, ToolPort};
pub use result::StepResult;
