//! # agentflow-tools: tool calling
//!
//! Tool definitions handed to a model, the [`ToolRegistry`] that executes
//! [`ToolUse`] requests, and [`tool_step`] which plugs the registry into an
//! agent chain. The registry also implements `ToolPort` so it can sit in an
//! `Env`.

pub mod registry;
pub mod types;

pub use registry::{FnTool, ToolHandler, ToolRegistry, tool_step};
pub use types::{ToolDefinition, ToolOutput, ToolParameter, ToolUse};
