use std::fmt;
use std::sync::Arc;

use agentflow_protocol::{KernelError, KernelResult, MemoryPort, ModelPort, SinkPort, ToolPort};
use agentflow_trace::Trace;

/// What the kernel needs from an environment: its trace handle.
///
/// Everything else an environment carries is opaque to the kernel and only
/// read by steps.
pub trait Environment: Clone + Send + Sync + 'static {
    fn trace(&self) -> Option<&Trace>;

    /// The same environment with its trace handle replaced.
    fn with_trace(&self, trace: Trace) -> Self;
}

/// Default environment: a bundle of optional ports plus a trace.
#[derive(Clone, Default)]
pub struct Env {
    model: Option<Arc<dyn ModelPort>>,
    tools: Option<Arc<dyn ToolPort>>,
    memory: Option<Arc<dyn MemoryPort>>,
    sink: Option<Arc<dyn SinkPort>>,
    trace: Option<Trace>,
}

impl Env {
    pub fn builder() -> EnvBuilder {
        EnvBuilder::default()
    }

    pub fn model(&self) -> Option<&Arc<dyn ModelPort>> {
        self.model.as_ref()
    }

    pub fn tools(&self) -> Option<&Arc<dyn ToolPort>> {
        self.tools.as_ref()
    }

    pub fn memory(&self) -> Option<&Arc<dyn MemoryPort>> {
        self.memory.as_ref()
    }

    pub fn sink(&self) -> Option<&Arc<dyn SinkPort>> {
        self.sink.as_ref()
    }

    pub fn require_model(&self) -> KernelResult<&Arc<dyn ModelPort>> {
        self.model
            .as_ref()
            .ok_or_else(|| KernelError::InvalidConfig("environment has no model port".to_owned()))
    }

    pub fn require_tools(&self) -> KernelResult<&Arc<dyn ToolPort>> {
        self.tools
            .as_ref()
            .ok_or_else(|| KernelError::InvalidConfig("environment has no tool port".to_owned()))
    }

    pub fn require_memory(&self) -> KernelResult<&Arc<dyn MemoryPort>> {
        self.memory
            .as_ref()
            .ok_or_else(|| KernelError::InvalidConfig("environment has no memory port".to_owned()))
    }

    pub fn with_sink(&self, sink: Arc<dyn SinkPort>) -> Self {
        Self {
            sink: Some(sink),
            ..self.clone()
        }
    }
}

impl Environment for Env {
    fn trace(&self) -> Option<&Trace> {
        self.trace.as_ref()
    }

    fn with_trace(&self, trace: Trace) -> Self {
        Self {
            trace: Some(trace),
            ..self.clone()
        }
    }
}

impl fmt::Debug for Env {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Env")
            .field("model", &self.model.is_some())
            .field("tools", &self.tools.is_some())
            .field("memory", &self.memory.is_some())
            .field("sink", &self.sink.is_some())
            .field("trace", &self.trace)
            .finish()
    }
}

#[derive(Default)]
pub struct EnvBuilder {
    model: Option<Arc<dyn ModelPort>>,
    tools: Option<Arc<dyn ToolPort>>,
    memory: Option<Arc<dyn MemoryPort>>,
    sink: Option<Arc<dyn SinkPort>>,
    trace: Option<Trace>,
}

impl EnvBuilder {
    pub fn model(mut self, model: Arc<dyn ModelPort>) -> Self {
        self.model = Some(model);
        self
    }

    pub fn tools(mut self, tools: Arc<dyn ToolPort>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn memory(mut self, memory: Arc<dyn MemoryPort>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn SinkPort>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Start a fresh trace, enabled or not.
    pub fn trace(mut self, enabled: bool) -> Self {
        self.trace = Some(Trace::new(enabled));
        self
    }

    /// Share an existing trace handle.
    pub fn with_trace(mut self, trace: Trace) -> Self {
        self.trace = Some(trace);
        self
    }

    pub fn build(self) -> Env {
        Env {
            model: self.model,
            tools: self.tools,
            memory: self.memory,
            sink: self.sink,
            trace: self.trace,
        }
    }
}
