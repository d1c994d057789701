//! Ports bundled into an environment.
//!
//! These traits are the boundary between steps and the outside world (model
//! providers, tools, external memory, output streams). The kernel passes them
//! through untouched; only steps call them.
//!
//! Object-safety note: traits use `async-trait` so they can be held as
//! `Arc<dyn Port>`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::KernelResult;

/// Output streaming port.
#[async_trait]
pub trait SinkPort: Send + Sync {
    async fn send(&self, chunk: String) -> KernelResult<()>;
    async fn close(&self) -> KernelResult<()>;
}

/// Model completion port.
#[async_trait]
pub trait ModelPort: Send + Sync {
    async fn complete(&self, prompt: &str) -> KernelResult<String>;

    /// Complete and forward the output to `sink`.
    ///
    /// Providers without native streaming get a single chunk.
    async fn stream_complete(&self, prompt: &str, sink: &dyn SinkPort) -> KernelResult<String> {
        let text = self.complete(prompt).await?;
        sink.send(text.clone()).await?;
        Ok(text)
    }
}

/// Tool execution port.
#[async_trait]
pub trait ToolPort: Send + Sync {
    async fn call(&self, name: &str, arguments: Value) -> KernelResult<Value>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryQuery {
    pub limit: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
}

impl Default for MemoryQuery {
    fn default() -> Self {
        Self {
            limit: 256,
            text: None,
        }
    }
}

impl MemoryQuery {
    pub fn matching(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }
}

/// External knowledge store. Infrastructure, not domain state.
#[async_trait]
pub trait MemoryPort: Send + Sync {
    async fn append(&self, records: Vec<Value>) -> KernelResult<()>;
    async fn query(&self, query: MemoryQuery) -> KernelResult<Vec<Value>>;
    async fn clear(&self) -> KernelResult<()>;
    async fn close(&self) -> KernelResult<()>;
}
