use std::sync::atomic::{AtomicUsize, Ordering};

use agentflow_protocol::{KernelError, KernelResult, ModelPort, SinkPort};
use async_trait::async_trait;
use tracing::debug;

/// Deterministic model: each prompt prefix has a list of replies handed out
/// in turn, sticking on the last one.
pub struct ScriptedModel {
    scripts: Vec<Script>,
}

struct Script {
    prefix: &'static str,
    replies: Vec<&'static str>,
    served: AtomicUsize,
}

impl ScriptedModel {
    pub fn new() -> Self {
        Self { scripts: Vec::new() }
    }

    pub fn on(mut self, prefix: &'static str, replies: Vec<&'static str>) -> Self {
        self.scripts.push(Script {
            prefix,
            replies,
            served: AtomicUsize::new(0),
        });
        self
    }
}

#[async_trait]
impl ModelPort for ScriptedModel {
    async fn complete(&self, prompt: &str) -> KernelResult<String> {
        let script = self
            .scripts
            .iter()
            .find(|script| prompt.starts_with(script.prefix))
            .ok_or_else(|| KernelError::Model(format!("no scripted reply for prompt: {prompt}")))?;
        let turn = script.served.fetch_add(1, Ordering::SeqCst);
        let reply = script
            .replies
            .get(turn)
            .or(script.replies.last())
            .ok_or_else(|| KernelError::Model(format!("empty script for {}", script.prefix)))?;
        debug!(prefix = script.prefix, turn, "scripted completion");
        Ok((*reply).to_owned())
    }

    /// Streams the reply word by word.
    async fn stream_complete(&self, prompt: &str, sink: &dyn SinkPort) -> KernelResult<String> {
        let text = self.complete(prompt).await?;
        for word in text.split_inclusive(' ') {
            sink.send(word.to_owned()).await?;
        }
        Ok(text)
    }
}
