use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use agentflow_protocol::{KernelError, KernelResult, SinkPort};
use async_trait::async_trait;
use parking_lot::Mutex;

/// Forwards every chunk to a callback. Sends after `close` fail.
pub struct CallbackSink {
    callback: Box<dyn Fn(&str) + Send + Sync>,
    closed: AtomicBool,
}

impl CallbackSink {
    pub fn new(callback: impl Fn(&str) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
            closed: AtomicBool::new(false),
        }
    }
}

impl fmt::Debug for CallbackSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackSink")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SinkPort for CallbackSink {
    async fn send(&self, chunk: String) -> KernelResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(KernelError::Closed("callback sink".to_owned()));
        }
        (self.callback)(&chunk);
        Ok(())
    }

    async fn close(&self) -> KernelResult<()> {
        self.closed.store(true, Ordering::Release);
        Ok(())
    }
}

/// Collects chunks in memory.
#[derive(Debug, Default)]
pub struct BufferSink {
    chunks: Mutex<Vec<String>>,
}

impl BufferSink {
    pub fn chunks(&self) -> Vec<String> {
        self.chunks.lock().clone()
    }

    pub fn joined(&self) -> String {
        self.chunks.lock().concat()
    }
}

#[async_trait]
impl SinkPort for BufferSink {
    async fn send(&self, chunk: String) -> KernelResult<()> {
        self.chunks.lock().push(chunk);
        Ok(())
    }

    async fn close(&self) -> KernelResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agentflow_protocol::{KernelError, SinkPort};
    use parking_lot::Mutex;

    use super::{BufferSink, CallbackSink};

    #[tokio::test]
    async fn callback_sink_forwards_until_closed() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let captured = seen.clone();
        let sink = CallbackSink::new(move |chunk| captured.lock().push(chunk.to_owned()));

        sink.send("a".to_owned()).await.unwrap();
        sink.send("b".to_owned()).await.unwrap();
        sink.close().await.unwrap();
        assert!(matches!(sink.send("c".to_owned()).await, Err(KernelError::Closed(_))));
        assert_eq!(*seen.lock(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn buffer_sink_joins_chunks() {
        let sink = BufferSink::default();
        sink.send("hello ".to_owned()).await.unwrap();
        sink.send("world".to_owned()).await.unwrap();
        assert_eq!(sink.chunks().len(), 2);
        assert_eq!(sink.joined(), "hello world");
    }
}
