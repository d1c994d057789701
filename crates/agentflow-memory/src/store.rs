use agentflow_protocol::{KernelError, KernelResult, MemoryPort, MemoryQuery};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Default)]
struct StoreInner {
    records: Vec<Value>,
    closed: bool,
}

/// Process-local [`MemoryPort`] backed by a record list.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    inner: Mutex<StoreInner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl MemoryPort for InMemoryStore {
    async fn append(&self, records: Vec<Value>) -> KernelResult<()> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(KernelError::Closed("memory store".to_owned()));
        }
        debug!(records = records.len(), "memory append");
        inner.records.extend(records);
        Ok(())
    }

    /// The most recent `limit` matching records, oldest first. A text filter
    /// matches as a substring of the record's JSON rendering.
    async fn query(&self, query: MemoryQuery) -> KernelResult<Vec<Value>> {
        let inner = self.inner.lock();
        let mut hits: Vec<Value> = inner
            .records
            .iter()
            .rev()
            .filter(|record| match &query.text {
                Some(text) => record.to_string().contains(text.as_str()),
                None => true,
            })
            .take(query.limit)
            .cloned()
            .collect();
        hits.reverse();
        Ok(hits)
    }

    async fn clear(&self) -> KernelResult<()> {
        self.inner.lock().records.clear();
        Ok(())
    }

    async fn close(&self) -> KernelResult<()> {
        self.inner.lock().closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use agentflow_protocol::{KernelError, MemoryPort, MemoryQuery};
    use anyhow::Result;
    use serde_json::json;

    use super::InMemoryStore;

    #[tokio::test]
    async fn query_returns_most_recent_matches_oldest_first() -> Result<()> {
        let store = InMemoryStore::new();
        store
            .append(vec![
                json!({"topic": "rust", "n": 1}),
                json!({"topic": "go", "n": 2}),
                json!({"topic": "rust", "n": 3}),
                json!({"topic": "rust", "n": 4}),
            ])
            .await?;

        let all = store.query(MemoryQuery::default()).await?;
        assert_eq!(all.len(), 4);

        let query = MemoryQuery {
            limit: 2,
            ..MemoryQuery::matching("rust")
        };
        let hits = store.query(query).await?;
        assert_eq!(hits, vec![json!({"topic": "rust", "n": 3}), json!({"topic": "rust", "n": 4})]);
        Ok(())
    }

    #[tokio::test]
    async fn closed_store_rejects_appends() -> Result<()> {
        let store = InMemoryStore::new();
        store.append(vec![json!("kept")]).await?;
        store.close().await?;

        assert!(matches!(store.append(vec![json!("late")]).await, Err(KernelError::Closed(_))));
        assert_eq!(store.query(MemoryQuery::default()).await?, vec![json!("kept")]);

        store.clear().await?;
        assert!(store.is_empty());
        Ok(())
    }
}
