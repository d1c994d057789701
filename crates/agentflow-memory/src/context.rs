use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Execution-local working context.
///
/// Part of domain state, so it is persistent-style: every mutation returns a
/// new context and leaves the receiver unchanged. Clones share storage until
/// one of them is modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkingContext<T = Value> {
    entries: Arc<Vec<T>>,
}

impl<T> Default for WorkingContext<T> {
    fn default() -> Self {
        Self {
            entries: Arc::new(Vec::new()),
        }
    }
}

impl<T: Clone> WorkingContext<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, entry: T) -> Self {
        let mut next = self.clone();
        Arc::make_mut(&mut next.entries).push(entry);
        next
    }

    pub fn query<'a, P>(&'a self, predicate: P) -> impl Iterator<Item = &'a T> + 'a
    where
        P: Fn(&T) -> bool + 'a,
    {
        self.entries.iter().filter(move |entry| predicate(entry))
    }

    pub fn snapshot(&self) -> &[T] {
        &self.entries
    }

    /// Apply a trim policy to a copy of the entries.
    pub fn trim<P>(&self, policy: P) -> Self
    where
        P: FnOnce(Vec<T>) -> Vec<T>,
    {
        Self {
            entries: Arc::new(policy(self.entries.as_ref().clone())),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Clone> FromIterator<T> for WorkingContext<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self {
            entries: Arc::new(iter.into_iter().collect()),
        }
    }
}

/// Trim policy keeping the newest `n` entries.
pub fn keep_last<T>(n: usize) -> impl FnOnce(Vec<T>) -> Vec<T> {
    move |mut entries| {
        let excess = entries.len().saturating_sub(n);
        entries.drain(..excess);
        entries
    }
}
