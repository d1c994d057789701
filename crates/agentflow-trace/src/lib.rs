//! Run-scoped evidence trace.
//!
//! A [`Trace`] is an append-only log of [`Evidence`] plus a LIFO stack of open
//! event ids. Nested `Agent::run` calls push their `step_begin` id so that
//! events recorded underneath are parented automatically.
//!
//! Performance contract:
//! - a disabled trace holds no allocation and every `record` is one branch
//! - appends are O(1)
//! - the parent/child tree is never built during execution, only by
//!   [`Trace::as_tree`] and [`Trace::render`]

mod evidence;

use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use agentflow_protocol::{EventId, RunId};
use chrono::Utc;
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::trace;

pub use evidence::Evidence;

#[derive(Debug, Default)]
struct TraceLog {
    events: Vec<Evidence>,
    next_id: u64,
}

#[derive(Debug, Clone)]
struct TraceScope {
    run_id: RunId,
    log: Arc<Mutex<TraceLog>>,
    stack: Arc<Mutex<Vec<EventId>>>,
}

/// Handle to a run's trace. Clones share the same log and stack.
///
/// `Trace::default()` is disabled.
#[derive(Debug, Clone, Default)]
pub struct Trace {
    scope: Option<TraceScope>,
}

impl Trace {
    pub fn new(enabled: bool) -> Self {
        if enabled {
            Self::enabled()
        } else {
            Self::disabled()
        }
    }

    pub fn enabled() -> Self {
        Self {
            scope: Some(TraceScope {
                run_id: RunId::default(),
                log: Arc::new(Mutex::new(TraceLog::default())),
                stack: Arc::new(Mutex::new(Vec::new())),
            }),
        }
    }

    pub fn disabled() -> Self {
        Self { scope: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.scope.is_some()
    }

    pub fn run_id(&self) -> Option<&RunId> {
        self.scope.as_ref().map(|scope| &scope.run_id)
    }

    /// Record an event and return its id, or `None` when disabled.
    ///
    /// Without an explicit `parent_id` the event is parented under the top of
    /// the stack, if any. Non-object `info` is stored under a `"value"` key.
    pub fn record(
        &self,
        action: &str,
        info: Option<Value>,
        parent_id: Option<EventId>,
        duration: Option<Duration>,
    ) -> Option<EventId> {
        let scope = self.scope.as_ref()?;

        let parent_id = parent_id.or_else(|| scope.stack.lock().last().copied());
        let mut log = scope.log.lock();
        let id = EventId::new(log.next_id);
        log.next_id += 1;
        log.events.push(Evidence {
            id,
            parent_id,
            action: action.to_owned(),
            timestamp: Utc::now(),
            info: evidence::info_map(info),
            duration,
        });
        trace!(event_id = id.get(), action, "evidence recorded");
        Some(id)
    }

    /// Shorthand for an event with no info, implicit parent and no duration.
    pub fn mark(&self, action: &str) -> Option<EventId> {
        self.record(action, None, None, None)
    }

    /// Make `id` the implicit parent of subsequent records.
    pub fn push(&self, id: EventId) {
        if let Some(scope) = &self.scope {
            scope.stack.lock().push(id);
        }
    }

    pub fn pop(&self) -> Option<EventId> {
        self.scope.as_ref()?.stack.lock().pop()
    }

    /// The implicit parent for the next record.
    pub fn current_parent(&self) -> Option<EventId> {
        self.scope.as_ref()?.stack.lock().last().copied()
    }

    /// A handle sharing this log and id counter with its own stack, seeded
    /// with `parent`. Concurrent branches each get one so their nesting never
    /// interleaves.
    pub fn fork(&self, parent: Option<EventId>) -> Self {
        Self {
            scope: self.scope.as_ref().map(|scope| TraceScope {
                run_id: scope.run_id.clone(),
                log: scope.log.clone(),
                stack: Arc::new(Mutex::new(parent.into_iter().collect())),
            }),
        }
    }

    /// Snapshot of all events in record order.
    pub fn events(&self) -> Vec<Evidence> {
        match &self.scope {
            Some(scope) => scope.log.lock().events.clone(),
            None => Vec::new(),
        }
    }

    pub fn find(&self, action: &str) -> Vec<Evidence> {
        match &self.scope {
            Some(scope) => scope
                .log
                .lock()
                .events
                .iter()
                .filter(|event| event.action == action)
                .cloned()
                .collect(),
            None => Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.scope
            .as_ref()
            .map(|scope| scope.log.lock().events.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Parent id to child ids, in record order. Roots sit under `None`.
    pub fn as_tree(&self) -> IndexMap<Option<EventId>, Vec<EventId>> {
        let mut tree: IndexMap<Option<EventId>, Vec<EventId>> = IndexMap::new();
        if let Some(scope) = &self.scope {
            for event in &scope.log.lock().events {
                tree.entry(event.parent_id).or_default().push(event.id);
            }
        }
        tree
    }

    /// Indented text rendering of the event tree, one event per line.
    pub fn render(&self) -> String {
        let events = self.events();
        let tree = self.as_tree();
        let mut out = String::new();
        let mut pending: Vec<(EventId, usize)> = tree
            .get(&None)
            .map(|roots| roots.iter().rev().map(|id| (*id, 0)).collect())
            .unwrap_or_default();

        while let Some((id, depth)) = pending.pop() {
            let Some(event) = events.get(id.get() as usize) else {
                continue;
            };
            let _ = write!(out, "{:indent$}#{} {}", "", event.id, event.action, indent = depth * 2);
            if let Some(control) = event.control() {
                let _ = write!(out, " [{control}]");
            }
            if let Some(duration) = event.duration {
                let _ = write!(out, " ({:.3}ms)", duration.as_secs_f64() * 1000.0);
            }
            out.push('\n');
            if let Some(children) = tree.get(&Some(id)) {
                pending.extend(children.iter().rev().map(|child| (*child, depth + 1)));
            }
        }
        out
    }

    /// Drop all events and reset the id counter and stack.
    pub fn clear(&self) {
        if let Some(scope) = &self.scope {
            let mut log = scope.log.lock();
            log.events.clear();
            log.next_id = 0;
            scope.stack.lock().clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use agentflow_protocol::EventId;
    use serde_json::json;

    use crate::Trace;

    #[test]
    fn disabled_trace_records_nothing() {
        let trace = Trace::disabled();
        for _ in 0..10 {
            assert_eq!(trace.mark("step_begin"), None);
        }
        assert_eq!(trace.len(), 0);
        assert!(trace.events().is_empty());
        assert!(trace.as_tree().is_empty());
        assert!(trace.run_id().is_none());
    }

    #[test]
    fn enabled_trace_assigns_increasing_ids_from_zero() {
        let trace = Trace::enabled();
        let ids: Vec<u64> = (0..5)
            .filter_map(|i| trace.mark(&format!("event_{i}")))
            .map(EventId::get)
            .collect();
        assert_eq!(ids, vec![0, 1, 2, 3, 4]);

        let actions: Vec<String> = trace.events().into_iter().map(|e| e.action).collect();
        assert_eq!(actions, vec!["event_0", "event_1", "event_2", "event_3", "event_4"]);
    }

    #[test]
    fn stack_top_becomes_implicit_parent() {
        let trace = Trace::enabled();
        let outer = trace.mark("outer").unwrap();
        trace.push(outer);
        let inner = trace.mark("inner").unwrap();
        trace.push(inner);
        let leaf = trace.mark("leaf").unwrap();
        assert_eq!(trace.pop(), Some(inner));
        let sibling = trace.mark("sibling").unwrap();
        assert_eq!(trace.pop(), Some(outer));
        assert_eq!(trace.pop(), None);

        let events = trace.events();
        assert_eq!(events[inner.get() as usize].parent_id, Some(outer));
        assert_eq!(events[leaf.get() as usize].parent_id, Some(inner));
        assert_eq!(events[sibling.get() as usize].parent_id, Some(outer));
    }

    #[test]
    fn explicit_parent_overrides_stack() {
        let trace = Trace::enabled();
        let root = trace.mark("root").unwrap();
        let other = trace.mark("other").unwrap();
        trace.push(other);
        let child = trace
            .record("child", Some(json!({"k": "v"})), Some(root), Some(Duration::from_millis(3)))
            .unwrap();

        let event = &trace.events()[child.get() as usize];
        assert_eq!(event.parent_id, Some(root));
        assert_eq!(event.info_str("k"), Some("v"));
        assert_eq!(event.duration, Some(Duration::from_millis(3)));
    }

    #[test]
    fn as_tree_groups_children_by_parent() {
        let trace = Trace::enabled();
        let a = trace.mark("a").unwrap();
        trace.push(a);
        let b = trace.mark("b").unwrap();
        let c = trace.mark("c").unwrap();
        trace.pop();
        let d = trace.mark("d").unwrap();

        let tree = trace.as_tree();
        assert_eq!(tree.get(&None), Some(&vec![a, d]));
        assert_eq!(tree.get(&Some(a)), Some(&vec![b, c]));
        assert_eq!(tree.len(), 2);
    }

    #[test]
    fn fork_shares_log_but_not_stack() {
        let trace = Trace::enabled();
        let parallel = trace.mark("parallel_begin").unwrap();
        let left = trace.fork(Some(parallel));
        let right = trace.fork(Some(parallel));

        let l = left.mark("left").unwrap();
        left.push(l);
        let r = right.mark("right").unwrap();

        let events = trace.events();
        assert_eq!(trace.len(), 3);
        assert_eq!(events[l.get() as usize].parent_id, Some(parallel));
        assert_eq!(events[r.get() as usize].parent_id, Some(parallel));
        assert_eq!(trace.current_parent(), None);
        assert_eq!(left.run_id(), trace.run_id());
    }

    #[test]
    fn non_object_info_is_wrapped() {
        let trace = Trace::enabled();
        trace.record("note", Some(json!("plain")), None, None);
        assert_eq!(trace.events()[0].info_str("value"), Some("plain"));
    }

    #[test]
    fn render_indents_nested_events() {
        let trace = Trace::enabled();
        let begin = trace.mark("step_begin").unwrap();
        trace.record("step_end", Some(json!({"control": "halt"})), Some(begin), None);

        let rendered = trace.render();
        assert_eq!(rendered, "#0 step_begin\n  #1 step_end [halt]\n");
    }

    #[test]
    fn clear_resets_ids() {
        let trace = Trace::enabled();
        trace.mark("a");
        trace.push(EventId::new(0));
        trace.clear();
        assert!(trace.is_empty());
        assert_eq!(trace.current_parent(), None);
        assert_eq!(trace.mark("b"), Some(EventId::new(0)));
    }
}
