use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// State shared by cooperating agents.
///
/// `current` names the active agent, `shared` is the ordered message log every
/// agent sees, `locals` holds per-agent private sub-state in insertion order.
/// Updates return new values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MultiState {
    pub current: String,
    #[serde(default)]
    pub shared: Vec<Value>,
    #[serde(default)]
    pub locals: IndexMap<String, Value>,
}

impl MultiState {
    pub fn new(current: impl Into<String>) -> Self {
        Self {
            current: current.into(),
            ..Self::default()
        }
    }

    pub fn with_current(&self, current: impl Into<String>) -> Self {
        Self {
            current: current.into(),
            ..self.clone()
        }
    }

    pub fn with_message(&self, message: impl Into<Value>) -> Self {
        let mut next = self.clone();
        next.shared.push(message.into());
        next
    }

    pub fn with_local(&self, agent: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut next = self.clone();
        next.locals.insert(agent.into(), value.into());
        next
    }

    pub fn local(&self, agent: &str) -> Option<&Value> {
        self.locals.get(agent)
    }

    pub fn last_message(&self) -> Option<&Value> {
        self.shared.last()
    }
}

/// Opt-in merge for concurrent branches: shared messages are concatenated in
/// branch order, later branches win on conflicting locals, and `current`
/// becomes `"merged"`.
pub fn merge_states(states: Vec<MultiState>) -> MultiState {
    let mut merged = MultiState::new("merged");
    for state in states {
        merged.shared.extend(state.shared);
        merged.locals.extend(state.locals);
    }
    merged
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{MultiState, merge_states};

    #[test]
    fn updates_leave_the_original_untouched() {
        let base = MultiState::new("planner");
        let next = base
            .with_message("hello")
            .with_local("planner", json!({"step": 1}))
            .with_current("writer");

        assert_eq!(base, MultiState::new("planner"));
        assert_eq!(next.current, "writer");
        assert_eq!(next.shared, vec![json!("hello")]);
        assert_eq!(next.local("planner"), Some(&json!({"step": 1})));
        assert_eq!(next.last_message(), Some(&json!("hello")));
    }

    #[test]
    fn merge_concatenates_shared_and_later_locals_win() {
        let a = MultiState::new("a").with_message("from-a").with_local("k", 1);
        let b = MultiState::new("b").with_message("from-b").with_local("k", 2).with_local("b", true);

        let merged = merge_states(vec![a, b]);
        assert_eq!(merged.current, "merged");
        assert_eq!(merged.shared, vec![json!("from-a"), json!("from-b")]);
        assert_eq!(merged.local("k"), Some(&json!(2)));
        assert_eq!(merged.locals.keys().collect::<Vec<_>>(), vec!["k", "b"]);
    }

    #[test]
    fn serializes_with_ordered_locals() {
        let state = MultiState::new("x").with_local("z", 1).with_local("a", 2);
        let encoded = serde_json::to_string(&state).unwrap_or_default();
        assert_eq!(encoded, r#"{"current":"x","shared":[],"locals":{"z":1,"a":2}}"#);
    }
}
