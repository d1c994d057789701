use std::time::Duration;

use agentflow_protocol::EventId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// One recorded execution event.
///
/// Evidence is runtime infrastructure, not domain state. Records are
/// immutable once appended; the tree they form is rebuilt from `parent_id`
/// links only on demand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    pub id: EventId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<EventId>,
    pub action: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub info: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<Duration>,
}

impl Evidence {
    pub fn info_str(&self, key: &str) -> Option<&str> {
        self.info.get(key).and_then(Value::as_str)
    }

    /// The control kind recorded by `step_end` and branch events.
    pub fn control(&self) -> Option<&str> {
        self.info_str("control")
    }
}

/// Normalize caller-supplied info into a JSON object.
pub(crate) fn info_map(info: Option<Value>) -> Map<String, Value> {
    match info {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map,
        Some(other) => {
            let mut map = Map::new();
            map.insert("value".to_owned(), other);
            map
        }
    }
}
