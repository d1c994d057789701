//! Typed identifiers used across agentflow.
//!
//! Run and call ids are opaque UUID-backed strings (serde-transparent).
//! Trace event ids are a separate, monotonic counter so ordering by id is the
//! same as ordering by record time.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! typed_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            /// Create a new id using UUID v4.
            pub fn new_uuid() -> Self {
                Self(uuid::Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new_uuid()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_owned())
            }
        }
    };
}

typed_id!(
    /// Identifies one traced run; attached to log spans for correlation.
    RunId
);
typed_id!(
    /// Identifies one tool invocation.
    CallId
);

/// Id of a recorded trace event. Assigned from 0 upward in record order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EventId(u64);

impl EventId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_new_is_unique() {
        assert_ne!(RunId::new_uuid(), RunId::new_uuid());
    }

    #[test]
    fn call_id_from_str() {
        let id: CallId = "call-1".into();
        assert_eq!(id.as_str(), "call-1");
        assert_eq!(id.to_string(), "call-1");
    }

    #[test]
    fn event_id_serializes_as_number() {
        let json = serde_json::to_string(&EventId::new(4)).unwrap();
        assert_eq!(json, "4");
        let back: EventId = serde_json::from_str(&json).unwrap();
        assert_eq!(back.get(), 4);
    }

    #[test]
    fn event_ids_order_numerically() {
        assert!(EventId::new(2) < EventId::new(10));
    }
}
