use agentflow_protocol::CallId;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolParameter {
    pub name: String,
    /// JSON type name shown to the model, e.g. `"string"`.
    #[serde(rename = "type")]
    pub kind: String,
    pub description: String,
    pub required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
}

impl ToolParameter {
    pub fn required(name: impl Into<String>, kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: kind.into(),
            description: description.into(),
            required: true,
            default: None,
        }
    }

    pub fn optional(name: impl Into<String>, kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            required: false,
            ..Self::required(name, kind, description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub parameters: IndexMap<String, ToolParameter>,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: IndexMap::new(),
        }
    }

    pub fn parameter(mut self, parameter: ToolParameter) -> Self {
        self.parameters.insert(parameter.name.clone(), parameter);
        self
    }

    /// True when every required parameter is present in `arguments`.
    /// Non-object arguments only pass when nothing is required.
    pub fn validate_arguments(&self, arguments: &Value) -> bool {
        let provided = arguments.as_object();
        self.parameters
            .values()
            .filter(|parameter| parameter.required)
            .all(|parameter| provided.is_some_and(|map| map.contains_key(&parameter.name)))
    }
}

/// A model's request to call a tool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolUse {
    pub call_id: CallId,
    pub name: String,
    #[serde(default)]
    pub arguments: Value,
}

impl ToolUse {
    pub fn new(name: impl Into<String>, arguments: Value) -> Self {
        Self {
            call_id: CallId::default(),
            name: name.into(),
            arguments,
        }
    }

    pub fn argument_str(&self, key: &str) -> Option<&str> {
        self.arguments.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolOutput {
    pub call_id: CallId,
    pub content: String,
    #[serde(default)]
    pub failed: bool,
}

impl ToolOutput {
    pub fn success(call_id: CallId, content: impl Into<String>) -> Self {
        Self {
            call_id,
            content: content.into(),
            failed: false,
        }
    }

    pub fn failure(call_id: CallId, content: impl Into<String>) -> Self {
        Self {
            call_id,
            content: content.into(),
            failed: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn search() -> ToolDefinition {
        ToolDefinition::new("search", "Search the index")
            .parameter(ToolParameter::required("query", "string", "what to look for"))
            .parameter(ToolParameter::optional("limit", "integer", "max hits").with_default(json!(10)))
    }

    #[test]
    fn validation_checks_required_parameters_only() {
        let definition = search();
        assert!(definition.validate_arguments(&json!({"query": "rust"})));
        assert!(definition.validate_arguments(&json!({"query": "rust", "limit": 3})));
        assert!(!definition.validate_arguments(&json!({"limit": 3})));
        assert!(!definition.validate_arguments(&json!("rust")));
        assert!(ToolDefinition::new("noop", "").validate_arguments(&json!(null)));
    }

    #[test]
    fn parameter_kind_serializes_as_type() {
        let encoded = serde_json::to_value(ToolParameter::required("q", "string", "query"))
            .unwrap_or_default();
        assert_eq!(encoded["type"], "string");
        assert!(encoded.get("default").is_none());
    }

    #[test]
    fn outputs_record_failure_flag() {
        let call = ToolUse::new("search", json!({"query": "x"}));
        assert_eq!(call.argument_str("query"), Some("x"));
        assert!(!ToolOutput::success(call.call_id.clone(), "ok").failed);
        assert!(ToolOutput::failure(call.call_id, "nope").failed);
    }
}
