use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use agentflow_protocol::{KernelError, KernelResult, StepResult, ToolPort};
use async_trait::async_trait;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use indexmap::IndexMap;
use serde_json::Value;
use tracing::{Instrument, debug, info_span, warn};

use crate::types::{ToolDefinition, ToolOutput, ToolUse};

/// Executes one tool call and returns its textual content.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    async fn handle(&self, call: &ToolUse) -> anyhow::Result<String>;
}

/// Adapts an async closure into a [`ToolHandler`].
pub struct FnTool<F>(pub F);

#[async_trait]
impl<F, Fut> ToolHandler for FnTool<F>
where
    F: Fn(ToolUse) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    async fn handle(&self, call: &ToolUse) -> anyhow::Result<String> {
        (self.0)(call.clone()).await
    }
}

struct RegisteredTool {
    handler: Arc<dyn ToolHandler>,
    definition: Option<ToolDefinition>,
}

/// Named tool handlers with optional definitions, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, RegisteredTool>,
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.names())
            .finish()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        handler: Arc<dyn ToolHandler>,
        definition: Option<ToolDefinition>,
    ) -> &mut Self {
        self.tools.insert(name.into(), RegisteredTool { handler, definition });
        self
    }

    /// Register an async closure as a tool.
    pub fn register_fn<F, Fut>(
        &mut self,
        name: impl Into<String>,
        handler: F,
        definition: Option<ToolDefinition>,
    ) -> &mut Self
    where
        F: Fn(ToolUse) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
    {
        self.register(name, Arc::new(FnTool(handler)), definition)
    }

    pub fn definition(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).and_then(|tool| tool.definition.as_ref())
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.tools.values().filter_map(|tool| tool.definition.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Run a tool call. Unknown tools, invalid arguments, handler errors and
    /// handler panics all come back as failed outputs.
    pub async fn execute(&self, call: &ToolUse) -> ToolOutput {
        let span = info_span!("tool.execute", tool = %call.name, call_id = %call.call_id);
        async {
            let Some(tool) = self.tools.get(&call.name) else {
                warn!("tool not found");
                return ToolOutput::failure(
                    call.call_id.clone(),
                    format!("tool not found: {}", call.name),
                );
            };

            let valid = tool
                .definition
                .as_ref()
                .is_none_or(|definition| definition.validate_arguments(&call.arguments));
            if !valid {
                warn!("tool arguments failed validation");
                return ToolOutput::failure(
                    call.call_id.clone(),
                    format!("invalid parameters for tool: {}", call.name),
                );
            }

            let outcome = AssertUnwindSafe(tool.handler.handle(call)).catch_unwind().await;
            match outcome {
                Ok(Ok(content)) => {
                    debug!(bytes = content.len(), "tool finished");
                    ToolOutput::success(call.call_id.clone(), content)
                }
                Ok(Err(error)) => {
                    warn!(error = %format!("{error:#}"), "tool failed");
                    ToolOutput::failure(call.call_id.clone(), format!("tool error: {error:#}"))
                }
                Err(_) => {
                    warn!("tool panicked");
                    ToolOutput::failure(
                        call.call_id.clone(),
                        format!("tool panicked: {}", call.name),
                    )
                }
            }
        }
        .instrument(span)
        .await
    }
}

#[async_trait]
impl ToolPort for ToolRegistry {
    async fn call(&self, name: &str, arguments: Value) -> KernelResult<Value> {
        if !self.contains(name) {
            return Err(KernelError::ToolNotFound(name.to_owned()));
        }
        let output = self.execute(&ToolUse::new(name, arguments)).await;
        if output.failed {
            Err(KernelError::Tool(output.content))
        } else {
            Ok(Value::String(output.content))
        }
    }
}

/// A step that executes the incoming [`ToolUse`] against `registry`.
///
/// Successful output continues as the value; a failed output becomes
/// `Control::Error` carrying the output content, over the unchanged state.
pub fn tool_step<S, E>(
    registry: Arc<ToolRegistry>,
) -> impl Fn(S, ToolUse, E) -> BoxFuture<'static, anyhow::Result<StepResult<S, ToolOutput>>> + Send + Sync
where
    S: Send + 'static,
    E: Send + 'static,
{
    move |state: S, call: ToolUse, _env: E| {
        let registry = Arc::clone(&registry);
        async move {
            let output = registry.execute(&call).await;
            if output.failed {
                return anyhow::Ok(StepResult::error(state, output.content));
            }
            anyhow::Ok(StepResult::proceed(state, output))
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use agentflow_kernel::{Agent, Env};
    use agentflow_protocol::{ControlKind, KernelError, ToolPort};
    use anyhow::{Result, anyhow};
    use serde_json::json;

    use super::{ToolRegistry, tool_step};
    use crate::types::{ToolDefinition, ToolParameter, ToolUse};

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry
            .register_fn(
                "search",
                |call: ToolUse| async move {
                    let query = call.argument_str("query").unwrap_or_default().to_owned();
                    anyhow::Ok(format!("No results for query: {query}"))
                },
                Some(
                    ToolDefinition::new("search", "Search the index")
                        .parameter(ToolParameter::required("query", "string", "search text")),
                ),
            )
            .register_fn(
                "broken",
                |_call: ToolUse| async move { Err::<String, _>(anyhow!("disk on fire")) },
                None,
            )
            .register_fn(
                "explodes",
                |_call: ToolUse| async move {
                    if true {
                        panic!("handler exploded");
                    }
                    anyhow::Ok(String::new())
                },
                None,
            );
        registry
    }

    #[tokio::test]
    async fn execute_runs_the_handler() {
        let output = registry().execute(&ToolUse::new("search", json!({"query": "rust"}))).await;
        assert!(!output.failed);
        assert_eq!(output.content, "No results for query: rust");
    }

    #[tokio::test]
    async fn execute_never_panics() {
        let registry = registry();

        let unknown = registry.execute(&ToolUse::new("nope", json!({}))).await;
        assert!(unknown.failed);
        assert!(unknown.content.contains("tool not found"));

        let invalid = registry.execute(&ToolUse::new("search", json!({}))).await;
        assert!(invalid.failed);
        assert!(invalid.content.contains("invalid parameters"));

        let broken = registry.execute(&ToolUse::new("broken", json!({}))).await;
        assert!(broken.failed);
        assert!(broken.content.contains("disk on fire"));

        let exploded = registry.execute(&ToolUse::new("explodes", json!({}))).await;
        assert!(exploded.failed);
    }

    #[tokio::test]
    async fn registry_is_a_tool_port() {
        let registry = registry();
        let port: &dyn ToolPort = &registry;

        let value = port.call("search", json!({"query": "q"})).await;
        assert!(matches!(value, Ok(v) if v == json!("No results for query: q")));
        assert!(matches!(port.call("nope", json!({})).await, Err(KernelError::ToolNotFound(_))));
        assert!(matches!(port.call("broken", json!({})).await, Err(KernelError::Tool(_))));
    }

    #[test]
    fn definitions_follow_registration_order() {
        let registry = registry();
        assert_eq!(registry.names(), vec!["search", "broken", "explodes"]);
        assert_eq!(registry.definitions().count(), 1);
        assert!(registry.definition("search").is_some());
        assert!(registry.definition("broken").is_none());
    }

    #[tokio::test]
    async fn tool_step_continues_or_errors() -> Result<()> {
        let registry = Arc::new(registry());

        let ok = Agent::<u32, ToolUse>::start(ToolUse::new("search", json!({"query": "x"})))
            .then(tool_step::<u32, Env>(registry.clone()));
        let result = ok.run(7, Env::default()).await?;
        assert!(result.control().is_continue());
        assert_eq!(result.require_value()?.content, "No results for query: x");

        let failing = Agent::<u32, ToolUse>::start(ToolUse::new("broken", json!({})))
            .then(tool_step::<u32, Env>(registry));
        let result = failing.run(7, Env::default()).await?;
        assert_eq!(result.kind(), ControlKind::Error);
        assert_eq!(*result.state(), 7);
        assert!(
            result
                .control()
                .reason()
                .is_some_and(|fault| fault.to_string().contains("disk on fire"))
        );
        Ok(())
    }
}
