//! Higher-order agents for multi-agent workflows.

use std::sync::Arc;

use agentflow_kernel::{Agent, Environment};
use agentflow_protocol::{Control, KernelError, KernelResult, StepResult};
use futures_util::future::join_all;
use serde_json::{Value, json};
use tracing::{Instrument, debug, debug_span, warn};

use crate::registry::{MultiAgent, MultiEnv};
use crate::state::MultiState;

/// Run the registered agent `target` with the current state and environment
/// and return its result verbatim.
///
/// A missing target fails with [`KernelError::AgentNotFound`] through the
/// kernel error channel.
pub fn handoff(target: impl Into<String>) -> MultiAgent {
    let target: Arc<str> = Arc::from(target.into());
    Agent::new(move |state: MultiState, env: MultiEnv| {
        let target = Arc::clone(&target);
        async move {
            let agent = env.registry().get(&target).inspect_err(|error| {
                warn!(%target, %error, "handoff target missing");
            })?;
            debug!(%target, from = %state.current, "handing off");
            agent.run(state, env).await
        }
    })
}

/// Pick a target from the current state, then [`handoff`] to it.
pub fn route<F>(selector: F) -> MultiAgent
where
    F: Fn(&MultiState) -> String + Send + Sync + 'static,
{
    let selector = Arc::new(selector);
    Agent::new(move |state: MultiState, env: MultiEnv| {
        let selector = Arc::clone(&selector);
        async move {
            let target = selector(&state);
            debug!(%target, "route selected");
            handoff(target).run(state, env).await
        }
    })
}

/// Append `message` to the shared log and continue with `Value::Null`.
///
/// The result is a plain [`MultiAgent`], so an emitter can be registered as a
/// handoff target.
pub fn emit(message: impl Into<Value>) -> MultiAgent {
    let message = message.into();
    Agent::new(move |state: MultiState, _env: MultiEnv| {
        let next = state.with_message(message.clone());
        async move { Ok(StepResult::proceed(next, Value::Null)) }
    })
}

/// Run every agent against a clone of the same state and environment and
/// wait for all of them.
///
/// The value is the ordered list of branch results; controls are not merged
/// and the result always continues. The next state is
/// `merge_state(branch states)`. When a branch fails through the kernel error
/// channel every branch still finishes and the first failure in input order
/// is returned.
///
/// With tracing enabled this records `parallel_begin`, one `branch_{i}` event
/// per branch carrying its control kind, and `parallel_end`. Each branch runs
/// on a forked trace handle parented under `parallel_begin`.
pub fn concurrent<S, V, E, M>(
    agents: Vec<Agent<S, V, E>>,
    merge_state: M,
) -> Agent<S, Vec<StepResult<S, V>>, E>
where
    S: Clone + Send + 'static,
    V: Send + 'static,
    E: Environment,
    M: Fn(Vec<S>) -> S + Send + Sync + 'static,
{
    let agents: Arc<[Agent<S, V, E>]> = agents.into();
    let merge_state = Arc::new(merge_state);
    Agent::new(move |state: S, env: E| {
        let agents = Arc::clone(&agents);
        let merge_state = Arc::clone(&merge_state);
        async move {
            let trace = env.trace().cloned().unwrap_or_default();
            let traced = trace.is_enabled();
            let branches = agents.len();
            let begin = if traced {
                trace.record(
                    "parallel_begin",
                    Some(json!({ "branches": branches })),
                    None,
                    None,
                )
            } else {
                None
            };

            let runs = agents.iter().map(|agent| {
                let branch_env = env.with_trace(trace.fork(begin));
                agent.run(state.clone(), branch_env)
            });
            let outcomes = join_all(runs)
                .instrument(debug_span!("multi.concurrent", branches))
                .await;

            let mut results = Vec::with_capacity(branches);
            let mut first_failure: Option<KernelError> = None;
            for (index, outcome) in outcomes.into_iter().enumerate() {
                if traced {
                    let control = match &outcome {
                        Ok(result) => result.kind().as_str(),
                        Err(_) => "fault",
                    };
                    trace.record(
                        &format!("branch_{index}"),
                        Some(json!({ "control": control })),
                        begin,
                        None,
                    );
                }
                match outcome {
                    Ok(result) => results.push(result),
                    Err(error) => {
                        warn!(branch = index, %error, "concurrent branch failed");
                        if first_failure.is_none() {
                            first_failure = Some(error);
                        }
                    }
                }
            }
            if traced {
                trace.record("parallel_end", None, begin, None);
            }

            if let Some(error) = first_failure {
                return Err(error);
            }
            let merged = merge_state(results.iter().map(|result| result.state().clone()).collect());
            debug!(branches, "concurrent branches joined");
            Ok(StepResult::proceed(merged, results))
        }
    })
}

/// Re-run `agent` up to `max_steps` times, threading state between runs.
///
/// Stops as soon as a run halts or errors; otherwise returns the result of the
/// last run. `max_steps == 0` is rejected here, before anything runs.
pub fn repeat<S, V, E>(agent: Agent<S, V, E>, max_steps: usize) -> KernelResult<Agent<S, V, E>>
where
    S: Clone + Send + 'static,
    V: Send + 'static,
    E: Environment,
{
    if max_steps == 0 {
        return Err(KernelError::InvalidConfig(
            "repeat max_steps must be at least 1".to_owned(),
        ));
    }
    Ok(Agent::new(move |state: S, env: E| {
        let agent = agent.clone();
        async move {
            let mut current = agent.run(state, env.clone()).await?;
            for round in 1..max_steps {
                if matches!(current.control(), Control::Halt | Control::Error(_)) {
                    debug!(round, control = %current.kind(), "repeat stopped early");
                    return Ok(current);
                }
                current = agent.run(current.into_state(), env.clone()).await?;
            }
            Ok(current)
        }
    }))
}
