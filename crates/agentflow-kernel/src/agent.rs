use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use agentflow_protocol::{Control, EventId, Fault, KernelError, KernelResult, SinkPort, StepResult};
use agentflow_trace::Trace;
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use serde_json::json;
use tracing::{Instrument, debug, debug_span, warn};

use crate::env::{Env, Environment};
use crate::sink::CallbackSink;

type Transition<S, V, E> =
    dyn Fn(S, E) -> BoxFuture<'static, KernelResult<StepResult<S, V>>> + Send + Sync;

/// A composable computation from `(state, env)` to a [`StepResult`].
///
/// Agents are immutable; every combinator returns a new agent and leaves the
/// receiver usable. Cloning is cheap.
pub struct Agent<S, V, E = Env> {
    transition: Arc<Transition<S, V, E>>,
}

impl<S, V, E> Clone for Agent<S, V, E> {
    fn clone(&self) -> Self {
        Self {
            transition: Arc::clone(&self.transition),
        }
    }
}

impl<S, V, E> fmt::Debug for Agent<S, V, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Agent").finish_non_exhaustive()
    }
}

impl<S, V, E> Agent<S, V, E>
where
    S: Clone + Send + 'static,
    V: Send + Sync + Clone + 'static,
    E: Environment,
{
    /// An agent that continues with `value` and the input state untouched.
    pub fn start(value: V) -> Self {
        Self::lift(value)
    }

    /// Lift a plain value into an agent. Same as [`Agent::start`].
    pub fn lift(value: V) -> Self {
        Self::new(move |state, _env| {
            let value = value.clone();
            async move { Ok(StepResult::proceed(state, value)) }
        })
    }
}

impl<S, V, E> Agent<S, V, E>
where
    S: Clone + Send + 'static,
    V: Send + 'static,
    E: Environment,
{
    /// Wrap a raw transition.
    ///
    /// Errors returned here travel the kernel error channel: combinators do
    /// not convert them to `Control::Error`.
    pub fn new<F, Fut>(transition: F) -> Self
    where
        F: Fn(S, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = KernelResult<StepResult<S, V>>> + Send + 'static,
    {
        Self {
            transition: Arc::new(move |state, env| transition(state, env).boxed()),
        }
    }

    /// Execute the agent.
    ///
    /// With an enabled trace in `env` this records `step_begin`, keeps it on
    /// the trace stack while the transition runs, and records `step_end` (or
    /// `step_error` when the transition fails or panics) parented under it.
    /// The stack entry is popped on every exit path.
    pub async fn run(&self, state: S, env: E) -> KernelResult<StepResult<S, V>> {
        let trace = match env.trace() {
            Some(trace) if trace.is_enabled() => trace.clone(),
            _ => return (self.transition)(state, env).await,
        };

        let Some(step_id) = trace.mark("step_begin") else {
            return (self.transition)(state, env).await;
        };
        let _scope = StepScope::open(trace.clone(), step_id);
        let run_id = trace.run_id().map(ToString::to_string).unwrap_or_default();
        let span = debug_span!("agent.run", %run_id, step = step_id.get());
        let started = Instant::now();

        let outcome = AssertUnwindSafe((self.transition)(state, env).instrument(span))
            .catch_unwind()
            .await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(Ok(result)) => {
                let control = result.kind();
                trace.record(
                    "step_end",
                    Some(json!({ "control": control.as_str() })),
                    Some(step_id),
                    Some(elapsed),
                );
                debug!(
                    step = step_id.get(),
                    %control,
                    elapsed_us = elapsed.as_micros() as u64,
                    "step finished"
                );
                Ok(result)
            }
            Ok(Err(error)) => {
                trace.record(
                    "step_error",
                    Some(json!({ "error": error.to_string() })),
                    Some(step_id),
                    Some(elapsed),
                );
                warn!(step = step_id.get(), %error, "step raised a kernel error");
                Err(error)
            }
            Err(payload) => {
                trace.record(
                    "step_error",
                    Some(json!({ "error": panic_message(payload.as_ref()) })),
                    Some(step_id),
                    Some(elapsed),
                );
                panic::resume_unwind(payload)
            }
        }
    }

    /// Sequence a step after this agent.
    ///
    /// The step only runs when this agent continues with a value. Any other
    /// control passes through with its state and reason untouched. A step
    /// that returns `Err` or panics yields `Control::Error` over the state it
    /// was given.
    pub fn then<R, F, Fut>(&self, step: F) -> Agent<S, R, E>
    where
        R: Send + 'static,
        F: Fn(S, V, E) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<StepResult<S, R>>> + Send + 'static,
    {
        let upstream = self.clone();
        let step = Arc::new(step);
        Agent::new(move |state: S, env: E| {
            let upstream = upstream.clone();
            let step = Arc::clone(&step);
            async move {
                let current = upstream.run(state, env.clone()).await?;
                let (state, value) = match split_continue(current) {
                    Ok(parts) => parts,
                    Err(passed) => return Ok(passed),
                };

                let fallback = state.clone();
                let outcome = AssertUnwindSafe(async move { step(state, value, env).await })
                    .catch_unwind()
                    .await;
                Ok(match outcome {
                    Ok(Ok(result)) => result,
                    Ok(Err(error)) => {
                        warn!(error = %format!("{error:#}"), "step failed");
                        StepResult::error(fallback, error)
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        warn!(panic = %message, "step panicked");
                        StepResult::error(fallback, Fault::msg(format!("step panicked: {message}")))
                    }
                })
            }
        })
    }

    /// Transform the value of a continuing result.
    pub fn map<R, F>(&self, f: F) -> Agent<S, R, E>
    where
        R: Send + 'static,
        F: Fn(V) -> R + Send + Sync + 'static,
    {
        self.try_map(move |value| Ok(f(value)))
    }

    /// Like [`Agent::map`], but a mapper `Err` becomes `Control::Error`.
    pub fn try_map<R, F>(&self, f: F) -> Agent<S, R, E>
    where
        R: Send + 'static,
        F: Fn(V) -> anyhow::Result<R> + Send + Sync + 'static,
    {
        let upstream = self.clone();
        let f = Arc::new(f);
        Agent::new(move |state: S, env: E| {
            let upstream = upstream.clone();
            let f = Arc::clone(&f);
            async move {
                let current = upstream.run(state, env).await?;
                let (state, value) = match split_continue(current) {
                    Ok(parts) => parts,
                    Err(passed) => return Ok(passed),
                };
                Ok(match panic::catch_unwind(AssertUnwindSafe(|| f(value))) {
                    Ok(Ok(mapped)) => StepResult::proceed(state, mapped),
                    Ok(Err(error)) => {
                        warn!(error = %format!("{error:#}"), "map failed");
                        StepResult::error(state, error)
                    }
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        warn!(panic = %message, "map panicked");
                        StepResult::error(state, Fault::msg(format!("map panicked: {message}")))
                    }
                })
            }
        })
    }

    /// Replace an `Error` result with a continuing value computed from its
    /// fault. Every other result passes through.
    pub fn recover<F>(&self, f: F) -> Agent<S, V, E>
    where
        F: Fn(Fault) -> V + Send + Sync + 'static,
    {
        let upstream = self.clone();
        let f = Arc::new(f);
        Agent::new(move |state: S, env: E| {
            let upstream = upstream.clone();
            let f = Arc::clone(&f);
            async move {
                let current = upstream.run(state, env).await?;
                let fault = match current.control() {
                    Control::Error(fault) => fault.clone(),
                    _ => return Ok(current),
                };
                let state = current.into_state();
                debug!(%fault, "recovering from error");
                Ok(match panic::catch_unwind(AssertUnwindSafe(|| f(fault))) {
                    Ok(value) => StepResult::proceed(state, value),
                    Err(payload) => {
                        let message = panic_message(payload.as_ref());
                        warn!(panic = %message, "recovery panicked");
                        StepResult::error(state, Fault::msg(format!("recovery panicked: {message}")))
                    }
                })
            }
        })
    }
}

impl<S, V> Agent<S, V, Env>
where
    S: Clone + Send + 'static,
    V: Send + 'static,
{
    /// Run with a [`CallbackSink`] installed as the environment's sink. The
    /// sink is closed once the run returns.
    pub async fn run_streaming(
        &self,
        state: S,
        env: Env,
        on_chunk: impl Fn(&str) + Send + Sync + 'static,
    ) -> KernelResult<StepResult<S, V>> {
        let sink = Arc::new(CallbackSink::new(on_chunk));
        let result = self.run(state, env.with_sink(sink.clone())).await;
        sink.close().await?;
        result
    }
}

/// Split a continuing result into state and value, or hand back the result
/// to propagate unchanged. A continue without a value becomes an error.
fn split_continue<S, V, R>(current: StepResult<S, V>) -> Result<(S, V), StepResult<S, R>>
where
    V: Send + 'static,
    R: 'static,
{
    if current.control().is_terminal() {
        return Err(current.carry());
    }
    let (state, value, control) = current.into_parts();
    match value {
        Some(value) => Ok((state, value)),
        None => {
            let error = KernelError::NoValue {
                control: control.kind(),
            };
            warn!(%error, "continue result carried no value");
            Err(StepResult::error(state, error))
        }
    }
}

/// Keeps a `step_begin` id on the trace stack for the life of the guard.
struct StepScope {
    trace: Trace,
}

impl StepScope {
    fn open(trace: Trace, id: EventId) -> Self {
        trace.push(id);
        Self { trace }
    }
}

impl Drop for StepScope {
    fn drop(&mut self) {
        self.trace.pop();
    }
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_owned()
    }
}
