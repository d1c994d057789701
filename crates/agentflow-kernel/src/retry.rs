//! Step-level retry.
//!
//! Composition never acts on `RetryClean`/`RetryDirty`; it only passes them
//! through. [`retry`] wraps a single step and honors the tags locally:
//! `RetryClean` re-runs from the original input, `RetryDirty` re-runs from the
//! state the failed attempt produced.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use agentflow_protocol::{Control, KernelError, KernelResult, StepResult};
use futures_util::FutureExt;
use futures_util::future::BoxFuture;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts, including the first. Must be at least 1.
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, base_delay: Duration, max_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self.max_delay = max_delay;
        self
    }

    /// Doubling backoff before attempt `attempt` (1-based), capped at `max_delay`.
    fn delay_before(&self, attempt: u32) -> Duration {
        if attempt <= 1 || self.base_delay.is_zero() {
            return Duration::ZERO;
        }
        let factor = 2u32.saturating_pow(attempt - 2);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Wrap `step` so retry-tagged results are re-attempted up to
/// `policy.max_attempts` times. The last result is returned as-is once the
/// budget is spent.
pub fn retry<S, V, R, E, F, Fut>(
    step: F,
    policy: RetryPolicy,
) -> KernelResult<impl Fn(S, V, E) -> BoxFuture<'static, anyhow::Result<StepResult<S, R>>> + Send + Sync>
where
    S: Clone + Send + 'static,
    V: Clone + Send + 'static,
    R: Send + 'static,
    E: Clone + Send + Sync + 'static,
    F: Fn(S, V, E) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<StepResult<S, R>>> + Send + 'static,
{
    if policy.max_attempts == 0 {
        return Err(KernelError::InvalidConfig(
            "retry max_attempts must be at least 1".to_owned(),
        ));
    }
    let step = Arc::new(step);
    Ok(move |state: S, value: V, env: E| {
        run_with_retry(Arc::clone(&step), policy.clone(), state, value, env).boxed()
    })
}

async fn run_with_retry<S, V, R, E, F, Fut>(
    step: Arc<F>,
    policy: RetryPolicy,
    state: S,
    value: V,
    env: E,
) -> anyhow::Result<StepResult<S, R>>
where
    S: Clone,
    V: Clone,
    E: Clone,
    F: Fn(S, V, E) -> Fut,
    Fut: Future<Output = anyhow::Result<StepResult<S, R>>>,
{
    let mut attempt_state = state.clone();
    let mut attempt = 1;
    loop {
        let result = step(attempt_state, value.clone(), env.clone()).await?;
        if attempt >= policy.max_attempts {
            return Ok(result);
        }
        attempt_state = match result.control() {
            Control::RetryClean(_) => state.clone(),
            Control::RetryDirty(_) => result.into_state(),
            _ => return Ok(result),
        };
        attempt += 1;
        debug!(attempt, max_attempts = policy.max_attempts, "retrying step");
        let delay = policy.delay_before(attempt);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }
}
