//! The `(state, value, control)` triple every step produces.

use std::any::Any;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::control::{Control, ControlKind, Fault};
use crate::error::{KernelError, KernelResult};

/// Immutable outcome of one step or agent invocation.
///
/// `state` is the domain state threaded across steps, `value` the payload
/// handed to the next step and `control` the directive telling the kernel
/// whether to keep going.
///
/// A non-continue result that crossed a value-type change keeps its upstream
/// value type-erased; read it back with [`StepResult::carried_value`].
#[derive(Debug, Clone)]
pub struct StepResult<S, V> {
    state: S,
    value: Option<V>,
    control: Control,
    carried: Option<Carried>,
}

/// Upstream value of another type, boxed as `Mutex<Option<T>>`.
type Carried = Arc<dyn Any + Send + Sync>;

impl<S, V> StepResult<S, V> {
    pub fn new(state: S, value: Option<V>, control: Control) -> Self {
        Self {
            state,
            value,
            control,
            carried: None,
        }
    }

    /// `Continue` with `value`.
    pub fn proceed(state: S, value: V) -> Self {
        Self::new(state, Some(value), Control::Continue)
    }

    /// `Halt` with `value` as the final answer.
    pub fn halt(state: S, value: V) -> Self {
        Self::new(state, Some(value), Control::Halt)
    }

    pub fn error(state: S, reason: impl Into<Fault>) -> Self {
        Self::new(state, None, Control::error(reason))
    }

    pub fn retry_clean(state: S, reason: impl Into<Fault>) -> Self {
        Self::new(state, None, Control::retry_clean(reason))
    }

    pub fn retry_dirty(state: S, reason: impl Into<Fault>) -> Self {
        Self::new(state, None, Control::retry_dirty(reason))
    }

    pub fn state(&self) -> &S {
        &self.state
    }

    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    pub fn control(&self) -> &Control {
        &self.control
    }

    pub fn kind(&self) -> ControlKind {
        self.control.kind()
    }

    /// The value, or [`KernelError::NoValue`] when there is none.
    pub fn require_value(&self) -> KernelResult<&V> {
        self.value.as_ref().ok_or(KernelError::NoValue {
            control: self.control.kind(),
        })
    }

    /// Consuming form of [`require_value`](Self::require_value).
    pub fn into_value(self) -> KernelResult<V> {
        let control = self.control.kind();
        self.value.ok_or(KernelError::NoValue { control })
    }

    pub fn into_state(self) -> S {
        self.state
    }

    pub fn into_parts(self) -> (S, Option<V>, Control) {
        (self.state, self.value, self.control)
    }

    pub fn map_value<R>(self, f: impl FnOnce(V) -> R) -> StepResult<S, R> {
        StepResult {
            state: self.state,
            value: self.value.map(f),
            control: self.control,
            carried: self.carried,
        }
    }

    /// The value as a `T`: the own value when `V` is `T`, else a value carried
    /// across an earlier type change.
    pub fn carried_value<T>(&self) -> Option<T>
    where
        V: 'static,
        T: Clone + 'static,
    {
        if let Some(own) = (&self.value as &dyn Any).downcast_ref::<Option<T>>() {
            return own.clone();
        }
        self.carried
            .as_ref()?
            .downcast_ref::<Mutex<Option<T>>>()?
            .lock()
            .clone()
    }

    /// Carry this result across a value-type boundary unchanged.
    ///
    /// State and control always survive. When `R` is `V` the value stays in
    /// place; otherwise it moves to the carried slot, and a carried `R` from
    /// an earlier hop is restored as the value.
    pub fn carry<R>(self) -> StepResult<S, R>
    where
        V: Send + 'static,
        R: 'static,
    {
        let StepResult {
            state,
            mut value,
            control,
            carried,
        } = self;
        if let Some(same) = (&mut value as &mut dyn Any).downcast_mut::<Option<R>>() {
            return StepResult {
                state,
                value: same.take(),
                control,
                carried,
            };
        }

        let mut carried = match value {
            Some(value) => Some(Arc::new(Mutex::new(Some(value))) as Carried),
            None => carried,
        };
        let restored = carried
            .as_mut()
            .and_then(Arc::get_mut)
            .and_then(|slot| slot.downcast_mut::<Mutex<Option<R>>>())
            .and_then(|slot| slot.get_mut().take());
        if restored.is_some() {
            carried = None;
        }
        StepResult {
            state,
            value: restored,
            control,
            carried,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn require_value_fails_loudly_without_value() {
        let result: StepResult<(), String> = StepResult::retry_clean((), "retry");
        let err = result.require_value().unwrap_err();
        assert!(matches!(
            err,
            KernelError::NoValue {
                control: ControlKind::RetryClean
            }
        ));
        assert_eq!(err.to_string(), "no value present (control: retry_clean)");
    }

    #[test]
    fn proceed_and_halt_carry_values() {
        let ok = StepResult::proceed("s", 7);
        assert_eq!(ok.kind(), ControlKind::Continue);
        assert_eq!(ok.require_value().ok(), Some(&7));

        let done = StepResult::halt("s", "final");
        assert_eq!(done.kind(), ControlKind::Halt);
        assert_eq!(done.into_value().ok(), Some("final"));
    }

    #[test]
    fn carry_keeps_value_of_same_type() {
        let halted: StepResult<&str, String> = StepResult::halt("s", "done".to_owned());
        let carried: StepResult<&str, String> = halted.carry();
        assert_eq!(carried.value().map(String::as_str), Some("done"));
        assert_eq!(carried.kind(), ControlKind::Halt);
    }

    #[test]
    fn carry_keeps_value_across_types_in_the_carried_slot() {
        let halted: StepResult<&str, String> = StepResult::halt("s", "done".to_owned());
        let carried: StepResult<&str, u32> = halted.carry();
        assert!(carried.value().is_none());
        assert_eq!(carried.carried_value::<String>().as_deref(), Some("done"));
        assert_eq!(carried.kind(), ControlKind::Halt);
        assert_eq!(*carried.state(), "s");

        let cloned = carried.clone();
        assert_eq!(cloned.carried_value::<String>().as_deref(), Some("done"));
        assert_eq!(cloned.carried_value::<u64>(), None);
    }

    #[test]
    fn carry_restores_the_value_when_the_type_comes_back() {
        let halted: StepResult<(), String> = StepResult::halt((), "answer".to_owned());
        let hopped: StepResult<(), usize> = halted.carry();
        let back: StepResult<(), String> = hopped.carry();
        assert_eq!(back.value().map(String::as_str), Some("answer"));
        assert_eq!(back.carried_value::<String>().as_deref(), Some("answer"));
    }

    #[test]
    fn map_value_preserves_control() {
        let result = StepResult::proceed(1, 2).map_value(|v| v * 10);
        assert_eq!(result.value(), Some(&20));
        assert!(result.control().is_continue());
    }
}
