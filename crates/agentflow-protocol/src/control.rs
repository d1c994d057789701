//! Control directives attached to every step result.
//!
//! `Control` is a closed sum of five tags. The kernel only ever distinguishes
//! `Continue` from everything else; `Halt`, `Error`, `RetryClean` and
//! `RetryDirty` are all terminal at a composition boundary.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize, Serializer};

use crate::error::KernelError;

/// Failure payload carried by [`Control::Error`] and the retry tags.
///
/// Cheap to clone; the underlying [`anyhow::Error`] is shared.
#[derive(Clone)]
pub struct Fault(Arc<anyhow::Error>);

impl Fault {
    /// Build a fault from a plain message.
    pub fn msg<M>(message: M) -> Self
    where
        M: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self(Arc::new(anyhow::Error::msg(message)))
    }

    /// Build a fault from any standard error.
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self(Arc::new(anyhow::Error::new(error)))
    }

    pub fn error(&self) -> &anyhow::Error {
        &self.0
    }

    /// Look through the fault for a concrete error type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }
}

impl fmt::Display for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl fmt::Debug for Fault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Fault").field(&self.to_string()).finish()
    }
}

impl Serialize for Fault {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl From<anyhow::Error> for Fault {
    fn from(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }
}

impl From<KernelError> for Fault {
    fn from(error: KernelError) -> Self {
        Self::new(error)
    }
}

impl From<&str> for Fault {
    fn from(message: &str) -> Self {
        Self::msg(message.to_owned())
    }
}

impl From<String> for Fault {
    fn from(message: String) -> Self {
        Self::msg(message)
    }
}

/// The tag of a [`Control`], without its payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlKind {
    Continue,
    Halt,
    Error,
    RetryClean,
    RetryDirty,
}

impl ControlKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Continue => "continue",
            Self::Halt => "halt",
            Self::Error => "error",
            Self::RetryClean => "retry_clean",
            Self::RetryDirty => "retry_dirty",
        }
    }
}

impl fmt::Display for ControlKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Execution directive reported by a step.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "kind", content = "reason", rename_all = "snake_case")]
pub enum Control {
    /// Proceed to the next step with the result's value.
    Continue,
    /// Stop successfully; the result's value is final.
    Halt,
    /// Stop unsuccessfully.
    Error(Fault),
    /// Advisory: redo the unit of work from its original input.
    RetryClean(Option<Fault>),
    /// Advisory: redo the unit of work from the latest intermediate state.
    RetryDirty(Option<Fault>),
}

impl Control {
    pub fn error(reason: impl Into<Fault>) -> Self {
        Self::Error(reason.into())
    }

    pub fn retry_clean(reason: impl Into<Fault>) -> Self {
        Self::RetryClean(Some(reason.into()))
    }

    pub fn retry_dirty(reason: impl Into<Fault>) -> Self {
        Self::RetryDirty(Some(reason.into()))
    }

    pub fn kind(&self) -> ControlKind {
        match self {
            Self::Continue => ControlKind::Continue,
            Self::Halt => ControlKind::Halt,
            Self::Error(_) => ControlKind::Error,
            Self::RetryClean(_) => ControlKind::RetryClean,
            Self::RetryDirty(_) => ControlKind::RetryDirty,
        }
    }

    /// The payload of `Error` and of retry tags that carry one.
    pub fn reason(&self) -> Option<&Fault> {
        match self {
            Self::Error(reason) => Some(reason),
            Self::RetryClean(reason) | Self::RetryDirty(reason) => reason.as_ref(),
            Self::Continue | Self::Halt => None,
        }
    }

    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }

    pub fn is_halt(&self) -> bool {
        matches!(self, Self::Halt)
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    pub fn is_retry(&self) -> bool {
        matches!(self, Self::RetryClean(_) | Self::RetryDirty(_))
    }

    /// Anything but `Continue` ends a pipeline.
    pub fn is_terminal(&self) -> bool {
        !self.is_continue()
    }
}
