//! The suspendable builtin protocol.
//!
//! A builtin step either finishes, asks the host to run a verb and re-enter it later
//! at a numbered step, or hands the host a [`Waiter`] that parks the whole task until
//! an external event resumes it:
//!
//! - [`Progress::Complete`] / [`Progress::Error`]: synchronous result
//! - [`Progress::Pending`]: a nested verb call was started; resume the
//!   [`Continuation`] with the verb's return value
//! - [`Progress::Suspend`]: park the task; the waiter's subsystem later calls
//!   [`TaskResumer::resume_task`]
//!
//! Continuations are plain data, so an in-flight `create`, `move` or `recycle` can be
//! written into a checkpoint with [`Continuation::dump`] and restored with
//! [`Continuation::load`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    builtins::BuiltinFunction,
    error::{BuiltinError, ErrorCode},
    host::Host,
    var::{Objid, Var},
};

/// Opaque handle of a suspended task, owned by the VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Answer of a task enumeration callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskEnumAction {
    /// Keep enumerating.
    Continue,
    /// Stop enumerating.
    Stop,
    /// Stop waking this task, then stop enumerating.
    Kill,
}

/// What happened when a builtin asked the host to run a verb.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    /// The verb will run; the builtin is re-entered with its return value.
    Started,
    /// No such verb, or the target is not a valid object.
    NotFound,
    /// The call would exceed the nested call limit.
    RecursionExceeded,
}

/// Per-operation state that survives a nested verb call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum BuiltinData {
    Move { what: Objid, where_: Objid },
    /// The object being created, persistent or anonymous.
    Create { object: Var },
    /// The object being recycled, persistent or anonymous.
    Recycle { object: Var },
}

/// A builtin parked on a nested verb call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Continuation {
    function: BuiltinFunction,
    /// The programmer whose permissions the builtin runs with.
    progr: Objid,
    /// Step to re-enter at; step 1 is always the entry step.
    next: u8,
    data: BuiltinData,
}

impl Continuation {
    pub(crate) fn new(function: BuiltinFunction, progr: Objid, next: u8, data: BuiltinData) -> Self {
        Self {
            function,
            progr,
            next,
            data,
        }
    }

    #[must_use]
    pub fn function(&self) -> BuiltinFunction {
        self.function
    }

    #[must_use]
    pub fn next_step(&self) -> u8 {
        self.next
    }

    #[must_use]
    pub fn data(&self) -> &BuiltinData {
        &self.data
    }

    /// Re-enters the builtin with the nested verb call's return value.
    ///
    /// Objects may have been destroyed while the builtin was parked; every step
    /// re-validates what it touches instead of trusting the saved state.
    pub fn resume(self, value: Var, host: &mut impl Host) -> Progress {
        self.function.resume(host, self.progr, value, self.next, self.data)
    }

    /// Serializes the continuation for a checkpoint.
    pub fn dump(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Restores a continuation written by [`Continuation::dump`].
    pub fn load(bytes: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(bytes)
    }
}

/// Parks a task on an external subsystem.
///
/// The host calls [`Waiter::suspend`] once it has a task handle for the parked task.
/// An error means the task was never parked and must receive the error instead.
pub trait Waiter: fmt::Debug {
    fn suspend(self: Box<Self>, task: TaskId) -> Result<(), BuiltinError>;
}

/// The VM side of resumption: continue a parked task with a value.
pub trait TaskResumer {
    fn resume_task(&mut self, task: TaskId, value: Var);
}

/// Result of one builtin step.
#[derive(Debug)]
pub enum Progress {
    /// The builtin finished with a value.
    Complete(Var),
    /// The builtin failed.
    Error(BuiltinError),
    /// The builtin started a nested verb call and must be resumed with its result.
    Pending(Continuation),
    /// The builtin wants the whole task parked on an external event.
    Suspend(Box<dyn Waiter>),
}

impl Progress {
    /// Completion with no value.
    #[must_use]
    pub fn done() -> Self {
        Self::Complete(Var::None)
    }

    #[must_use]
    pub fn error(code: ErrorCode) -> Self {
        Self::Error(BuiltinError::new(code))
    }

    pub(crate) fn call(function: BuiltinFunction, progr: Objid, next: impl Into<u8>, data: BuiltinData) -> Self {
        Self::Pending(Continuation::new(function, progr, next.into(), data))
    }

    /// Consumes the progress and returns the final value, if it completed.
    #[must_use]
    pub fn into_complete(self) -> Option<Var> {
        match self {
            Self::Complete(value) => Some(value),
            _ => None,
        }
    }

    /// Consumes the progress and returns the continuation, if a verb call is pending.
    #[must_use]
    pub fn into_pending(self) -> Option<Continuation> {
        match self {
            Self::Pending(continuation) => Some(continuation),
            _ => None,
        }
    }
}

impl From<BuiltinError> for Progress {
    fn from(err: BuiltinError) -> Self {
        Self::Error(err)
    }
}

impl From<Result<Var, BuiltinError>> for Progress {
    fn from(result: Result<Var, BuiltinError>) -> Self {
        match result {
            Ok(value) => Self::Complete(value),
            Err(err) => Self::Error(err),
        }
    }
}
