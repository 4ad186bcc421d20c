use std::{fmt, io};

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString, IntoStaticStr};

use crate::var::Var;

/// Result type alias for builtin helpers that fail with a raisable error.
pub type BfResult<T> = Result<T, BuiltinError>;

/// Error codes visible to scripts.
///
/// The string forms are the server's canonical spellings (`E_PERM`, `E_QUOTA`, ...).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr, Serialize, Deserialize)]
pub enum ErrorCode {
    /// Wrong argument or operand type.
    #[strum(serialize = "E_TYPE")]
    Type,
    /// Wrong number of arguments.
    #[strum(serialize = "E_ARGS")]
    Args,
    /// Invalid argument, including invalid object references and sandbox paths.
    #[strum(serialize = "E_INVARG")]
    InvArg,
    /// Invalid indirection through an object that does not exist.
    #[strum(serialize = "E_INVIND")]
    InvInd,
    /// Permission denied.
    #[strum(serialize = "E_PERM")]
    Perm,
    /// Ownership quota exhausted, or the process table is full.
    #[strum(serialize = "E_QUOTA")]
    Quota,
    /// Too many nested verb calls.
    #[strum(serialize = "E_MAXREC")]
    MaxRec,
    /// The change would make an object contain or inherit from itself.
    #[strum(serialize = "E_RECMOVE")]
    RecMove,
    /// The destination refused to accept the object.
    #[strum(serialize = "E_NACC")]
    Nacc,
    /// An external process could not be started.
    #[strum(serialize = "E_EXEC")]
    Exec,
    /// Verb not found.
    #[strum(serialize = "E_VERBNF")]
    VerbNf,
}

/// Error raised by a builtin.
///
/// Most builtins fail with a bare code; some raise a code with a message and a value,
/// e.g. `exec` raising `E_INVARG` with "Does not exist".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuiltinError {
    pub code: ErrorCode,
    pub message: Option<String>,
    pub value: Var,
}

impl BuiltinError {
    #[must_use]
    pub fn new(code: ErrorCode) -> Self {
        Self {
            code,
            message: None,
            value: Var::Int(0),
        }
    }

    #[must_use]
    pub fn raise(code: ErrorCode, message: impl Into<String>, value: Var) -> Self {
        Self {
            code,
            message: Some(message.into()),
            value,
        }
    }

    /// Returns the message, or the code's canonical spelling when there is none.
    #[must_use]
    pub fn message(&self) -> &str {
        self.message.as_deref().unwrap_or_else(|| self.code.into())
    }
}

impl From<ErrorCode> for BuiltinError {
    fn from(code: ErrorCode) -> Self {
        Self::new(code)
    }
}

impl fmt::Display for BuiltinError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.message {
            Some(msg) => write!(f, "{}: {msg}", self.code),
            None => write!(f, "{}", self.code),
        }
    }
}

impl std::error::Error for BuiltinError {}

/// Host-facing failures outside the builtin result path.
///
/// These never reach scripts: they are problems with the event loop or with
/// restoring a checkpoint, reported to the server shell.
#[derive(Debug)]
pub enum EngineError {
    /// The I/O event loop failed.
    Io(io::Error),
    /// A persisted continuation could not be encoded or decoded.
    Checkpoint(postcard::Error),
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(err) => write!(f, "event loop error: {err}"),
            Self::Checkpoint(err) => write!(f, "checkpoint error: {err}"),
        }
    }
}

impl std::error::Error for EngineError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(err) => Some(err),
            Self::Checkpoint(err) => Some(err),
        }
    }
}

impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<postcard::Error> for EngineError {
    fn from(err: postcard::Error) -> Self {
        Self::Checkpoint(err)
    }
}
