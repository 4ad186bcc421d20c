//! Asynchronous external processes.
//!
//! `exec` parks its task on an [`ExecWaiter`]; once the VM has a task handle the waiter
//! spawns the process into the [`ProcessEngine`]'s table. From then on the server's
//! event loop feeds the child's output into the record, exits are picked up by
//! [`ProcessEngine::poll_exits`] or reported through [`ProcessEngine::notify_exit`],
//! and [`ProcessEngine::handle_completions`] resumes the task with
//! `{exit code, stdout, stderr}`.

pub mod binary;
mod engine;
mod event_loop;
pub(crate) mod path;
mod record;
mod table;

use std::path::PathBuf;

pub use engine::{ExecWaiter, ProcessEngine, ProcessInfo, Spawner};
pub use event_loop::{IoRegistry, PollLoop};
pub use record::WaitStatus;

/// A validated `exec` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecRequest {
    /// Resolved program path beneath the sandbox directory.
    pub path: PathBuf,
    /// The command as the script gave it, used in logs and enumeration.
    pub cmd: String,
    /// Full argument vector; `args[0]` becomes the child's `argv[0]`.
    pub args: Vec<String>,
    /// Bytes written to the child's stdin before it is closed.
    pub input: Option<Vec<u8>>,
}
