//! Execution-core event tracing.
//!
//! The process engine and the reference host carry a tracer as a type parameter, so the
//! default [`NoopTracer`] compiles away entirely while the other implementations give
//! a log or a recorded event stream.
//!
//! | Tracer | Purpose |
//! |--------|---------|
//! | [`NoopTracer`] | Zero-cost default |
//! | [`StderrTracer`] | Human-readable server log on stderr |
//! | [`RecordingTracer`] | Event recording for tests and post-mortem analysis |

use crate::{
    protocol::{CallOutcome, TaskId},
    var::Var,
};

/// Trace event captured by [`RecordingTracer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceEvent {
    /// A builtin was entered (`step == 1`) or re-entered after a nested call.
    Builtin { name: &'static str, step: u8 },
    /// A builtin asked the host to run a verb.
    VerbCall { this: Var, verb: String, outcome: CallOutcome },
    /// An external process was started.
    Spawn { cmd: String, pid: u32 },
    /// Starting an external process failed.
    SpawnFailed { cmd: String, reason: String },
    /// An owned process was reported as exited.
    Exit { pid: u32, code: i32 },
    /// A process entry was flagged killed during enumeration.
    Kill { task: TaskId },
    /// A task waiting on a process was resumed with its result.
    Resume { task: TaskId },
    /// A process table slot was torn down.
    Release { slot: usize },
}

/// Hook points in the execution core.
///
/// Every method has a no-op default, so implementations only override what they need.
pub trait ServerTracer: std::fmt::Debug {
    #[inline(always)]
    fn on_builtin(&mut self, _name: &'static str, _step: u8) {}

    #[inline(always)]
    fn on_verb_call(&mut self, _this: &Var, _verb: &str, _outcome: CallOutcome) {}

    #[inline(always)]
    fn on_spawn(&mut self, _cmd: &str, _pid: u32) {}

    #[inline(always)]
    fn on_spawn_failed(&mut self, _cmd: &str, _reason: &str) {}

    #[inline(always)]
    fn on_exit(&mut self, _pid: u32, _code: i32) {}

    #[inline(always)]
    fn on_kill(&mut self, _task: TaskId) {}

    #[inline(always)]
    fn on_resume(&mut self, _task: TaskId) {}

    #[inline(always)]
    fn on_release(&mut self, _slot: usize) {}
}

// ============================================================================
// NoopTracer
// ============================================================================

/// A tracer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopTracer;

impl ServerTracer for NoopTracer {}

// ============================================================================
// StderrTracer
// ============================================================================

/// Tracer that writes one log line per event to stderr.
///
/// ```text
/// EXEC: executables/echo (4121)...
/// EXEC: pid 4121 exited with 0
/// ```
#[derive(Debug, Default)]
pub struct StderrTracer {
    /// Also log builtin entries and verb calls, which are chatty.
    verbose: bool,
}

impl StderrTracer {
    #[must_use]
    pub fn new() -> Self {
        Self { verbose: false }
    }

    /// Creates a tracer that also logs every builtin step and verb call.
    #[must_use]
    pub fn verbose() -> Self {
        Self { verbose: true }
    }
}

impl ServerTracer for StderrTracer {
    fn on_builtin(&mut self, name: &'static str, step: u8) {
        if self.verbose {
            eprintln!("BUILTIN: {name} step {step}");
        }
    }

    fn on_verb_call(&mut self, this: &Var, verb: &str, outcome: CallOutcome) {
        if self.verbose {
            eprintln!("VERB: {this}:{verb} -> {outcome:?}");
        }
    }

    fn on_spawn(&mut self, cmd: &str, pid: u32) {
        eprintln!("EXEC: {cmd} ({pid})...");
    }

    fn on_spawn_failed(&mut self, cmd: &str, reason: &str) {
        eprintln!("EXEC: couldn't start {cmd}: {reason}");
    }

    fn on_exit(&mut self, pid: u32, code: i32) {
        eprintln!("EXEC: pid {pid} exited with {code}");
    }

    fn on_kill(&mut self, task: TaskId) {
        eprintln!("EXEC: task {task} killed, process left to finish");
    }
}

// ============================================================================
// RecordingTracer
// ============================================================================

/// Tracer that records every event in order.
#[derive(Debug, Default)]
pub struct RecordingTracer {
    events: Vec<TraceEvent>,
}

impl RecordingTracer {
    #[must_use]
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Returns the recorded events.
    #[must_use]
    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Consumes the tracer and returns the recorded events.
    #[must_use]
    pub fn into_events(self) -> Vec<TraceEvent> {
        self.events
    }
}

impl ServerTracer for RecordingTracer {
    fn on_builtin(&mut self, name: &'static str, step: u8) {
        self.events.push(TraceEvent::Builtin { name, step });
    }

    fn on_verb_call(&mut self, this: &Var, verb: &str, outcome: CallOutcome) {
        self.events.push(TraceEvent::VerbCall {
            this: this.clone(),
            verb: verb.to_owned(),
            outcome,
        });
    }

    fn on_spawn(&mut self, cmd: &str, pid: u32) {
        self.events.push(TraceEvent::Spawn {
            cmd: cmd.to_owned(),
            pid,
        });
    }

    fn on_spawn_failed(&mut self, cmd: &str, reason: &str) {
        self.events.push(TraceEvent::SpawnFailed {
            cmd: cmd.to_owned(),
            reason: reason.to_owned(),
        });
    }

    fn on_exit(&mut self, pid: u32, code: i32) {
        self.events.push(TraceEvent::Exit { pid, code });
    }

    fn on_kill(&mut self, task: TaskId) {
        self.events.push(TraceEvent::Kill { task });
    }

    fn on_resume(&mut self, task: TaskId) {
        self.events.push(TraceEvent::Resume { task });
    }

    fn on_release(&mut self, slot: usize) {
        self.events.push(TraceEvent::Release { slot });
    }
}
