use std::{
    fmt,
    os::unix::process::CommandExt,
    process::{Command, Stdio},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use parking_lot::Mutex;

use super::{
    ExecRequest,
    event_loop::{IoRegistry, PollLoop},
    record::{Pipe, ProcessRecord, WaitStatus, feed},
    table::ProcessTable,
};
use crate::{
    config::ServerConfig,
    error::{BuiltinError, EngineError, ErrorCode},
    protocol::{TaskEnumAction, TaskId, TaskResumer, Waiter},
    tracer::{NoopTracer, ServerTracer},
    var::Var,
};

/// Snapshot of one process table entry, for administrative listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub slot: usize,
    pub pid: u32,
    pub task: TaskId,
    pub cmd: String,
    pub args: Vec<String>,
    pub status: WaitStatus,
}

#[derive(Debug)]
struct Inner<Tr> {
    table: ProcessTable,
    tracer: Tr,
}

#[derive(Debug)]
struct Shared<Tr> {
    /// Every table mutation happens under this lock, including exit notification.
    inner: Mutex<Inner<Tr>>,
    /// Set when some entry has exited since the last reap pass.
    exited: AtomicBool,
    io: Arc<dyn IoRegistry>,
    config: ServerConfig,
}

/// Owner of every external process started by `exec`.
///
/// Cheap to clone; clones share one process table. Exit notification may come from
/// another thread (a dedicated child reaper, say); everything else is meant to be
/// driven from the server's main loop.
pub struct ProcessEngine<Tr: ServerTracer = NoopTracer> {
    shared: Arc<Shared<Tr>>,
}

impl<Tr: ServerTracer> Clone for ProcessEngine<Tr> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<Tr: ServerTracer> fmt::Debug for ProcessEngine<Tr> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessEngine")
            .field("config", &self.shared.config)
            .field("exited", &self.shared.exited.load(Ordering::Acquire))
            .finish_non_exhaustive()
    }
}

impl ProcessEngine<NoopTracer> {
    /// Creates an engine without tracing.
    #[must_use]
    pub fn new(config: ServerConfig, io: Arc<dyn IoRegistry>) -> Self {
        Self::with_tracer(config, io, NoopTracer)
    }
}

impl<Tr: ServerTracer> ProcessEngine<Tr> {
    #[must_use]
    pub fn with_tracer(config: ServerConfig, io: Arc<dyn IoRegistry>, tracer: Tr) -> Self {
        Self {
            shared: Arc::new(Shared {
                inner: Mutex::new(Inner {
                    table: ProcessTable::new(config.max_processes),
                    tracer,
                }),
                exited: AtomicBool::new(false),
                io,
                config,
            }),
        }
    }

    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.shared.config
    }

    /// Gives read access to the tracer, e.g. to inspect a [`crate::RecordingTracer`].
    pub fn tracer<R>(&self, f: impl FnOnce(&Tr) -> R) -> R {
        f(&self.shared.inner.lock().tracer)
    }

    /// Number of occupied table slots.
    #[must_use]
    pub fn len(&self) -> usize {
        self.shared.inner.lock().table.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Starts `request` on behalf of `task`, returning the child's pid.
    ///
    /// Fails with `E_QUOTA` "Too many processes" when the table is full and with
    /// `E_EXEC` when the process cannot be started or fed its input. A failed spawn
    /// leaves no table entry, no open descriptor and no running child behind.
    ///
    /// The entry is in the table before its input is written, and the table is not
    /// locked during the write, so exit notification and the event loop carry on
    /// while a slow child reads its stdin.
    pub fn spawn(&self, mut request: ExecRequest, task: TaskId) -> Result<u32, BuiltinError> {
        let config = &self.shared.config;
        let input = request.input.take();
        let cmd = request.cmd.clone();

        let (pid, slot, stdin) = {
            let mut guard = self.shared.inner.lock();
            let Inner { table, tracer } = &mut *guard;
            let Some(slot) = table.free_slot() else {
                return Err(BuiltinError::raise(ErrorCode::Quota, "Too many processes", Var::Int(0)));
            };

            let mut command = Command::new(&request.path);
            if let Some((argv0, rest)) = request.args.split_first() {
                command.arg0(argv0).args(rest);
            }
            command
                .env_clear()
                .envs(config.env_pairs())
                .stdin(Stdio::piped())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped());

            let started = command
                .spawn()
                .and_then(|child| ProcessRecord::start(child, request, task, slot, Arc::clone(&self.shared.io)));
            match started {
                Ok((record, stdin)) => {
                    let pid = record.pid;
                    tracer.on_spawn(&cmd, pid);
                    table.insert(record);
                    (pid, slot, stdin)
                }
                Err(err) => return Err(spawn_failed(tracer, cmd, &err)),
            }
        };

        let fed = feed(stdin, input.as_deref(), config.stdin_write_timeout);
        let mut guard = self.shared.inner.lock();
        let Inner { table, tracer } = &mut *guard;
        match fed {
            Ok(()) => {
                if let Some(record) = table.get_mut(slot) {
                    record.fed();
                }
                Ok(pid)
            }
            Err(err) => {
                if let Some(mut record) = table.remove(slot) {
                    record.abort();
                }
                Err(spawn_failed(tracer, cmd, &err))
            }
        }
    }

    /// A waiter that spawns `request` once the VM hands it the parked task.
    #[must_use]
    pub fn waiter(&self, request: ExecRequest) -> ExecWaiter<Tr> {
        ExecWaiter {
            engine: self.clone(),
            request,
        }
    }

    /// Drains the pipe behind an event-loop key.
    pub fn on_readable(&self, key: usize) {
        let (slot, pipe) = Pipe::from_key(key);
        let chunk = self.shared.config.read_chunk;
        if let Some(record) = self.shared.inner.lock().table.get_mut(slot) {
            record.read_pipe(pipe, chunk);
        }
    }

    /// Checks every child not yet known to have exited, without blocking.
    ///
    /// Returns how many exits were found.
    pub fn poll_exits(&self) -> usize {
        let mut guard = self.shared.inner.lock();
        let Inner { table, tracer } = &mut *guard;
        let mut found = 0;
        for record in table.iter_mut().filter(|record| !record.has_exited()) {
            if let Some(code) = record.try_exit_code() {
                record.exited(code);
                tracer.on_exit(record.pid, code);
                found += 1;
            }
        }
        if found > 0 {
            self.shared.exited.store(true, Ordering::Release);
        }
        found
    }

    /// Reports that `pid` exited with `code`, for hosts that reap children themselves.
    ///
    /// Returns whether the process belongs to this engine. Only the first report for
    /// an entry changes it.
    pub fn notify_exit(&self, pid: u32, code: i32) -> bool {
        let mut guard = self.shared.inner.lock();
        let Inner { table, tracer } = &mut *guard;
        if !table.complete(pid, code) {
            return false;
        }
        tracer.on_exit(pid, code);
        self.shared.exited.store(true, Ordering::Release);
        true
    }

    /// The per-iteration reap pass.
    ///
    /// Resumes the task of every exited entry with `{code, stdout, stderr}` after one
    /// last drain of its pipes, then releases every finished entry. Killed entries are
    /// released without resuming anything, and only once their process is gone. Tasks
    /// are resumed after the table lock is dropped. Returns the number of resumed tasks.
    pub fn handle_completions(&self, resumer: &mut impl TaskResumer) -> usize {
        self.poll_exits();
        if !self.shared.exited.swap(false, Ordering::AcqRel) {
            return 0;
        }

        let chunk = self.shared.config.read_chunk;
        let mut ready = Vec::new();
        {
            let mut guard = self.shared.inner.lock();
            let Inner { table, tracer } = &mut *guard;
            for record in table.iter_mut().filter(|record| record.is_ready()) {
                record.read_pipe(Pipe::Stdout, chunk);
                record.read_pipe(Pipe::Stderr, chunk);
                tracer.on_resume(record.task);
                ready.push((record.task, record.take_result()));
            }
            for slot in table.release_finished() {
                tracer.on_release(slot);
            }
        }

        let resumed = ready.len();
        for (task, value) in ready {
            resumer.resume_task(task, value);
        }
        resumed
    }

    /// Walks every entry that is not killed, asking `callback` what to do with it.
    ///
    /// [`TaskEnumAction::Kill`] only flags the entry: its task is never resumed and the
    /// entry is released by a later reap pass, after the process has exited on its own.
    /// Enumeration stops at the first answer other than `Continue`, which is returned.
    /// The table is locked for the duration, so `callback` must not call back into the
    /// engine.
    pub fn enumerate(&self, mut callback: impl FnMut(TaskId, &str) -> TaskEnumAction) -> TaskEnumAction {
        let mut guard = self.shared.inner.lock();
        let Inner { table, tracer } = &mut *guard;
        let mut action = TaskEnumAction::Continue;
        for record in table.iter_mut().filter(|record| record.status() != WaitStatus::Killed) {
            action = callback(record.task, &record.cmd);
            if action == TaskEnumAction::Kill {
                record.kill();
                tracer.on_kill(record.task);
            }
            if action != TaskEnumAction::Continue {
                break;
            }
        }
        action
    }

    /// Lists the table.
    #[must_use]
    pub fn processes(&self) -> Vec<ProcessInfo> {
        self.shared
            .inner
            .lock()
            .table
            .iter()
            .map(|record| ProcessInfo {
                slot: record.slot,
                pid: record.pid,
                task: record.task,
                cmd: record.cmd.clone(),
                args: record.args.clone(),
                status: record.status(),
            })
            .collect()
    }

    /// One event-loop iteration: wait up to `timeout` for output, drain whatever became
    /// readable, then run the reap pass.
    pub fn turn(
        &self,
        poll: &PollLoop,
        timeout: Option<Duration>,
        resumer: &mut impl TaskResumer,
    ) -> Result<usize, EngineError> {
        for key in poll.wait(timeout)? {
            self.on_readable(key);
        }
        Ok(self.handle_completions(resumer))
    }
}

fn spawn_failed(tracer: &mut impl ServerTracer, cmd: String, err: &std::io::Error) -> BuiltinError {
    let reason = err.to_string();
    tracer.on_spawn_failed(&cmd, &reason);
    BuiltinError::raise(ErrorCode::Exec, reason, Var::Str(cmd))
}

/// The suspension `exec` hands to the VM.
#[derive(Debug)]
pub struct ExecWaiter<Tr: ServerTracer = NoopTracer> {
    engine: ProcessEngine<Tr>,
    request: ExecRequest,
}

impl<Tr: ServerTracer> Waiter for ExecWaiter<Tr> {
    fn suspend(self: Box<Self>, task: TaskId) -> Result<(), BuiltinError> {
        let Self { engine, request } = *self;
        engine.spawn(request, task).map(|_| ())
    }
}

/// Type-erased access to a process engine, for hosts that do not want to carry the
/// tracer type around.
pub trait Spawner: fmt::Debug {
    fn waiter(&self, request: ExecRequest) -> Box<dyn Waiter>;
}

impl<Tr: ServerTracer + 'static> Spawner for ProcessEngine<Tr> {
    fn waiter(&self, request: ExecRequest) -> Box<dyn Waiter> {
        Box::new(ProcessEngine::waiter(self, request))
    }
}
