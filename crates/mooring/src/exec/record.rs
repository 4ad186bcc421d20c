use std::{
    io::{self, ErrorKind, Read, Write},
    os::{
        fd::{AsRawFd, RawFd},
        unix::process::ExitStatusExt,
    },
    process::{Child, ChildStderr, ChildStdin, ChildStdout, ExitStatus},
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use strum::{Display, IntoStaticStr};

use super::{ExecRequest, binary, event_loop::IoRegistry};
use crate::{protocol::TaskId, var::Var};

/// Lifecycle of a process table entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum WaitStatus {
    /// The process has not been reported as exited and the task still waits on it.
    Running,
    /// The process exited; the task is resumed on the next reap pass. Final.
    Stopped,
    /// The task no longer waits; the entry is released once the process exits. Final.
    Killed,
}

/// Status plus exit bookkeeping, separate from the OS handles so it can be reasoned
/// about on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Lifecycle {
    status: WaitStatus,
    exit_code: Option<i32>,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            status: WaitStatus::Running,
            exit_code: None,
        }
    }

    pub(crate) fn status(self) -> WaitStatus {
        self.status
    }

    pub(crate) fn exit_code(self) -> Option<i32> {
        self.exit_code
    }

    /// Records an exit. Only the first report counts: a later one changes neither the
    /// status nor the code.
    pub(crate) fn exited(&mut self, code: i32) {
        if self.exit_code.is_some() {
            return;
        }
        self.exit_code = Some(code);
        if self.status == WaitStatus::Running {
            self.status = WaitStatus::Stopped;
        }
    }

    pub(crate) fn kill(&mut self) {
        self.status = WaitStatus::Killed;
    }

    /// Final status and the process is gone.
    pub(crate) fn is_finished(self) -> bool {
        self.status != WaitStatus::Running && self.exit_code.is_some()
    }
}

/// Which of a child's output pipes an event-loop key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Pipe {
    Stdout,
    Stderr,
}

impl Pipe {
    const ALL: [Self; 2] = [Self::Stdout, Self::Stderr];

    pub(crate) fn key(self, slot: usize) -> usize {
        slot * 2 + self as usize
    }

    /// Splits an event-loop key into slot and pipe.
    pub(crate) fn from_key(key: usize) -> (usize, Self) {
        let pipe = if key % 2 == 0 { Self::Stdout } else { Self::Stderr };
        (key / 2, pipe)
    }
}

/// One spawned process and everything it owns.
///
/// Dropping the record unregisters its pipes from the event loop and then closes them,
/// so every exit path (spawn failure, kill, normal reap) releases the same resources.
#[derive(Debug)]
pub(crate) struct ProcessRecord {
    pub(crate) cmd: String,
    pub(crate) args: Vec<String>,
    pub(crate) pid: u32,
    pub(crate) task: TaskId,
    pub(crate) slot: usize,
    lifecycle: Lifecycle,
    feeding: bool,
    child: Child,
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    out: String,
    err: String,
    registered: [bool; 2],
    io: Arc<dyn IoRegistry>,
}

impl ProcessRecord {
    /// Takes ownership of a freshly spawned child: makes its pipes non-blocking and
    /// registers stdout/stderr under `slot`. The child's stdin is handed back for
    /// [`feed`]; until [`ProcessRecord::fed`] is called the entry is never resumed or
    /// released.
    ///
    /// On failure the child is killed and reaped and every descriptor is closed.
    pub(crate) fn start(
        mut child: Child,
        request: ExecRequest,
        task: TaskId,
        slot: usize,
        io: Arc<dyn IoRegistry>,
    ) -> io::Result<(Self, ChildStdin)> {
        let stdin = child.stdin.take();
        let mut record = Self {
            cmd: request.cmd,
            args: request.args,
            pid: child.id(),
            task,
            slot,
            lifecycle: Lifecycle::new(),
            feeding: true,
            stdout: child.stdout.take(),
            stderr: child.stderr.take(),
            child,
            out: String::new(),
            err: String::new(),
            registered: [false; 2],
            io,
        };
        match record.plumb(stdin) {
            Ok(stdin) => Ok((record, stdin)),
            Err(err) => {
                record.abort();
                Err(err)
            }
        }
    }

    fn plumb(&mut self, stdin: Option<ChildStdin>) -> io::Result<ChildStdin> {
        let stdin = stdin.ok_or_else(|| io::Error::new(ErrorKind::BrokenPipe, "child has no stdin"))?;
        set_nonblocking(stdin.as_raw_fd())?;
        for pipe in Pipe::ALL {
            if let Some(fd) = self.raw_fd(pipe) {
                set_nonblocking(fd)?;
                self.io.register_fd(fd, pipe.key(self.slot))?;
                self.registered[pipe as usize] = true;
            }
        }
        Ok(stdin)
    }

    /// Kills and reaps the child.
    pub(crate) fn abort(&mut self) {
        // the child may already be gone
        let _ = self.child.kill();
        let _ = self.child.wait();
    }

    /// The child's input has been written and its stdin closed.
    pub(crate) fn fed(&mut self) {
        self.feeding = false;
    }

    fn raw_fd(&self, pipe: Pipe) -> Option<RawFd> {
        match pipe {
            Pipe::Stdout => self.stdout.as_ref().map(AsRawFd::as_raw_fd),
            Pipe::Stderr => self.stderr.as_ref().map(AsRawFd::as_raw_fd),
        }
    }

    pub(crate) fn status(&self) -> WaitStatus {
        self.lifecycle.status()
    }

    pub(crate) fn exit_code(&self) -> Option<i32> {
        self.lifecycle.exit_code()
    }

    pub(crate) fn has_exited(&self) -> bool {
        self.lifecycle.exit_code().is_some()
    }

    pub(crate) fn is_finished(&self) -> bool {
        !self.feeding && self.lifecycle.is_finished()
    }

    /// Exited, still awaited and fully fed: its task can be resumed.
    pub(crate) fn is_ready(&self) -> bool {
        !self.feeding && self.lifecycle.status() == WaitStatus::Stopped
    }

    pub(crate) fn exited(&mut self, code: i32) {
        self.lifecycle.exited(code);
    }

    pub(crate) fn kill(&mut self) {
        self.lifecycle.kill();
    }

    /// Non-blocking check whether the child has exited, without disturbing a host that
    /// reaps children itself.
    pub(crate) fn try_exit_code(&mut self) -> Option<i32> {
        self.child.try_wait().ok().flatten().map(exit_code)
    }

    /// Drains everything currently readable from one pipe.
    ///
    /// Output of a killed entry is read and thrown away so the child never blocks on a
    /// full pipe. The pipe is closed at end of file or when it cannot be re-armed, and
    /// re-armed otherwise.
    pub(crate) fn read_pipe(&mut self, pipe: Pipe, chunk: usize) {
        let discard = self.lifecycle.status() == WaitStatus::Killed;
        let eof = match pipe {
            Pipe::Stdout => match self.stdout.as_mut() {
                Some(stream) => drain(stream, chunk, &mut self.out, discard),
                None => return,
            },
            Pipe::Stderr => match self.stderr.as_mut() {
                Some(stream) => drain(stream, chunk, &mut self.err, discard),
                None => return,
            },
        };
        if eof {
            self.close_pipe(pipe);
        } else if let Some(fd) = self.raw_fd(pipe)
            && self.io.rearm_fd(fd, pipe.key(self.slot)).is_err()
        {
            // nothing would drain it again; the child gets EPIPE instead of blocking
            self.close_pipe(pipe);
        }
    }

    fn close_pipe(&mut self, pipe: Pipe) {
        if let Some(fd) = self.raw_fd(pipe)
            && self.registered[pipe as usize]
        {
            let _ = self.io.unregister_fd(fd);
        }
        self.registered[pipe as usize] = false;
        match pipe {
            Pipe::Stdout => self.stdout = None,
            Pipe::Stderr => self.stderr = None,
        }
    }

    /// The task's result, `{code, stdout, stderr}`, taking the buffered output.
    pub(crate) fn take_result(&mut self) -> Var {
        Var::List(vec![
            Var::Int(i64::from(self.exit_code().unwrap_or(0))),
            Var::Str(std::mem::take(&mut self.out)),
            Var::Str(std::mem::take(&mut self.err)),
        ])
    }
}

impl Drop for ProcessRecord {
    fn drop(&mut self) {
        for pipe in Pipe::ALL {
            self.close_pipe(pipe);
        }
        // collect the zombie if the host has not
        let _ = self.child.try_wait();
    }
}

/// Exit status as scripts see it: the exit code, or 128 plus the signal number.
pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    status
        .code()
        .or_else(|| status.signal().map(|signal| 128 + signal))
        .unwrap_or(-1)
}

fn set_nonblocking(fd: RawFd) -> io::Result<()> {
    // SAFETY: `fd` belongs to a pipe owned by the caller and stays open for the call;
    // F_GETFL does not touch memory.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags < 0 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: same descriptor; only O_NONBLOCK is added to its existing status flags.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK) } < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Writes `input`, if any, to the child and closes its stdin.
pub(crate) fn feed(mut stdin: ChildStdin, input: Option<&[u8]>, timeout: Duration) -> io::Result<()> {
    if let Some(input) = input {
        write_all(&mut stdin, input, timeout)?;
    }
    drop(stdin);
    Ok(())
}

/// Writes all of `input` to a non-blocking pipe, retrying would-block writes until
/// `timeout` has passed.
fn write_all(stdin: &mut ChildStdin, input: &[u8], timeout: Duration) -> io::Result<()> {
    let deadline = Instant::now() + timeout;
    let mut rest = input;
    while !rest.is_empty() {
        match stdin.write(rest) {
            Ok(0) => return Err(ErrorKind::WriteZero.into()),
            Ok(n) => rest = &rest[n..],
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                if Instant::now() >= deadline {
                    return Err(io::Error::new(ErrorKind::TimedOut, "child did not read its input"));
                }
                thread::sleep(Duration::from_millis(1));
            }
            Err(err) => return Err(err),
        }
    }
    Ok(())
}

/// Reads until the pipe would block or ends, appending the encoded bytes to `out`.
///
/// Returns true at end of file. A read error other than would-block also counts as
/// end of file: the pipe is unusable either way.
fn drain(stream: &mut impl Read, chunk: usize, out: &mut String, discard: bool) -> bool {
    let mut buf = vec![0; chunk.max(1)];
    loop {
        match stream.read(&mut buf) {
            Ok(0) => return true,
            Ok(_) if discard => {}
            Ok(n) => binary::encode_into(&buf[..n], out),
            Err(err) if err.kind() == ErrorKind::Interrupted => {}
            Err(err) if err.kind() == ErrorKind::WouldBlock => return false,
            Err(_) => return true,
        }
    }
}
