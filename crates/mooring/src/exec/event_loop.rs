//! The server's I/O event loop, as far as the process engine is concerned.
//!
//! The engine only needs to register a child's pipe under a key, re-arm it after a
//! readiness event and unregister it again; [`IoRegistry`] is that contract.
//! [`PollLoop`] implements it on top of the `polling` crate (epoll on Linux, kqueue on
//! the BSDs), in oneshot mode: every registration fires once and is re-armed by the
//! engine after draining the pipe.

use std::{fmt, io, os::fd::RawFd, time::Duration};

use polling::{Event, Poller};

/// Readability registration for raw descriptors.
pub trait IoRegistry: Send + Sync + fmt::Debug {
    /// Starts watching `fd` for readability, reporting it as `key`.
    fn register_fd(&self, fd: RawFd, key: usize) -> io::Result<()>;

    /// Re-enables a registration after it fired.
    fn rearm_fd(&self, _fd: RawFd, _key: usize) -> io::Result<()> {
        Ok(())
    }

    /// Stops watching `fd`. Must be called before `fd` is closed.
    fn unregister_fd(&self, fd: RawFd) -> io::Result<()>;
}

/// A `polling`-backed event loop.
pub struct PollLoop {
    poller: Poller,
}

impl fmt::Debug for PollLoop {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PollLoop").finish_non_exhaustive()
    }
}

impl PollLoop {
    pub fn new() -> io::Result<Self> {
        Ok(Self { poller: Poller::new()? })
    }

    /// Blocks until a registered descriptor is readable, [`PollLoop::wake`] is called,
    /// or `timeout` passes. Returns the keys of the ready descriptors.
    pub fn wait(&self, timeout: Option<Duration>) -> io::Result<Vec<usize>> {
        let mut events = Vec::new();
        match self.poller.wait(&mut events, timeout) {
            Ok(_) => {}
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
        Ok(events.into_iter().filter(|event| event.readable).map(|event| event.key).collect())
    }

    /// Interrupts a concurrent [`PollLoop::wait`].
    pub fn wake(&self) -> io::Result<()> {
        self.poller.notify()
    }
}

impl IoRegistry for PollLoop {
    fn register_fd(&self, fd: RawFd, key: usize) -> io::Result<()> {
        self.poller.add(fd, Event::readable(key))
    }

    fn rearm_fd(&self, fd: RawFd, key: usize) -> io::Result<()> {
        self.poller.modify(fd, Event::readable(key))
    }

    fn unregister_fd(&self, fd: RawFd) -> io::Result<()> {
        self.poller.delete(fd)
    }
}
