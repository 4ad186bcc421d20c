use std::{path::PathBuf, time::Duration};

/// Default sandbox directory for `exec`, relative to the server's working directory.
pub const DEFAULT_EXEC_DIR: &str = "executables";

/// Default capacity of the process table.
pub const DEFAULT_MAX_PROCESSES: usize = 16;

/// Bytes read from a child's pipe per `read` call.
pub const DEFAULT_READ_CHUNK: usize = 1000;

/// Nested verb depth past which the reference host reports recursion-exceeded.
pub const DEFAULT_MAX_RECURSION_DEPTH: usize = 50;

/// How long a would-block write to a child's stdin is retried before the spawn fails.
pub const DEFAULT_STDIN_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

/// Server configuration for the execution core.
///
/// Use `ServerConfig::default()` for the stock settings, or adjust them with the
/// builder methods.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Directory that every `exec` command path is resolved beneath.
    pub exec_dir: PathBuf,
    /// Maximum number of concurrently tracked external processes.
    pub max_processes: usize,
    /// Complete environment of spawned processes, as `NAME=value` entries.
    pub exec_env: Vec<String>,
    /// Read buffer size used when draining a child's stdout/stderr.
    pub read_chunk: usize,
    /// Bound on retrying a stdin write that would block.
    pub stdin_write_timeout: Duration,
    /// Maximum nested verb depth in the reference host.
    pub max_recursion_depth: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            exec_dir: PathBuf::from(DEFAULT_EXEC_DIR),
            max_processes: DEFAULT_MAX_PROCESSES,
            exec_env: vec!["PATH=/bin:/usr/bin".to_owned()],
            read_chunk: DEFAULT_READ_CHUNK,
            stdin_write_timeout: DEFAULT_STDIN_WRITE_TIMEOUT,
            max_recursion_depth: DEFAULT_MAX_RECURSION_DEPTH,
        }
    }
}

impl ServerConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the sandbox directory for `exec`.
    #[must_use]
    pub fn exec_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.exec_dir = dir.into();
        self
    }

    /// Sets the process table capacity.
    #[must_use]
    pub fn max_processes(mut self, limit: usize) -> Self {
        self.max_processes = limit;
        self
    }

    /// Replaces the environment given to spawned processes.
    #[must_use]
    pub fn exec_env(mut self, env: Vec<String>) -> Self {
        self.exec_env = env;
        self
    }

    /// Sets the pipe read chunk size; zero is bumped to one byte.
    #[must_use]
    pub fn read_chunk(mut self, bytes: usize) -> Self {
        self.read_chunk = bytes.max(1);
        self
    }

    /// Sets how long a blocked stdin write is retried.
    #[must_use]
    pub fn stdin_write_timeout(mut self, timeout: Duration) -> Self {
        self.stdin_write_timeout = timeout;
        self
    }

    /// Sets the nested verb depth limit used by the reference host.
    #[must_use]
    pub fn max_recursion_depth(mut self, limit: usize) -> Self {
        self.max_recursion_depth = limit;
        self
    }

    /// Splits `exec_env` into name/value pairs, skipping malformed entries.
    pub(crate) fn env_pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.exec_env.iter().filter_map(|entry| entry.split_once('='))
    }
}
