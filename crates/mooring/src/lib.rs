#![doc = include_str!("../../../README.md")]

mod builtins;
mod config;
pub mod db;
mod error;
pub mod exec;
mod host;
mod protocol;
pub mod tracer;
mod var;
mod world;

pub use crate::{
    builtins::{BuiltinFunction, Signature, registry},
    config::{
        DEFAULT_EXEC_DIR, DEFAULT_MAX_PROCESSES, DEFAULT_MAX_RECURSION_DEPTH, DEFAULT_READ_CHUNK,
        DEFAULT_STDIN_WRITE_TIMEOUT, ServerConfig,
    },
    db::{Database, MemoryDb, ObjectFlag},
    error::{BfResult, BuiltinError, EngineError, ErrorCode},
    exec::{ExecRequest, ExecWaiter, IoRegistry, PollLoop, ProcessEngine, ProcessInfo, Spawner, WaitStatus},
    host::Host,
    protocol::{
        BuiltinData, CallOutcome, Continuation, Progress, TaskEnumAction, TaskId, TaskResumer, Waiter,
    },
    tracer::{NoopTracer, RecordingTracer, ServerTracer, StderrTracer, TraceEvent},
    var::{AnonId, ObjRef, Objid, Var, VarType},
    world::{NativeVerb, TaskResult, VerbCall, World},
};
