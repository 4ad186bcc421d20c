//! Reference host: a [`MemoryDb`] with native verbs, playing the VM's part for nested
//! verb calls and parked tasks.
//!
//! `World` is what the tests and the CLI run builtins against. A real server drives
//! the continuation protocol from its interpreter loop instead; `World` does the same
//! thing in [`World::drive`], with verbs written as Rust closures.

use std::fmt;

use ahash::AHashMap;

use crate::{
    builtins::BuiltinFunction,
    config::ServerConfig,
    db::{Database, MemoryDb},
    error::BuiltinError,
    exec::{ExecRequest, Spawner},
    host::Host,
    protocol::{CallOutcome, Progress, TaskId, TaskResumer, Waiter},
    tracer::{NoopTracer, ServerTracer},
    var::{ObjRef, Objid, Var},
};

/// A verb invocation as seen by a native verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerbCall {
    pub this: Var,
    pub verb: String,
    pub args: Vec<Var>,
    /// The object the verb was found on: `this` or one of its ancestors.
    pub definer: ObjRef,
}

/// A verb implemented in Rust. Its return value resumes the builtin that called it.
pub type NativeVerb = Box<dyn FnMut(&mut MemoryDb, &VerbCall) -> Var>;

/// How a builtin run by [`World::run_builtin`] ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskResult {
    Complete(Var),
    Error(BuiltinError),
    /// The task was parked; its value arrives through [`TaskResumer::resume_task`].
    Suspended(TaskId),
}

impl TaskResult {
    #[must_use]
    pub fn into_complete(self) -> Option<Var> {
        match self {
            Self::Complete(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_error(self) -> Option<BuiltinError> {
        match self {
            Self::Error(err) => Some(err),
            _ => None,
        }
    }
}

pub struct World<Tr: ServerTracer = NoopTracer> {
    db: MemoryDb,
    config: ServerConfig,
    tracer: Tr,
    verbs: AHashMap<(ObjRef, String), NativeVerb>,
    spawner: Option<Box<dyn Spawner>>,
    /// The verb call a builtin just started, run before the builtin is resumed.
    pending: Option<VerbCall>,
    depth: usize,
    next_task: u64,
    resumed: AHashMap<TaskId, Var>,
    booted: Vec<Objid>,
}

impl<Tr: ServerTracer> fmt::Debug for World<Tr> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("db", &self.db)
            .field("config", &self.config)
            .field("tracer", &self.tracer)
            .field("verbs", &self.verbs.len())
            .field("spawner", &self.spawner)
            .finish_non_exhaustive()
    }
}

impl World<NoopTracer> {
    #[must_use]
    pub fn new(db: MemoryDb) -> Self {
        Self::with_tracer(db, NoopTracer)
    }
}

impl<Tr: ServerTracer> World<Tr> {
    #[must_use]
    pub fn with_tracer(db: MemoryDb, tracer: Tr) -> Self {
        Self {
            db,
            config: ServerConfig::default(),
            tracer,
            verbs: AHashMap::new(),
            spawner: None,
            pending: None,
            depth: 0,
            next_task: 1,
            resumed: AHashMap::new(),
            booted: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: ServerConfig) -> Self {
        self.config = config;
        self
    }

    /// Enables `exec`, parking its tasks on `spawner`.
    #[must_use]
    pub fn with_spawner(mut self, spawner: impl Spawner + 'static) -> Self {
        self.spawner = Some(Box::new(spawner));
        self
    }

    /// Defines `name` on `on`. Redefining a verb replaces it.
    pub fn add_verb(
        &mut self,
        on: impl Into<ObjRef>,
        name: &str,
        verb: impl FnMut(&mut MemoryDb, &VerbCall) -> Var + 'static,
    ) {
        self.verbs.insert((on.into(), name.to_owned()), Box::new(verb));
    }

    #[must_use]
    pub fn db(&self) -> &MemoryDb {
        &self.db
    }

    pub fn db_mut(&mut self) -> &mut MemoryDb {
        &mut self.db
    }

    #[must_use]
    pub fn tracer(&self) -> &Tr {
        &self.tracer
    }

    #[must_use]
    pub fn into_tracer(self) -> Tr {
        self.tracer
    }

    /// Players disconnected by `set_player_flag`, in order.
    #[must_use]
    pub fn booted_players(&self) -> &[Objid] {
        &self.booted
    }

    /// Takes the value a parked task was resumed with, if it has been.
    pub fn take_resumed(&mut self, task: TaskId) -> Option<Var> {
        self.resumed.remove(&task)
    }

    /// Runs `function` as `progr` until it completes, fails or parks.
    pub fn run_builtin(&mut self, progr: Objid, function: BuiltinFunction, args: Vec<Var>) -> TaskResult {
        let progress = function.call(self, progr, args);
        self.drive(progress)
    }

    /// Drives a builtin step to its end, running each nested verb call it starts.
    ///
    /// Also accepts a continuation restored from a checkpoint; the verb call it was
    /// waiting on is then taken to have returned `0`.
    pub fn drive(&mut self, mut progress: Progress) -> TaskResult {
        loop {
            progress = match progress {
                Progress::Complete(value) => return TaskResult::Complete(value),
                Progress::Error(err) => return TaskResult::Error(err),
                Progress::Pending(continuation) => {
                    let value = self.run_pending();
                    continuation.resume(value, self)
                }
                Progress::Suspend(waiter) => return self.park(waiter),
            };
        }
    }

    fn park(&mut self, waiter: Box<dyn Waiter>) -> TaskResult {
        let task = TaskId(self.next_task);
        self.next_task += 1;
        match waiter.suspend(task) {
            Ok(()) => TaskResult::Suspended(task),
            Err(err) => TaskResult::Error(err),
        }
    }

    fn run_pending(&mut self) -> Var {
        let Some(call) = self.pending.take() else {
            return Var::Int(0);
        };
        let key = (call.definer, call.verb.clone());
        let Some(mut verb) = self.verbs.remove(&key) else {
            return Var::Int(0);
        };
        self.depth += 1;
        let value = verb(&mut self.db, &call);
        self.depth -= 1;
        self.verbs.insert(key, verb);
        value
    }

    /// Finds `verb` on `obj` or its nearest ancestor defining it.
    fn lookup(&self, obj: ObjRef, verb: &str) -> Option<ObjRef> {
        let has = |on: ObjRef| self.verbs.contains_key(&(on, verb.to_owned()));
        if has(obj) {
            return Some(obj);
        }
        self.db.ancestors(obj).into_iter().map(ObjRef::Obj).find(|on| has(*on))
    }
}

impl<Tr: ServerTracer> Host for World<Tr> {
    type Db = MemoryDb;

    fn db(&self) -> &MemoryDb {
        &self.db
    }

    fn db_mut(&mut self) -> &mut MemoryDb {
        &mut self.db
    }

    fn config(&self) -> &ServerConfig {
        &self.config
    }

    fn call_verb(&mut self, this: &Var, verb: &str, args: Vec<Var>) -> CallOutcome {
        let definer = this
            .as_object()
            .filter(|obj| self.db.is_valid(*obj))
            .and_then(|obj| self.lookup(obj, verb));
        let outcome = match definer {
            None => CallOutcome::NotFound,
            Some(_) if self.depth >= self.config.max_recursion_depth => CallOutcome::RecursionExceeded,
            Some(definer) => {
                self.pending = Some(VerbCall {
                    this: this.clone(),
                    verb: verb.to_owned(),
                    args,
                    definer,
                });
                CallOutcome::Started
            }
        };
        self.tracer.on_verb_call(this, verb, outcome);
        outcome
    }

    fn boot_player(&mut self, who: Objid) {
        self.booted.push(who);
    }

    fn spawn_waiter(&mut self, request: ExecRequest) -> Option<Box<dyn Waiter>> {
        self.spawner.as_ref().map(|spawner| spawner.waiter(request))
    }

    fn trace_builtin(&mut self, name: &'static str, step: u8) {
        self.tracer.on_builtin(name, step);
    }
}

impl<Tr: ServerTracer> TaskResumer for World<Tr> {
    fn resume_task(&mut self, task: TaskId, value: Var) {
        self.resumed.insert(task, value);
    }
}
