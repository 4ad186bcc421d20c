/// Tests for exec() and the process engine: sandbox checks, output capture through
/// the event loop, exit codes, killed tasks and table capacity.
use std::{
    path::Path,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use mooring::{
    BuiltinFunction, Database, ErrorCode, ExecRequest, IoRegistry, MemoryDb, NoopTracer, ObjRef, ObjectFlag, Objid,
    PollLoop, ProcessEngine, RecordingTracer, ServerConfig, ServerTracer, TaskEnumAction, TaskId, TaskResult,
    TraceEvent, Var, WaitStatus, World,
};
use pretty_assertions::assert_eq;
use tempfile::TempDir;

const WIZARD: Objid = Objid(0);
const PLAYER: Objid = Objid(1);

struct Harness<Tr: ServerTracer = NoopTracer> {
    dir: TempDir,
    poll: Arc<PollLoop>,
    engine: ProcessEngine<Tr>,
    world: World,
}

/// Links a system tool into the sandbox under its own name.
fn link_tool(dir: &Path, name: &str) {
    let target = ["/bin", "/usr/bin"]
        .iter()
        .map(|bin| Path::new(bin).join(name))
        .find(|path| path.exists())
        .unwrap_or_else(|| panic!("{name} not found"));
    std::os::unix::fs::symlink(target, dir.join(name)).unwrap();
}

fn harness_with<Tr: ServerTracer + 'static>(
    tracer: Tr,
    configure: impl FnOnce(ServerConfig) -> ServerConfig,
) -> Harness<Tr> {
    let dir = tempfile::tempdir().unwrap();
    for tool in ["echo", "cat", "sh", "sleep"] {
        link_tool(dir.path(), tool);
    }
    let config = configure(ServerConfig::new().exec_dir(dir.path()));

    let poll = Arc::new(PollLoop::new().unwrap());
    let io: Arc<dyn IoRegistry> = poll.clone();
    let engine = ProcessEngine::with_tracer(config.clone(), io, tracer);

    let mut db = MemoryDb::new();
    let wizard = db.create(&[], Objid::NOTHING);
    db.set_flag(ObjRef::Obj(wizard), ObjectFlag::Wizard);
    db.create(&[], Objid::NOTHING);
    let world = World::new(db).with_config(config).with_spawner(engine.clone());

    Harness {
        dir,
        poll,
        engine,
        world,
    }
}

fn harness() -> Harness {
    harness_with(NoopTracer, |config| config)
}

fn argv(words: &[&str]) -> Var {
    Var::List(words.iter().map(|word| Var::Str((*word).to_owned())).collect())
}

impl<Tr: ServerTracer> Harness<Tr> {
    fn exec(&mut self, progr: Objid, args: Vec<Var>) -> TaskResult {
        self.world.run_builtin(progr, BuiltinFunction::Exec, args)
    }

    fn start(&mut self, words: &[&str]) -> TaskId {
        match self.exec(WIZARD, vec![argv(words)]) {
            TaskResult::Suspended(task) => task,
            other => panic!("exec {words:?} did not suspend: {other:?}"),
        }
    }

    /// Runs the event loop until `task` is resumed.
    fn wait_for(&mut self, task: TaskId) -> Var {
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            self.engine
                .turn(&self.poll, Some(Duration::from_millis(50)), &mut self.world)
                .unwrap();
            if let Some(value) = self.world.take_resumed(task) {
                return value;
            }
        }
        panic!("task {task} was never resumed");
    }

    /// Runs the event loop until the process table is empty.
    fn drain(&mut self) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while !self.engine.is_empty() {
            assert!(Instant::now() < deadline, "process table never emptied");
            self.engine
                .turn(&self.poll, Some(Duration::from_millis(50)), &mut self.world)
                .unwrap();
        }
    }
}

fn result(code: i64, out: &str, err: &str) -> Var {
    Var::List(vec![Var::Int(code), Var::Str(out.to_owned()), Var::Str(err.to_owned())])
}

fn raised(result: TaskResult) -> (ErrorCode, String) {
    let err = result.into_error().expect("expected an error");
    (err.code, err.message().to_owned())
}

// =============================================================================
// Output and exit codes
// =============================================================================

#[test]
fn echo_output_comes_back_binary_encoded() {
    let mut h = harness();
    let task = h.start(&["echo", "hi"]);

    assert_eq!(h.wait_for(task), result(0, "hi~0A", ""));
    h.drain();
}

#[test]
fn input_is_fed_to_stdin() {
    let mut h = harness();
    let TaskResult::Suspended(task) = h.exec(WIZARD, vec![argv(&["cat"]), Var::Str("one~0Atwo~7E".to_owned())])
    else {
        panic!("cat did not suspend");
    };

    assert_eq!(h.wait_for(task), result(0, "one~0Atwo~7E", ""));
}

#[test]
fn exit_code_and_stderr_are_reported() {
    let mut h = harness();
    let task = h.start(&["sh", "-c", "echo oops >&2; exit 3"]);

    assert_eq!(h.wait_for(task), result(3, "", "oops~0A"));
}

#[test]
fn signal_death_is_128_plus_the_signal() {
    let mut h = harness();
    let task = h.start(&["sh", "-c", "kill -9 $$"]);

    assert_eq!(h.wait_for(task), result(137, "", ""));
}

#[test]
fn output_larger_than_one_read_is_kept_whole() {
    let mut h = harness_with(NoopTracer, |config| config.read_chunk(7));
    let task = h.start(&["sh", "-c", "echo 0123456789; echo abcdefghij"]);

    assert_eq!(h.wait_for(task), result(0, "0123456789~0Aabcdefghij~0A", ""));
}

#[test]
fn concurrent_tasks_are_resumed_independently() {
    let mut h = harness();
    let slow = h.start(&["sh", "-c", "sleep 0.2; echo slow"]);
    let fast = h.start(&["echo", "fast"]);

    assert_eq!(h.wait_for(fast), result(0, "fast~0A", ""));
    assert_eq!(h.wait_for(slow), result(0, "slow~0A", ""));
    h.drain();
}

#[test]
fn lifecycle_is_traced() {
    let mut h = harness_with(RecordingTracer::new(), |config| config);
    let task = h.start(&["echo"]);
    h.wait_for(task);
    h.drain();

    let events = h.engine.tracer(|tracer| tracer.events().to_vec());
    let [TraceEvent::Spawn { cmd, pid }, rest @ ..] = events.as_slice() else {
        panic!("no spawn event in {events:?}");
    };
    assert_eq!(cmd, "echo");
    assert_eq!(
        rest,
        &[
            TraceEvent::Exit { pid: *pid, code: 0 },
            TraceEvent::Resume { task },
            TraceEvent::Release { slot: 0 },
        ]
    );
}

// =============================================================================
// Argument and sandbox checks
// =============================================================================

#[test]
fn paths_outside_the_sandbox_are_invalid() {
    let mut h = harness();
    for cmd in ["../echo", "/bin/echo", "./echo", "bin/../echo", ""] {
        let outcome = raised(h.exec(WIZARD, vec![argv(&[cmd])]));
        assert_eq!(outcome, (ErrorCode::InvArg, "Invalid path".to_owned()), "{cmd:?}");
    }
    assert!(h.engine.is_empty());
}

#[test]
fn missing_and_non_file_commands() {
    let mut h = harness();
    std::fs::create_dir(h.dir.path().join("tools")).unwrap();

    let outcome = raised(h.exec(WIZARD, vec![argv(&["nope"])]));
    assert_eq!(outcome, (ErrorCode::InvArg, "Does not exist".to_owned()));
    let outcome = raised(h.exec(WIZARD, vec![argv(&["tools"])]));
    assert_eq!(outcome, (ErrorCode::InvArg, "Is not a file".to_owned()));
}

#[test]
fn malformed_argument_lists_are_invalid() {
    let mut h = harness();
    let outcome = raised(h.exec(WIZARD, vec![Var::List(Vec::new())]));
    assert_eq!(outcome.0, ErrorCode::InvArg);
    let outcome = raised(h.exec(WIZARD, vec![Var::List(vec![Var::Str("echo".to_owned()), Var::Int(1)])]));
    assert_eq!(outcome.0, ErrorCode::InvArg);
    let outcome = raised(h.exec(WIZARD, vec![argv(&["cat"]), Var::Str("~ZZ".to_owned())]));
    assert_eq!(outcome.0, ErrorCode::InvArg);
    let outcome = raised(h.exec(WIZARD, vec![Var::Str("echo".to_owned())]));
    assert_eq!(outcome.0, ErrorCode::Type);
}

#[test]
fn exec_is_for_wizards_but_paths_are_checked_first() {
    let mut h = harness();
    assert_eq!(raised(h.exec(PLAYER, vec![argv(&["echo"])])).0, ErrorCode::Perm);
    assert_eq!(raised(h.exec(PLAYER, vec![argv(&["../echo"])])).0, ErrorCode::InvArg);
}

#[test]
fn unexecutable_file_fails_to_start() {
    let mut h = harness();
    std::fs::write(h.dir.path().join("script"), b"#!/bin/sh\necho hi\n").unwrap();

    let err = h.exec(WIZARD, vec![argv(&["script"])]).into_error().unwrap();
    assert_eq!(err.code, ErrorCode::Exec);
    assert_eq!(err.value, Var::Str("script".to_owned()));
    assert!(h.engine.is_empty());
}

#[test]
fn without_an_engine_exec_is_unavailable() {
    let mut db = MemoryDb::new();
    let wizard = db.create(&[], Objid::NOTHING);
    db.set_flag(ObjRef::Obj(wizard), ObjectFlag::Wizard);
    let dir = tempfile::tempdir().unwrap();
    link_tool(dir.path(), "echo");
    let mut world = World::new(db).with_config(ServerConfig::new().exec_dir(dir.path()));

    let outcome = raised(world.run_builtin(wizard, BuiltinFunction::Exec, vec![argv(&["echo"])]));
    assert_eq!(outcome, (ErrorCode::Exec, "Process execution is not available".to_owned()));
}

// =============================================================================
// Table management
// =============================================================================

#[test]
fn full_table_is_a_quota_error() {
    let mut h = harness_with(NoopTracer, |config| config.max_processes(1));
    let task = h.start(&["sh", "-c", "sleep 0.2"]);

    let outcome = raised(h.exec(WIZARD, vec![argv(&["echo"])]));
    assert_eq!(outcome, (ErrorCode::Quota, "Too many processes".to_owned()));
    assert_eq!(h.engine.len(), 1);

    assert_eq!(h.wait_for(task), result(0, "", ""));
    h.drain();
    let task = h.start(&["echo", "again"]);
    assert_eq!(h.wait_for(task), result(0, "again~0A", ""));
}

#[test]
fn first_exit_report_wins() {
    let mut h = harness();
    let task = h.start(&["sleep", "1"]);
    let pid = h.engine.processes()[0].pid;

    assert!(h.engine.notify_exit(pid, 7));
    assert!(h.engine.notify_exit(pid, 9));
    assert!(!h.engine.notify_exit(u32::MAX, 1));

    assert_eq!(h.engine.handle_completions(&mut h.world), 1);
    assert_eq!(h.world.take_resumed(task), Some(result(7, "", "")));
    assert!(h.engine.is_empty());
}

#[test]
fn table_stays_usable_while_a_child_ignores_its_input() {
    let mut h = harness_with(NoopTracer, |config| config.stdin_write_timeout(Duration::from_secs(2)));
    let request = ExecRequest {
        path: h.dir.path().join("sleep"),
        cmd: "sleep".to_owned(),
        args: vec!["sleep".to_owned(), "5".to_owned()],
        input: Some(vec![b'x'; 1 << 20]),
    };
    let engine = h.engine.clone();
    let feeder = thread::spawn(move || engine.spawn(request, TaskId(99)));

    let deadline = Instant::now() + Duration::from_secs(1);
    let pid = loop {
        if let Some(info) = h.engine.processes().first() {
            break info.pid;
        }
        assert!(Instant::now() < deadline, "entry not visible while its input is written");
        thread::sleep(Duration::from_millis(10));
    };
    assert!(!feeder.is_finished());
    assert!(h.engine.notify_exit(pid, 0));
    // not resumed or released before the write settles
    assert_eq!(h.engine.handle_completions(&mut h.world), 0);
    assert_eq!(h.engine.len(), 1);

    let err = feeder.join().unwrap().unwrap_err();
    assert_eq!(err.code, ErrorCode::Exec);
    assert_eq!(err.message(), "child did not read its input");
    assert!(h.engine.is_empty());
    assert_eq!(h.world.take_resumed(TaskId(99)), None);
}

#[test]
fn killed_task_is_never_resumed_and_released_after_exit() {
    let mut h = harness();
    let task = h.start(&["sh", "-c", "sleep 0.2; echo late"]);

    let mut seen = Vec::new();
    let action = h.engine.enumerate(|id, cmd| {
        seen.push((id, cmd.to_owned()));
        TaskEnumAction::Kill
    });
    assert_eq!(action, TaskEnumAction::Kill);
    assert_eq!(seen, vec![(task, "sh".to_owned())]);

    let processes = h.engine.processes();
    assert_eq!(processes.len(), 1);
    assert_eq!(processes[0].status, WaitStatus::Killed);
    assert_eq!(processes[0].args, vec!["sh", "-c", "sleep 0.2; echo late"]);

    // killed entries are invisible to enumeration
    let action = h.engine.enumerate(|_, _| panic!("killed entry enumerated"));
    assert_eq!(action, TaskEnumAction::Continue);

    h.drain();
    assert_eq!(h.world.take_resumed(task), None);
}

#[test]
fn enumeration_stops_when_asked() {
    let mut h = harness();
    let first = h.start(&["sleep", "0.2"]);
    let second = h.start(&["sleep", "0.2"]);

    let mut seen = Vec::new();
    let action = h.engine.enumerate(|id, _| {
        seen.push(id);
        TaskEnumAction::Stop
    });
    assert_eq!(action, TaskEnumAction::Stop);
    assert_eq!(seen, vec![first]);

    let mut seen = Vec::new();
    h.engine.enumerate(|id, _| {
        seen.push(id);
        TaskEnumAction::Continue
    });
    assert_eq!(seen, vec![first, second]);

    assert_eq!(h.wait_for(first), result(0, "", ""));
    assert_eq!(h.wait_for(second), result(0, "", ""));
}
