use std::{
    env, fs,
    process::ExitCode,
    sync::Arc,
    time::{Duration, Instant},
};

use mooring::{
    BuiltinFunction, Database, IoRegistry, MemoryDb, ObjRef, ObjectFlag, Objid, PollLoop, ProcessEngine,
    ServerConfig, StderrTracer, TaskResult, Var, World,
};

const TURN_TIMEOUT: Duration = Duration::from_millis(100);

fn main() -> ExitCode {
    let mut args: Vec<String> = env::args().skip(1).collect();
    let config = if args.first().is_some_and(|arg| arg == "--config") {
        let Some(path) = args.get(1).cloned() else {
            eprintln!("error: --config needs a file");
            return ExitCode::FAILURE;
        };
        args.drain(..2);
        match read_config(&path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("error: {err}");
                return ExitCode::FAILURE;
            }
        }
    } else {
        ServerConfig::default()
    };
    if args.is_empty() {
        eprintln!("usage: mooring [--config FILE] COMMAND [ARGS...]");
        return ExitCode::FAILURE;
    }

    let poll = match PollLoop::new() {
        Ok(poll) => Arc::new(poll),
        Err(err) => {
            eprintln!("error: cannot start the event loop: {err}");
            return ExitCode::FAILURE;
        }
    };
    let io: Arc<dyn IoRegistry> = poll.clone();
    let engine = ProcessEngine::with_tracer(config.clone(), io, StderrTracer::new());

    let mut db = MemoryDb::new();
    let wizard = db.create(&[], Objid::NOTHING);
    db.set_flag(ObjRef::Obj(wizard), ObjectFlag::Wizard);
    let mut world = World::with_tracer(db, StderrTracer::new())
        .with_config(config)
        .with_spawner(engine.clone());

    let start = Instant::now();
    let argv = Var::List(args.into_iter().map(Var::Str).collect());
    let task = match world.run_builtin(wizard, BuiltinFunction::Exec, vec![argv]) {
        TaskResult::Suspended(task) => task,
        TaskResult::Complete(value) => {
            println!("{value}");
            return ExitCode::SUCCESS;
        }
        TaskResult::Error(err) => {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
    };

    loop {
        if let Err(err) = engine.turn(&poll, Some(TURN_TIMEOUT), &mut world) {
            eprintln!("error: {err}");
            return ExitCode::FAILURE;
        }
        if let Some(value) = world.take_resumed(task) {
            let elapsed = start.elapsed();
            eprintln!("task {task} resumed after: {elapsed:?}");
            println!("{value}");
            return ExitCode::SUCCESS;
        }
    }
}

fn read_config(file_path: &str) -> Result<ServerConfig, String> {
    let contents = fs::read_to_string(file_path).map_err(|err| format!("Error reading {file_path}: {err}"))?;
    serde_json::from_str(&contents).map_err(|err| format!("Error parsing {file_path}: {err}"))
}
