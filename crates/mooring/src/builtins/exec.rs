//! Implementation of the exec() builtin function.

use crate::{
    db::Database,
    error::{BfResult, BuiltinError, ErrorCode},
    exec::{ExecRequest, binary, path},
    host::Host,
    protocol::Progress,
    var::{Objid, Var},
};

/// Implementation of the exec() builtin function.
///
/// `exec({cmd, @args} [, input])` runs `cmd` from the sandbox directory and suspends
/// the task until it exits, resuming it with `{code, stdout, stderr}`. Every check
/// happens before anything is spawned; only a request that passes all of them parks
/// the task.
pub(super) fn builtin_exec(host: &mut impl Host, progr: Objid, args: &[Var]) -> Progress {
    let request = match prepare(host, progr, args) {
        Ok(request) => request,
        Err(err) => return Progress::Error(err),
    };
    match host.spawn_waiter(request) {
        Some(waiter) => Progress::Suspend(waiter),
        None => Progress::Error(BuiltinError::raise(
            ErrorCode::Exec,
            "Process execution is not available",
            Var::Int(0),
        )),
    }
}

fn prepare(host: &impl Host, progr: Objid, args: &[Var]) -> BfResult<ExecRequest> {
    let argv: Vec<String> = args[0]
        .as_list()
        .and_then(|items| items.iter().map(|item| item.as_str().map(str::to_owned)).collect())
        .filter(|argv: &Vec<String>| !argv.is_empty())
        .ok_or(ErrorCode::InvArg)?;

    let cmd = argv[0].clone();
    path::validate(&cmd)?;

    let input = match args.get(1).and_then(Var::as_str) {
        Some(text) => Some(binary::decode(text).ok_or(ErrorCode::InvArg)?),
        None => None,
    };

    if !host.db().is_wizard(progr) {
        return Err(ErrorCode::Perm.into());
    }

    let path = path::resolve(&host.config().exec_dir, &cmd)?;
    Ok(ExecRequest {
        path,
        cmd,
        args: argv,
        input,
    })
}
