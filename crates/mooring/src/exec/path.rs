//! Sandbox rules for `exec` command paths.

use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::{
    error::{BfResult, BuiltinError, ErrorCode},
    var::Var,
};

fn raise(message: &str) -> BuiltinError {
    BuiltinError::raise(ErrorCode::InvArg, message, Var::Int(0))
}

/// Checks that `cmd` names something beneath the sandbox directory.
///
/// Rejected: the empty path, absolute paths, and anything containing `..`, `/.` or
/// `./` (which also covers hidden files and any parent traversal). No filesystem
/// access happens here.
pub(crate) fn validate(cmd: &str) -> BfResult<()> {
    if cmd.is_empty()
        || cmd.starts_with('/')
        || cmd.contains("..")
        || cmd.contains("/.")
        || cmd.contains("./")
        || cmd.contains('\0')
    {
        return Err(raise("Invalid path"));
    }
    Ok(())
}

/// Resolves a validated `cmd` under `exec_dir` and checks it is a regular file.
///
/// The result always contains a `/`: `Command` looks a bare name up in `PATH`, which
/// would leave the sandbox when `exec_dir` is empty.
pub(crate) fn resolve(exec_dir: &Path, cmd: &str) -> BfResult<PathBuf> {
    let base = if exec_dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        exec_dir
    };
    let path = base.join(cmd);
    let meta = fs::metadata(&path).map_err(|_| raise("Does not exist"))?;
    if !meta.is_file() {
        return Err(raise("Is not a file"));
    }
    Ok(path)
}
