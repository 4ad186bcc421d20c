//! The builtins' view of the server.

use crate::{
    config::ServerConfig,
    db::Database,
    exec::ExecRequest,
    protocol::{CallOutcome, Waiter},
    var::{Objid, Var},
};

/// Services a builtin needs from the VM and the server shell.
///
/// The VM implements this for the task running the builtin. [`crate::World`] is the
/// reference implementation used by the tests and the CLI.
pub trait Host {
    type Db: Database;

    fn db(&self) -> &Self::Db;

    fn db_mut(&mut self) -> &mut Self::Db;

    fn config(&self) -> &ServerConfig;

    /// Asks the VM to run `this:verb(args)` on behalf of the current task.
    ///
    /// On [`CallOutcome::Started`] the builtin returns its [`crate::Continuation`] and
    /// is resumed with the verb's return value. Any other outcome means no verb ran.
    fn call_verb(&mut self, this: &Var, verb: &str, args: Vec<Var>) -> CallOutcome;

    /// Disconnects `who` if they are connected.
    fn boot_player(&mut self, _who: Objid) {}

    /// Hands an exec request to the process engine.
    ///
    /// `None` means the server has no process engine.
    fn spawn_waiter(&mut self, request: ExecRequest) -> Option<Box<dyn Waiter>>;

    #[inline(always)]
    fn trace_builtin(&mut self, _name: &'static str, _step: u8) {}
}
