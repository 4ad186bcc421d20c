//! Object and process builtins.
//!
//! Each builtin has its own submodule. Builtins that call back into verbs (`create`,
//! `move`, `recycle`) are step-indexed state machines: the entry step returns a
//! [`Progress::Pending`] continuation and is re-entered through
//! [`BuiltinFunction::resume`] once the verb returns.

mod chparent;
mod create;
mod exec;
mod move_;
mod query;
mod recycle;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator, IntoStaticStr};

use crate::{
    db::{Database, ObjectFlag},
    error::ErrorCode,
    host::Host,
    protocol::{BuiltinData, Progress},
    var::{ObjRef, Objid, Var, VarType},
};

/// Every builtin this crate provides.
///
/// Names are the script-visible spellings (`create`, `set_player_flag`, ...) and parse
/// with `FromStr`.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Display,
    EnumString,
    EnumIter,
    IntoStaticStr,
    Serialize,
    Deserialize,
)]
#[strum(serialize_all = "snake_case")]
pub enum BuiltinFunction {
    Create,
    Recycle,
    Move,
    Chparent,
    Chparents,
    Parent,
    Parents,
    Children,
    Ancestors,
    Descendants,
    Valid,
    Isa,
    ObjectBytes,
    MaxObject,
    Players,
    IsPlayer,
    SetPlayerFlag,
    Exec,
}

/// Arity and argument types of a builtin.
///
/// Arguments past the end of `types` are unchecked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    pub min: usize,
    pub max: usize,
    pub types: &'static [VarType],
}

impl Signature {
    const fn new(min: usize, max: usize, types: &'static [VarType]) -> Self {
        Self { min, max, types }
    }

    fn check(self, args: &[Var]) -> Result<(), ErrorCode> {
        if args.len() < self.min || args.len() > self.max {
            return Err(ErrorCode::Args);
        }
        let ok = args
            .iter()
            .zip(self.types)
            .all(|(arg, ty)| arg.matches_type(*ty));
        if ok { Ok(()) } else { Err(ErrorCode::Type) }
    }
}

impl BuiltinFunction {
    #[must_use]
    pub fn signature(self) -> Signature {
        use VarType::{Any, List, Obj, Str};
        match self {
            Self::Create => Signature::new(1, 4, &[Any, Any, Any, Any]),
            Self::Recycle | Self::Parent | Self::Parents | Self::Children | Self::Valid | Self::ObjectBytes => {
                Signature::new(1, 1, &[Any])
            }
            Self::Move => Signature::new(2, 2, &[Obj, Obj]),
            Self::Chparent => Signature::new(2, 3, &[Any, Obj, List]),
            Self::Chparents => Signature::new(2, 3, &[Any, List, List]),
            Self::Ancestors | Self::Descendants => Signature::new(1, 2, &[Any, Any]),
            Self::Isa => Signature::new(2, 2, &[Any, Any]),
            Self::MaxObject | Self::Players => Signature::new(0, 0, &[]),
            Self::IsPlayer => Signature::new(1, 1, &[Obj]),
            Self::SetPlayerFlag => Signature::new(2, 2, &[Obj, Any]),
            Self::Exec => Signature::new(1, 2, &[List, Str]),
        }
    }

    /// True for builtins whose in-flight state can be written to a checkpoint.
    #[must_use]
    pub fn has_checkpoint(self) -> bool {
        matches!(self, Self::Create | Self::Recycle | Self::Move)
    }

    /// Runs the entry step of the builtin.
    ///
    /// Arguments are checked against [`BuiltinFunction::signature`] first: `E_ARGS` for
    /// the wrong count, `E_TYPE` for a mismatched type.
    pub fn call(self, host: &mut impl Host, progr: Objid, args: Vec<Var>) -> Progress {
        if let Err(code) = self.signature().check(&args) {
            return Progress::error(code);
        }
        host.trace_builtin(self.into(), 1);
        match self {
            Self::Create => create::builtin_create(host, progr, &args),
            Self::Recycle => recycle::builtin_recycle(host, progr, &args[0]),
            Self::Move => move_::builtin_move(host, progr, &args),
            Self::Chparent | Self::Chparents => chparent::builtin_chparent(host, progr, &args).into(),
            Self::Parent => query::builtin_parent(host.db(), &args[0]).into(),
            Self::Parents => query::builtin_parents(host.db(), &args[0]).into(),
            Self::Children => query::builtin_children(host.db(), &args[0]).into(),
            Self::Ancestors => query::builtin_ancestors(host.db(), &args).into(),
            Self::Descendants => query::builtin_descendants(host.db(), &args).into(),
            Self::Valid => query::builtin_valid(host.db(), &args[0]).into(),
            Self::Isa => query::builtin_isa(host.db(), &args[0], &args[1]).into(),
            Self::ObjectBytes => query::builtin_object_bytes(host.db(), progr, &args[0]).into(),
            Self::MaxObject => Progress::Complete(Var::Obj(host.db().last_used_objid())),
            Self::Players => Progress::Complete(Var::obj_list(host.db().all_users())),
            Self::IsPlayer => query::builtin_is_player(host.db(), &args[0]).into(),
            Self::SetPlayerFlag => query::builtin_set_player_flag(host, progr, &args[0], &args[1]).into(),
            Self::Exec => exec::builtin_exec(host, progr, &args),
        }
    }

    /// Re-enters the builtin at step `next` with a nested verb call's return value.
    ///
    /// State that does not belong to this builtin, or a step it does not have, means
    /// the continuation was corrupted and fails with `E_INVARG`.
    pub(crate) fn resume(self, host: &mut impl Host, progr: Objid, value: Var, next: u8, data: BuiltinData) -> Progress {
        host.trace_builtin(self.into(), next);
        match (self, data) {
            (Self::Move, BuiltinData::Move { what, where_ }) => move_::resume(host, progr, &value, next, what, where_),
            (Self::Create, BuiltinData::Create { object }) => create::resume(next, object),
            (Self::Recycle, BuiltinData::Recycle { object }) => recycle::resume(host, progr, next, object),
            _ => Progress::error(ErrorCode::InvArg),
        }
    }
}

/// Every builtin, in registration order.
#[must_use]
pub fn registry() -> Vec<BuiltinFunction> {
    BuiltinFunction::iter().collect()
}

/// True if `who` may modify `what`: a wizard or its owner.
pub(crate) fn controls(db: &impl Database, who: Objid, what: ObjRef) -> bool {
    db.is_wizard(who) || who == db.owner(what)
}

/// True if every object named by `parents` is valid; `#-1` alone counts as valid.
pub(crate) fn all_valid(db: &impl Database, parents: &Var) -> bool {
    match parents {
        Var::Obj(oid) => oid.is_nothing() || db.valid(*oid),
        Var::List(items) => items.iter().all(|item| item.as_objid().is_some_and(|oid| db.valid(oid))),
        _ => false,
    }
}

/// True if `progr` may use every object named by `parents` in the way `flag` governs.
pub(crate) fn all_allowed(db: &impl Database, parents: &Var, progr: Objid, flag: ObjectFlag) -> bool {
    parents
        .objids()
        .into_iter()
        .all(|oid| db.allows(oid, progr, flag))
}
