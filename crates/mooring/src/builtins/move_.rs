//! Implementation of the move() builtin function.

use strum::FromRepr;

use super::{BuiltinFunction, controls};
use crate::{
    db::Database,
    error::ErrorCode,
    host::Host,
    protocol::{BuiltinData, CallOutcome, Progress},
    var::{Objid, Var},
};

/// Re-entry points of `move`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub(crate) enum MoveStep {
    Entry = 1,
    /// Back from `where:accept`.
    Accepted = 2,
    /// Back from `oldloc:exitfunc`.
    Exited = 3,
    /// Back from `where:enterfunc`.
    Entered = 4,
}

impl From<MoveStep> for u8 {
    fn from(step: MoveStep) -> Self {
        step as Self
    }
}

/// Implementation of the move() builtin function.
///
/// `move(what, where)` checks permissions, asks `where:accept(what)` unless `where` is
/// `#-1`, changes the location, then runs the old location's `exitfunc` and the new
/// location's `enterfunc`.
pub(super) fn builtin_move(host: &mut impl Host, progr: Objid, args: &[Var]) -> Progress {
    let (Some(what), Some(where_)) = (args[0].as_objid(), args[1].as_objid()) else {
        return Progress::error(ErrorCode::Type);
    };
    let db = host.db();
    if !db.valid(what) || (!db.valid(where_) && !where_.is_nothing()) {
        return Progress::error(ErrorCode::InvArg);
    }
    if !controls(db, progr, what.into()) {
        return Progress::error(ErrorCode::Perm);
    }
    if where_.is_nothing() {
        return relocate(host, progr, true, what, where_);
    }

    match host.call_verb(&Var::Obj(where_), "accept", vec![Var::Obj(what)]) {
        CallOutcome::Started => pending(progr, MoveStep::Accepted, what, where_),
        CallOutcome::NotFound => relocate(host, progr, false, what, where_),
        CallOutcome::RecursionExceeded => Progress::error(ErrorCode::MaxRec),
    }
}

pub(super) fn resume(host: &mut impl Host, progr: Objid, value: &Var, next: u8, what: Objid, where_: Objid) -> Progress {
    match MoveStep::from_repr(next) {
        Some(MoveStep::Accepted) => relocate(host, progr, value.is_true(), what, where_),
        Some(MoveStep::Exited) => enter(host, progr, what, where_),
        Some(MoveStep::Entered) => Progress::done(),
        Some(MoveStep::Entry) | None => Progress::error(ErrorCode::InvArg),
    }
}

fn pending(progr: Objid, step: MoveStep, what: Objid, where_: Objid) -> Progress {
    Progress::call(BuiltinFunction::Move, progr, step, BuiltinData::Move { what, where_ })
}

/// Second half of the entry step, or re-entry after `accept`.
///
/// Everything is re-validated: `accept` is arbitrary code and may have recycled either
/// object or moved `where` inside `what`.
fn relocate(host: &mut impl Host, progr: Objid, accepts: bool, what: Objid, where_: Objid) -> Progress {
    let db = host.db();
    if !accepts && !db.is_wizard(progr) {
        return Progress::error(ErrorCode::Nacc);
    }
    if !db.valid(what) || (!where_.is_nothing() && !db.valid(where_)) || db.location(what) == where_ {
        return Progress::done();
    }

    let mut oid = where_;
    while !oid.is_nothing() {
        if oid == what {
            return Progress::error(ErrorCode::RecMove);
        }
        oid = db.location(oid);
    }

    let old = db.location(what);
    host.db_mut().change_location(what, where_);

    match host.call_verb(&Var::Obj(old), "exitfunc", vec![Var::Obj(what)]) {
        CallOutcome::Started => pending(progr, MoveStep::Exited, what, where_),
        CallOutcome::NotFound => enter(host, progr, what, where_),
        CallOutcome::RecursionExceeded => Progress::error(ErrorCode::MaxRec),
    }
}

/// Runs `where:enterfunc` if `what` is still where it was moved to.
fn enter(host: &mut impl Host, progr: Objid, what: Objid, where_: Objid) -> Progress {
    let db = host.db();
    if !(db.valid(where_) && db.valid(what) && db.location(what) == where_) {
        return Progress::done();
    }
    match host.call_verb(&Var::Obj(where_), "enterfunc", vec![Var::Obj(what)]) {
        CallOutcome::Started => pending(progr, MoveStep::Entered, what, where_),
        CallOutcome::NotFound => Progress::done(),
        CallOutcome::RecursionExceeded => Progress::error(ErrorCode::MaxRec),
    }
}
