//! Implementation of the recycle() builtin function.

use smallvec::SmallVec;
use strum::FromRepr;

use super::{BuiltinFunction, controls};
use crate::{
    db::{Database, ObjectFlag},
    error::ErrorCode,
    host::Host,
    protocol::{BuiltinData, CallOutcome, Progress},
    var::{ObjRef, Objid, Var},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub(crate) enum RecycleStep {
    Entry = 1,
    /// Back from `object:recycle` or an `exitfunc` run while emptying the object.
    Teardown = 2,
}

impl From<RecycleStep> for u8 {
    fn from(step: RecycleStep) -> Self {
        step as Self
    }
}

/// Implementation of the recycle() builtin function.
///
/// Marks the object recycled before anything else, so a second `recycle` of the same
/// object (even from inside its own `recycle` verb) fails with `E_INVARG`.
pub(super) fn builtin_recycle(host: &mut impl Host, progr: Objid, arg: &Var) -> Progress {
    let Some(obj) = arg.as_object() else {
        return Progress::error(ErrorCode::Type);
    };
    let db = host.db();
    if !db.is_valid(obj) || db.has_flag(obj, ObjectFlag::Recycled) {
        return Progress::error(ErrorCode::InvArg);
    }
    if !controls(db, progr, obj) {
        return Progress::error(ErrorCode::Perm);
    }
    host.db_mut().set_flag(obj, ObjectFlag::Recycled);

    let object = Var::from(obj);
    match host.call_verb(&object, "recycle", Vec::new()) {
        CallOutcome::Started => pending(progr, object),
        CallOutcome::NotFound => teardown(host, progr, object),
        CallOutcome::RecursionExceeded => Progress::error(ErrorCode::MaxRec),
    }
}

pub(super) fn resume(host: &mut impl Host, progr: Objid, next: u8, object: Var) -> Progress {
    match RecycleStep::from_repr(next) {
        Some(RecycleStep::Teardown) => teardown(host, progr, object),
        Some(RecycleStep::Entry) | None => Progress::error(ErrorCode::InvArg),
    }
}

fn pending(progr: Objid, object: Var) -> Progress {
    Progress::call(
        BuiltinFunction::Recycle,
        progr,
        RecycleStep::Teardown,
        BuiltinData::Recycle { object },
    )
}

/// Empties, detaches and destroys the object.
///
/// Each `exitfunc` that actually runs parks the builtin and re-enters this step, since
/// the verb may put things back into the object or move it somewhere else.
fn teardown(host: &mut impl Host, progr: Objid, object: Var) -> Progress {
    let Some(obj) = object.as_object() else {
        return Progress::error(ErrorCode::InvArg);
    };
    if !host.db().is_valid(obj) {
        return Progress::done();
    }

    let oid = match obj {
        ObjRef::Obj(oid) => oid,
        ObjRef::Anon(anon) => {
            let db = host.db_mut();
            let owner = db.owner(obj);
            db.incr_quota(owner);
            db.destroy_anonymous(anon);
            return Progress::done();
        }
    };

    while let Some(item) = host.db().first_content(oid) {
        match move_to_nothing(host, item) {
            CallOutcome::Started => return pending(progr, object),
            CallOutcome::NotFound => {}
            CallOutcome::RecursionExceeded => return Progress::error(ErrorCode::MaxRec),
        }
    }
    if !host.db().location(oid).is_nothing() {
        match move_to_nothing(host, oid) {
            CallOutcome::Started => return pending(progr, object),
            CallOutcome::NotFound => {}
            CallOutcome::RecursionExceeded => return Progress::error(ErrorCode::MaxRec),
        }
    }

    let db = host.db_mut();
    let own_parents = db.parents(obj);
    for child in db.children(oid) {
        let merged = splice_parents(&db.parents(ObjRef::Obj(child)), oid, &own_parents);
        db.change_parents(ObjRef::Obj(child), &merged, &[]);
    }
    db.change_parents(obj, &[], &[]);
    let owner = db.owner(obj);
    db.incr_quota(owner);
    db.destroy_object(oid);
    Progress::done()
}

/// Moves `oid` to `#-1` and runs the old location's `exitfunc`.
///
/// The caller parks on `Started`; the move itself is never undone.
fn move_to_nothing(host: &mut impl Host, oid: Objid) -> CallOutcome {
    let old = host.db().location(oid);
    host.db_mut().change_location(oid, Objid::NOTHING);
    host.call_verb(&Var::Obj(old), "exitfunc", vec![Var::Obj(oid)])
}

/// Replaces `removed` in a child's parent list with `replacement`, in place.
///
/// The child's parents before `removed` come first, then `replacement`, then the
/// child's remaining parents; the first occurrence of a duplicate wins.
pub(crate) fn splice_parents(parents: &[Objid], removed: Objid, replacement: &[Objid]) -> SmallVec<[Objid; 4]> {
    let (before, after) = match parents.iter().position(|p| *p == removed) {
        Some(i) => (&parents[..i], &parents[i + 1..]),
        None => (parents, &[][..]),
    };
    let mut merged: SmallVec<[Objid; 4]> = SmallVec::new();
    for &parent in before.iter().chain(replacement).chain(after) {
        if !merged.contains(&parent) {
            merged.push(parent);
        }
    }
    merged
}
