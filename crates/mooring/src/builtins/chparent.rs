//! Implementation of the chparent() and chparents() builtin functions.

use super::{all_allowed, all_valid, controls};
use crate::{
    db::{Database, ObjectFlag},
    error::{BfResult, ErrorCode},
    host::Host,
    var::{AnonId, ObjRef, Objid, Var},
};

/// Implementation of chparent(obj, parent [, anon_kids]) and chparents(obj, parents [, anon_kids]).
///
/// The change is all or nothing: either every check passes and the database commits
/// the new parent set, or nothing changes.
pub(super) fn builtin_chparent(host: &mut impl Host, progr: Objid, args: &[Var]) -> BfResult<Var> {
    let what = &args[1];
    let Some(obj) = args[0].as_object() else {
        return Err(ErrorCode::Type.into());
    };
    if !what.is_obj_or_list_of_objs() {
        return Err(ErrorCode::Type.into());
    }

    let db = host.db();
    if args.len() > 2 && !db.is_wizard(progr) {
        return Err(ErrorCode::Perm.into());
    }
    let anon_kids = anonymous_kids(args.get(2));

    if !db.is_valid(obj) || !all_valid(db, what) {
        return Err(ErrorCode::InvArg.into());
    }
    if !controls(db, progr, obj) || !all_allowed(db, what, progr, ObjectFlag::Fertile) {
        return Err(ErrorCode::Perm.into());
    }
    let parents = what.objids();
    if let ObjRef::Obj(oid) = obj {
        let descendants = db.descendants(oid);
        if parents.iter().any(|p| *p == oid || descendants.contains(p)) {
            return Err(ErrorCode::RecMove.into());
        }
    }

    let Some(kids) = anon_kids else {
        return Err(ErrorCode::InvArg.into());
    };
    if host.db_mut().change_parents(obj, &parents, &kids) {
        Ok(Var::None)
    } else {
        Err(ErrorCode::InvArg.into())
    }
}

/// Anonymous children that survive the change; `None` if the list holds anything else.
fn anonymous_kids(arg: Option<&Var>) -> Option<Vec<AnonId>> {
    let Some(Var::List(items)) = arg else {
        return Some(Vec::new());
    };
    items
        .iter()
        .map(|item| match item {
            Var::Anon(anon) => Some(*anon),
            _ => None,
        })
        .collect()
}
