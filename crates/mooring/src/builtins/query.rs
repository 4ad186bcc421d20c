//! Read-only hierarchy queries and the player flag builtins.

use crate::{
    db::{Database, ObjectFlag},
    error::{BfResult, ErrorCode},
    host::Host,
    var::{ObjRef, Objid, Var},
};

/// Resolves an object argument: `E_TYPE` if it is not an object, `E_INVARG` if it is gone.
fn valid_object(db: &impl Database, arg: &Var) -> BfResult<ObjRef> {
    let obj = arg.as_object().ok_or(ErrorCode::Type)?;
    if db.is_valid(obj) {
        Ok(obj)
    } else {
        Err(ErrorCode::InvArg.into())
    }
}

fn full_flag(args: &[Var]) -> bool {
    args.get(1).is_some_and(Var::is_true)
}

/// Implementation of the parent() builtin function: the first parent, or `#-1`.
pub(super) fn builtin_parent(db: &impl Database, arg: &Var) -> BfResult<Var> {
    let obj = valid_object(db, arg)?;
    let first = db.parents(obj).first().copied().unwrap_or(Objid::NOTHING);
    Ok(Var::Obj(first))
}

pub(super) fn builtin_parents(db: &impl Database, arg: &Var) -> BfResult<Var> {
    let obj = valid_object(db, arg)?;
    Ok(Var::obj_list(db.parents(obj)))
}

/// Anonymous objects never have persistent children.
pub(super) fn builtin_children(db: &impl Database, arg: &Var) -> BfResult<Var> {
    match valid_object(db, arg)? {
        ObjRef::Obj(oid) => Ok(Var::obj_list(db.children(oid))),
        ObjRef::Anon(_) => Ok(Var::List(Vec::new())),
    }
}

/// Implementation of ancestors(obj [, full]); `full` puts `obj` itself first.
pub(super) fn builtin_ancestors(db: &impl Database, args: &[Var]) -> BfResult<Var> {
    let obj = valid_object(db, &args[0])?;
    let mut list = Vec::new();
    if full_flag(args) {
        list.push(Var::from(obj));
    }
    list.extend(db.ancestors(obj).into_iter().map(Var::Obj));
    Ok(Var::List(list))
}

/// Implementation of descendants(obj [, full]); `full` puts `obj` itself first.
pub(super) fn builtin_descendants(db: &impl Database, args: &[Var]) -> BfResult<Var> {
    let obj = valid_object(db, &args[0])?;
    let mut list = Vec::new();
    if full_flag(args) {
        list.push(Var::from(obj));
    }
    if let ObjRef::Obj(oid) = obj {
        list.extend(db.descendants(oid).into_iter().map(Var::Obj));
    }
    Ok(Var::List(list))
}

pub(super) fn builtin_valid(db: &impl Database, arg: &Var) -> BfResult<Var> {
    let obj = arg.as_object().ok_or(ErrorCode::Type)?;
    Ok(Var::bool(db.is_valid(obj)))
}

/// Implementation of isa(obj, parent). An invalid `obj` is simply not a descendant.
pub(super) fn builtin_isa(db: &impl Database, obj: &Var, parent: &Var) -> BfResult<Var> {
    let (Some(obj), Some(parent)) = (obj.as_object(), parent.as_object()) else {
        return Err(ErrorCode::Type.into());
    };
    Ok(Var::bool(db.is_valid(obj) && db.isa(obj, parent)))
}

pub(super) fn builtin_object_bytes(db: &impl Database, progr: Objid, arg: &Var) -> BfResult<Var> {
    let obj = arg.as_object().ok_or(ErrorCode::Type)?;
    if !db.is_valid(obj) {
        return Err(ErrorCode::InvInd.into());
    }
    if !db.is_wizard(progr) {
        return Err(ErrorCode::Perm.into());
    }
    Ok(Var::Int(i64::try_from(db.object_bytes(obj)).unwrap_or(i64::MAX)))
}

pub(super) fn builtin_is_player(db: &impl Database, arg: &Var) -> BfResult<Var> {
    let oid = arg.as_objid().ok_or(ErrorCode::Type)?;
    if !db.valid(oid) {
        return Err(ErrorCode::InvArg.into());
    }
    Ok(Var::bool(db.is_user(oid)))
}

/// Implementation of set_player_flag(obj, value). Clearing the flag boots the player first.
pub(super) fn builtin_set_player_flag(host: &mut impl Host, progr: Objid, arg: &Var, value: &Var) -> BfResult<Var> {
    let oid = arg.as_objid().ok_or(ErrorCode::Type)?;
    if !host.db().valid(oid) {
        return Err(ErrorCode::InvArg.into());
    }
    if !host.db().is_wizard(progr) {
        return Err(ErrorCode::Perm.into());
    }
    if value.is_true() {
        host.db_mut().set_flag(ObjRef::Obj(oid), ObjectFlag::User);
    } else {
        host.boot_player(oid);
        host.db_mut().clear_flag(ObjRef::Obj(oid), ObjectFlag::User);
    }
    Ok(Var::None)
}
