//! Implementation of the create() builtin function.

use strum::FromRepr;

use super::{BuiltinFunction, all_allowed, all_valid};
use crate::{
    db::{Database, ObjectFlag},
    error::ErrorCode,
    host::Host,
    protocol::{BuiltinData, CallOutcome, Progress},
    var::{ObjRef, Objid, Var},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, FromRepr)]
#[repr(u8)]
pub(crate) enum CreateStep {
    Entry = 1,
    /// Back from `object:initialize`.
    Initialized = 2,
}

impl From<CreateStep> for u8 {
    fn from(step: CreateStep) -> Self {
        step as Self
    }
}

/// Optional arguments after the parent(s), resolved by type.
///
/// Position two may be the owner, the anonymous flag or the initializer list; later
/// positions may only be the flag or the list, each at most once.
struct CreateArgs<'a> {
    owner: Objid,
    anonymous: bool,
    init: &'a [Var],
}

impl<'a> CreateArgs<'a> {
    fn parse(progr: Objid, args: &'a [Var]) -> Result<Self, ErrorCode> {
        let mut parsed = Self {
            owner: progr,
            anonymous: false,
            init: &[],
        };
        let mut seen_flag = false;
        let mut seen_init = false;
        for (pos, arg) in args.iter().enumerate().skip(1) {
            match arg {
                Var::Obj(owner) if pos == 1 => parsed.owner = *owner,
                Var::Int(_) if !seen_flag => {
                    seen_flag = true;
                    parsed.anonymous = arg.is_true();
                }
                Var::List(items) if !seen_init => {
                    seen_init = true;
                    parsed.init = items.as_slice();
                }
                _ => return Err(ErrorCode::Type),
            }
        }
        Ok(parsed)
    }
}

/// Implementation of the create() builtin function.
///
/// `create(parents [, owner] [, anonymous] [, init_args])` charges one object to the
/// owner's quota, allocates the object, attaches it to its parents and calls its
/// `initialize` verb. Every failure before `initialize` leaves no object behind and
/// the quota untouched.
pub(super) fn builtin_create(host: &mut impl Host, progr: Objid, args: &[Var]) -> Progress {
    let parents = &args[0];
    if !parents.is_obj_or_list_of_objs() {
        return Progress::error(ErrorCode::Type);
    }
    let CreateArgs { owner, anonymous, init } = match CreateArgs::parse(progr, args) {
        Ok(parsed) => parsed,
        Err(code) => return Progress::error(code),
    };

    let db = host.db();
    if (anonymous && owner.is_nothing()) || (!db.valid(owner) && !owner.is_nothing()) || !all_valid(db, parents) {
        return Progress::error(ErrorCode::InvArg);
    }
    let flag = if anonymous {
        ObjectFlag::Anonymous
    } else {
        ObjectFlag::Fertile
    };
    if (progr != owner && !db.is_wizard(progr)) || !all_allowed(db, parents, progr, flag) {
        return Progress::error(ErrorCode::Perm);
    }

    let charged = db.valid(owner);
    let db = host.db_mut();
    if charged && !db.decr_quota(owner) {
        return Progress::error(ErrorCode::Quota);
    }

    let last = db.last_used_objid();
    let oid = db.create_object();
    db.set_owner(oid, if charged { owner } else { oid });
    if !db.change_parents(ObjRef::Obj(oid), &parents.objids(), &[]) {
        db.destroy_object(oid);
        db.set_last_used_objid(last);
        if charged {
            db.incr_quota(owner);
        }
        return Progress::error(ErrorCode::InvArg);
    }

    let object = if anonymous {
        Var::Anon(db.make_anonymous(oid, last))
    } else {
        Var::Obj(oid)
    };

    match host.call_verb(&object, "initialize", init.to_vec()) {
        CallOutcome::Started => Progress::call(
            BuiltinFunction::Create,
            progr,
            CreateStep::Initialized,
            BuiltinData::Create { object },
        ),
        CallOutcome::NotFound => Progress::Complete(object),
        CallOutcome::RecursionExceeded => Progress::error(ErrorCode::MaxRec),
    }
}

/// `initialize` returned; its value is ignored.
pub(super) fn resume(next: u8, object: Var) -> Progress {
    match CreateStep::from_repr(next) {
        Some(CreateStep::Initialized) => Progress::Complete(object),
        Some(CreateStep::Entry) | None => Progress::error(ErrorCode::InvArg),
    }
}
