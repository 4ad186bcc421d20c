//! Object database contract.
//!
//! The builtins only see the database through [`Database`]; the on-disk store of a real
//! server implements it, and [`MemoryDb`] is the in-memory reference implementation.

mod memory;

use strum::{Display, EnumString, IntoStaticStr};

pub use memory::MemoryDb;

use crate::var::{AnonId, ObjRef, Objid};

/// Per-object flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
#[repr(u8)]
pub enum ObjectFlag {
    User = 0,
    Programmer = 1,
    Wizard = 2,
    Read = 4,
    Write = 5,
    Fertile = 8,
    Anonymous = 9,
    /// Set once recycling starts; never cleared.
    Recycled = 10,
}

impl ObjectFlag {
    #[must_use]
    pub fn bit(self) -> u16 {
        1 << (self as u8)
    }
}

/// Primitives the execution core needs from the object store.
///
/// Queries on invalid objects return neutral values (`#-1`, empty lists, `false`);
/// callers validate first.
pub trait Database {
    /// True if `oid` names a live persistent object.
    fn valid(&self, oid: Objid) -> bool;

    /// True if `obj` names a live persistent or anonymous object.
    fn is_valid(&self, obj: ObjRef) -> bool;

    fn owner(&self, obj: ObjRef) -> Objid;

    fn set_owner(&mut self, oid: Objid, owner: Objid);

    fn location(&self, oid: Objid) -> Objid;

    /// Moves `oid` into `location`, keeping both content lists in step.
    fn change_location(&mut self, oid: Objid, location: Objid);

    fn contents(&self, oid: Objid) -> Vec<Objid>;

    fn first_content(&self, oid: Objid) -> Option<Objid> {
        self.contents(oid).first().copied()
    }

    /// Direct parents in declaration order.
    fn parents(&self, obj: ObjRef) -> Vec<Objid>;

    /// Direct persistent children in creation order.
    fn children(&self, oid: Objid) -> Vec<Objid>;

    /// Replaces the parent set of `obj` with `parents`, all or nothing.
    ///
    /// `anon_kids` names anonymous children of `obj` that stay valid across the change.
    /// Returns false and changes nothing if the new parent set is not acceptable.
    fn change_parents(&mut self, obj: ObjRef, parents: &[Objid], anon_kids: &[AnonId]) -> bool;

    /// All ancestors, nearest first, without duplicates and without `obj` itself.
    fn ancestors(&self, obj: ObjRef) -> Vec<Objid>;

    /// All persistent descendants, without duplicates and without `oid` itself.
    fn descendants(&self, oid: Objid) -> Vec<Objid>;

    /// True if `obj` is `parent` or inherits from it.
    fn isa(&self, obj: ObjRef, parent: ObjRef) -> bool {
        if obj == parent {
            return true;
        }
        match parent {
            ObjRef::Obj(parent) => self.ancestors(obj).contains(&parent),
            ObjRef::Anon(_) => false,
        }
    }

    /// Allocates a new persistent object numbered one past `last_used_objid`.
    fn create_object(&mut self) -> Objid;

    fn destroy_object(&mut self, oid: Objid);

    fn last_used_objid(&self) -> Objid;

    fn set_last_used_objid(&mut self, oid: Objid);

    /// Turns the freshly created `oid` into an anonymous object.
    ///
    /// `oid` is invalid afterwards and the id counter goes back to `last`.
    fn make_anonymous(&mut self, oid: Objid, last: Objid) -> AnonId;

    fn destroy_anonymous(&mut self, anon: AnonId);

    fn has_flag(&self, obj: ObjRef, flag: ObjectFlag) -> bool;

    fn set_flag(&mut self, obj: ObjRef, flag: ObjectFlag);

    fn clear_flag(&mut self, obj: ObjRef, flag: ObjectFlag);

    fn is_wizard(&self, who: Objid) -> bool {
        self.valid(who) && self.has_flag(ObjRef::Obj(who), ObjectFlag::Wizard)
    }

    fn is_user(&self, who: Objid) -> bool {
        self.valid(who) && self.has_flag(ObjRef::Obj(who), ObjectFlag::User)
    }

    /// True if `progr` may use `obj` in the way `flag` governs (e.g. as a parent).
    fn allows(&self, obj: Objid, progr: Objid, flag: ObjectFlag) -> bool {
        progr == self.owner(ObjRef::Obj(obj)) || self.has_flag(ObjRef::Obj(obj), flag) || self.is_wizard(progr)
    }

    /// Approximate storage size of the object in bytes.
    fn object_bytes(&self, obj: ObjRef) -> usize;

    /// Every object with the user flag.
    fn all_users(&self) -> Vec<Objid>;

    /// Charges one object to `owner`. Returns false, charging nothing, if the quota is spent.
    fn decr_quota(&mut self, owner: Objid) -> bool;

    /// Refunds one object to `owner`.
    fn incr_quota(&mut self, owner: Objid);
}
