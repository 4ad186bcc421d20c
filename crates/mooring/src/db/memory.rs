use std::mem;

use ahash::AHashMap;
use indexmap::IndexSet;

use super::{Database, ObjectFlag};
use crate::var::{AnonId, ObjRef, Objid};

#[derive(Debug, Clone)]
struct Object {
    owner: Objid,
    location: Objid,
    flags: u16,
    parents: IndexSet<Objid>,
    children: IndexSet<Objid>,
    anon_children: IndexSet<AnonId>,
    contents: IndexSet<Objid>,
}

impl Default for Object {
    fn default() -> Self {
        Self {
            owner: Objid::NOTHING,
            location: Objid::NOTHING,
            flags: 0,
            parents: IndexSet::new(),
            children: IndexSet::new(),
            anon_children: IndexSet::new(),
            contents: IndexSet::new(),
        }
    }
}

/// In-memory object store.
///
/// Persistent objects live in a dense arena indexed by object number; anonymous objects
/// live in a separate map keyed by handle. Owners without a quota entry are unlimited.
#[derive(Debug, Clone)]
pub struct MemoryDb {
    objects: Vec<Option<Object>>,
    anons: AHashMap<AnonId, Object>,
    next_anon: u64,
    last_used: Objid,
    quotas: AHashMap<Objid, i64>,
}

impl Default for MemoryDb {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDb {
    #[must_use]
    pub fn new() -> Self {
        Self {
            objects: Vec::new(),
            anons: AHashMap::new(),
            next_anon: 1,
            last_used: Objid::NOTHING,
            quotas: AHashMap::new(),
        }
    }

    /// Creates an object with the given parents and owner in one go.
    ///
    /// Setup helper for embedders and tests; parents that would be rejected by
    /// [`Database::change_parents`] are ignored.
    pub fn create(&mut self, parents: &[Objid], owner: Objid) -> Objid {
        let oid = self.create_object();
        self.set_owner(oid, if owner.is_nothing() { oid } else { owner });
        self.change_parents(ObjRef::Obj(oid), parents, &[]);
        oid
    }

    /// Limits how many more objects `owner` may create.
    pub fn set_quota(&mut self, owner: Objid, remaining: i64) {
        self.quotas.insert(owner, remaining);
    }

    /// Remaining quota of `owner`, `None` if unlimited.
    #[must_use]
    pub fn quota(&self, owner: Objid) -> Option<i64> {
        self.quotas.get(&owner).copied()
    }

    /// Anonymous children of `obj` in creation order.
    #[must_use]
    pub fn anonymous_children(&self, obj: ObjRef) -> Vec<AnonId> {
        self.get(obj)
            .map(|o| o.anon_children.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of live persistent objects.
    #[must_use]
    pub fn object_count(&self) -> usize {
        self.objects.iter().filter(|slot| slot.is_some()).count()
    }

    fn index(oid: Objid) -> Option<usize> {
        usize::try_from(oid.0).ok()
    }

    fn obj(&self, oid: Objid) -> Option<&Object> {
        Self::index(oid).and_then(|i| self.objects.get(i)).and_then(Option::as_ref)
    }

    fn obj_mut(&mut self, oid: Objid) -> Option<&mut Object> {
        Self::index(oid)
            .and_then(|i| self.objects.get_mut(i))
            .and_then(Option::as_mut)
    }

    fn get(&self, obj: ObjRef) -> Option<&Object> {
        match obj {
            ObjRef::Obj(oid) => self.obj(oid),
            ObjRef::Anon(anon) => self.anons.get(&anon),
        }
    }

    fn get_mut(&mut self, obj: ObjRef) -> Option<&mut Object> {
        match obj {
            ObjRef::Obj(oid) => self.obj_mut(oid),
            ObjRef::Anon(anon) => self.anons.get_mut(&anon),
        }
    }

    fn unlink_child(&mut self, parent: Objid, child: ObjRef) {
        if let Some(p) = self.obj_mut(parent) {
            match child {
                ObjRef::Obj(oid) => {
                    p.children.shift_remove(&oid);
                }
                ObjRef::Anon(anon) => {
                    p.anon_children.shift_remove(&anon);
                }
            }
        }
    }

    fn link_child(&mut self, parent: Objid, child: ObjRef) {
        if let Some(p) = self.obj_mut(parent) {
            match child {
                ObjRef::Obj(oid) => {
                    p.children.insert(oid);
                }
                ObjRef::Anon(anon) => {
                    p.anon_children.insert(anon);
                }
            }
        }
    }

    /// Drops anonymous children of `obj` except those in `keep`, refunding their quota.
    fn invalidate_anon_children(&mut self, obj: ObjRef, keep: &[AnonId]) {
        let doomed: Vec<AnonId> = self
            .get(obj)
            .map(|o| o.anon_children.iter().copied().filter(|a| !keep.contains(a)).collect())
            .unwrap_or_default();
        for anon in doomed {
            let owner = self.owner(ObjRef::Anon(anon));
            self.destroy_anonymous(anon);
            self.incr_quota(owner);
        }
    }
}

impl Database for MemoryDb {
    fn valid(&self, oid: Objid) -> bool {
        self.obj(oid).is_some()
    }

    fn is_valid(&self, obj: ObjRef) -> bool {
        self.get(obj).is_some()
    }

    fn owner(&self, obj: ObjRef) -> Objid {
        self.get(obj).map_or(Objid::NOTHING, |o| o.owner)
    }

    fn set_owner(&mut self, oid: Objid, owner: Objid) {
        if let Some(o) = self.obj_mut(oid) {
            o.owner = owner;
        }
    }

    fn location(&self, oid: Objid) -> Objid {
        self.obj(oid).map_or(Objid::NOTHING, |o| o.location)
    }

    fn change_location(&mut self, oid: Objid, location: Objid) {
        let Some(old) = self.obj(oid).map(|o| o.location) else {
            return;
        };
        if let Some(o) = self.obj_mut(old) {
            o.contents.shift_remove(&oid);
        }
        let location = if self.valid(location) { location } else { Objid::NOTHING };
        if let Some(o) = self.obj_mut(location) {
            o.contents.insert(oid);
        }
        if let Some(o) = self.obj_mut(oid) {
            o.location = location;
        }
    }

    fn contents(&self, oid: Objid) -> Vec<Objid> {
        self.obj(oid)
            .map(|o| o.contents.iter().copied().collect())
            .unwrap_or_default()
    }

    fn first_content(&self, oid: Objid) -> Option<Objid> {
        self.obj(oid).and_then(|o| o.contents.first().copied())
    }

    fn parents(&self, obj: ObjRef) -> Vec<Objid> {
        self.get(obj)
            .map(|o| o.parents.iter().copied().collect())
            .unwrap_or_default()
    }

    fn children(&self, oid: Objid) -> Vec<Objid> {
        self.obj(oid)
            .map(|o| o.children.iter().copied().collect())
            .unwrap_or_default()
    }

    fn change_parents(&mut self, obj: ObjRef, parents: &[Objid], anon_kids: &[AnonId]) -> bool {
        let Some(current) = self.get(obj) else {
            return false;
        };
        if anon_kids.iter().any(|kid| !current.anon_children.contains(kid)) {
            return false;
        }
        let descendants = match obj {
            ObjRef::Obj(oid) => self.descendants(oid),
            ObjRef::Anon(_) => Vec::new(),
        };
        let mut seen = IndexSet::with_capacity(parents.len());
        for &parent in parents {
            if !self.valid(parent)
                || !seen.insert(parent)
                || ObjRef::Obj(parent) == obj
                || descendants.contains(&parent)
            {
                return false;
            }
        }

        self.invalidate_anon_children(obj, anon_kids);
        let old = match self.get_mut(obj) {
            Some(o) => mem::replace(&mut o.parents, seen),
            None => return false,
        };
        for parent in old {
            self.unlink_child(parent, obj);
        }
        for &parent in parents {
            self.link_child(parent, obj);
        }
        true
    }

    fn ancestors(&self, obj: ObjRef) -> Vec<Objid> {
        let mut found: IndexSet<Objid> = IndexSet::new();
        let mut stack: Vec<Objid> = self.parents(obj).into_iter().rev().collect();
        while let Some(oid) = stack.pop() {
            if found.insert(oid) {
                stack.extend(self.parents(ObjRef::Obj(oid)).into_iter().rev());
            }
        }
        found.into_iter().collect()
    }

    fn descendants(&self, oid: Objid) -> Vec<Objid> {
        let mut found: IndexSet<Objid> = IndexSet::new();
        let mut stack: Vec<Objid> = self.children(oid).into_iter().rev().collect();
        while let Some(child) = stack.pop() {
            if child != oid && found.insert(child) {
                stack.extend(self.children(child).into_iter().rev());
            }
        }
        found.into_iter().collect()
    }

    fn create_object(&mut self) -> Objid {
        let oid = Objid(self.last_used.0 + 1);
        let Some(index) = Self::index(oid) else {
            return Objid::NOTHING;
        };
        if self.objects.len() <= index {
            self.objects.resize_with(index + 1, || None);
        }
        self.objects[index] = Some(Object::default());
        self.last_used = oid;
        oid
    }

    fn destroy_object(&mut self, oid: Objid) {
        let Some(object) = self.obj(oid).cloned() else {
            return;
        };
        self.invalidate_anon_children(ObjRef::Obj(oid), &[]);
        for parent in &object.parents {
            self.unlink_child(*parent, ObjRef::Obj(oid));
        }
        for child in &object.children {
            if let Some(c) = self.obj_mut(*child) {
                c.parents.shift_remove(&oid);
            }
        }
        for item in &object.contents {
            if let Some(c) = self.obj_mut(*item) {
                c.location = Objid::NOTHING;
            }
        }
        if let Some(o) = self.obj_mut(object.location) {
            o.contents.shift_remove(&oid);
        }
        if let Some(slot) = Self::index(oid).and_then(|i| self.objects.get_mut(i)) {
            *slot = None;
        }
    }

    fn last_used_objid(&self) -> Objid {
        self.last_used
    }

    fn set_last_used_objid(&mut self, oid: Objid) {
        self.last_used = oid;
    }

    fn make_anonymous(&mut self, oid: Objid, last: Objid) -> AnonId {
        let anon = AnonId(self.next_anon);
        self.next_anon += 1;
        let object = Self::index(oid)
            .and_then(|i| self.objects.get_mut(i))
            .and_then(Option::take)
            .unwrap_or_default();
        for parent in &object.parents {
            self.unlink_child(*parent, ObjRef::Obj(oid));
            self.link_child(*parent, ObjRef::Anon(anon));
        }
        self.anons.insert(
            anon,
            Object {
                location: Objid::NOTHING,
                contents: IndexSet::new(),
                children: IndexSet::new(),
                ..object
            },
        );
        self.last_used = last;
        anon
    }

    fn destroy_anonymous(&mut self, anon: AnonId) {
        if let Some(object) = self.anons.remove(&anon) {
            for parent in object.parents {
                self.unlink_child(parent, ObjRef::Anon(anon));
            }
        }
    }

    fn has_flag(&self, obj: ObjRef, flag: ObjectFlag) -> bool {
        self.get(obj).is_some_and(|o| o.flags & flag.bit() != 0)
    }

    fn set_flag(&mut self, obj: ObjRef, flag: ObjectFlag) {
        if let Some(o) = self.get_mut(obj) {
            o.flags |= flag.bit();
        }
    }

    fn clear_flag(&mut self, obj: ObjRef, flag: ObjectFlag) {
        if let Some(o) = self.get_mut(obj) {
            o.flags &= !flag.bit();
        }
    }

    fn object_bytes(&self, obj: ObjRef) -> usize {
        self.get(obj).map_or(0, |o| {
            mem::size_of::<Object>()
                + mem::size_of::<Objid>() * (o.parents.len() + o.children.len() + o.contents.len())
                + mem::size_of::<AnonId>() * o.anon_children.len()
        })
    }

    fn all_users(&self) -> Vec<Objid> {
        (0..self.objects.len())
            .filter_map(|i| i64::try_from(i).ok().map(Objid))
            .filter(|oid| self.has_flag(ObjRef::Obj(*oid), ObjectFlag::User))
            .collect()
    }

    fn decr_quota(&mut self, owner: Objid) -> bool {
        match self.quotas.get_mut(&owner) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            Some(_) => false,
            None => true,
        }
    }

    fn incr_quota(&mut self, owner: Objid) {
        if let Some(remaining) = self.quotas.get_mut(&owner) {
            *remaining += 1;
        }
    }
}
