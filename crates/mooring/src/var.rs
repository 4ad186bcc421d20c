//! Values exchanged between builtins, verbs and the host.
//!
//! `Var` is the subset of the server's value type the execution core needs: enough to
//! carry object references, argument lists, process output and error codes through
//! the continuation protocol and into persisted checkpoints.

use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, IntoStaticStr};

use crate::error::ErrorCode;

/// Persistent object number.
///
/// Negative numbers never name a real object; `#-1` doubles as the null location
/// and the "no parent" marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Objid(pub i64);

impl Objid {
    /// The null object, `#-1`.
    pub const NOTHING: Self = Self(-1);

    #[must_use]
    pub fn is_nothing(self) -> bool {
        self == Self::NOTHING
    }
}

impl fmt::Display for Objid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Handle of an anonymous object.
///
/// Anonymous objects have no stable number; they are reachable only through values
/// holding this handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AnonId(pub u64);

impl fmt::Display for AnonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "*anonymous {}*", self.0)
    }
}

/// Any object reference, persistent or anonymous.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ObjRef {
    Obj(Objid),
    Anon(AnonId),
}

impl From<Objid> for ObjRef {
    fn from(oid: Objid) -> Self {
        Self::Obj(oid)
    }
}

impl From<ObjRef> for Var {
    fn from(obj: ObjRef) -> Self {
        match obj {
            ObjRef::Obj(oid) => Self::Obj(oid),
            ObjRef::Anon(anon) => Self::Anon(anon),
        }
    }
}

/// Type tags used in builtin signatures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, IntoStaticStr)]
pub enum VarType {
    Any,
    Int,
    Str,
    Obj,
    List,
}

/// A value.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Var {
    /// The "no value" result of builtins that only have side effects.
    #[default]
    None,
    Int(i64),
    Str(String),
    Obj(Objid),
    Anon(AnonId),
    Err(ErrorCode),
    List(Vec<Var>),
}

impl Var {
    /// MOO truthiness: nonzero integers, non-empty strings and non-empty lists.
    #[must_use]
    pub fn is_true(&self) -> bool {
        match self {
            Self::Int(n) => *n != 0,
            Self::Str(s) => !s.is_empty(),
            Self::List(items) => !items.is_empty(),
            Self::None | Self::Obj(_) | Self::Anon(_) | Self::Err(_) => false,
        }
    }

    /// Returns the object reference held by this value, persistent or anonymous.
    #[must_use]
    pub fn as_object(&self) -> Option<ObjRef> {
        match self {
            Self::Obj(oid) => Some(ObjRef::Obj(*oid)),
            Self::Anon(anon) => Some(ObjRef::Anon(*anon)),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_objid(&self) -> Option<Objid> {
        match self {
            Self::Obj(oid) => Some(*oid),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s),
            _ => None,
        }
    }

    /// True for a single object number or a list made only of object numbers.
    #[must_use]
    pub fn is_obj_or_list_of_objs(&self) -> bool {
        match self {
            Self::Obj(_) => true,
            Self::List(items) => items.iter().all(|item| matches!(item, Self::Obj(_))),
            _ => false,
        }
    }

    /// Flattens an object-or-list-of-objects value into object numbers.
    ///
    /// `#-1` on its own means "no objects" and yields an empty list.
    #[must_use]
    pub fn objids(&self) -> Vec<Objid> {
        match self {
            Self::Obj(oid) if oid.is_nothing() => Vec::new(),
            Self::Obj(oid) => vec![*oid],
            Self::List(items) => items.iter().filter_map(Self::as_objid).collect(),
            _ => Vec::new(),
        }
    }

    #[must_use]
    pub fn matches_type(&self, ty: VarType) -> bool {
        match ty {
            VarType::Any => true,
            VarType::Int => matches!(self, Self::Int(_)),
            VarType::Str => matches!(self, Self::Str(_)),
            VarType::Obj => matches!(self, Self::Obj(_)),
            VarType::List => matches!(self, Self::List(_)),
        }
    }

    /// Builds a list of object numbers.
    #[must_use]
    pub fn obj_list(oids: impl IntoIterator<Item = Objid>) -> Self {
        Self::List(oids.into_iter().map(Self::Obj).collect())
    }

    /// Builds an integer from a boolean.
    #[must_use]
    pub fn bool(value: bool) -> Self {
        Self::Int(i64::from(value))
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("<none>"),
            Self::Int(n) => write!(f, "{n}"),
            Self::Str(s) => write!(f, "{s:?}"),
            Self::Obj(oid) => write!(f, "{oid}"),
            Self::Anon(anon) => write!(f, "{anon}"),
            Self::Err(code) => write!(f, "{code}"),
            Self::List(items) => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("}")
            }
        }
    }
}
