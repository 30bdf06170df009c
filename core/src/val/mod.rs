//! Runtime values.
//!
//! Numbers and Strings are plain data. Lists and Dicts live in the [`Heap`] and
//! are referred to by handle; every `Value::List`/`Value::Dict` held somewhere
//! owns one reference, acquired with [`Heap::inc_value`] and given back with
//! [`Heap::release`].

use std::rc::Rc;

use anyhow::Result;

use crate::error::err_immutable;

mod convert;
mod copy;
mod dict;
mod display;
mod heap;
mod list;

#[cfg(test)]
mod list_test;
#[cfg(test)]
mod val_test;

pub use convert::str2nr;
pub use dict::{Dict, DictItem, ItemFlags, check_key};
pub use display::Rendered;
pub(crate) use copy::str_eq_ignore_case;
pub use heap::{DO_NOT_FREE, Heap};
pub(crate) use heap::is_numbered_func;
pub use list::{List, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListId(pub(crate) u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DictId(pub(crate) u32);

/// Dynamically typed value.
///
/// `PartialEq` compares containers by identity; value equality that looks into
/// containers is [`Heap::values_equal`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Number(i64),
    /// Bytes, normally UTF-8. Subscripts count bytes and may split a character.
    String(Vec<u8>),
    List(ListId),
    Dict(DictId),
    Funcref(Rc<str>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Number(0)
    }
}

impl Value {
    pub fn str(s: impl Into<Vec<u8>>) -> Self {
        Value::String(s.into())
    }

    pub fn funcref(name: &str) -> Self {
        Value::Funcref(Rc::from(name))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Number(_) => "Number",
            Value::String(_) => "String",
            Value::List(_) => "List",
            Value::Dict(_) => "Dictionary",
            Value::Funcref(_) => "Funcref",
        }
    }

    /// Numeric code reported by `type()`.
    pub fn type_code(&self) -> i64 {
        match self {
            Value::Number(_) => 0,
            Value::String(_) => 1,
            Value::Funcref(_) => 2,
            Value::List(_) => 3,
            Value::Dict(_) => 4,
        }
    }

    #[inline]
    pub fn is_container(&self) -> bool {
        matches!(self, Value::List(_) | Value::Dict(_))
    }

    #[inline]
    pub fn as_list(&self) -> Option<ListId> {
        match self {
            Value::List(id) => Some(*id),
            _ => None,
        }
    }

    #[inline]
    pub fn as_dict(&self) -> Option<DictId> {
        match self {
            Value::Dict(id) => Some(*id),
            _ => None,
        }
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Number(b as i64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.as_bytes().to_vec())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s.into_bytes())
    }
}

/// Mutability marker of a container or variable.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum VarLock {
    #[default]
    Unlocked,
    /// Locked with `:lockvar`; can be unlocked again.
    Locked,
    /// Permanently read-only.
    Fixed,
}

impl VarLock {
    #[inline]
    pub fn is_locked(self) -> bool {
        self != VarLock::Unlocked
    }

    pub fn lock(&mut self) {
        if *self == VarLock::Unlocked {
            *self = VarLock::Locked;
        }
    }

    pub fn unlock(&mut self) {
        if *self == VarLock::Locked {
            *self = VarLock::Unlocked;
        }
    }

    /// Fail when something guarded by this lock is about to change.
    pub fn check(self, name: &str) -> Result<()> {
        match self {
            VarLock::Unlocked => Ok(()),
            VarLock::Locked => err_immutable(format!("Value is locked: {name}")),
            VarLock::Fixed => err_immutable(format!("Cannot change value of {name}")),
        }
    }
}

/// A value together with its lock, as stored in List items and Dict entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypVal {
    pub value: Value,
    pub lock: VarLock,
}

impl TypVal {
    pub fn new(value: Value) -> Self {
        Self {
            value,
            lock: VarLock::Unlocked,
        }
    }

    pub fn with_lock(value: Value, lock: VarLock) -> Self {
        Self { value, lock }
    }
}
