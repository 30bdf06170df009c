//! User-defined functions: the registry, definition and the call engine.

use std::cell::Cell;
use std::rc::Rc;

use anyhow::Result;

use crate::hashtab::HashTable;
use crate::val::{DictId, ListId, Value};

mod call;
mod define;

#[cfg(test)]
mod func_test;

pub(crate) use define::FuncHeader;

/// Most arguments a function call may pass.
pub const MAX_FUNC_ARGS: usize = 20;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FuncFlags {
    /// Stop at the first error.
    pub abort: bool,
    /// Called once for a range instead of once per line.
    pub range: bool,
    /// Needs a dictionary bound to `self`.
    pub dict: bool,
}

#[derive(Debug)]
pub struct UserFunction {
    pub name: Rc<str>,
    pub params: Vec<String>,
    /// Accepts extra arguments (`...`).
    pub varargs: bool,
    /// Source lines; `None` where a continuation line was folded into the
    /// line before it.
    pub body: Vec<Option<String>>,
    pub flags: FuncFlags,
    /// Script the function was defined in; its `s:` scope is visible while running.
    pub script_id: u32,
    /// Active invocations.
    pub(crate) calls: Cell<u32>,
}

impl UserFunction {
    /// Is this an anonymous function created by `:function dict.key()`?
    pub fn is_numbered(&self) -> bool {
        self.name.as_bytes().first().is_some_and(u8::is_ascii_digit)
    }

    /// The `:function` header as it would be written to define this function.
    pub fn signature(&self) -> String {
        let mut params = self.params.join(", ");
        if self.varargs {
            if !params.is_empty() {
                params.push_str(", ");
            }
            params.push_str("...");
        }
        let mut out = format!("function {}({})", self.name, params);
        for (set, word) in [(self.flags.range, " range"), (self.flags.abort, " abort"), (self.flags.dict, " dict")] {
            if set {
                out.push_str(word);
            }
        }
        out
    }
}

/// All user functions by name.
#[derive(Debug, Default)]
pub struct FuncRegistry {
    table: HashTable<Rc<UserFunction>>,
    last_number: u32,
    /// Anonymous functions that lost their last Funcref while still running.
    pub(crate) pending_delete: Vec<Rc<str>>,
}

impl FuncRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Rc<UserFunction>> {
        self.table.get(name).cloned()
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.table.contains_key(name)
    }

    /// Add or replace a function.
    pub(crate) fn insert(&mut self, func: UserFunction) -> Result<Rc<UserFunction>> {
        let func = Rc::new(func);
        self.table.remove_key(&func.name);
        self.table.add(&func.name, func.clone())?;
        Ok(func)
    }

    pub(crate) fn remove(&mut self, name: &str) -> Option<Rc<UserFunction>> {
        self.table.remove_key(name)
    }

    /// Name for a new anonymous function.
    pub(crate) fn next_numbered_name(&mut self) -> String {
        self.last_number += 1;
        self.last_number.to_string()
    }

    /// Sorted names of all functions.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.table.iter().map(|(k, _)| k.to_string()).collect();
        names.sort();
        names
    }
}

/// One active call of a user function.
#[derive(Debug)]
pub(crate) struct CallFrame {
    pub(crate) func: Rc<UserFunction>,
    /// `l:`
    pub(crate) locals: DictId,
    /// `a:`
    pub(crate) args: DictId,
    /// `a:000`, owned by the `a:` dict.
    pub(crate) varargs: ListId,
    pub(crate) return_value: Option<Value>,
    /// Index of the body line being executed.
    pub(crate) line: usize,
}

impl CallFrame {
    #[inline]
    pub(crate) fn returned(&self) -> bool {
        self.return_value.is_some()
    }
}
