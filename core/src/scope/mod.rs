//! Variable scopes.
//!
//! Every scope is a Dict in the heap. `g:` and `v:` exist for the whole
//! session; buffer, window, tab and script scopes are created the first time
//! they are used; `l:` and `a:` belong to the active call frame.

use anyhow::Result;

use crate::error::{err_immutable, err_syntax, err_type, err_undefined};
use crate::interp::Interp;
use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::val::{DictId, Heap, ItemFlags, TypVal, Value};

mod vimvar;


pub(crate) use vimvar::{VV_RO, VV_RO_SBX, VimVarInit, is_compat_name, vimvar_def};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    Global,
    Buffer,
    Window,
    Tab,
    Script,
    Local,
    Argument,
    /// `v:`
    Builtin,
}

impl ScopeKind {
    pub fn from_prefix(c: u8) -> Option<Self> {
        Some(match c {
            b'g' => ScopeKind::Global,
            b'b' => ScopeKind::Buffer,
            b'w' => ScopeKind::Window,
            b't' => ScopeKind::Tab,
            b's' => ScopeKind::Script,
            b'l' => ScopeKind::Local,
            b'a' => ScopeKind::Argument,
            b'v' => ScopeKind::Builtin,
            _ => return None,
        })
    }

    pub fn prefix(self) -> char {
        match self {
            ScopeKind::Global => 'g',
            ScopeKind::Buffer => 'b',
            ScopeKind::Window => 'w',
            ScopeKind::Tab => 't',
            ScopeKind::Script => 's',
            ScopeKind::Local => 'l',
            ScopeKind::Argument => 'a',
            ScopeKind::Builtin => 'v',
        }
    }
}

/// Owner of the long-lived scope dictionaries.
#[derive(Debug)]
pub struct Scopes {
    pub(crate) global: DictId,
    pub(crate) vimvars: DictId,
    buffers: FastHashMap<u32, DictId>,
    windows: FastHashMap<u32, DictId>,
    tabs: FastHashMap<u32, DictId>,
    scripts: FastHashMap<u32, DictId>,
}

pub(crate) fn vimvar_flags(flags: u8) -> ItemFlags {
    ItemFlags {
        read_only: flags & VV_RO != 0,
        read_only_sandbox: flags & VV_RO_SBX != 0,
        fixed: true,
    }
}

impl Scopes {
    pub fn new(heap: &mut Heap) -> Result<Self> {
        let global = heap.new_scope_dict(ScopeKind::Global);
        let vimvars = heap.new_scope_dict(ScopeKind::Builtin);
        for def in vimvar::VIMVARS {
            let value = match def.init {
                VimVarInit::Number(n) => Value::Number(n),
                VimVarInit::Str(s) => Value::str(s),
                VimVarInit::List => Value::List(heap.new_list()),
                VimVarInit::Absent => continue,
            };
            heap.dict_mut(vimvars)
                .insert_with_flags(def.name, TypVal::new(value), vimvar_flags(def.flags))?;
        }
        Ok(Self {
            global,
            vimvars,
            buffers: fast_hash_map_new(),
            windows: fast_hash_map_new(),
            tabs: fast_hash_map_new(),
            scripts: fast_hash_map_new(),
        })
    }

    #[inline]
    pub fn global(&self) -> DictId {
        self.global
    }

    #[inline]
    pub fn vimvars(&self) -> DictId {
        self.vimvars
    }

    pub fn buffer(&mut self, heap: &mut Heap, id: u32) -> DictId {
        *self.buffers.entry(id).or_insert_with(|| heap.new_scope_dict(ScopeKind::Buffer))
    }

    pub fn window(&mut self, heap: &mut Heap, id: u32) -> DictId {
        *self.windows.entry(id).or_insert_with(|| heap.new_scope_dict(ScopeKind::Window))
    }

    pub fn tab(&mut self, heap: &mut Heap, id: u32) -> DictId {
        *self.tabs.entry(id).or_insert_with(|| heap.new_scope_dict(ScopeKind::Tab))
    }

    pub fn script(&mut self, heap: &mut Heap, id: u32) -> DictId {
        *self.scripts.entry(id).or_insert_with(|| heap.new_scope_dict(ScopeKind::Script))
    }

    /// Drop the variables of a buffer that went away.
    pub fn free_buffer(&mut self, heap: &mut Heap, id: u32) {
        if let Some(dict) = self.buffers.remove(&id) {
            heap.free_scope_dict(dict);
        }
    }
}

fn illegal_name<T>(name: &str) -> Result<T> {
    err_syntax(format!("Illegal variable name: {name}"))
}

/// Variable names: letters, digits (not first), `_` and `#`.
pub(crate) fn valid_varname(name: &str) -> bool {
    !name.is_empty()
        && name
            .bytes()
            .enumerate()
            .all(|(i, b)| b.is_ascii_alphabetic() || b == b'_' || b == b'#' || (i > 0 && b.is_ascii_digit()))
}

fn check_read_only(flags: ItemFlags, name: &str, sandbox: bool) -> Result<()> {
    if flags.read_only {
        return err_immutable(format!("Cannot change read-only variable \"{name}\""));
    }
    if flags.read_only_sandbox && sandbox {
        return err_immutable(format!("Cannot set variable in the sandbox: \"{name}\""));
    }
    Ok(())
}

const CHANGEDTICK: &str = "b:changedtick";

impl Interp {
    /// Resolve the dictionary a variable name lives in. Returns the dict and the
    /// byte offset where the name inside that dict starts. `None` when the
    /// prefix names a scope that does not exist here (`l:` outside a function,
    /// `s:` outside a script).
    pub(crate) fn find_var_dict(&mut self, name: &str) -> Option<(DictId, usize)> {
        let bytes = name.as_bytes();
        if bytes.len() >= 2 && bytes[1] == b':' {
            let dict = match ScopeKind::from_prefix(bytes[0])? {
                ScopeKind::Global => self.scopes.global,
                ScopeKind::Builtin => self.scopes.vimvars,
                ScopeKind::Buffer => {
                    let id = self.host.buffer_id();
                    self.scopes.buffer(&mut self.heap, id)
                }
                ScopeKind::Window => {
                    let id = self.host.window_id();
                    self.scopes.window(&mut self.heap, id)
                }
                ScopeKind::Tab => {
                    let id = self.host.tab_id();
                    self.scopes.tab(&mut self.heap, id)
                }
                ScopeKind::Script => {
                    if self.ctx.script_id == 0 {
                        return None;
                    }
                    let id = self.ctx.script_id;
                    self.scopes.script(&mut self.heap, id)
                }
                ScopeKind::Local => self.ctx.frames.last()?.locals,
                ScopeKind::Argument => self.ctx.frames.last()?.args,
            };
            return Some((dict, 2));
        }
        if bytes.first().is_none_or(|b| *b == b':') {
            return None;
        }
        // Autoload variables are always global.
        if name.contains('#') {
            return Some((self.scopes.global, 0));
        }
        if is_compat_name(name) {
            return Some((self.scopes.vimvars, 0));
        }
        match self.ctx.frames.last() {
            Some(frame) => Some((frame.locals, 0)),
            None => Some((self.scopes.global, 0)),
        }
    }

    /// Value of a variable with a new reference, or `None` when it does not exist.
    /// A bare scope prefix such as `g:` yields the scope dictionary.
    pub(crate) fn lookup_var(&mut self, name: &str) -> Result<Option<Value>> {
        if name == CHANGEDTICK {
            let buf = self.host.buffer_id();
            return Ok(Some(Value::Number(self.host.changedtick(buf))));
        }
        let Some((dict, off)) = self.find_var_dict(name) else {
            return Ok(None);
        };
        let varname = &name[off..];
        if varname.is_empty() {
            return Ok(Some(self.heap.inc_value(&Value::Dict(dict))));
        }
        if let Some(item) = self.heap.dict(dict).get(varname) {
            let value = item.tv.value.clone();
            return Ok(Some(self.heap.inc_value(&value)));
        }
        if dict == self.scopes.global && name.contains('#') && self.try_autoload(name)? {
            if let Some(item) = self.heap.dict(dict).get(varname) {
                let value = item.tv.value.clone();
                return Ok(Some(self.heap.inc_value(&value)));
            }
        }
        Ok(None)
    }

    /// Value of a variable; the caller owns the returned reference.
    pub fn get_var(&mut self, name: &str) -> Result<Value> {
        match self.lookup_var(name)? {
            Some(v) => Ok(v),
            None => err_undefined(format!("Undefined variable: {name}")),
        }
    }

    /// Reject Funcref variable names that cannot be called or that would hide a function.
    pub(crate) fn check_funcref_name(&self, name: &str, new_var: bool) -> Result<()> {
        let bytes = name.as_bytes();
        let scoped = bytes.get(1) == Some(&b':');
        let lower_ok = scoped && b"wbst".contains(&bytes[0]);
        let first = if scoped { bytes.get(2) } else { bytes.first() };
        if !lower_ok && !first.is_some_and(u8::is_ascii_uppercase) {
            return err_type(format!("Funcref variable name must start with a capital: {name}"));
        }
        let bare = name.strip_prefix("g:").unwrap_or(name);
        if new_var && self.function_exists(bare) {
            return err_type(format!("Variable name conflicts with existing function: {name}"));
        }
        Ok(())
    }

    /// Assign `value` to the variable `name`, creating it when needed. A new
    /// reference is taken for the stored value.
    pub fn set_var(&mut self, name: &str, value: &Value) -> Result<()> {
        if name == CHANGEDTICK {
            return err_immutable(format!("Cannot change read-only variable \"{name}\""));
        }
        let Some((dict, off)) = self.find_var_dict(name) else {
            return illegal_name(name);
        };
        let varname = &name[off..];
        if varname.is_empty() {
            return illegal_name(name);
        }
        let existing = self.heap.dict(dict).get(varname).map(|item| (item.flags, item.tv.lock, item.tv.value.clone()));
        if matches!(value, Value::Funcref(_)) {
            self.check_funcref_name(name, existing.is_none())?;
        }

        match existing {
            Some((flags, lock, old)) => {
                check_read_only(flags, name, self.ctx.sandbox > 0)?;
                lock.check(name)?;
                let new = if dict == self.scopes.vimvars {
                    // v: variables keep their type.
                    match old {
                        Value::String(_) => Value::String(value.to_bytes()?.into_owned()),
                        Value::Number(_) => Value::Number(value.to_number()?),
                        _ if old.type_code() == value.type_code() => self.heap.inc_value(value),
                        _ => return err_type(format!("Variable type mismatch for: {name}")),
                    }
                } else {
                    self.heap.inc_value(value)
                };
                let old = self
                    .heap
                    .dict_mut(dict)
                    .get_mut(varname)
                    .map(|item| std::mem::replace(&mut item.tv.value, new));
                if let Some(old) = old {
                    self.heap.release(old);
                }
            }
            None => {
                let d = self.heap.dict(dict);
                if dict == self.scopes.vimvars || d.scope == Some(ScopeKind::Argument) {
                    return illegal_name(name);
                }
                d.lock.check(name)?;
                if !valid_varname(varname) {
                    return illegal_name(name);
                }
                let new = self.heap.inc_value(value);
                self.heap.dict_mut(dict).insert(varname, TypVal::new(new))?;
            }
        }
        Ok(())
    }

    /// Remove a variable. With `forceit` a missing variable is not an error.
    pub(crate) fn unlet_var(&mut self, name: &str, forceit: bool) -> Result<()> {
        if name == CHANGEDTICK {
            return err_immutable(format!("Cannot delete read-only variable \"{name}\""));
        }
        let Some((dict, off)) = self.find_var_dict(name) else {
            return illegal_name(name);
        };
        let varname = &name[off..];
        let d = self.heap.dict(dict);
        let Some(item) = d.get(varname) else {
            if forceit {
                return Ok(());
            }
            return err_undefined(format!("No such variable: \"{name}\""));
        };
        if item.flags.fixed {
            return err_immutable(format!("Cannot delete variable {name}"));
        }
        check_read_only(item.flags, name, self.ctx.sandbox > 0)?;
        item.tv.lock.check(name)?;
        d.lock.check(name)?;
        if let Some(item) = self.heap.dict_mut(dict).remove(varname) {
            self.heap.release(item.tv.value);
        }
        Ok(())
    }

    /// Current value of a `v:` variable with a new reference.
    pub fn vimvar(&mut self, name: &str) -> Option<Value> {
        let value = self.heap.dict(self.scopes.vimvars).get(name)?.tv.value.clone();
        Some(self.heap.inc_value(&value))
    }

    /// Set a `v:` variable from inside the interpreter, bypassing its read-only
    /// flag. Takes ownership of `value`.
    pub fn set_vimvar(&mut self, name: &str, value: Value) -> Result<()> {
        let Some(def) = vimvar_def(name) else {
            return illegal_name(&format!("v:{name}"));
        };
        let dict = self.scopes.vimvars;
        match self.heap.dict_mut(dict).get_mut(name) {
            Some(item) => {
                let old = std::mem::replace(&mut item.tv.value, value);
                self.heap.release(old);
            }
            None => {
                self.heap
                    .dict_mut(dict)
                    .insert_with_flags(name, TypVal::new(value), vimvar_flags(def.flags))?;
            }
        }
        Ok(())
    }

    /// Take a `v:` variable out of the scope again (`v:key`, `v:val`).
    pub fn remove_vimvar(&mut self, name: &str) {
        let dict = self.scopes.vimvars;
        if let Some(item) = self.heap.dict_mut(dict).remove(name) {
            self.heap.release(item.tv.value);
        }
    }
}
