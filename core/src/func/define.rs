use std::cell::Cell;

use anyhow::Result;
use tracing::debug;

use crate::error::{err_immutable, err_other, err_syntax, err_type, err_undefined};
use crate::expr::Cursor;
use crate::interp::{AssignOp, Interp};
use crate::lval::LvalKind;
use crate::val::Value;

use super::{FuncFlags, UserFunction};

/// Parsed `:function` header: `Name(a, b, ...) range abort dict`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct FuncHeader {
    /// Name as written; may be `dict.key` or `dict['key']`.
    pub(crate) name: String,
    pub(crate) params: Vec<String>,
    pub(crate) varargs: bool,
    pub(crate) flags: FuncFlags,
}

impl FuncHeader {
    /// Parse everything after `:function[!]`. Returns `None` when there is no
    /// argument list, which asks for a listing instead of a definition.
    pub(crate) fn parse(text: &str) -> Result<Option<Self>> {
        let text = text.trim();
        let Some(open) = text.find('(') else {
            return Ok(None);
        };
        let name = text[..open].trim_end();
        if name.is_empty() {
            return err_syntax("Function name required");
        }
        let rest = &text[open + 1..];
        let Some(close) = rest.find(')') else {
            return err_syntax(format!("Missing ')': {text}"));
        };

        let mut params: Vec<String> = Vec::new();
        let mut varargs = false;
        let inner = rest[..close].trim();
        for param in inner.split(',').map(str::trim).filter(|_| !inner.is_empty()) {
            if varargs {
                return err_syntax(format!("Illegal argument: {param}"));
            }
            if param == "..." {
                varargs = true;
                continue;
            }
            let valid = param.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_')
                && param.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_');
            if !valid || param == "firstline" || param == "lastline" {
                return err_syntax(format!("Illegal argument: {param}"));
            }
            if params.iter().any(|p| p == param) {
                return err_syntax(format!("Duplicate argument name: {param}"));
            }
            params.push(param.to_string());
        }

        let mut flags = FuncFlags::default();
        for word in rest[close + 1..].split_whitespace() {
            match word {
                "range" => flags.range = true,
                "abort" => flags.abort = true,
                "dict" => flags.dict = true,
                _ if word.starts_with('"') => break,
                _ => return err_syntax(format!("Trailing characters: {word}")),
            }
        }
        Ok(Some(Self {
            name: name.to_string(),
            params,
            varargs,
            flags,
        }))
    }

    fn is_dict_member(&self) -> bool {
        !self.name.starts_with('<') && self.name.contains(['.', '['])
    }
}

/// Checks the registry name of a new named function.
fn check_function_name(written: &str, name: &str) -> Result<()> {
    let bare = name
        .strip_prefix("<SNR>")
        .map(|rest| rest.trim_start_matches(|c: char| c.is_ascii_digit()).trim_start_matches('_'))
        .unwrap_or(name);
    if bare.is_empty() || !bare.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'#') {
        return err_syntax(format!("Invalid function name: {written}"));
    }
    if !name.starts_with("<SNR>") && !name.contains('#') && !name.starts_with(|c: char| c.is_ascii_uppercase()) {
        return err_syntax(format!("Function name must start with a capital or contain a colon: {written}"));
    }
    Ok(())
}

impl Interp {
    /// Define (or with `forceit` redefine) a user function.
    pub(crate) fn define_function(&mut self, header: FuncHeader, forceit: bool, body: Vec<Option<String>>) -> Result<()> {
        if self.ctx.sandbox > 0 {
            return err_other("Not allowed in sandbox");
        }
        if header.is_dict_member() {
            return self.define_dict_function(header, forceit, body);
        }

        let name = self.script_function_name(&header.name)?;
        check_function_name(&header.name, &name)?;
        if !header.name.contains('#')
            && let Some(var) = self.lookup_var(&header.name)?
        {
            let is_funcref = matches!(var, Value::Funcref(_));
            self.heap.release(var);
            if is_funcref {
                return err_type(format!("Function name conflicts with variable: {}", header.name));
            }
        }
        if let Some(existing) = self.funcs.get(&name) {
            if !forceit {
                return err_other(format!("Function {name} already exists, add ! to replace it"));
            }
            if existing.calls.get() > 0 {
                return err_other(format!("Cannot redefine function {name}: It is in use"));
            }
        }
        self.insert_function(name, header, body)
    }

    fn insert_function(&mut self, name: String, header: FuncHeader, body: Vec<Option<String>>) -> Result<()> {
        debug!(target: "vex::func", function = %name, lines = body.len(), "defined");
        self.funcs.insert(UserFunction {
            name: name.as_str().into(),
            params: header.params,
            varargs: header.varargs,
            body,
            flags: header.flags,
            script_id: self.ctx.script_id,
            calls: Cell::new(0),
        })?;
        Ok(())
    }

    /// `:function dict.key()`: an anonymous function stored in a Dictionary entry.
    fn define_dict_function(&mut self, mut header: FuncHeader, forceit: bool, body: Vec<Option<String>>) -> Result<()> {
        header.flags.dict = true;
        let mut cur = Cursor::new(&header.name);
        let lval = self.get_lval(&mut cur, false)?;
        if !cur.at_end() {
            self.release_lval(lval);
            return err_syntax(format!("Trailing characters: {}", cur.rest()));
        }

        match &lval.kind {
            LvalKind::DictItem { dict, key } => {
                let existing = self.heap.dict(*dict).get(key).map(|item| item.tv.value.clone());
                let result = match existing {
                    _ if !forceit => err_other("Dictionary entry already exists"),
                    Some(Value::Funcref(name)) if crate::val::is_numbered_func(&name) => {
                        match self.funcs.get(&name) {
                            Some(f) if f.calls.get() > 0 => {
                                err_other(format!("Cannot redefine function {name}: It is in use"))
                            }
                            _ => self.insert_function(name.to_string(), header, body),
                        }
                    }
                    _ => err_type("Funcref required"),
                };
                self.release_lval(lval);
                result
            }
            LvalKind::NewKey { .. } => {
                let name = self.funcs.next_numbered_name();
                self.insert_function(name.clone(), header, body)?;
                let funcref = self.heap.new_funcref(&name);
                let result = self.set_lval(&lval, &funcref, AssignOp::Set);
                self.heap.release(funcref);
                self.release_lval(lval);
                result
            }
            _ => {
                self.release_lval(lval);
                err_type(format!("Dictionary required: {}", header.name))
            }
        }
    }

    /// `:delfunction name`
    pub(crate) fn delete_function(&mut self, text: &str) -> Result<()> {
        let text = text.trim();
        if text.is_empty() {
            return err_syntax("Argument required");
        }
        if !text.starts_with('<') && text.contains(['.', '[']) {
            // Dropping the entry releases the anonymous function.
            let mut cur = Cursor::new(text);
            let lval = self.get_lval(&mut cur, true)?;
            let result = match &lval.kind {
                LvalKind::DictItem { dict, key } => {
                    match self.heap.dict(*dict).get(key).map(|item| item.tv.value.clone()) {
                        Some(Value::Funcref(_)) => self.unlet_lval(&lval, false),
                        _ => err_type("Funcref required"),
                    }
                }
                _ => err_undefined(format!("Undefined function: {text}")),
            };
            self.release_lval(lval);
            return result;
        }

        let name = self.script_function_name(text)?;
        match self.funcs.get(&name) {
            None => err_undefined(format!("Undefined function: {name}")),
            Some(f) if f.calls.get() > 0 => err_immutable(format!("Cannot delete function {name}: It is in use")),
            Some(_) => {
                debug!(target: "vex::func", function = %name, "deleted");
                self.funcs.remove(&name);
                Ok(())
            }
        }
    }
}
