use std::rc::Rc;

use anyhow::Result;
use tracing::{debug, trace, warn};

use crate::error::{err_arity, err_recursion, err_syntax, err_undefined};
use crate::interp::Interp;
use crate::scope::ScopeKind;
use crate::val::{DictId, ItemFlags, TypVal, Value, VarLock};

use super::{CallFrame, MAX_FUNC_ARGS, UserFunction};

const RO_FIXED: ItemFlags = ItemFlags {
    read_only: true,
    read_only_sandbox: false,
    fixed: true,
};

/// Builtin function names start with a lowercase letter and have no scope or
/// autoload part.
pub(crate) fn is_builtin_name(name: &str) -> bool {
    name.as_bytes().first().is_some_and(u8::is_ascii_lowercase) && !name.contains([':', '#'])
}

impl Interp {
    /// Is there a builtin or user function called `name` (already translated)?
    pub fn function_exists(&self, name: &str) -> bool {
        if is_builtin_name(name) {
            self.builtins.contains(name)
        } else {
            self.funcs.contains(name)
        }
    }

    /// Translate the name of a function as written in a script to its registry
    /// name: `s:F` and `<SID>F` become `<SNR>{id}_F`, `g:F` becomes `F`.
    pub fn script_function_name(&self, name: &str) -> Result<String> {
        let script_local = if let Some(rest) = name.strip_prefix("s:") {
            Some(rest)
        } else if name.len() >= 5 && name.is_char_boundary(5) && name[..5].eq_ignore_ascii_case("<SID>") {
            Some(&name[5..])
        } else {
            None
        };
        if let Some(rest) = script_local {
            if self.ctx.script_id == 0 {
                return err_syntax(format!("Using <SID> not in a script context: {name}"));
            }
            return Ok(format!("<SNR>{}_{}", self.ctx.script_id, rest));
        }
        Ok(name.strip_prefix("g:").unwrap_or(name).to_string())
    }

    /// Call a builtin or user function. `args` stay owned by the caller; the
    /// result is owned by the caller.
    pub fn call_func(
        &mut self,
        name: &str,
        args: &[Value],
        range: Option<(i64, i64)>,
        selfdict: Option<DictId>,
    ) -> Result<Value> {
        if args.len() > MAX_FUNC_ARGS {
            return err_arity(format!("Too many arguments for function: {name}"));
        }
        if is_builtin_name(name) {
            let Some(builtin) = self.builtins.find(name).copied() else {
                return err_undefined(format!("Unknown function: {name}"));
            };
            if args.len() < builtin.min_args {
                return err_arity(format!("Not enough arguments for function: {name}"));
            }
            if args.len() > builtin.max_args {
                return err_arity(format!("Too many arguments for function: {name}"));
            }
            trace!(target: "vex::func", builtin = name, args = args.len(), "calling builtin");
            return (builtin.func)(args, self);
        }

        let func = match self.funcs.get(name) {
            Some(func) => func,
            None if name.contains('#') && self.try_autoload(name)? => match self.funcs.get(name) {
                Some(func) => func,
                None => return err_undefined(format!("Unknown function: {name}")),
            },
            None => return err_undefined(format!("Unknown function: {name}")),
        };
        if func.flags.dict && selfdict.is_none() {
            return err_arity(format!("Using a Dictionary function without a Dictionary: {name}"));
        }
        let result = self.call_user_func(func, args, range, selfdict);
        self.after_call();
        result
    }

    fn call_user_func(
        &mut self,
        func: Rc<UserFunction>,
        args: &[Value],
        range: Option<(i64, i64)>,
        selfdict: Option<DictId>,
    ) -> Result<Value> {
        let depth = self.ctx.frames.len();
        if depth >= self.max_func_depth() {
            return err_recursion("Function call depth is higher than 'maxfuncdepth'");
        }
        if args.len() < func.params.len() {
            return err_arity(format!("Not enough arguments for function: {}", func.name));
        }
        if !func.varargs && args.len() > func.params.len() {
            return err_arity(format!("Too many arguments for function: {}", func.name));
        }
        debug!(target: "vex::func", function = %func.name, args = args.len(), depth, "calling");

        let (firstline, lastline) = range.unwrap_or_else(|| {
            let lnum = self.host.cursor_line();
            (lnum, lnum)
        });
        let (locals, arg_dict, varargs) = self.bind_arguments(&func, args, firstline, lastline, selfdict)?;

        func.calls.set(func.calls.get() + 1);
        let saved_script = std::mem::replace(&mut self.ctx.script_id, func.script_id);
        let saved_did_emsg = std::mem::replace(&mut self.ctx.did_emsg, false);
        self.ctx.frames.push(CallFrame {
            func: func.clone(),
            locals,
            args: arg_dict,
            varargs,
            return_value: None,
            line: 0,
        });

        let outcome = self.run_function_body();

        let frame = self.ctx.frames.pop();
        self.ctx.script_id = saved_script;
        func.calls.set(func.calls.get() - 1);

        let mut result = frame.and_then(|f| f.return_value).unwrap_or(Value::Number(0));
        if let Err(err) = outcome {
            self.report_error(&err);
        }
        if func.flags.abort && self.ctx.did_emsg {
            self.heap.release(result);
            result = Value::Number(-1);
            self.ctx.aborting = true;
        }
        self.ctx.did_emsg |= saved_did_emsg;
        debug!(target: "vex::func", function = %func.name, "returned");

        self.release_frame(func.name.clone(), locals, arg_dict, varargs);
        Ok(result)
    }

    /// Create `a:` and `l:` for a call.
    fn bind_arguments(
        &mut self,
        func: &UserFunction,
        args: &[Value],
        firstline: i64,
        lastline: i64,
        selfdict: Option<DictId>,
    ) -> Result<(DictId, DictId, crate::val::ListId)> {
        let locals = self.heap.new_dict();
        self.heap.dict_mut(locals).scope = Some(ScopeKind::Local);
        let arg_dict = self.heap.new_dict();
        self.heap.dict_mut(arg_dict).scope = Some(ScopeKind::Argument);

        let extra = &args[func.params.len()..];
        let varargs = self.heap.new_list();
        for v in extra {
            let v = self.heap.inc_value(v);
            self.heap.list_mut(varargs).append(TypVal::with_lock(v, VarLock::Fixed));
        }
        self.heap.list_mut(varargs).lock = VarLock::Fixed;

        let mut entries: Vec<(String, Value)> = vec![
            ("0".to_string(), Value::Number(extra.len() as i64)),
            ("000".to_string(), Value::List(varargs)),
            ("firstline".to_string(), Value::Number(firstline)),
            ("lastline".to_string(), Value::Number(lastline)),
        ];
        for (i, v) in extra.iter().enumerate() {
            entries.push(((i + 1).to_string(), self.heap.inc_value(v)));
        }
        for (param, v) in func.params.iter().zip(args) {
            entries.push((param.clone(), self.heap.inc_value(v)));
        }
        for (key, value) in entries {
            self.heap
                .dict_mut(arg_dict)
                .insert_with_flags(&key, TypVal::with_lock(value, VarLock::Fixed), RO_FIXED)?;
        }

        if let Some(d) = selfdict {
            let value = self.heap.inc_value(&Value::Dict(d));
            self.heap
                .dict_mut(locals)
                .insert_with_flags("self", TypVal::with_lock(value, VarLock::Fixed), RO_FIXED)?;
        }
        Ok((locals, arg_dict, varargs))
    }

    /// Free the variables of a finished call, unless something still refers to them.
    fn release_frame(&mut self, name: Rc<str>, locals: DictId, args: DictId, varargs: crate::val::ListId) {
        let escaped = self.heap.dict_refcount(locals) > 1
            || self.heap.dict_refcount(args) > 1
            || self.heap.list_refcount(varargs) > 1;
        if escaped {
            self.keep_frame(name, locals, args, varargs);
        } else {
            self.heap.release(Value::Dict(locals));
            self.heap.release(Value::Dict(args));
        }
    }

    /// Source the autoload script for `name` (`dir#sub#Func` or `dir#sub#var`).
    /// Each script is tried once. Returns true when a script was sourced.
    pub(crate) fn try_autoload(&mut self, name: &str) -> Result<bool> {
        let name = name.strip_prefix("g:").unwrap_or(name);
        let Some((script, _)) = name.rsplit_once('#') else {
            return Ok(false);
        };
        if !self.autoloaded.insert(script.to_string()) {
            return Ok(false);
        }
        let Some(lines) = self.host.autoload(name) else {
            debug!(target: "vex::func", script, "no autoload script");
            return Ok(false);
        };
        debug!(target: "vex::func", script, lines = lines.len(), "sourcing autoload script");
        let mut source = crate::exec::Lines::new(lines);
        // Errors inside the script were already reported.
        let _ = self.source_lines(&mut source);
        if !name.contains(':') && !self.funcs.contains(name) && !self.heap.dict(self.scopes.global).contains_key(name) {
            warn!(target: "vex::func", name, script, "autoload script did not define the name");
        }
        Ok(true)
    }
}
