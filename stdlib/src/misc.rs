use anyhow::Result;
use tracing::debug;
use vex_core::error::err_type;
use vex_core::exec::command_exists;
use vex_core::module::{Builtin, BuiltinRegistry, Module};
use vex_core::{Interp, OptionScope, Value};

use crate::args::opt_bool;

/// Type inspection, copying, existence checks and the garbage collector.
#[derive(Debug)]
pub struct MiscModule {
    functions: Vec<Builtin>,
}

impl Default for MiscModule {
    fn default() -> Self {
        Self::new()
    }
}

impl MiscModule {
    pub fn new() -> Self {
        Self {
            functions: vec![
                Builtin::new("copy", 1, 1, copy),
                Builtin::new("deepcopy", 1, 2, deepcopy),
                Builtin::new("empty", 1, 1, empty),
                Builtin::new("exists", 1, 1, exists),
                Builtin::new("garbagecollect", 0, 1, garbagecollect),
                Builtin::new("islocked", 1, 1, islocked),
                Builtin::new("len", 1, 1, len),
                Builtin::new("type", 1, 1, type_of),
            ],
        }
    }
}

impl Module for MiscModule {
    fn name(&self) -> &str {
        "misc"
    }

    fn description(&self) -> &str {
        "Type inspection, copying, existence checks and garbage collection"
    }

    fn register(&self, registry: &mut BuiltinRegistry) -> Result<()> {
        for builtin in &self.functions {
            registry.register(*builtin)?;
        }
        Ok(())
    }
}

fn len(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let n = match &args[0] {
        Value::Number(_) | Value::String(_) => args[0].to_bytes()?.len(),
        Value::List(l) => interp.heap.list(*l).len(),
        Value::Dict(d) => interp.heap.dict(*d).len(),
        Value::Funcref(_) => return err_type("Invalid type for len()"),
    };
    Ok(Value::Number(n as i64))
}

fn empty(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let empty = match &args[0] {
        Value::Number(n) => *n == 0,
        Value::String(s) => s.is_empty(),
        Value::List(l) => interp.heap.list(*l).is_empty(),
        Value::Dict(d) => interp.heap.dict(*d).is_empty(),
        Value::Funcref(_) => false,
    };
    Ok(Value::from(empty))
}

fn type_of(args: &[Value], _interp: &mut Interp) -> Result<Value> {
    Ok(Value::Number(args[0].type_code()))
}

/// `copy({expr})`: containers get a new top level, items are shared.
fn copy(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let max_nest = interp.config.max_nest;
    interp.heap.copy_value(&args[0], false, max_nest)
}

/// `deepcopy({expr} [, {noref}])`. With `{noref}` set, a container that
/// appears twice is copied twice and a cycle is an error.
fn deepcopy(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let max_nest = interp.config.max_nest;
    if opt_bool(args, 1)? {
        interp.heap.deep_copy_noref(&args[0], max_nest)
    } else {
        interp.heap.copy_value(&args[0], true, max_nest)
    }
}

/// `exists({expr})`
///
/// * `&option`, `&l:option`, `&g:option`: an option
/// * `$NAME`: an environment variable
/// * `*name`: a function
/// * `:name`: an Ex command, reported as 2
/// * anything else: a variable, List item or Dictionary entry
fn exists(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let text = args[0].to_str()?.into_owned();
    let text = text.trim();
    let found = if let Some(option) = text.strip_prefix('&').or_else(|| text.strip_prefix('+')) {
        let (name, scope) = if let Some(name) = option.strip_prefix("l:") {
            (name, OptionScope::Local)
        } else if let Some(name) = option.strip_prefix("g:") {
            (name, OptionScope::Global)
        } else {
            (option, OptionScope::Both)
        };
        interp.host().get_option(name, scope).is_some()
    } else if let Some(name) = text.strip_prefix('$') {
        interp.host().env_var(name).is_some()
    } else if let Some(name) = text.strip_prefix('*') {
        match interp.script_function_name(name) {
            Ok(name) => !name.is_empty() && interp.function_exists(&name),
            Err(err) => {
                debug!(target: "vex::func", name, %err, "exists() on a bad function name");
                false
            }
        }
    } else if let Some(name) = text.strip_prefix(':') {
        return Ok(Value::Number(if command_exists(name) { 2 } else { 0 }));
    } else {
        interp.variable_exists(text)
    };
    Ok(Value::from(found))
}

/// `islocked({expr})`: 1 when the target cannot be changed.
fn islocked(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let text = args[0].to_str()?.into_owned();
    Ok(Value::from(interp.is_locked(&text)?))
}

/// `garbagecollect([{atexit}])`. Runs once the current command finishes when
/// called from inside a script or function.
fn garbagecollect(_args: &[Value], interp: &mut Interp) -> Result<Value> {
    let freed = interp.collect_garbage();
    debug!(target: "vex::heap", freed, "garbagecollect()");
    Ok(Value::Number(0))
}
