use anyhow::{Result, anyhow};

use crate::error::{err_arity, err_type, err_undefined};
use crate::func::MAX_FUNC_ARGS;
use crate::interp::Interp;
use crate::val::Value;

/// Signature of a builtin function. Arguments stay owned by the caller; the
/// returned value carries its own reference.
pub type BuiltinFn = fn(&[Value], &mut Interp) -> Result<Value>;

#[derive(Debug, Clone, Copy)]
pub struct Builtin {
    pub name: &'static str,
    pub min_args: usize,
    pub max_args: usize,
    pub func: BuiltinFn,
}

impl Builtin {
    pub const fn new(name: &'static str, min_args: usize, max_args: usize, func: BuiltinFn) -> Self {
        Self {
            name,
            min_args,
            max_args,
            func,
        }
    }
}

/// Table of builtin functions, sorted by name for binary search.
#[derive(Debug, Default)]
pub struct BuiltinRegistry {
    table: Vec<Builtin>,
    modules: Vec<(String, String)>,
}

impl BuiltinRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one builtin. Names must be lowercase and unique.
    pub fn register(&mut self, builtin: Builtin) -> Result<()> {
        if !builtin.name.starts_with(|c: char| c.is_ascii_lowercase()) {
            return Err(anyhow!("builtin name must start with a lowercase letter: {}", builtin.name));
        }
        match self.table.binary_search_by(|b| b.name.cmp(builtin.name)) {
            Ok(_) => Err(anyhow!("builtin '{}' registered twice", builtin.name)),
            Err(pos) => {
                self.table.insert(pos, builtin);
                Ok(())
            }
        }
    }

    /// Register every builtin a module provides.
    pub fn register_module(&mut self, module: &dyn Module) -> Result<()> {
        module.register(self)?;
        self.modules.push((module.name().to_string(), module.description().to_string()));
        Ok(())
    }

    pub fn find(&self, name: &str) -> Option<&Builtin> {
        self.table
            .binary_search_by(|b| b.name.cmp(name))
            .ok()
            .map(|idx| &self.table[idx])
    }

    #[inline]
    pub fn contains(&self, name: &str) -> bool {
        self.find(name).is_some()
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.table.iter().map(|b| b.name)
    }

    /// `(name, description)` of the registered modules.
    pub fn modules(&self) -> &[(String, String)] {
        &self.modules
    }
}

/// A group of builtins registered together.
pub trait Module: std::fmt::Debug {
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    fn register(&self, registry: &mut BuiltinRegistry) -> Result<()>;
}

/// Builtins that reach into the call engine: `function()` and `call()`.
#[derive(Debug)]
pub struct CoreModule {
    functions: Vec<Builtin>,
}

impl Default for CoreModule {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreModule {
    pub fn new() -> Self {
        Self {
            functions: vec![
                Builtin::new("function", 1, 1, Self::function),
                Builtin::new("call", 2, 3, Self::call),
            ],
        }
    }

    /// `function({name})`: a Funcref to an existing function.
    fn function(args: &[Value], interp: &mut Interp) -> Result<Value> {
        let name = args[0].to_str()?;
        let name = interp.script_function_name(&name)?;
        if name.is_empty() || !interp.function_exists(&name) {
            return err_undefined(format!("Unknown function: {name}"));
        }
        Ok(interp.heap.new_funcref(&name))
    }

    /// `call({func}, {arglist} [, {dict}])`
    fn call(args: &[Value], interp: &mut Interp) -> Result<Value> {
        let name = match &args[0] {
            Value::Funcref(name) => name.to_string(),
            other => interp.script_function_name(&other.to_str()?)?,
        };
        let Value::List(list) = args[1] else {
            return err_type("List required");
        };
        let selfdict = match args.get(2) {
            None => None,
            Some(Value::Dict(d)) => Some(*d),
            Some(_) => return err_type("Dictionary required"),
        };
        if interp.heap.list(list).len() > MAX_FUNC_ARGS {
            return err_arity("Too many arguments");
        }
        let call_args = interp.heap.list_snapshot(list);
        let result = interp.call_func(&name, &call_args, None, selfdict);
        interp.heap.release_all(call_args);
        result
    }
}

impl Module for CoreModule {
    fn name(&self) -> &str {
        "core"
    }

    fn description(&self) -> &str {
        "Function references and indirect calls"
    }

    fn register(&self, registry: &mut BuiltinRegistry) -> Result<()> {
        for builtin in &self.functions {
            registry.register(*builtin)?;
        }
        Ok(())
    }
}
