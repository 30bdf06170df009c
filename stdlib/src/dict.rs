use anyhow::Result;
use vex_core::error::err_type;
use vex_core::module::{Builtin, BuiltinRegistry, Module};
use vex_core::{Interp, Value};

use crate::args::{dict_arg, share};

#[derive(Debug)]
pub struct DictModule {
    functions: Vec<Builtin>,
}

impl Default for DictModule {
    fn default() -> Self {
        Self::new()
    }
}

impl DictModule {
    pub fn new() -> Self {
        Self {
            functions: vec![
                Builtin::new("get", 2, 3, get),
                Builtin::new("has_key", 2, 2, has_key),
                Builtin::new("items", 1, 1, items),
                Builtin::new("keys", 1, 1, keys),
                Builtin::new("values", 1, 1, values),
            ],
        }
    }
}

impl Module for DictModule {
    fn name(&self) -> &str {
        "dict"
    }

    fn description(&self) -> &str {
        "Dictionary lookup and iteration"
    }

    fn register(&self, registry: &mut BuiltinRegistry) -> Result<()> {
        for builtin in &self.functions {
            registry.register(*builtin)?;
        }
        Ok(())
    }
}

/// `get({list}, {idx} [, {default}])` or `get({dict}, {key} [, {default}])`
fn get(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let found = match &args[0] {
        Value::List(l) => {
            let list = interp.heap.list(*l);
            list.find(args[1].to_number()?).map(|node| list.item(node).value.clone())
        }
        Value::Dict(d) => {
            let key = args[1].to_str()?;
            interp.heap.dict(*d).get(&key).map(|item| item.tv.value.clone())
        }
        _ => return err_type("Argument of get() must be a List or Dictionary"),
    };
    match found.as_ref().or(args.get(2)) {
        Some(value) => Ok(share(interp, value)),
        None => Ok(Value::Number(0)),
    }
}

fn has_key(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let dict = dict_arg(&args[0])?;
    let key = args[1].to_str()?;
    Ok(Value::from(interp.heap.dict(dict).contains_key(&key)))
}

/// `keys({dict})`, in insertion order.
fn keys(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let dict = dict_arg(&args[0])?;
    let keys = interp.heap.dict(dict).keys().into_iter().map(Value::str).collect();
    Ok(Value::List(interp.heap.new_list_from(keys)))
}

fn values(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let dict = dict_arg(&args[0])?;
    let values: Vec<Value> = dict_values(interp, dict);
    Ok(Value::List(interp.heap.new_list_from(values)))
}

/// `items({dict})`: a List of `[key, value]` pairs.
fn items(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let dict = dict_arg(&args[0])?;
    let keys = interp.heap.dict(dict).keys();
    let values = dict_values(interp, dict);
    let pairs = keys
        .into_iter()
        .zip(values)
        .map(|(key, value)| Value::List(interp.heap.new_list_from(vec![Value::str(key), value])))
        .collect();
    Ok(Value::List(interp.heap.new_list_from(pairs)))
}

/// The values of `dict` in insertion order, each with a new reference.
fn dict_values(interp: &mut Interp, dict: vex_core::val::DictId) -> Vec<Value> {
    let values: Vec<Value> = interp
        .heap
        .dict(dict)
        .entries()
        .into_iter()
        .map(|(_, item)| item.tv.value.clone())
        .collect();
    values.iter().map(|v| interp.heap.inc_value(v)).collect()
}
