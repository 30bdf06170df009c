use anyhow::Result;
use vex_core::error::{err_range, err_type};
use vex_core::val::{DictId, ListId, NodeId, VarLock};
use vex_core::{Interp, Value};

/// The List argument of `func`.
pub(crate) fn list_arg(value: &Value, func: &str) -> Result<ListId> {
    match value {
        Value::List(l) => Ok(*l),
        _ => err_type(format!("Argument of {func}() must be a List")),
    }
}

pub(crate) fn dict_arg(value: &Value) -> Result<DictId> {
    match value {
        Value::Dict(d) => Ok(*d),
        _ => err_type("Dictionary required"),
    }
}

/// Optional Number argument at `idx`.
pub(crate) fn opt_number(args: &[Value], idx: usize, default: i64) -> Result<i64> {
    args.get(idx).map_or(Ok(default), Value::to_number)
}

pub(crate) fn opt_bool(args: &[Value], idx: usize) -> Result<bool> {
    Ok(opt_number(args, idx, 0)? != 0)
}

pub(crate) fn opt_string(args: &[Value], idx: usize, default: &str) -> Result<String> {
    match args.get(idx) {
        Some(v) => Ok(v.to_str()?.into_owned()),
        None => Ok(default.to_string()),
    }
}

/// Fail when `lock` forbids changing the value passed to `func`.
pub(crate) fn check_lock(lock: VarLock, func: &str) -> Result<()> {
    lock.check(&format!("{func}() argument"))
}

/// Node of `list` at `idx` (negative counts from the end).
pub(crate) fn list_node(interp: &Interp, list: ListId, idx: i64) -> Result<NodeId> {
    match interp.heap.list(list).find(idx) {
        Some(node) => Ok(node),
        None => err_range(format!("List index out of range: {idx}")),
    }
}

/// A new reference to `value`, handed back as a builtin's result.
pub(crate) fn share(interp: &mut Interp, value: &Value) -> Value {
    interp.heap.inc_value(value)
}
