use std::cmp::Ordering;

use anyhow::Result;
use tracing::trace;
use vex_core::error::{err_arity, err_other, err_range, err_type, err_undefined};
use vex_core::module::{Builtin, BuiltinRegistry, Module};
use vex_core::val::{DictId, ListId, TypVal};
use vex_core::{Interp, Value};

use crate::args::{check_lock, list_arg, list_node, opt_bool, opt_number, opt_string, share};

/// Builtins working on Lists, and the ones shared between Lists and
/// Dictionaries (`remove`, `extend`, `count`, `filter`, `map`, ...).
#[derive(Debug)]
pub struct ListModule {
    functions: Vec<Builtin>,
}

impl Default for ListModule {
    fn default() -> Self {
        Self::new()
    }
}

impl ListModule {
    pub fn new() -> Self {
        Self {
            functions: vec![
                Builtin::new("add", 2, 2, add),
                Builtin::new("count", 2, 4, count),
                Builtin::new("extend", 2, 3, extend),
                Builtin::new("filter", 2, 2, filter),
                Builtin::new("index", 2, 4, index),
                Builtin::new("insert", 2, 3, insert),
                Builtin::new("join", 1, 2, join),
                Builtin::new("map", 2, 2, map),
                Builtin::new("max", 1, 1, max),
                Builtin::new("min", 1, 1, min),
                Builtin::new("range", 1, 3, range),
                Builtin::new("remove", 2, 3, remove),
                Builtin::new("reverse", 1, 1, reverse),
                Builtin::new("sort", 1, 2, sort),
            ],
        }
    }
}

impl Module for ListModule {
    fn name(&self) -> &str {
        "list"
    }

    fn description(&self) -> &str {
        "List construction, mutation, searching and sorting"
    }

    fn register(&self, registry: &mut BuiltinRegistry) -> Result<()> {
        for builtin in &self.functions {
            registry.register(*builtin)?;
        }
        Ok(())
    }
}

/// `add({list}, {expr})`
fn add(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let list = list_arg(&args[0], "add")?;
    check_lock(interp.heap.list(list).lock, "add")?;
    let item = interp.heap.inc_value(&args[1]);
    interp.heap.list_append(list, item);
    Ok(share(interp, &args[0]))
}

/// Node to insert before for index `idx`; `None` appends.
fn insert_position(interp: &Interp, list: ListId, idx: i64) -> Result<Option<vex_core::val::NodeId>> {
    let len = interp.heap.list(list).len() as i64;
    if idx == len {
        return Ok(None);
    }
    list_node(interp, list, idx).map(Some)
}

/// `insert({list}, {item} [, {idx}])`
fn insert(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let list = list_arg(&args[0], "insert")?;
    check_lock(interp.heap.list(list).lock, "insert")?;
    let before = insert_position(interp, list, opt_number(args, 2, 0)?)?;
    let item = interp.heap.inc_value(&args[1]);
    interp.heap.list_mut(list).insert_before(before, TypVal::new(item));
    Ok(share(interp, &args[0]))
}

/// `remove({list}, {idx} [, {end}])` or `remove({dict}, {key})`
fn remove(args: &[Value], interp: &mut Interp) -> Result<Value> {
    match &args[0] {
        Value::Dict(d) => {
            if args.len() > 2 {
                return err_arity("Too many arguments for function: remove");
            }
            let key = args[1].to_str()?.into_owned();
            let dict = interp.heap.dict(*d);
            check_lock(dict.lock, "remove")?;
            match dict.get(&key) {
                None => return err_undefined(format!("Key not present in Dictionary: {key}")),
                Some(item) if item.flags.fixed => return err_other(format!("Cannot delete variable {key}")),
                Some(item) => item.tv.lock.check(&key)?,
            }
            match interp.heap.dict_mut(*d).remove(&key) {
                Some(item) => Ok(item.tv.value),
                None => err_undefined(format!("Key not present in Dictionary: {key}")),
            }
        }
        Value::List(l) => {
            let list = *l;
            check_lock(interp.heap.list(list).lock, "remove")?;
            let first = list_node(interp, list, args[1].to_number()?)?;
            if args.len() == 2 {
                return Ok(interp.heap.list_mut(list).remove(first).value);
            }
            let last = list_node(interp, list, args[2].to_number()?)?;
            let l = interp.heap.list(list);
            let (from, to) = (l.index_of(first).unwrap_or(0), l.index_of(last).unwrap_or(0));
            if to < from {
                return err_range("Invalid range");
            }
            let nodes: Vec<_> = l.node_ids()[from..=to].to_vec();
            let values: Vec<Value> = nodes
                .into_iter()
                .map(|node| interp.heap.list_mut(list).remove(node).value)
                .collect();
            Ok(Value::List(interp.heap.new_list_from(values)))
        }
        _ => err_type("Argument of remove() must be a List or Dictionary"),
    }
}

/// `extend({list1}, {list2} [, {idx}])` or `extend({dict1}, {dict2} [, {how}])`
fn extend(args: &[Value], interp: &mut Interp) -> Result<Value> {
    match (&args[0], &args[1]) {
        (Value::List(target), Value::List(source)) => {
            check_lock(interp.heap.list(*target).lock, "extend")?;
            let before = match args.get(2) {
                Some(idx) => insert_position(interp, *target, idx.to_number()?)?,
                None => None,
            };
            // Snapshot first: extending a List with itself must stop.
            for value in interp.heap.list_snapshot(*source) {
                interp.heap.list_mut(*target).insert_before(before, TypVal::new(value));
            }
        }
        (Value::Dict(target), Value::Dict(source)) => {
            let how = opt_string(args, 2, "force")?;
            if !matches!(how.as_str(), "keep" | "force" | "error") {
                return err_type(format!("Invalid argument: {how}"));
            }
            check_lock(interp.heap.dict(*target).lock, "extend")?;
            extend_dict(interp, *target, *source, &how)?;
        }
        _ => return err_type("Argument of extend() must be a List or Dictionary"),
    }
    Ok(share(interp, &args[0]))
}

fn extend_dict(interp: &mut Interp, target: DictId, source: DictId, how: &str) -> Result<()> {
    let entries: Vec<(String, Value)> = interp
        .heap
        .dict(source)
        .entries()
        .into_iter()
        .map(|(k, item)| (k.to_string(), item.tv.value.clone()))
        .collect();
    for (key, value) in entries {
        let existing = interp.heap.dict(target).get(&key).map(|item| item.tv.lock);
        match existing {
            Some(_) if how == "error" => return err_other(format!("Key already exists: {key}")),
            Some(_) if how == "keep" => {}
            Some(lock) => {
                lock.check(&key)?;
                let new = interp.heap.inc_value(&value);
                if let Some(item) = interp.heap.dict_mut(target).get_mut(&key) {
                    let old = std::mem::replace(&mut item.tv.value, new);
                    interp.heap.release(old);
                }
            }
            None => {
                let new = interp.heap.inc_value(&value);
                interp.heap.dict_mut(target).insert(&key, TypVal::new(new))?;
            }
        }
    }
    Ok(())
}

/// Position a search starts at: `start` normalized, or an error when it is
/// outside a non-empty list.
fn search_start(interp: &Interp, list: ListId, start: i64) -> Result<usize> {
    if start == 0 {
        return Ok(0);
    }
    let node = list_node(interp, list, start)?;
    Ok(interp.heap.list(list).index_of(node).unwrap_or(0))
}

/// `index({list}, {expr} [, {start} [, {ic}]])`
fn index(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let list = list_arg(&args[0], "index")?;
    let start = search_start(interp, list, opt_number(args, 2, 0)?)?;
    let ignore_case = opt_bool(args, 3)?;
    let heap = &interp.heap;
    let found = heap
        .list(list)
        .iter()
        .enumerate()
        .skip(start)
        .find(|(_, tv)| heap.values_equal(&tv.value, &args[1], ignore_case))
        .map_or(-1, |(idx, _)| idx as i64);
    Ok(Value::Number(found))
}

/// `count({comp}, {expr} [, {ic} [, {start}]])`
fn count(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let ignore_case = opt_bool(args, 2)?;
    let heap = &interp.heap;
    let n = match &args[0] {
        Value::List(l) => {
            let start = search_start(interp, *l, opt_number(args, 3, 0)?)?;
            heap.list(*l)
                .iter()
                .skip(start)
                .filter(|tv| heap.values_equal(&tv.value, &args[1], ignore_case))
                .count()
        }
        Value::Dict(d) => {
            if args.len() > 3 {
                return err_type("Invalid argument: start is not allowed for a Dictionary");
            }
            heap.dict(*d)
                .entries()
                .into_iter()
                .filter(|(_, item)| heap.values_equal(&item.tv.value, &args[1], ignore_case))
                .count()
        }
        _ => return err_type("Argument of count() must be a List or Dictionary"),
    };
    Ok(Value::Number(n as i64))
}

/// Text of a List item for `join()` and `sort()`: Strings and Numbers as they
/// are, containers in their `string()` form.
fn item_text(interp: &mut Interp, value: &Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(String::from_utf8_lossy(s).into_owned()),
        Value::Number(n) => Ok(n.to_string()),
        other => interp.string_of(other),
    }
}

/// `join({list} [, {sep}])`
fn join(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let list = list_arg(&args[0], "join")?;
    let sep = opt_string(args, 1, " ")?;
    let values = interp.heap.list_snapshot(list);
    let mut parts = Vec::with_capacity(values.len());
    let mut failed = None;
    for v in &values {
        match item_text(interp, v) {
            Ok(text) => parts.push(text),
            Err(err) => {
                failed = Some(err);
                break;
            }
        }
    }
    interp.heap.release_all(values);
    match failed {
        Some(err) => Err(err),
        None => Ok(Value::str(parts.join(&sep))),
    }
}

/// `reverse({list})`, in place.
fn reverse(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let list = list_arg(&args[0], "reverse")?;
    check_lock(interp.heap.list(list).lock, "reverse")?;
    let mut order = interp.heap.list(list).node_ids();
    order.reverse();
    interp.heap.list_mut(list).reorder(&order);
    Ok(share(interp, &args[0]))
}

enum SortBy {
    Text { ignore_case: bool },
    Func(String),
}

/// `sort({list} [, {func}])`, in place and stable.
fn sort(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let list = list_arg(&args[0], "sort")?;
    check_lock(interp.heap.list(list).lock, "sort")?;
    let by = match args.get(1) {
        None => SortBy::Text { ignore_case: false },
        Some(Value::Number(n)) => SortBy::Text { ignore_case: *n != 0 },
        Some(Value::Funcref(name)) => SortBy::Func(name.to_string()),
        Some(name @ Value::String(_)) => SortBy::Func(interp.script_function_name(&name.to_str()?)?),
        Some(_) => return err_type("Invalid argument for sort()"),
    };

    let nodes = interp.heap.list(list).node_ids();
    let values = interp.heap.list_snapshot(list);
    let mut order: Vec<usize> = (0..nodes.len()).collect();
    let result = match by {
        SortBy::Text { ignore_case } => sort_by_text(interp, &values, &mut order, ignore_case),
        SortBy::Func(name) => sort_by_func(interp, &values, &mut order, &name),
    };
    interp.heap.release_all(values);
    result?;

    let l = interp.heap.list(list);
    if l.len() != nodes.len() || nodes.iter().any(|n| !l.contains_node(*n)) {
        return err_other("List changed while sorting");
    }
    let sorted: Vec<_> = order.iter().map(|&i| nodes[i]).collect();
    interp.heap.list_mut(list).reorder(&sorted);
    Ok(share(interp, &args[0]))
}

fn sort_by_text(interp: &mut Interp, values: &[Value], order: &mut [usize], ignore_case: bool) -> Result<()> {
    let mut keys = Vec::with_capacity(values.len());
    for v in values {
        let text = item_text(interp, v)?;
        keys.push(if ignore_case { text.to_lowercase() } else { text });
    }
    order.sort_by(|&a, &b| keys[a].cmp(&keys[b]));
    Ok(())
}

fn sort_by_func(interp: &mut Interp, values: &[Value], order: &mut [usize], name: &str) -> Result<()> {
    let mut failed = None;
    order.sort_by(|&a, &b| {
        if failed.is_some() {
            return Ordering::Equal;
        }
        let pair = [values[a].clone(), values[b].clone()];
        let outcome = interp.call_func(name, &pair, None, None).and_then(|r| {
            let n = r.to_number();
            interp.heap.release(r);
            n
        });
        match outcome {
            Ok(n) => n.cmp(&0),
            Err(err) => {
                trace!(target: "vex::func", function = name, %err, "sort compare failed");
                failed = Some(err);
                Ordering::Equal
            }
        }
    });
    match failed {
        Some(err) => Err(err.context("Sort compare function failed")),
        None => Ok(()),
    }
}

/// `range({expr} [, {max} [, {stride}]])`
fn range(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let (start, end) = match args.get(1) {
        Some(max) => (args[0].to_number()?, max.to_number()?),
        None => (0, args[0].to_number()?.saturating_sub(1)),
    };
    let stride = opt_number(args, 2, 1)?;
    if stride == 0 {
        return err_other("Stride is zero");
    }
    if (stride > 0 && end.saturating_add(1) < start) || (stride < 0 && end.saturating_sub(1) > start) {
        return err_other("Start past end");
    }
    let mut items = Vec::new();
    let mut i = start;
    while (stride > 0 && i <= end) || (stride < 0 && i >= end) {
        items.push(Value::Number(i));
        match i.checked_add(stride) {
            Some(next) => i = next,
            None => break,
        }
    }
    Ok(Value::List(interp.heap.new_list_from(items)))
}

fn extreme(args: &[Value], interp: &mut Interp, func: &str, pick: fn(i64, i64) -> i64) -> Result<Value> {
    let values: Vec<Value> = match &args[0] {
        Value::List(l) => interp.heap.list(*l).iter().map(|tv| tv.value.clone()).collect(),
        Value::Dict(d) => interp
            .heap
            .dict(*d)
            .entries()
            .into_iter()
            .map(|(_, item)| item.tv.value.clone())
            .collect(),
        _ => return err_type(format!("Argument of {func}() must be a List or Dictionary")),
    };
    let mut best: Option<i64> = None;
    for v in &values {
        let n = v.to_number()?;
        best = Some(best.map_or(n, |b| pick(b, n)));
    }
    Ok(Value::Number(best.unwrap_or(0)))
}

/// `max({list})`; 0 for an empty one.
fn max(args: &[Value], interp: &mut Interp) -> Result<Value> {
    extreme(args, interp, "max", i64::max)
}

fn min(args: &[Value], interp: &mut Interp) -> Result<Value> {
    extreme(args, interp, "min", i64::min)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Filter,
    Map,
}

impl Mode {
    fn name(self) -> &'static str {
        match self {
            Mode::Filter => "filter",
            Mode::Map => "map",
        }
    }
}

/// `filter({expr1}, {expr2})`: keep the items for which `{expr2}` is true.
fn filter(args: &[Value], interp: &mut Interp) -> Result<Value> {
    filter_map(args, interp, Mode::Filter)
}

/// `map({expr1}, {expr2})`: replace every item with the value of `{expr2}`.
fn map(args: &[Value], interp: &mut Interp) -> Result<Value> {
    filter_map(args, interp, Mode::Map)
}

fn filter_map(args: &[Value], interp: &mut Interp, mode: Mode) -> Result<Value> {
    let expr = args[1].to_str()?.into_owned();
    // v:key and v:val of an outer filter()/map() come back afterwards.
    let saved_val = interp.vimvar("val");
    let saved_key = interp.vimvar("key");
    let result = match &args[0] {
        Value::List(l) => filter_map_list(interp, *l, &expr, mode),
        Value::Dict(d) => filter_map_dict(interp, *d, &expr, mode),
        _ => err_type(format!("Argument of {}() must be a List or Dictionary", mode.name())),
    };
    restore_vimvar(interp, "val", saved_val);
    restore_vimvar(interp, "key", saved_key);
    result?;
    Ok(share(interp, &args[0]))
}

fn restore_vimvar(interp: &mut Interp, name: &str, saved: Option<Value>) {
    match saved {
        // `val` and `key` are known names, so this cannot fail.
        Some(value) => {
            let _ = interp.set_vimvar(name, value);
        }
        None => interp.remove_vimvar(name),
    }
}

/// Evaluate `expr` with `v:key` and `v:val` bound. Takes ownership of `val`.
fn eval_with_item(interp: &mut Interp, expr: &str, key: Value, val: Value) -> Result<Value> {
    interp.set_vimvar("val", val)?;
    interp.set_vimvar("key", key)?;
    interp.eval_text(expr)
}

fn filter_map_list(interp: &mut Interp, list: ListId, expr: &str, mode: Mode) -> Result<()> {
    check_lock(interp.heap.list(list).lock, mode.name())?;
    let nodes = interp.heap.list(list).node_ids();
    for (idx, node) in nodes.into_iter().enumerate() {
        // The expression may have removed items.
        if !interp.heap.list(list).contains_node(node) {
            continue;
        }
        let tv = interp.heap.list(list).item(node).clone();
        let val = interp.heap.inc_value(&tv.value);
        let result = eval_with_item(interp, expr, Value::Number(idx as i64), val)?;
        if !interp.heap.list(list).contains_node(node) {
            interp.heap.release(result);
            continue;
        }
        match mode {
            Mode::Map => {
                if let Err(err) = tv.lock.check(&format!("map() argument item {idx}")) {
                    interp.heap.release(result);
                    return Err(err);
                }
                let old = std::mem::replace(&mut interp.heap.list_mut(list).item_mut(node).value, result);
                interp.heap.release(old);
            }
            Mode::Filter => {
                let keep = result.is_truthy();
                interp.heap.release(result);
                if !keep? {
                    let removed = interp.heap.list_mut(list).remove(node);
                    interp.heap.release(removed.value);
                }
            }
        }
    }
    Ok(())
}

fn filter_map_dict(interp: &mut Interp, dict: DictId, expr: &str, mode: Mode) -> Result<()> {
    check_lock(interp.heap.dict(dict).lock, mode.name())?;
    let keys = interp.heap.dict(dict).keys();
    // No resize while entries are visited and possibly removed.
    interp.heap.dict_mut(dict).table_mut().lock();
    let result = filter_map_entries(interp, dict, keys, expr, mode);
    let unlocked = interp.heap.dict_mut(dict).table_mut().unlock();
    result.and(unlocked)
}

fn filter_map_entries(interp: &mut Interp, dict: DictId, keys: Vec<String>, expr: &str, mode: Mode) -> Result<()> {
    for key in keys {
        let Some(value) = interp.heap.dict(dict).get(&key).map(|item| item.tv.value.clone()) else {
            continue;
        };
        let val = interp.heap.inc_value(&value);
        let result = eval_with_item(interp, expr, Value::str(key.as_str()), val)?;
        let Some(item) = interp.heap.dict(dict).get(&key) else {
            interp.heap.release(result);
            continue;
        };
        let (lock, fixed) = (item.tv.lock, item.flags.fixed);
        match mode {
            Mode::Map => {
                if let Err(err) = lock.check(&key) {
                    interp.heap.release(result);
                    return Err(err);
                }
                if let Some(item) = interp.heap.dict_mut(dict).get_mut(&key) {
                    let old = std::mem::replace(&mut item.tv.value, result);
                    interp.heap.release(old);
                }
            }
            Mode::Filter => {
                let keep = result.is_truthy();
                interp.heap.release(result);
                if !keep? {
                    if fixed {
                        return err_other(format!("Cannot delete variable {key}"));
                    }
                    lock.check(&key)?;
                    if let Some(removed) = interp.heap.dict_mut(dict).remove(&key) {
                        interp.heap.release(removed.tv.value);
                    }
                }
            }
        }
    }
    Ok(())
}
