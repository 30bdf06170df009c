//! Assignment targets: variables, List items and ranges, Dictionary entries.

use anyhow::Result;

use crate::error::{err_range, err_recursion, err_syntax, err_type, err_undefined};
use crate::expr::Cursor;
use crate::interp::{AssignOp, Interp};
use crate::scope::ScopeKind;
use crate::val::{DictId, ListId, NodeId, TypVal, Value, check_key};

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LvalKind {
    /// A variable.
    Var,
    /// `list[idx]`
    ListItem { list: ListId, node: NodeId },
    /// `list[first : last]`; a missing `last` runs to the end.
    ListRange { list: ListId, first: i64, last: Option<i64> },
    /// `dict[key]` for an existing key.
    DictItem { dict: DictId, key: String },
    /// `dict[key]` for a key that is not there yet.
    NewKey { dict: DictId, key: String },
}

/// A resolved assignment target. Holds a reference on the List or Dictionary it
/// points into; give it back with [`Interp::release_lval`].
#[derive(Debug)]
pub(crate) struct Lval {
    /// Variable the target starts from.
    pub(crate) name: String,
    /// Target as written, for messages.
    pub(crate) text: String,
    pub(crate) kind: LvalKind,
}

impl Lval {
    fn var(name: String) -> Self {
        Self {
            text: name.clone(),
            name,
            kind: LvalKind::Var,
        }
    }

    fn container(&self) -> Option<Value> {
        match &self.kind {
            LvalKind::Var => None,
            LvalKind::ListItem { list, .. } | LvalKind::ListRange { list, .. } => Some(Value::List(*list)),
            LvalKind::DictItem { dict, .. } | LvalKind::NewKey { dict, .. } => Some(Value::Dict(*dict)),
        }
    }
}

fn has_subscript(cur: &Cursor) -> bool {
    cur.peek() == Some(b'[')
        || (cur.peek() == Some(b'.') && cur.peek_at(1).is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_'))
}

/// Name of the variable a scope dictionary entry stands for, if `dict` backs a scope.
fn scope_var_name(interp: &Interp, dict: DictId, key: &str) -> Option<String> {
    let scope = interp.heap.dict(dict).scope?;
    Some(format!("{}:{key}", scope.prefix()))
}

/// Parsed contents of one `[...]` subscript.
struct Bracket {
    first: Option<Value>,
    second: Option<Value>,
    range: bool,
}

impl Interp {
    /// Parse an assignment target at the cursor without evaluating anything.
    pub(crate) fn skip_lvalue(&mut self, cur: &mut Cursor) -> Result<()> {
        self.get_name(cur, false)?;
        loop {
            match cur.peek() {
                Some(b'[') => {
                    let b = self.parse_bracket(cur, false)?;
                    self.heap.release_all(b.first.into_iter().chain(b.second));
                }
                Some(b'.') if cur.peek_at(1).is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_') => {
                    cur.advance(1);
                    cur.take_while(|b| b.is_ascii_alphanumeric() || b == b'_');
                }
                _ => return Ok(()),
            }
        }
    }

    fn parse_bracket(&mut self, cur: &mut Cursor, evaluate: bool) -> Result<Bracket> {
        cur.advance(1);
        cur.skip_white();
        let (first, range) = if cur.eat(b':') {
            (None, true)
        } else {
            let v = self.eval1(cur, evaluate)?;
            cur.skip_white();
            (Some(v), cur.eat(b':'))
        };
        cur.skip_white();
        let mut second = None;
        if range && cur.peek() != Some(b']') {
            match self.eval1(cur, evaluate) {
                Ok(v) => second = Some(v),
                Err(err) => {
                    self.heap.release_all(first);
                    return Err(err);
                }
            }
            cur.skip_white();
        }
        if !cur.eat(b']') {
            self.heap.release_all(first.into_iter().chain(second));
            return err_syntax(format!("Missing ']': {}", cur.rest()));
        }
        Ok(Bracket { first, second, range })
    }

    /// Resolve the target at the cursor. With `unlet` a missing Dictionary key is
    /// an error instead of a new entry.
    pub(crate) fn get_lval(&mut self, cur: &mut Cursor, unlet: bool) -> Result<Lval> {
        let start = cur.pos();
        let name = self.get_name(cur, true)?;
        if name.is_empty() {
            return err_syntax(format!("Illegal variable name: {}", cur.slice(start, cur.pos())));
        }
        if !has_subscript(cur) {
            return Ok(Lval::var(name));
        }

        let mut current = self.get_var(&name)?;
        let mut kind = LvalKind::Var;
        let result = loop {
            if !has_subscript(cur) {
                break Ok(());
            }
            if matches!(kind, LvalKind::ListRange { .. }) {
                break err_syntax("[:] must come last");
            }
            // Descend into the item the previous subscript selected.
            match std::mem::replace(&mut kind, LvalKind::Var) {
                LvalKind::Var => {}
                LvalKind::ListItem { list, node } => {
                    let v = self.heap.list(list).item(node).value.clone();
                    let next = self.heap.inc_value(&v);
                    self.heap.release(std::mem::replace(&mut current, next));
                }
                LvalKind::DictItem { dict, key } => {
                    let v = self.heap.dict(dict).get(&key).map(|i| i.tv.value.clone()).unwrap_or_default();
                    let next = self.heap.inc_value(&v);
                    self.heap.release(std::mem::replace(&mut current, next));
                }
                LvalKind::NewKey { key, .. } => break err_undefined(format!("Key not present in Dictionary: {key}")),
                LvalKind::ListRange { .. } => unreachable!(),
            }
            if !current.is_container() {
                break err_type("Can only index a List or Dictionary");
            }
            if cur.peek() == Some(b'.') && !matches!(current, Value::Dict(_)) {
                break err_syntax(format!("Trailing characters: {}", cur.rest()));
            }

            let bracket = if cur.peek() == Some(b'.') {
                cur.advance(1);
                let key = cur.take_while(|b| b.is_ascii_alphanumeric() || b == b'_');
                Bracket {
                    first: Some(Value::str(key)),
                    second: None,
                    range: false,
                }
            } else {
                match self.parse_bracket(cur, true) {
                    Ok(b) => b,
                    Err(err) => break Err(err),
                }
            };
            let resolved = self.resolve_subscript(&current, &bracket, unlet);
            self.heap.release_all(bracket.first.into_iter().chain(bracket.second));
            match resolved {
                Ok(k) => kind = k,
                Err(err) => break Err(err),
            }
        };

        if let Err(err) = result {
            self.heap.release(current);
            return Err(err);
        }
        // `current` is the container `kind` points into; the lval keeps its reference.
        Ok(Lval {
            name,
            text: cur.slice(start, cur.pos()).to_string(),
            kind,
        })
    }

    fn resolve_subscript(&mut self, container: &Value, bracket: &Bracket, unlet: bool) -> Result<LvalKind> {
        match container {
            Value::Dict(dict) => {
                if bracket.range {
                    return err_type("Cannot use [:] with a Dictionary");
                }
                let key = match &bracket.first {
                    Some(k) => k.to_str()?.into_owned(),
                    None => String::new(),
                };
                if self.heap.dict(*dict).contains_key(&key) {
                    Ok(LvalKind::DictItem { dict: *dict, key })
                } else if unlet {
                    err_undefined(format!("Key not present in Dictionary: {key}"))
                } else {
                    Ok(LvalKind::NewKey { dict: *dict, key })
                }
            }
            Value::List(list) => {
                let n1 = bracket.first.as_ref().map(Value::to_number).transpose()?.unwrap_or(0);
                let l = self.heap.list(*list);
                let mut first = n1;
                let mut node = l.find(first);
                if node.is_none() && first < 0 {
                    first = 0;
                    node = l.find(0);
                }
                let Some(node) = node else {
                    return err_range(format!("List index out of range: {n1}"));
                };
                if !bracket.range {
                    return Ok(LvalKind::ListItem { list: *list, node });
                }
                if first < 0 {
                    first = l.index_of(node).unwrap_or(0) as i64;
                }
                let last = match &bracket.second {
                    None => None,
                    Some(v) => {
                        let mut n2 = v.to_number()?;
                        if n2 < 0 {
                            let Some(ni) = l.find(n2) else {
                                return err_range(format!("List index out of range: {n2}"));
                            };
                            n2 = l.index_of(ni).unwrap_or(0) as i64;
                        }
                        if n2 < first {
                            return err_range(format!("List index out of range: {n2}"));
                        }
                        Some(n2)
                    }
                };
                Ok(LvalKind::ListRange {
                    list: *list,
                    first,
                    last,
                })
            }
            _ => err_type("Can only index a List or Dictionary"),
        }
    }

    pub(crate) fn release_lval(&mut self, lval: Lval) {
        if let Some(container) = lval.container() {
            self.heap.release(container);
        }
    }

    /// `target {op} value`. Only plain `=` takes a new reference on `value`;
    /// the other operators combine it with the current value.
    pub(crate) fn set_lval(&mut self, lval: &Lval, value: &Value, op: AssignOp) -> Result<()> {
        match &lval.kind {
            LvalKind::Var => {
                if op == AssignOp::Set {
                    return self.set_var(&lval.name, value);
                }
                let current = self.get_var(&lval.name)?;
                let new = self.tv_op(&current, value, op, &lval.text);
                self.heap.release(current);
                let new = new?;
                let result = self.set_var(&lval.name, &new);
                self.heap.release(new);
                result
            }
            LvalKind::ListItem { list, node } => {
                let (list, node) = (*list, *node);
                let item = self.heap.list(list).item(node);
                item.lock.check(&lval.text)?;
                let current = item.value.clone();
                let new = self.combine(current, value, op, &lval.text)?;
                let old = std::mem::replace(&mut self.heap.list_mut(list).item_mut(node).value, new);
                self.heap.release(old);
                Ok(())
            }
            LvalKind::ListRange { list, first, last } => self.set_list_range(*list, *first, *last, value, op, &lval.text),
            LvalKind::DictItem { dict, key } => {
                if let Some(var) = scope_var_name(self, *dict, key) {
                    return self.set_lval(&Lval::var(var), value, op);
                }
                let item = self.heap.dict(*dict).get(key).map(|i| (i.tv.lock, i.tv.value.clone()));
                let Some((lock, current)) = item else {
                    return err_undefined(format!("Key not present in Dictionary: {key}"));
                };
                lock.check(&lval.text)?;
                let new = self.combine(current, value, op, &lval.text)?;
                let old = self
                    .heap
                    .dict_mut(*dict)
                    .get_mut(key)
                    .map(|item| std::mem::replace(&mut item.tv.value, new));
                if let Some(old) = old {
                    self.heap.release(old);
                }
                Ok(())
            }
            LvalKind::NewKey { dict, key } => {
                check_key(key)?;
                if op != AssignOp::Set {
                    return err_type(format!("Wrong variable type for {}", op.symbol()));
                }
                if let Some(var) = scope_var_name(self, *dict, key) {
                    return self.set_var(&var, value);
                }
                self.heap.dict(*dict).lock.check(&lval.text)?;
                if matches!(value, Value::Funcref(_)) && self.heap.dict(*dict).scope == Some(ScopeKind::Global) {
                    self.check_funcref_name(key, true)?;
                }
                let new = self.heap.inc_value(value);
                self.heap.dict_mut(*dict).insert(key, TypVal::new(new))?;
                Ok(())
            }
        }
    }

    /// New value of a slot for `op`: a new reference on `value` for `=`, else
    /// the combination with the slot's current value.
    fn combine(&mut self, current: Value, value: &Value, op: AssignOp, name: &str) -> Result<Value> {
        if op == AssignOp::Set {
            return Ok(self.heap.inc_value(value));
        }
        self.tv_op(&current, value, op, name)
    }

    /// `+=`, `-=` and `.=` on a value. A List on the left is extended in place.
    pub(crate) fn tv_op(&mut self, target: &Value, rhs: &Value, op: AssignOp, name: &str) -> Result<Value> {
        let wrong_type = || err_type(format!("Wrong variable type for {}", op.symbol()));
        match (target, op) {
            (Value::List(l), AssignOp::Add) => {
                let Value::List(r) = rhs else {
                    return wrong_type();
                };
                self.heap.list(*l).lock.check(name)?;
                self.list_extend(*l, *r);
                Ok(self.heap.inc_value(target))
            }
            (Value::Number(_) | Value::String(_), AssignOp::Add | AssignOp::Sub) => {
                if !matches!(rhs, Value::Number(_) | Value::String(_)) {
                    return wrong_type();
                }
                let (a, b) = (target.to_number()?, rhs.to_number()?);
                Ok(Value::Number(if op == AssignOp::Add {
                    a.wrapping_add(b)
                } else {
                    a.wrapping_sub(b)
                }))
            }
            (Value::Number(_) | Value::String(_), AssignOp::Concat) => {
                let mut s = target.to_bytes()?.into_owned();
                s.extend_from_slice(&rhs.to_bytes()?);
                Ok(Value::String(s))
            }
            _ => wrong_type(),
        }
    }

    fn set_list_range(
        &mut self,
        list: ListId,
        first: i64,
        last: Option<i64>,
        value: &Value,
        op: AssignOp,
        name: &str,
    ) -> Result<()> {
        let Value::List(src) = value else {
            return err_type("[:] requires a List value");
        };
        let values: Vec<Value> = self.heap.list(*src).iter().map(|tv| tv.value.clone()).collect();

        // Refuse before changing anything if a target item is locked.
        {
            let l = self.heap.list(list);
            let mut node = l.find(first);
            let mut idx = first;
            for _ in 0..values.len() {
                let Some(n) = node else { break };
                l.item(n).lock.check(name)?;
                if last == Some(idx) {
                    break;
                }
                node = l.next(n);
                idx += 1;
            }
        }

        let mut node = self.heap.list(list).find(first);
        let mut idx = first;
        let mut assigned = 0;
        while assigned < values.len() {
            let Some(n) = node else { break };
            let current = self.heap.list(list).item(n).value.clone();
            let new = self.combine(current, &values[assigned], op, name)?;
            let old = std::mem::replace(&mut self.heap.list_mut(list).item_mut(n).value, new);
            self.heap.release(old);
            assigned += 1;
            if assigned == values.len() || last == Some(idx) {
                break;
            }
            let next = match self.heap.list(list).next(n) {
                Some(next) => next,
                // Grow the list when the range runs past its end.
                None => self.heap.list_mut(list).append(TypVal::new(Value::Number(0))),
            };
            node = Some(next);
            idx += 1;
        }

        if assigned < values.len() {
            return err_range("List value has more items than target");
        }
        let short = match last {
            None => node.is_some_and(|n| self.heap.list(list).next(n).is_some()),
            Some(last) => idx != last,
        };
        if short {
            return err_range("List value has not enough items");
        }
        Ok(())
    }

    /// `:unlet` of a target.
    pub(crate) fn unlet_lval(&mut self, lval: &Lval, forceit: bool) -> Result<()> {
        match &lval.kind {
            LvalKind::Var => self.unlet_var(&lval.name, forceit),
            LvalKind::ListItem { list, node } => {
                self.heap.list(*list).lock.check(&lval.text)?;
                self.heap.list(*list).item(*node).lock.check(&lval.text)?;
                let tv = self.heap.list_mut(*list).remove(*node);
                self.heap.release(tv.value);
                Ok(())
            }
            LvalKind::ListRange { list, first, last } => {
                let l = self.heap.list(*list);
                l.lock.check(&lval.text)?;
                let mut nodes = Vec::new();
                let mut node = l.find(*first);
                let mut idx = *first;
                while let Some(n) = node {
                    if last.is_some_and(|last| idx > last) {
                        break;
                    }
                    l.item(n).lock.check(&lval.text)?;
                    nodes.push(n);
                    node = l.next(n);
                    idx += 1;
                }
                for n in nodes {
                    let tv = self.heap.list_mut(*list).remove(n);
                    self.heap.release(tv.value);
                }
                Ok(())
            }
            LvalKind::DictItem { dict, key } => {
                if let Some(var) = scope_var_name(self, *dict, key) {
                    return self.unlet_var(&var, forceit);
                }
                let d = self.heap.dict(*dict);
                d.lock.check(&lval.text)?;
                if let Some(item) = d.get(key) {
                    item.tv.lock.check(&lval.text)?;
                }
                if let Some(item) = self.heap.dict_mut(*dict).remove(key) {
                    self.heap.release(item.tv.value);
                }
                Ok(())
            }
            LvalKind::NewKey { key, .. } => {
                if forceit {
                    return Ok(());
                }
                err_undefined(format!("Key not present in Dictionary: {key}"))
            }
        }
    }

    /// `:lockvar` / `:unlockvar` of a target. `depth` < 0 locks everything
    /// reachable.
    pub(crate) fn lock_lval(&mut self, lval: &Lval, depth: i32, lock: bool) -> Result<()> {
        match &lval.kind {
            LvalKind::Var => {
                let Some((dict, off)) = self.find_var_dict(&lval.name) else {
                    return err_undefined(format!("No such variable: \"{}\"", lval.name));
                };
                let key = lval.name[off..].to_string();
                let Some(value) = self.heap.dict(dict).get(&key).map(|i| i.tv.value.clone()) else {
                    return err_undefined(format!("No such variable: \"{}\"", lval.name));
                };
                if depth == 0 {
                    return Ok(());
                }
                if let Some(item) = self.heap.dict_mut(dict).get_mut(&key) {
                    set_lock(&mut item.tv, lock);
                }
                self.lock_value(&value, depth, lock, 0)
            }
            LvalKind::ListItem { list, node } => {
                let value = self.heap.list(*list).item(*node).value.clone();
                if depth == 0 {
                    return Ok(());
                }
                set_lock(self.heap.list_mut(*list).item_mut(*node), lock);
                self.lock_value(&value, depth, lock, 0)
            }
            LvalKind::ListRange { list, first, last } => {
                let l = self.heap.list(*list);
                let mut nodes = Vec::new();
                let mut node = l.find(*first);
                let mut idx = *first;
                while let Some(n) = node {
                    if last.is_some_and(|last| idx > last) {
                        break;
                    }
                    nodes.push(n);
                    node = l.next(n);
                    idx += 1;
                }
                if depth == 0 {
                    return Ok(());
                }
                for n in nodes {
                    set_lock(self.heap.list_mut(*list).item_mut(n), lock);
                    let value = self.heap.list(*list).item(n).value.clone();
                    self.lock_value(&value, depth, lock, 0)?;
                }
                Ok(())
            }
            LvalKind::DictItem { dict, key } => {
                let Some(value) = self.heap.dict(*dict).get(key).map(|i| i.tv.value.clone()) else {
                    return err_undefined(format!("Key not present in Dictionary: {key}"));
                };
                if depth == 0 {
                    return Ok(());
                }
                if let Some(item) = self.heap.dict_mut(*dict).get_mut(key) {
                    set_lock(&mut item.tv, lock);
                }
                self.lock_value(&value, depth, lock, 0)
            }
            LvalKind::NewKey { key, .. } => err_undefined(format!("Key not present in Dictionary: {key}")),
        }
    }

    /// Lock the List or Dictionary `value` refers to, and with `depth` > 1 its
    /// items as well.
    fn lock_value(&mut self, value: &Value, depth: i32, lock: bool, nest: usize) -> Result<()> {
        if nest >= self.config.max_nest {
            return err_recursion("variable nested too deep for (un)lock");
        }
        let recurse = depth < 0 || depth > 1;
        match value {
            Value::List(l) => {
                set_var_lock(&mut self.heap.list_mut(*l).lock, lock);
                if recurse {
                    for node in self.heap.list(*l).node_ids() {
                        set_lock(self.heap.list_mut(*l).item_mut(node), lock);
                        let child = self.heap.list(*l).item(node).value.clone();
                        self.lock_value(&child, depth - 1, lock, nest + 1)?;
                    }
                }
            }
            Value::Dict(d) => {
                set_var_lock(&mut self.heap.dict_mut(*d).lock, lock);
                if recurse {
                    for key in self.heap.dict(*d).keys() {
                        let child = match self.heap.dict_mut(*d).get_mut(&key) {
                            Some(item) => {
                                set_lock(&mut item.tv, lock);
                                item.tv.value.clone()
                            }
                            None => continue,
                        };
                        self.lock_value(&child, depth - 1, lock, nest + 1)?;
                    }
                }
            }
            _ => {}
        }
        Ok(())
    }

    /// Does the variable, List item or Dictionary entry written as `text` exist?
    /// Errors while resolving it count as "no".
    pub fn variable_exists(&mut self, text: &str) -> bool {
        let mut cur = Cursor::new(text.trim());
        let lval = match self.get_lval(&mut cur, true) {
            Ok(lval) => lval,
            Err(_) => return false,
        };
        let exists = cur.at_end()
            && match &lval.kind {
                LvalKind::Var => match self.lookup_var(&lval.name) {
                    Ok(Some(value)) => {
                        self.heap.release(value);
                        true
                    }
                    _ => false,
                },
                LvalKind::NewKey { .. } => false,
                _ => true,
            };
        self.release_lval(lval);
        exists
    }

    /// Is the target written as `text` locked, either itself or the container
    /// it refers to?
    pub fn is_locked(&mut self, text: &str) -> Result<bool> {
        let mut cur = Cursor::new(text.trim());
        let lval = self.get_lval(&mut cur, false)?;
        if !cur.at_end() {
            self.release_lval(lval);
            return err_syntax(format!("Trailing characters: {}", cur.rest()));
        }
        let result = match &lval.kind {
            LvalKind::Var => {
                let found = self
                    .find_var_dict(&lval.name)
                    .and_then(|(dict, off)| self.heap.dict(dict).get(&lval.name[off..]).map(|i| (i.flags, i.tv.clone())));
                match found {
                    Some((flags, tv)) => Ok(flags.read_only || self.typval_locked(&tv)),
                    None if lval.name == "b:changedtick" => Ok(true),
                    None => err_undefined(format!("Undefined variable: {}", lval.name)),
                }
            }
            LvalKind::ListRange { .. } => err_type("Range not allowed"),
            LvalKind::NewKey { key, .. } => err_undefined(format!("Key not present in Dictionary: {key}")),
            LvalKind::ListItem { list, node } => {
                let tv = self.heap.list(*list).item(*node).clone();
                Ok(self.typval_locked(&tv))
            }
            LvalKind::DictItem { dict, key } => {
                let tv = self.heap.dict(*dict).get(key).map(|i| i.tv.clone()).unwrap_or_default();
                Ok(self.typval_locked(&tv))
            }
        };
        self.release_lval(lval);
        result
    }

    fn typval_locked(&self, tv: &TypVal) -> bool {
        tv.lock.is_locked()
            || match tv.value {
                Value::List(l) => self.heap.list(l).lock.is_locked(),
                Value::Dict(d) => self.heap.dict(d).lock.is_locked(),
                _ => false,
            }
    }
}

fn set_var_lock(l: &mut crate::val::VarLock, lock: bool) {
    if lock { l.lock() } else { l.unlock() }
}

fn set_lock(tv: &mut TypVal, lock: bool) {
    set_var_lock(&mut tv.lock, lock);
}
