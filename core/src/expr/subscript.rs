use anyhow::Result;

use crate::error::{err_range, err_syntax, err_type, err_undefined};
use crate::interp::Interp;
use crate::val::{DictId, ListId, Value};

use super::Cursor;

/// Substring by byte positions, `n2` inclusive. Out-of-range yields "".
fn string_slice(bytes: &[u8], n1: i64, n2: Option<i64>) -> Vec<u8> {
    let len = bytes.len() as i64;
    let n1 = if n1 < 0 { (len + n1).max(0) } else { n1 };
    let n2 = match n2 {
        None => len - 1,
        Some(n) if n < 0 => len + n,
        Some(n) => n.min(len - 1),
    };
    if n1 >= len || n2 < 0 || n1 > n2 {
        return Vec::new();
    }
    bytes[n1 as usize..=n2 as usize].to_vec()
}

/// The byte at `idx` as a string; "" when out of range.
fn string_index(bytes: &[u8], idx: i64) -> Vec<u8> {
    match usize::try_from(idx).ok().and_then(|i| bytes.get(i)) {
        Some(&b) => vec![b],
        None => Vec::new(),
    }
}

impl Interp {
    /// Apply `[idx]`, `[a:b]`, `.key` and `(args)` following a value. Takes
    /// ownership of `value` and of the reference on `selfdict`.
    pub(super) fn handle_subscripts(
        &mut self,
        cur: &mut Cursor,
        mut value: Value,
        mut selfdict: Option<DictId>,
        evaluate: bool,
    ) -> Result<Value> {
        let result = loop {
            if cur.after_white() {
                break Ok(());
            }
            let next = cur.peek();
            let at_call = next == Some(b'(') && (!evaluate || matches!(value, Value::Funcref(_)));
            let at_dot = next == Some(b'.')
                && matches!(value, Value::Dict(_))
                && cur.peek_at(1).is_some_and(|b| b.is_ascii_alphanumeric() || b == b'_');
            let at_index = next == Some(b'[');

            if at_call {
                let name = match &value {
                    Value::Funcref(name) => name.to_string(),
                    _ => String::new(),
                };
                let args = match self.eval_call_args(cur, evaluate, &name) {
                    Ok(args) => args,
                    Err(err) => break Err(err),
                };
                let called = if evaluate {
                    let r = self.call_func(&name, &args, None, selfdict);
                    self.heap.release_all(args);
                    r
                } else {
                    Ok(Value::Number(0))
                };
                if let Some(d) = selfdict.take() {
                    self.heap.release(Value::Dict(d));
                }
                match called {
                    Ok(v) => {
                        let old = std::mem::replace(&mut value, v);
                        self.heap.release(old);
                    }
                    Err(err) => break Err(err),
                }
                continue;
            }
            if !at_dot && !at_index {
                break Ok(());
            }

            if let Some(d) = selfdict.take() {
                self.heap.release(Value::Dict(d));
            }
            let item = if at_dot {
                cur.advance(1);
                let key = cur.take_while(|b| b.is_ascii_alphanumeric() || b == b'_');
                match value {
                    Value::Dict(d) if evaluate => self.dict_index(d, key),
                    _ => Ok(Value::Number(0)),
                }
            } else {
                self.eval_bracket(cur, &value, evaluate)
            };
            let item = match item {
                Ok(item) => item,
                Err(err) => break Err(err),
            };
            if let (Value::Dict(d), Value::Funcref(_)) = (&value, &item) {
                self.heap.inc_dict(*d);
                selfdict = Some(*d);
            }
            let old = std::mem::replace(&mut value, item);
            self.heap.release(old);
        };

        if let Some(d) = selfdict {
            self.heap.release(Value::Dict(d));
        }
        match result {
            Ok(()) => Ok(value),
            Err(err) => {
                self.heap.release(value);
                Err(err)
            }
        }
    }

    /// `[expr]` or `[expr1 : expr2]` applied to `container`.
    fn eval_bracket(&mut self, cur: &mut Cursor, container: &Value, evaluate: bool) -> Result<Value> {
        if evaluate && matches!(container, Value::Funcref(_)) {
            return err_type("Cannot index a Funcref");
        }
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
        if !evaluate {
            return Ok(Value::Number(0));
        }
        let result = self.index_value(container, first.as_ref(), second.as_ref(), range);
        self.heap.release_all(first.into_iter().chain(second));
        result
    }

    /// Item or slice of a String, List or Dictionary, with a new reference.
    pub(crate) fn index_value(
        &mut self,
        container: &Value,
        first: Option<&Value>,
        second: Option<&Value>,
        range: bool,
    ) -> Result<Value> {
        match container {
            Value::Funcref(_) => err_type("Cannot index a Funcref"),
            Value::Dict(d) => {
                if range {
                    return err_type("Cannot use [:] with a Dictionary");
                }
                let key = match first {
                    Some(k) => k.to_str()?.into_owned(),
                    None => String::new(),
                };
                self.dict_index(*d, &key)
            }
            Value::List(l) => {
                let n1 = first.map(Value::to_number).transpose()?;
                let n2 = second.map(Value::to_number).transpose()?;
                self.list_index(*l, n1, n2, range)
            }
            Value::Number(_) | Value::String(_) => {
                let n1 = first.map(Value::to_number).transpose()?.unwrap_or(0);
                let n2 = second.map(Value::to_number).transpose()?;
                let s = container.to_bytes()?;
                Ok(Value::String(if range {
                    string_slice(&s, n1, n2)
                } else {
                    string_index(&s, n1)
                }))
            }
        }
    }

    pub(crate) fn dict_index(&mut self, dict: DictId, key: &str) -> Result<Value> {
        match self.heap.dict(dict).get(key) {
            Some(item) => {
                let v = item.tv.value.clone();
                Ok(self.heap.inc_value(&v))
            }
            None => err_undefined(format!("Key not present in Dictionary: {key}")),
        }
    }

    fn list_index(&mut self, list: ListId, n1: Option<i64>, n2: Option<i64>, range: bool) -> Result<Value> {
        let len = self.heap.list(list).len() as i64;
        let written = n1.unwrap_or(0);
        let mut n1 = if written < 0 { len + written } else { written };
        if n1 < 0 || n1 >= len {
            // A slice may start out of range and is then empty.
            if !range {
                return err_range(format!("List index out of range: {written}"));
            }
            n1 = len;
        }
        if !range {
            let l = self.heap.list(list);
            let v = l.find(n1).map(|node| l.item(node).value.clone()).unwrap_or_default();
            return Ok(self.heap.inc_value(&v));
        }

        let mut n2 = n2.unwrap_or(-1);
        if n2 < 0 {
            n2 += len;
        } else if n2 >= len {
            n2 = len - 1;
        }
        if n2 < 0 || n2 + 1 < n1 {
            n2 = -1;
        }
        let mut items = Vec::new();
        let l = self.heap.list(list);
        let mut node = l.find(n1);
        let mut idx = n1;
        while idx <= n2 {
            let Some(nd) = node else { break };
            items.push(l.item(nd).value.clone());
            node = l.next(nd);
            idx += 1;
        }
        let items: Vec<Value> = items.iter().map(|v| self.heap.inc_value(v)).collect();
        Ok(Value::List(self.heap.new_list_from(items)))
    }
}
