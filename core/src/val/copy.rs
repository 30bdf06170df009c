use anyhow::Result;

use crate::error::err_recursion;

use super::{Dict, Heap, List, TypVal, Value};

/// Starting depth bound for structural equality. Each time a comparison hits it the
/// bound shrinks, so self-referencing structures with many branches finish quickly.
const EQUAL_RECURSE_LIMIT: usize = 1000;

pub(crate) fn str_eq_ignore_case(a: &str, b: &str) -> bool {
    a.eq_ignore_ascii_case(b) || a.to_lowercase() == b.to_lowercase()
}

impl Heap {
    /// Copy a value. Containers get a fresh top-level container; with `deep` the
    /// children are copied recursively, otherwise they are shared. Shared and cyclic
    /// substructure is copied once per call, so the copy has the same shape.
    pub fn copy_value(&mut self, value: &Value, deep: bool, max_nest: usize) -> Result<Value> {
        let copy_id = if deep { self.next_copy_id() } else { 0 };
        self.item_copy(value, deep, copy_id, 0, max_nest)
    }

    /// Deep copy without cycle tracking: shared children are duplicated and a cycle
    /// fails on the nesting limit.
    pub fn deep_copy_noref(&mut self, value: &Value, max_nest: usize) -> Result<Value> {
        self.item_copy(value, true, 0, 0, max_nest)
    }

    fn item_copy(&mut self, value: &Value, deep: bool, copy_id: u32, depth: usize, max_nest: usize) -> Result<Value> {
        if depth >= max_nest {
            return err_recursion("Variable nested too deep for making a copy");
        }
        match value {
            Value::List(id) => {
                let src = self.list(*id);
                if copy_id != 0
                    && src.copy_id == copy_id
                    && let Some(target) = src.copy_target
                {
                    self.inc_list(target);
                    return Ok(Value::List(target));
                }
                let items: Vec<Value> = src.iter().map(|tv| tv.value.clone()).collect();
                let new = self.alloc_list(List::new());
                if copy_id != 0 {
                    let src = self.list_mut(*id);
                    src.copy_id = copy_id;
                    src.copy_target = Some(new);
                }
                for item in items {
                    let copied = if deep {
                        match self.item_copy(&item, deep, copy_id, depth + 1, max_nest) {
                            Ok(v) => v,
                            Err(err) => {
                                self.release(Value::List(new));
                                return Err(err);
                            }
                        }
                    } else {
                        self.inc_value(&item)
                    };
                    self.list_mut(new).append(TypVal::new(copied));
                }
                Ok(Value::List(new))
            }
            Value::Dict(id) => {
                let src = self.dict(*id);
                if copy_id != 0
                    && src.copy_id == copy_id
                    && let Some(target) = src.copy_target
                {
                    self.inc_dict(target);
                    return Ok(Value::Dict(target));
                }
                let entries: Vec<(String, Value)> = src
                    .entries()
                    .into_iter()
                    .map(|(k, item)| (k.to_string(), item.tv.value.clone()))
                    .collect();
                let new = self.alloc_dict(Dict::new());
                if copy_id != 0 {
                    let src = self.dict_mut(*id);
                    src.copy_id = copy_id;
                    src.copy_target = Some(new);
                }
                for (key, item) in entries {
                    let copied = if deep {
                        match self.item_copy(&item, deep, copy_id, depth + 1, max_nest) {
                            Ok(v) => v,
                            Err(err) => {
                                self.release(Value::Dict(new));
                                return Err(err);
                            }
                        }
                    } else {
                        self.inc_value(&item)
                    };
                    self.dict_mut(new).insert(&key, TypVal::new(copied))?;
                }
                Ok(Value::Dict(new))
            }
            _ => Ok(self.inc_value(value)),
        }
    }

    /// Structural equality. Containers compare by content; a container always equals
    /// itself, which also makes self-containing structures compare equal.
    pub fn values_equal(&self, a: &Value, b: &Value, ignore_case: bool) -> bool {
        let mut limit = EQUAL_RECURSE_LIMIT;
        self.tv_equal(a, b, ignore_case, 0, &mut limit)
    }

    fn tv_equal(&self, a: &Value, b: &Value, ic: bool, depth: usize, limit: &mut usize) -> bool {
        if depth >= *limit {
            // Assume equal; shrink the bound for the remaining branches.
            *limit = limit.saturating_sub(1);
            return true;
        }
        match (a, b) {
            (Value::Number(x), Value::Number(y)) => x == y,
            (Value::String(x), Value::String(y)) => {
                if ic {
                    str_eq_ignore_case(&String::from_utf8_lossy(x), &String::from_utf8_lossy(y))
                } else {
                    x == y
                }
            }
            (Value::Funcref(x), Value::Funcref(y)) => x == y,
            (Value::List(x), Value::List(y)) => {
                if x == y {
                    return true;
                }
                let (lx, ly) = (self.list(*x), self.list(*y));
                if lx.len() != ly.len() {
                    return false;
                }
                lx.iter()
                    .zip(ly.iter())
                    .all(|(ix, iy)| self.tv_equal(&ix.value, &iy.value, ic, depth + 1, limit))
            }
            (Value::Dict(x), Value::Dict(y)) => {
                if x == y {
                    return true;
                }
                let (dx, dy) = (self.dict(*x), self.dict(*y));
                if dx.len() != dy.len() {
                    return false;
                }
                dx.table().iter().all(|(key, item)| match dy.get(key) {
                    Some(other) => self.tv_equal(&item.tv.value, &other.tv.value, ic, depth + 1, limit),
                    None => false,
                })
            }
            _ => false,
        }
    }
}
