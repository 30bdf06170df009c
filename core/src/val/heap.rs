use std::rc::Rc;

use tracing::debug;

use crate::scope::ScopeKind;
use crate::util::fast_map::{FastHashMap, fast_hash_map_new};

use super::{Dict, DictId, List, ListId, TypVal, Value};

/// Refcount given to containers that must never be freed (scope dictionaries).
pub const DO_NOT_FREE: usize = usize::MAX / 2;

/// Arena owning every List and Dict.
///
/// Handles index into slot vectors; freed slots are recycled through free lists.
/// Reference counts are explicit: `inc_*` to take a reference, [`Heap::release`]
/// to give it back. Cycles are reclaimed by [`Heap::garbage_collect`].
#[derive(Debug, Default)]
pub struct Heap {
    lists: Vec<Option<List>>,
    free_lists: Vec<u32>,
    dicts: Vec<Option<Dict>>,
    free_dicts: Vec<u32>,
    last_copy_id: u32,
    /// References held on anonymous (numbered) functions.
    func_refs: FastHashMap<Rc<str>, usize>,
    orphaned_funcs: Vec<Rc<str>>,
}

/// Anonymous functions have purely numeric names and are reference counted.
#[inline]
pub(crate) fn is_numbered_func(name: &str) -> bool {
    name.as_bytes().first().is_some_and(u8::is_ascii_digit)
}

impl Heap {
    pub fn new() -> Self {
        Self {
            func_refs: fast_hash_map_new(),
            ..Self::default()
        }
    }

    pub fn alloc_list(&mut self, list: List) -> ListId {
        if let Some(slot) = self.free_lists.pop() {
            self.lists[slot as usize] = Some(list);
            ListId(slot)
        } else {
            self.lists.push(Some(list));
            ListId((self.lists.len() - 1) as u32)
        }
    }

    pub fn alloc_dict(&mut self, dict: Dict) -> DictId {
        if let Some(slot) = self.free_dicts.pop() {
            self.dicts[slot as usize] = Some(dict);
            DictId(slot)
        } else {
            self.dicts.push(Some(dict));
            DictId((self.dicts.len() - 1) as u32)
        }
    }

    /// New empty list holding one reference for the caller.
    pub fn new_list(&mut self) -> ListId {
        self.alloc_list(List::new())
    }

    /// New list taking ownership of `values`.
    pub fn new_list_from(&mut self, values: Vec<Value>) -> ListId {
        let mut list = List::new();
        for v in values {
            list.append(TypVal::new(v));
        }
        self.alloc_list(list)
    }

    pub fn new_dict(&mut self) -> DictId {
        self.alloc_dict(Dict::new())
    }

    /// Dictionary backing a scope; never freed by refcounting.
    pub fn new_scope_dict(&mut self, scope: ScopeKind) -> DictId {
        let mut dict = Dict::new();
        dict.scope = Some(scope);
        dict.refcount = DO_NOT_FREE;
        self.alloc_dict(dict)
    }

    #[inline]
    pub fn list(&self, id: ListId) -> &List {
        self.lists[id.0 as usize].as_ref().expect("list handle already freed")
    }

    #[inline]
    pub fn list_mut(&mut self, id: ListId) -> &mut List {
        self.lists[id.0 as usize].as_mut().expect("list handle already freed")
    }

    #[inline]
    pub fn dict(&self, id: DictId) -> &Dict {
        self.dicts[id.0 as usize].as_ref().expect("dict handle already freed")
    }

    #[inline]
    pub fn dict_mut(&mut self, id: DictId) -> &mut Dict {
        self.dicts[id.0 as usize].as_mut().expect("dict handle already freed")
    }

    pub fn is_list_live(&self, id: ListId) -> bool {
        matches!(self.lists.get(id.0 as usize), Some(Some(_)))
    }

    pub fn is_dict_live(&self, id: DictId) -> bool {
        matches!(self.dicts.get(id.0 as usize), Some(Some(_)))
    }

    pub fn list_refcount(&self, id: ListId) -> usize {
        self.list(id).refcount
    }

    pub fn dict_refcount(&self, id: DictId) -> usize {
        self.dict(id).refcount
    }

    pub fn inc_list(&mut self, id: ListId) {
        let list = self.list_mut(id);
        if list.refcount < DO_NOT_FREE {
            list.refcount += 1;
        }
    }

    pub fn inc_dict(&mut self, id: DictId) {
        let dict = self.dict_mut(id);
        if dict.refcount < DO_NOT_FREE {
            dict.refcount += 1;
        }
    }

    pub fn ref_func(&mut self, name: &Rc<str>) {
        if is_numbered_func(name) {
            *self.func_refs.entry(name.clone()).or_insert(0) += 1;
        }
    }

    fn unref_func(&mut self, name: &Rc<str>) {
        if !is_numbered_func(name) {
            return;
        }
        if let Some(count) = self.func_refs.get_mut(name) {
            *count -= 1;
            if *count == 0 {
                self.func_refs.remove(name);
                self.orphaned_funcs.push(name.clone());
            }
        }
    }

    /// New Funcref value holding a reference on `name`.
    pub fn new_funcref(&mut self, name: &str) -> Value {
        let name: Rc<str> = Rc::from(name);
        self.ref_func(&name);
        Value::Funcref(name)
    }

    /// Funcrefs currently pointing at an anonymous function.
    pub fn func_refcount(&self, name: &str) -> usize {
        self.func_refs.get(name).copied().unwrap_or(0)
    }

    /// Anonymous functions whose last Funcref was released since the previous call.
    pub fn take_orphaned_funcs(&mut self) -> Vec<Rc<str>> {
        std::mem::take(&mut self.orphaned_funcs)
    }

    /// Duplicate a value, taking a new reference on whatever it points to.
    pub fn inc_value(&mut self, value: &Value) -> Value {
        match value {
            Value::List(id) => self.inc_list(*id),
            Value::Dict(id) => self.inc_dict(*id),
            Value::Funcref(name) => self.ref_func(name),
            Value::Number(_) | Value::String(_) => {}
        }
        value.clone()
    }

    /// Give back the reference owned by `value`. Containers whose count drops to zero
    /// are freed together with everything only they referenced.
    pub fn release(&mut self, value: Value) {
        let mut work = vec![value];
        while let Some(v) = work.pop() {
            match v {
                Value::List(id) => {
                    let Some(list) = self.lists.get_mut(id.0 as usize).and_then(Option::as_mut) else {
                        continue;
                    };
                    if list.refcount >= DO_NOT_FREE {
                        continue;
                    }
                    if list.refcount > 1 {
                        list.refcount -= 1;
                        continue;
                    }
                    if let Some(mut list) = self.lists[id.0 as usize].take() {
                        self.free_lists.push(id.0);
                        work.extend(list.take_items().into_iter().map(|tv| tv.value));
                    }
                }
                Value::Dict(id) => {
                    let Some(dict) = self.dicts.get_mut(id.0 as usize).and_then(Option::as_mut) else {
                        continue;
                    };
                    if dict.refcount >= DO_NOT_FREE {
                        continue;
                    }
                    if dict.refcount > 1 {
                        dict.refcount -= 1;
                        continue;
                    }
                    if let Some(mut dict) = self.dicts[id.0 as usize].take() {
                        self.free_dicts.push(id.0);
                        work.extend(dict.take_items().into_iter().map(|tv| tv.value));
                    }
                }
                Value::Funcref(name) => self.unref_func(&name),
                Value::Number(_) | Value::String(_) => {}
            }
        }
    }

    pub fn release_all(&mut self, values: impl IntoIterator<Item = Value>) {
        for v in values {
            self.release(v);
        }
    }

    /// Free a scope dictionary regardless of its refcount.
    pub fn free_scope_dict(&mut self, id: DictId) {
        if let Some(dict) = self.dicts.get_mut(id.0 as usize).and_then(Option::as_mut) {
            dict.refcount = 1;
        }
        self.release(Value::Dict(id));
    }

    /// Token for one deep-copy, equality or marking pass.
    pub fn next_copy_id(&mut self) -> u32 {
        self.last_copy_id = self.last_copy_id.wrapping_add(1).max(1);
        self.last_copy_id
    }

    pub fn live_lists(&self) -> usize {
        self.lists.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn live_dicts(&self) -> usize {
        self.dicts.iter().filter(|slot| slot.is_some()).count()
    }

    /// Append `value` to a list, transferring its reference.
    pub fn list_append(&mut self, id: ListId, value: Value) {
        self.list_mut(id).append(TypVal::new(value));
    }

    /// The items of a list, each with a new reference the caller must release.
    pub fn list_snapshot(&mut self, id: ListId) -> Vec<Value> {
        let values: Vec<Value> = self.list(id).iter().map(|tv| tv.value.clone()).collect();
        values.iter().map(|v| self.inc_value(v)).collect()
    }

    /// Mark everything reachable from `roots` and scope dictionaries, then free the rest.
    /// Returns the number of containers freed.
    pub fn garbage_collect<'a>(&mut self, roots: impl IntoIterator<Item = &'a Value>) -> usize {
        let mark = self.next_copy_id();
        let mut stack: Vec<Value> = roots.into_iter().filter(|v| v.is_container()).cloned().collect();
        for (idx, slot) in self.dicts.iter().enumerate() {
            if slot.as_ref().is_some_and(|d| d.refcount >= DO_NOT_FREE) {
                stack.push(Value::Dict(DictId(idx as u32)));
            }
        }

        while let Some(v) = stack.pop() {
            match v {
                Value::List(id) => {
                    let Some(list) = self.lists.get_mut(id.0 as usize).and_then(Option::as_mut) else {
                        continue;
                    };
                    if list.copy_id == mark {
                        continue;
                    }
                    list.copy_id = mark;
                    stack.extend(list.iter().filter(|tv| tv.value.is_container()).map(|tv| tv.value.clone()));
                }
                Value::Dict(id) => {
                    let Some(dict) = self.dicts.get_mut(id.0 as usize).and_then(Option::as_mut) else {
                        continue;
                    };
                    if dict.copy_id == mark {
                        continue;
                    }
                    dict.copy_id = mark;
                    stack.extend(
                        dict.table()
                            .iter()
                            .filter(|(_, item)| item.tv.value.is_container())
                            .map(|(_, item)| item.tv.value.clone()),
                    );
                }
                _ => {}
            }
        }

        let dead_lists: Vec<u32> = self
            .lists
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.as_ref().is_some_and(|l| l.copy_id != mark))
            .map(|(idx, _)| idx as u32)
            .collect();
        let dead_dicts: Vec<u32> = self
            .dicts
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.as_ref().is_some_and(|d| d.copy_id != mark))
            .map(|(idx, _)| idx as u32)
            .collect();

        let mut orphans = Vec::new();
        for idx in &dead_lists {
            if let Some(mut list) = self.lists[*idx as usize].take() {
                self.free_lists.push(*idx);
                orphans.extend(list.take_items().into_iter().map(|tv| tv.value));
            }
        }
        for idx in &dead_dicts {
            if let Some(mut dict) = self.dicts[*idx as usize].take() {
                self.free_dicts.push(*idx);
                orphans.extend(dict.take_items().into_iter().map(|tv| tv.value));
            }
        }
        // Garbage may still point at survivors; give those references back.
        for v in orphans {
            match v {
                Value::List(id) if self.is_list_live(id) => self.release(v),
                Value::Dict(id) if self.is_dict_live(id) => self.release(v),
                Value::Funcref(name) => self.unref_func(&name),
                _ => {}
            }
        }

        let freed = dead_lists.len() + dead_dicts.len();
        if freed > 0 {
            debug!(target: "vex::heap", lists = dead_lists.len(), dicts = dead_dicts.len(), "garbage collected");
        }
        freed
    }
}
