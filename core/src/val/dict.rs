use anyhow::Result;

use crate::error::err_other;
use crate::hashtab::HashTable;
use crate::scope::ScopeKind;

use super::{DictId, TypVal, VarLock};

/// Per-entry attributes beyond the value lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ItemFlags {
    /// Cannot be assigned.
    pub read_only: bool,
    /// Cannot be assigned while the sandbox is active.
    pub read_only_sandbox: bool,
    /// Cannot be removed.
    pub fixed: bool,
}

#[derive(Debug, Clone)]
pub struct DictItem {
    pub tv: TypVal,
    pub flags: ItemFlags,
    seq: u64,
}

impl DictItem {
    #[inline]
    pub fn value(&self) -> &super::Value {
        &self.tv.value
    }
}

/// String-keyed map of values. Iteration helpers return entries in insertion order.
#[derive(Debug, Clone, Default)]
pub struct Dict {
    table: HashTable<DictItem>,
    next_seq: u64,
    pub lock: VarLock,
    /// Set for the dictionaries that back a variable scope.
    pub scope: Option<ScopeKind>,
    pub(crate) refcount: usize,
    pub(crate) copy_id: u32,
    pub(crate) copy_target: Option<DictId>,
}

impl Dict {
    pub fn new() -> Self {
        Self {
            refcount: 1,
            ..Self::default()
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    #[inline]
    pub fn table(&self) -> &HashTable<DictItem> {
        &self.table
    }

    #[inline]
    pub fn table_mut(&mut self) -> &mut HashTable<DictItem> {
        &mut self.table
    }

    pub fn get(&self, key: &str) -> Option<&DictItem> {
        self.table.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut DictItem> {
        self.table.get_mut(key)
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.table.contains_key(key)
    }

    /// Add a new entry. Returns `Ok(false)` if the key exists; an empty key is
    /// an error. Callers check the key with [`check_key`] before taking a
    /// reference for `tv`.
    pub fn insert(&mut self, key: &str, tv: TypVal) -> Result<bool> {
        self.insert_with_flags(key, tv, ItemFlags::default())
    }

    pub fn insert_with_flags(&mut self, key: &str, tv: TypVal, flags: ItemFlags) -> Result<bool> {
        check_key(key)?;
        let seq = self.next_seq;
        let added = self.table.add(key, DictItem { tv, flags, seq })?;
        if added {
            self.next_seq += 1;
        }
        Ok(added)
    }

    pub fn remove(&mut self, key: &str) -> Option<DictItem> {
        self.table.remove_key(key)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> Vec<String> {
        self.entries().into_iter().map(|(k, _)| k.to_string()).collect()
    }

    /// Entries in insertion order.
    pub fn entries(&self) -> Vec<(&str, &DictItem)> {
        let mut out: Vec<(&str, &DictItem)> = self.table.iter().collect();
        out.sort_by_key(|(_, item)| item.seq);
        out
    }

    pub(crate) fn take_items(&mut self) -> Vec<TypVal> {
        self.table.drain().into_iter().map(|(_, item)| item.tv).collect()
    }
}

/// Dictionary keys must be non-empty.
pub fn check_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return err_other("Cannot use empty key for Dictionary");
    }
    Ok(())
}
