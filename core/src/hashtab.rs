//! Open-addressing hashtable keyed by strings.
//!
//! Every scope and every Dict is backed by one of these. Slots are addressed by
//! index so callers can look a key up once and then inspect, fill or clear the
//! returned slot without hashing again.

use std::mem;

use anyhow::{Result, anyhow};
use tracing::trace;

/// Capacity of a fresh table; capacities are always powers of two.
pub const HT_INIT_SIZE: usize = 16;
const PERTURB_SHIFT: u32 = 5;

/// Polynomial string hash. The first byte seeds the hash; an empty key hashes to 0.
pub fn hash_key(key: &str) -> u32 {
    let bytes = key.as_bytes();
    let Some((&first, rest)) = bytes.split_first() else {
        return 0;
    };
    let mut hash = first as u32;
    for &b in rest {
        hash = hash.wrapping_mul(101).wrapping_add(b as u32);
    }
    hash
}

#[derive(Debug, Clone)]
enum Bucket<T> {
    Empty,
    Removed,
    Used { key: Box<str>, hash: u32, payload: T },
}

#[derive(Debug, Clone)]
pub struct HashTable<T> {
    buckets: Vec<Bucket<T>>,
    /// Live entries.
    used: usize,
    /// Live entries plus tombstones.
    filled: usize,
    locked: u32,
}

impl<T> Default for HashTable<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn empty_buckets<T>(size: usize) -> Vec<Bucket<T>> {
    let mut buckets = Vec::with_capacity(size);
    buckets.resize_with(size, || Bucket::Empty);
    buckets
}

impl<T> HashTable<T> {
    pub fn new() -> Self {
        Self {
            buckets: empty_buckets(HT_INIT_SIZE),
            used: 0,
            filled: 0,
            locked: 0,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.used
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.used == 0
    }

    /// Number of buckets.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buckets.len()
    }

    /// Live entries plus tombstones.
    #[inline]
    pub fn filled(&self) -> usize {
        self.filled
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.locked > 0
    }

    /// Find the slot for `key`. Always returns a slot: either the one holding the key,
    /// or the slot where it would be inserted (the first tombstone on the probe path if
    /// any, otherwise the terminating empty slot). Use [`HashTable::is_used`] to tell
    /// the two apart.
    pub fn find(&self, key: &str) -> usize {
        self.lookup(key, hash_key(key))
    }

    pub fn lookup(&self, key: &str, hash: u32) -> usize {
        let mask = self.buckets.len() - 1;
        let mut idx = hash as usize & mask;
        let mut free = None;
        match &self.buckets[idx] {
            Bucket::Empty => return idx,
            Bucket::Removed => free = Some(idx),
            Bucket::Used { key: k, hash: h, .. } if *h == hash && k.as_ref() == key => return idx,
            Bucket::Used { .. } => {}
        }

        // Visits every bucket eventually: once perturb reaches zero this is a
        // full-period linear congruential walk over a power-of-two table.
        let mut perturb = hash as usize;
        loop {
            idx = (idx << 2).wrapping_add(idx).wrapping_add(perturb).wrapping_add(1);
            let slot = idx & mask;
            match &self.buckets[slot] {
                Bucket::Empty => return free.unwrap_or(slot),
                Bucket::Removed => {
                    if free.is_none() {
                        free = Some(slot);
                    }
                }
                Bucket::Used { key: k, hash: h, .. } if *h == hash && k.as_ref() == key => return slot,
                Bucket::Used { .. } => {}
            }
            perturb >>= PERTURB_SHIFT;
        }
    }

    #[inline]
    pub fn is_used(&self, slot: usize) -> bool {
        matches!(self.buckets.get(slot), Some(Bucket::Used { .. }))
    }

    pub fn slot(&self, slot: usize) -> Option<(&str, &T)> {
        match self.buckets.get(slot)? {
            Bucket::Used { key, payload, .. } => Some((key.as_ref(), payload)),
            _ => None,
        }
    }

    pub fn slot_mut(&mut self, slot: usize) -> Option<(&str, &mut T)> {
        match self.buckets.get_mut(slot)? {
            Bucket::Used { key, payload, .. } => Some((&**key, payload)),
            _ => None,
        }
    }

    pub fn get(&self, key: &str) -> Option<&T> {
        let slot = self.find(key);
        self.slot(slot).map(|(_, payload)| payload)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut T> {
        let slot = self.find(key);
        self.slot_mut(slot).map(|(_, payload)| payload)
    }

    #[inline]
    pub fn contains_key(&self, key: &str) -> bool {
        self.is_used(self.find(key))
    }

    /// Add `payload` under `key`. Returns `Ok(false)` without touching the table when
    /// the key is empty or already present.
    pub fn add(&mut self, key: &str, payload: T) -> Result<bool> {
        if key.is_empty() {
            return Ok(false);
        }
        let hash = hash_key(key);
        let slot = self.lookup(key, hash);
        if self.is_used(slot) {
            return Ok(false);
        }
        self.add_at(slot, key, hash, payload)?;
        Ok(true)
    }

    /// Fill a slot previously returned by [`HashTable::lookup`] for the same key.
    pub fn add_at(&mut self, slot: usize, key: &str, hash: u32, payload: T) -> Result<()> {
        if self.locked > 0 && self.filled + 2 >= self.buckets.len() {
            return Err(anyhow!("hashtable is locked and full, cannot add '{}'", key));
        }
        match self.buckets[slot] {
            Bucket::Empty => self.filled += 1,
            Bucket::Removed => {}
            Bucket::Used { .. } => return Err(anyhow!("duplicate hashtable key '{}'", key)),
        }
        self.used += 1;
        self.buckets[slot] = Bucket::Used {
            key: key.into(),
            hash,
            payload,
        };
        self.may_resize(0)
    }

    /// Clear a used slot, leaving a tombstone so probe chains through it stay intact.
    pub fn remove(&mut self, slot: usize) -> Option<(Box<str>, T)> {
        if !self.is_used(slot) {
            return None;
        }
        let old = mem::replace(&mut self.buckets[slot], Bucket::Removed);
        self.used -= 1;
        match old {
            Bucket::Used { key, payload, .. } => Some((key, payload)),
            _ => None,
        }
    }

    pub fn remove_key(&mut self, key: &str) -> Option<T> {
        let slot = self.find(key);
        self.remove(slot).map(|(_, payload)| payload)
    }

    /// Prevent resizing while a caller iterates by slot index.
    pub fn lock(&mut self) {
        self.locked += 1;
    }

    /// Release one lock level; a resize deferred while locked happens now.
    pub fn unlock(&mut self) -> Result<()> {
        self.locked = self.locked.saturating_sub(1);
        if self.locked == 0 {
            return self.may_resize(0);
        }
        Ok(())
    }

    /// Make room for at least `min_items` entries without further resizing.
    pub fn resize(&mut self, min_items: usize) -> Result<()> {
        self.may_resize(min_items.max(1))
    }

    fn may_resize(&mut self, min_items: usize) -> Result<()> {
        if self.locked > 0 {
            return Ok(());
        }
        let old_size = self.buckets.len();
        let min_size = if min_items == 0 {
            // Stay in the initial table while it is not close to full.
            if self.filled < HT_INIT_SIZE - 1 && old_size == HT_INIT_SIZE {
                return Ok(());
            }
            // Keep between 1/5 and 2/3 full.
            if self.filled * 3 < old_size * 2 && self.used > old_size / 5 {
                return Ok(());
            }
            if self.used > 1000 { self.used * 2 } else { self.used * 4 }
        } else {
            let min_items = min_items.max(self.used);
            (min_items * 3).div_ceil(2)
        };

        let mut new_size = HT_INIT_SIZE;
        while new_size < min_size {
            new_size = new_size
                .checked_mul(2)
                .ok_or_else(|| anyhow!("hashtable capacity overflow"))?;
        }
        trace!(
            target: "vex::hashtab",
            old = old_size,
            new = new_size,
            used = self.used,
            filled = self.filled,
            "resize"
        );

        let old = mem::replace(&mut self.buckets, empty_buckets(new_size));
        let mask = new_size - 1;
        for bucket in old {
            if let Bucket::Used { key, hash, payload } = bucket {
                let mut idx = hash as usize & mask;
                let mut perturb = hash as usize;
                while !matches!(self.buckets[idx], Bucket::Empty) {
                    idx = ((idx << 2).wrapping_add(idx).wrapping_add(perturb).wrapping_add(1)) & mask;
                    perturb >>= PERTURB_SHIFT;
                }
                self.buckets[idx] = Bucket::Used { key, hash, payload };
            }
        }
        self.filled = self.used;
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &T)> {
        self.buckets.iter().filter_map(|bucket| match bucket {
            Bucket::Used { key, payload, .. } => Some((key.as_ref(), payload)),
            _ => None,
        })
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut T)> {
        self.buckets.iter_mut().filter_map(|bucket| match bucket {
            Bucket::Used { key, payload, .. } => Some((&**key, payload)),
            _ => None,
        })
    }

    /// Remove every entry and shrink back to the initial capacity.
    pub fn drain(&mut self) -> Vec<(Box<str>, T)> {
        let old = mem::replace(&mut self.buckets, empty_buckets(HT_INIT_SIZE));
        self.used = 0;
        self.filled = 0;
        old.into_iter()
            .filter_map(|bucket| match bucket {
                Bucket::Used { key, payload, .. } => Some((key, payload)),
                _ => None,
            })
            .collect()
    }
}
