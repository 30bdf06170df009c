#[cfg(test)]
mod test {
    use std::collections::HashMap;

    use anyhow::Result;

    use crate::hashtab::{HT_INIT_SIZE, HashTable, hash_key};

    // Small deterministic generator so failures reproduce.
    struct Lcg(u64);

    impl Lcg {
        fn next(&mut self) -> u64 {
            self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            self.0 >> 33
        }
    }

    fn assert_load_bounds<T>(ht: &HashTable<T>) {
        assert!(ht.capacity().is_power_of_two());
        assert!(ht.filled() < ht.capacity(), "table must keep an empty slot");
        if ht.capacity() > HT_INIT_SIZE {
            assert!(ht.filled() * 3 < ht.capacity() * 2, "more than 2/3 full");
        }
    }

    #[test]
    fn hash_is_polynomial_seeded_by_first_byte() {
        assert_eq!(hash_key(""), 0);
        assert_eq!(hash_key("a"), b'a' as u32);
        assert_eq!(hash_key("ab"), (b'a' as u32) * 101 + b'b' as u32);
    }

    #[test]
    fn add_find_remove() -> Result<()> {
        let mut ht = HashTable::new();
        assert!(ht.add("one", 1)?);
        assert!(ht.add("two", 2)?);
        assert!(!ht.add("one", 10)?, "duplicate key must be rejected");
        assert!(!ht.add("", 0)?, "empty key must be rejected");

        assert_eq!(ht.get("one"), Some(&1));
        assert_eq!(ht.len(), 2);

        let slot = ht.find("one");
        assert!(ht.is_used(slot));
        let (key, payload) = ht.remove(slot).expect("slot is used");
        assert_eq!((&*key, payload), ("one", 1));
        assert!(!ht.is_used(ht.find("one")));
        assert_eq!(ht.get("two"), Some(&2));
        Ok(())
    }

    #[test]
    fn tombstone_keeps_probe_chain() -> Result<()> {
        let mut ht = HashTable::new();
        for i in 0..12 {
            ht.add(&format!("k{i}"), i)?;
        }
        for i in (0..12).step_by(2) {
            assert_eq!(ht.remove_key(&format!("k{i}")), Some(i));
        }
        for i in (1..12).step_by(2) {
            assert_eq!(ht.get(&format!("k{i}")), Some(&i));
        }
        // A missing key may land on a tombstone; adding there reuses it.
        let before = ht.filled();
        let slot = ht.find("k0");
        assert!(!ht.is_used(slot));
        ht.add("k0", 100)?;
        assert!(ht.filled() <= before + 1);
        assert_eq!(ht.get("k0"), Some(&100));
        Ok(())
    }

    #[test]
    fn random_add_remove_sequences_stay_consistent() -> Result<()> {
        let mut rng = Lcg(7);
        let mut ht = HashTable::new();
        let mut model: HashMap<String, u64> = HashMap::new();

        for _ in 0..5000 {
            let key = format!("key{}", rng.next() % 700);
            if rng.next() % 3 == 0 {
                assert_eq!(ht.remove_key(&key), model.remove(&key));
            } else {
                let value = rng.next();
                let added = ht.add(&key, value)?;
                assert_eq!(added, !model.contains_key(&key));
                model.entry(key).or_insert(value);
            }
            assert_load_bounds(&ht);
        }

        assert_eq!(ht.len(), model.len());
        for (k, v) in &model {
            assert_eq!(ht.get(k), Some(v));
        }
        for i in 0..700 {
            let key = format!("key{i}");
            assert_eq!(ht.contains_key(&key), model.contains_key(&key));
        }
        Ok(())
    }

    #[test]
    fn grows_and_shrinks_within_bounds() -> Result<()> {
        let mut ht = HashTable::new();
        for i in 0..2000 {
            ht.add(&i.to_string(), i)?;
            assert_load_bounds(&ht);
        }
        let grown = ht.capacity();
        assert!(grown >= 2000 * 3 / 2);

        for i in 0..1990 {
            ht.remove_key(&i.to_string());
        }
        // Shrinking happens on the next insertion.
        ht.add("fresh", 0)?;
        assert!(ht.capacity() < grown);
        assert_load_bounds(&ht);
        for i in 1990..2000 {
            assert_eq!(ht.get(&i.to_string()), Some(&i));
        }
        Ok(())
    }

    #[test]
    fn locked_table_defers_resize() -> Result<()> {
        let mut ht = HashTable::new();
        for i in 0..10 {
            ht.add(&format!("v{i}"), i)?;
        }
        ht.lock();
        let cap = ht.capacity();
        // Deleting while locked keeps slot indices stable.
        let slots: Vec<usize> = (0..cap).filter(|s| ht.is_used(*s)).collect();
        for slot in &slots[..5] {
            ht.remove(*slot);
        }
        ht.add("extra", 99)?;
        assert_eq!(ht.capacity(), cap);
        for slot in &slots[5..] {
            assert!(ht.is_used(*slot));
        }
        ht.unlock()?;
        assert!(!ht.is_locked());
        assert_eq!(ht.get("extra"), Some(&99));
        assert_eq!(ht.len(), 6);
        Ok(())
    }

    #[test]
    fn unlock_runs_deferred_shrink() -> Result<()> {
        let mut ht = HashTable::new();
        for i in 0..100 {
            ht.add(&format!("k{i}"), i)?;
        }
        let cap = ht.capacity();
        ht.lock();
        for i in 5..100 {
            ht.remove_key(&format!("k{i}"));
        }
        assert_eq!(ht.capacity(), cap);
        ht.unlock()?;
        assert!(ht.capacity() < cap);
        assert_eq!(ht.len(), 5);
        assert_eq!(ht.get("k4"), Some(&4));
        Ok(())
    }

    #[test]
    fn locked_and_full_refuses_to_add() -> Result<()> {
        let mut ht = HashTable::new();
        ht.lock();
        let mut err = None;
        for i in 0..HT_INIT_SIZE {
            if let Err(e) = ht.add(&format!("x{i}"), i) {
                err = Some(e);
                break;
            }
        }
        assert!(err.is_some());
        assert!(ht.filled() < ht.capacity());
        ht.unlock()?;
        ht.add("after", 1)?;
        assert_eq!(ht.get("after"), Some(&1));
        Ok(())
    }

    #[test]
    fn explicit_resize_reserves_room() -> Result<()> {
        let mut ht: HashTable<u32> = HashTable::new();
        ht.resize(100)?;
        assert!(ht.capacity() >= 150);
        assert!(ht.capacity().is_power_of_two());
        for i in 0..90 {
            ht.add(&format!("n{i}"), i)?;
            assert_load_bounds(&ht);
        }
        assert_eq!(ht.len(), 90);
        Ok(())
    }
}
