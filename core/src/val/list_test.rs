#[cfg(test)]
mod test {
    use crate::val::{List, TypVal, Value};

    fn list_of(items: &[i64]) -> List {
        let mut list = List::new();
        for n in items {
            list.append(TypVal::new(Value::Number(*n)));
        }
        list
    }

    fn numbers(list: &List) -> Vec<i64> {
        list.iter()
            .map(|tv| match tv.value {
                Value::Number(n) => n,
                _ => panic!("expected number"),
            })
            .collect()
    }

    #[test]
    fn find_counts_from_either_end() {
        let list = list_of(&[10, 20, 30, 40]);
        let at = |i| list.find(i).map(|n| list.item(n).value.clone());
        assert_eq!(at(0), Some(Value::Number(10)));
        assert_eq!(at(3), Some(Value::Number(40)));
        assert_eq!(at(-1), Some(Value::Number(40)));
        assert_eq!(at(-4), Some(Value::Number(10)));
        assert_eq!(at(4), None);
        assert_eq!(at(-5), None);
    }

    #[test]
    fn cached_lookup_survives_edits() {
        let mut list = list_of(&[1, 2, 3, 4, 5]);
        let third = list.find(2).expect("index 2");
        assert_eq!(list.item(third).value, Value::Number(3));
        let first = list.first().expect("non-empty");
        list.remove(first);
        assert_eq!(list.find(2).map(|n| list.item(n).value.clone()), Some(Value::Number(4)));
        let head = list.first();
        list.insert_before(head, TypVal::new(Value::Number(0)));
        assert_eq!(list.find(1).map(|n| list.item(n).value.clone()), Some(Value::Number(2)));
        assert_eq!(list.len(), 5);
    }

    #[test]
    fn insert_and_remove_keep_links() {
        let mut list = list_of(&[1, 3]);
        let three = list.find(1).expect("index 1");
        list.insert_before(Some(three), TypVal::new(Value::Number(2)));
        list.append(TypVal::new(Value::Number(4)));
        assert_eq!(numbers(&list), vec![1, 2, 3, 4]);

        let last = list.last().expect("non-empty");
        list.remove(last);
        assert_eq!(numbers(&list), vec![1, 2, 3]);
        assert_eq!(list.last().map(|n| list.item(n).value.clone()), Some(Value::Number(3)));
        assert_eq!(list.index_of(three), Some(2));
    }

    #[test]
    fn watcher_moves_past_removed_item() {
        let mut list = list_of(&[1, 2, 3]);
        let second = list.find(1).expect("index 1");
        let w = list.add_watcher(Some(second));

        list.remove(second);
        let next = list.watcher_node(w).expect("watcher advanced");
        assert_eq!(list.item(next).value, Value::Number(3));

        list.remove(next);
        assert_eq!(list.watcher_node(w), None, "end of list reached");
        list.remove_watcher(w);
        assert_eq!(list.watcher_count(), 0);
    }

    #[test]
    fn reorder_relinks_nodes() {
        let mut list = list_of(&[1, 2, 3]);
        let mut ids = list.node_ids();
        ids.reverse();
        list.reorder(&ids);
        assert_eq!(numbers(&list), vec![3, 2, 1]);
        assert_eq!(list.find(-1).map(|n| list.item(n).value.clone()), Some(Value::Number(1)));
    }

    #[test]
    fn removed_slots_are_reused() {
        let mut list = list_of(&[1, 2]);
        let first = list.first().expect("non-empty");
        list.remove(first);
        let node = list.append(TypVal::new(Value::Number(5)));
        assert_eq!(node, first);
        assert_eq!(numbers(&list), vec![2, 5]);
    }
}
