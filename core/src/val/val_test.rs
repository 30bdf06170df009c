#[cfg(test)]
mod test {
    use anyhow::Result;

    use crate::error::{ErrorKind, error_kind};
    use crate::val::{Heap, TypVal, Value, VarLock, str2nr};

    #[test]
    fn str2nr_radixes() {
        assert_eq!(str2nr("42"), (42, 2));
        assert_eq!(str2nr("-12abc"), (-12, 3));
        assert_eq!(str2nr("0x1F"), (31, 4));
        assert_eq!(str2nr("0b101"), (5, 5));
        assert_eq!(str2nr("017"), (15, 3));
        assert_eq!(str2nr("019"), (19, 3), "not octal when a digit is 8 or 9");
        assert_eq!(str2nr("0x"), (0, 1));
        assert_eq!(str2nr("abc"), (0, 0));
        assert_eq!(str2nr("99999999999999999999").0, i64::MAX);
    }

    #[test]
    fn conversions() -> Result<()> {
        assert_eq!(Value::str("12ab").to_number()?, 12);
        assert_eq!(Value::Number(-7).to_str()?, "-7");
        assert!(Value::str("1").is_truthy()?);
        assert!(!Value::str("x").is_truthy()?);

        let mut heap = Heap::new();
        let l = heap.new_list();
        let err = Value::List(l).to_number().unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::TypeMismatch);
        assert_eq!(err.to_string(), "Using a List as a Number");
        Ok(())
    }

    #[test]
    fn lock_tri_state() {
        let mut lock = VarLock::Fixed;
        lock.unlock();
        assert_eq!(lock, VarLock::Fixed);

        let mut lock = VarLock::Unlocked;
        lock.lock();
        assert!(lock.is_locked());
        lock.unlock();
        assert_eq!(lock, VarLock::Unlocked);
    }

    #[test]
    fn list_equal_to_itself_even_when_cyclic() {
        let mut heap = Heap::new();
        let l = heap.new_list();
        heap.inc_list(l);
        heap.list_append(l, Value::List(l));
        let v = Value::List(l);
        assert!(heap.values_equal(&v, &v, false));
    }

    #[test]
    fn distinct_cycles_terminate() {
        let mut heap = Heap::new();
        let a = heap.new_list();
        heap.inc_list(a);
        heap.list_append(a, Value::List(a));
        let b = heap.new_list();
        heap.inc_list(b);
        heap.list_append(b, Value::List(b));
        assert!(heap.values_equal(&Value::List(a), &Value::List(b), false));
    }

    #[test]
    fn equality_is_symmetric() {
        let mut heap = Heap::new();
        let a = heap.new_list_from(vec![Value::Number(1), Value::str("x")]);
        let b = heap.new_list_from(vec![Value::Number(1), Value::str("X")]);
        let (va, vb) = (Value::List(a), Value::List(b));
        assert!(!heap.values_equal(&va, &vb, false));
        assert!(!heap.values_equal(&vb, &va, false));
        assert!(heap.values_equal(&va, &vb, true));
        assert!(heap.values_equal(&vb, &va, true));
        assert!(!heap.values_equal(&Value::Number(1), &Value::str("1"), false));
    }

    #[test]
    fn funcrefs_compare_by_name() {
        let heap = Heap::new();
        assert!(heap.values_equal(&Value::funcref("Foo"), &Value::funcref("Foo"), false));
        assert!(!heap.values_equal(&Value::funcref("Foo"), &Value::funcref("Bar"), false));
    }

    #[test]
    fn dicts_equal_regardless_of_order() -> Result<()> {
        let mut heap = Heap::new();
        let a = heap.new_dict();
        heap.dict_mut(a).insert("a", TypVal::new(Value::Number(1)))?;
        heap.dict_mut(a).insert("b", TypVal::new(Value::Number(2)))?;
        let b = heap.new_dict();
        heap.dict_mut(b).insert("b", TypVal::new(Value::Number(2)))?;
        heap.dict_mut(b).insert("a", TypVal::new(Value::Number(1)))?;
        assert!(heap.values_equal(&Value::Dict(a), &Value::Dict(b), false));

        heap.dict_mut(b).insert("c", TypVal::new(Value::Number(3)))?;
        assert!(!heap.values_equal(&Value::Dict(a), &Value::Dict(b), false));
        Ok(())
    }

    #[test]
    fn dict_keys_in_insertion_order() -> Result<()> {
        let mut heap = Heap::new();
        let d = heap.new_dict();
        for key in ["zeta", "alpha", "mid"] {
            heap.dict_mut(d).insert(key, TypVal::new(Value::Number(0)))?;
        }
        heap.dict_mut(d).remove("alpha");
        heap.dict_mut(d).insert("alpha", TypVal::new(Value::Number(1)))?;
        assert_eq!(heap.dict(d).keys(), vec!["zeta", "mid", "alpha"]);
        Ok(())
    }

    #[test]
    fn repr_quotes_nested_strings() -> Result<()> {
        let mut heap = Heap::new();
        let d = heap.new_dict();
        heap.dict_mut(d).insert("k", TypVal::new(Value::funcref("F")))?;
        let l = heap.new_list_from(vec![Value::Number(1), Value::str("it's"), Value::Dict(d)]);

        let shown = heap.echo_string(&Value::List(l), 100);
        assert_eq!(shown.text, "[1, 'it''s', {'k': function('F')}]");
        assert!(!shown.too_deep);
        assert_eq!(heap.echo_string(&Value::str("it's"), 100).text, "it's");
        assert_eq!(heap.string_repr(&Value::str("it's"), 100).text, "'it''s'");
        Ok(())
    }

    #[test]
    fn display_marks_recursion() {
        let mut heap = Heap::new();
        let l = heap.new_list();
        heap.inc_list(l);
        heap.list_append(l, Value::List(l));
        assert_eq!(heap.echo_string(&Value::List(l), 100).text, "[[...]]");

        let inner = heap.new_list_from(vec![Value::Number(1)]);
        let mid = heap.new_list_from(vec![Value::List(inner)]);
        let outer = heap.new_list_from(vec![Value::List(mid)]);
        let shown = heap.echo_string(&Value::List(outer), 2);
        assert_eq!(shown.text, "[[{E724}]]");
        assert!(shown.too_deep);
    }
}
