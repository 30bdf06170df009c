#[cfg(test)]
mod test {
    use anyhow::Result;

    use crate::error::{ErrorKind, error_kind};
    use crate::exec::test_support::{errors, interp, run};
    use crate::expr::Cursor;
    use crate::interp::AssignOp;
    use crate::lval::LvalKind;
    use crate::val::Value;

    #[test]
    fn skip_lvalue_stops_after_the_target() -> Result<()> {
        let (mut interp, _log) = interp();
        for (text, end) in [("abc = 1", 3), ("d.key.sub += 2", 9), ("l[1][x : y] .= 3", 11), ("g:{'a'}b = 4", 8)] {
            let mut cur = Cursor::new(text);
            interp.skip_lvalue(&mut cur)?;
            assert_eq!(cur.pos(), end, "{text}");
        }
        Ok(())
    }

    #[test]
    fn get_lval_resolves_each_kind() -> Result<()> {
        let (mut interp, _log) = interp();
        interp.source_str("let d = {'k': 1}\nlet l = [10, 20, 30]")?;

        let lval = interp.get_lval(&mut Cursor::new("d"), false)?;
        assert_eq!(lval.kind, LvalKind::Var);
        interp.release_lval(lval);

        let lval = interp.get_lval(&mut Cursor::new("d.k"), false)?;
        assert!(matches!(&lval.kind, LvalKind::DictItem { key, .. } if key == "k"));
        interp.release_lval(lval);

        let lval = interp.get_lval(&mut Cursor::new("d['new']"), false)?;
        assert!(matches!(&lval.kind, LvalKind::NewKey { key, .. } if key == "new"));
        assert_eq!(lval.text, "d['new']");
        interp.release_lval(lval);

        let lval = interp.get_lval(&mut Cursor::new("l[-1]"), false)?;
        assert!(matches!(lval.kind, LvalKind::ListItem { .. }));
        interp.release_lval(lval);

        let lval = interp.get_lval(&mut Cursor::new("l[-2:]"), false)?;
        assert!(matches!(lval.kind, LvalKind::ListRange { first: 1, last: None, .. }));
        interp.release_lval(lval);
        Ok(())
    }

    #[test]
    fn get_lval_errors() -> Result<()> {
        let (mut interp, _log) = interp();
        interp.source_str("let d = {}\nlet l = [1, 2]")?;
        let cases = [
            ("d['x']['y']", "Key not present in Dictionary: x"),
            ("l[0:1][0]", "[:] must come last"),
            ("d[1:2]", "Cannot use [:] with a Dictionary"),
            ("l[1:0]", "List index out of range: 0"),
            ("l[2]", "List index out of range: 2"),
            ("nosuch[0]", "Undefined variable: nosuch"),
        ];
        for (text, message) in cases {
            let err = interp.get_lval(&mut Cursor::new(text), false).unwrap_err();
            assert_eq!(err.to_string(), message, "{text}");
        }
        let err = interp.get_lval(&mut Cursor::new("d.gone"), true).unwrap_err();
        assert_eq!(error_kind(&err), ErrorKind::UndefinedName);
        Ok(())
    }

    #[test]
    fn scope_dictionaries_assign_variables() {
        let script = "let g:['made'] = 5\nlet g:made += 1\necho made\nunlet g:['made']\necho exists";
        assert_eq!(run(script)[0], "6");
        assert_eq!(errors(script), vec!["Undefined variable: exists"]);
    }

    #[test]
    fn tv_op_combines_values() -> Result<()> {
        let (mut interp, _log) = interp();
        assert_eq!(interp.tv_op(&Value::Number(4), &Value::str("3"), AssignOp::Sub, "n")?, Value::Number(1));
        assert_eq!(
            interp.tv_op(&Value::str("a"), &Value::Number(1), AssignOp::Concat, "s")?,
            Value::str("a1")
        );
        let err = interp
            .tv_op(&Value::Number(1), &Value::str("x"), AssignOp::Set, "n")
            .unwrap_err();
        assert_eq!(err.to_string(), "Wrong variable type for =");

        let list = Value::List(interp.heap.new_list_from(vec![Value::Number(1)]));
        let err = interp.tv_op(&list, &Value::Number(2), AssignOp::Add, "l").unwrap_err();
        assert_eq!(err.to_string(), "Wrong variable type for +=");
        interp.heap.release(list);
        Ok(())
    }

    #[test]
    fn adding_a_list_to_itself() {
        let script = "let l = [1, 2]\nlet l += l\necho l";
        assert_eq!(run(script), vec!["[1, 2, 1, 2]"]);
    }

    #[test]
    fn locked_list_cannot_grow() {
        let script = "let l = [1]\nlockvar 1 l\nlet l += [2]";
        assert_eq!(errors(script), vec!["Value is locked: l"]);
    }

    #[test]
    fn existence_and_locks() -> Result<()> {
        let (mut interp, _log) = interp();
        interp.source_str("let d = {'k': [1]}\nlet l = [1, 2]\nlockvar 1 l")?;
        assert!(interp.variable_exists("d"));
        assert!(interp.variable_exists("d.k"));
        assert!(interp.variable_exists("d.k[0]"));
        assert!(interp.variable_exists("b:changedtick"));
        assert!(!interp.variable_exists("d.missing"));
        assert!(!interp.variable_exists("l[7]"));
        assert!(!interp.variable_exists("nosuch"));
        assert!(!interp.variable_exists("d k"));

        assert!(interp.is_locked("l")?);
        assert!(!interp.is_locked("l[0]")?);
        assert!(!interp.is_locked("d.k")?);
        assert!(interp.is_locked("b:changedtick")?);
        assert_eq!(interp.is_locked("nosuch").unwrap_err().to_string(), "Undefined variable: nosuch");
        assert_eq!(interp.is_locked("l[0:1]").unwrap_err().to_string(), "Range not allowed");
        Ok(())
    }

    #[test]
    fn curly_brace_names() {
        let script = "let n = 'x'\nlet var_{n} = 7\necho var_x var_{n}";
        assert_eq!(run(script), vec!["7 7"]);
    }
}
