#[cfg(test)]
mod test {
    use anyhow::Result;

    use crate::exec::test_support::{errors, interp, run};
    use crate::host::OptionScope;
    use crate::val::Value;

    #[test]
    fn compound_assignment() {
        let script = r#"
let n = 5
let n -= 2
let n += 10
let s = 'a'
let s .= 'b'
let s .= 3
let l = [1]
let l += [2, 3]
echo n s l
"#;
        assert_eq!(run(script), vec!["13 ab3 [1, 2, 3]"]);
    }

    #[test]
    fn list_unpacking() {
        let script = r#"
let [a, b] = [1, 2]
let [x; rest] = ['p', 'q', 'r']
let [only; none] = [0]
echo a b x rest none
"#;
        assert_eq!(run(script), vec!["1 2 p ['q', 'r'] []"]);
    }

    #[test]
    fn list_unpacking_errors() {
        assert_eq!(errors("let [a, b] = [1]"), vec!["More targets than List items"]);
        assert_eq!(errors("let [a, b] = [1, 2, 3]"), vec!["Less targets than List items"]);
        assert_eq!(errors("let [a, b] = 5"), vec!["List required"]);
        assert_eq!(errors("let [a; b; c] = [1, 2, 3]"), vec!["Double ; in list of variables: ; c] = [1, 2, 3]"]);
    }

    #[test]
    fn unpacking_with_compound_operator() {
        let script = "let [a, b] = [1, 5]\nlet [a, b] += [2, -1]\nlet [c, d] = ['s', 't']\nlet [c, d] .= ['1', '2']\necho a b c d";
        assert_eq!(run(script), vec!["3 4 s1 t2"]);
    }

    #[test]
    fn items_and_entries() {
        let script = r#"
let d = {}
let d.x = 1
let d['y'] = 2
let d.x += 5
let l = [[0, 0], 1]
let l[0][1] = 'deep'
let l[-1] = 'last'
echo d.x d.y l
"#;
        assert_eq!(run(script), vec!["6 2 [[0, 'deep'], 'last']"]);
    }

    #[test]
    fn list_range_assignment() {
        let script = "let l = [1, 2, 3, 4]\nlet l[1:2] = ['a', 'b']\necho l\nlet l[2:] = [8, 9]\necho l";
        assert_eq!(run(script), vec!["[1, 'a', 'b', 4]", "[1, 'a', 8, 9]"]);
        assert_eq!(
            errors("let l = [1, 2, 3]\nlet l[0:1] = [9]"),
            vec!["List value has not enough items"]
        );
        assert_eq!(
            errors("let l = [1, 2, 3]\nlet l[0:1] = [7, 8, 9]"),
            vec!["List value has more items than target"]
        );
    }

    #[test]
    fn assignment_errors() {
        assert_eq!(errors("let d = {}\nlet d.x += 1"), vec!["Wrong variable type for +="]);
        assert_eq!(errors("let l = [1]\nlet l[5] = 1"), vec!["List index out of range: 5"]);
        assert_eq!(errors("let n = 1\nlet n[0] = 1"), vec!["Can only index a List or Dictionary"]);
        assert_eq!(errors("let d = {}\nlet d[''] = 1"), vec!["Cannot use empty key for Dictionary"]);
        assert_eq!(errors("let d = {}\nlet d[''] = [1]\necho d"), vec!["Cannot use empty key for Dictionary"]);
        assert_eq!(errors("let f = function('function')"), vec![
            "Funcref variable name must start with a capital: f"
        ]);
    }

    #[test]
    fn empty_key_leaves_dict_unchanged() -> Result<()> {
        let (mut interp, _log) = interp();
        let lists = interp.heap.live_lists();
        assert!(interp.source_str("let d = {'a': 1}\nlet d[''] = [2]").is_err());
        let d = interp.eval_to_value("d")?;
        assert_eq!(interp.display(&d), "{'a': 1}");
        interp.heap.release(d);
        assert_eq!(interp.heap.live_lists(), lists);
        Ok(())
    }

    #[test]
    fn options() -> Result<()> {
        let (mut interp, log) = interp();
        interp.source_str(
            "let &tabstop = 4\nlet &tabstop += 2\nlet &filetype = 'vi'\nlet &filetype .= 'm'\necho &tabstop &filetype",
        )?;
        assert_eq!(log.borrow().messages, vec!["6 vim"]);

        interp.source_str("let &l:shiftwidth = 2")?;
        assert_eq!(interp.host().get_option("shiftwidth", OptionScope::Local), Some(Value::Number(2)));
        assert_eq!(interp.host().get_option("shiftwidth", OptionScope::Global), Some(Value::Number(8)));

        let err = interp.source_str("let &filetype += 1").unwrap_err();
        assert_eq!(err.to_string(), "Wrong variable type for +=");
        let err = interp.source_str("let &nosuchoption = 1").unwrap_err();
        assert_eq!(err.to_string(), "Unknown option: nosuchoption");
        Ok(())
    }

    #[test]
    fn environment_and_registers() {
        let script = r#"
let $VEX_LET_TEST = 'x'
let $VEX_LET_TEST .= 'y'
let @a = 'one'
let @a .= 'two'
echo $VEX_LET_TEST @a @"
"#;
        assert_eq!(run(script), vec!["xy onetwo onetwo"]);
        assert_eq!(errors("let @a += 1"), vec!["Wrong variable type for +="]);
    }

    #[test]
    fn listing_variables() {
        let script = "let n = 5\nlet s = 'hi'\nlet l = [1, 'a']\nlet n s l";
        assert_eq!(
            run(script),
            vec![
                format!("n{}#5", " ".repeat(21)),
                format!("s{}{}", " ".repeat(21), " hi"),
                format!("l{}[1, 'a']", " ".repeat(21)),
            ]
        );
        assert_eq!(errors("let nosuch"), vec!["Undefined variable: nosuch"]);
    }

    #[test]
    fn listing_all_variables_includes_scope_prefixes() -> Result<()> {
        let (mut interp, log) = interp();
        interp.source_str("let g:top = 1\nlet s:mine = 2\nlet")?;
        let messages = log.borrow().messages.clone();
        assert!(messages.iter().any(|m| m.starts_with("top ")));
        assert!(messages.iter().any(|m| m.starts_with("s:mine ")));
        assert!(messages.iter().any(|m| m.starts_with("v:version ")));
        Ok(())
    }

    #[test]
    fn unlet_variables_items_and_entries() {
        let script = r#"
let x = 1
unlet x
let d = {'a': 1, 'b': 2}
unlet d.a
let l = [1, 2, 3, 4]
unlet l[0] l[-1]
let m = [1, 2, 3, 4]
unlet m[1:2]
echo d l m
"#;
        assert_eq!(run(script), vec!["{'b': 2} [2, 3] [1, 4]"]);
        assert_eq!(errors("let x = 1\nunlet x\necho x"), vec!["Undefined variable: x"]);
    }

    #[test]
    fn unlet_missing_variable() {
        assert_eq!(errors("unlet nosuch"), vec!["No such variable: \"nosuch\""]);
        assert!(errors("unlet! nosuch").is_empty());
        assert_eq!(errors("let d = {}\nunlet d.k"), vec!["Key not present in Dictionary: k"]);
        assert_eq!(errors("unlet"), vec!["Argument required"]);
    }

    #[test]
    fn read_only_variables() {
        assert_eq!(errors("let v:count = 1"), vec!["Cannot change read-only variable \"v:count\""]);
        assert_eq!(errors("let b:changedtick = 1"), vec!["Cannot change read-only variable \"b:changedtick\""]);
        assert_eq!(errors("let v:nosuch = 1"), vec!["Illegal variable name: v:nosuch"]);
        // v: variables keep their type.
        assert_eq!(run("let v:errmsg = 42\necho v:errmsg + 1"), vec!["43"]);
        assert_eq!(errors("let v:oldfiles = 1"), vec!["Variable type mismatch for: v:oldfiles"]);
    }

    #[test]
    fn lockvar_protects_values() {
        let script = "let l = [1, 2]\nlockvar l\nlet l[0] = 5\nlet l = 3";
        assert_eq!(errors(script), vec!["Value is locked: l[0]", "Value is locked: l"]);

        let script = "let l = [1, 2]\nlockvar l\nunlockvar l\nlet l[0] = 5\necho l";
        assert_eq!(run(script), vec!["[5, 2]"]);
    }

    #[test]
    fn lockvar_depth_one_leaves_items_alone() {
        let script = "let d = {'a': 1}\nlockvar 1 d\nlet d.a = 5\nlet d.new = 1\necho d";
        assert_eq!(errors(script), vec!["Value is locked: d.new"]);
        assert_eq!(run(script), vec!["{'a': 5}"]);
    }

    #[test]
    fn lockvar_bang_locks_nested_values() {
        let script = "let l = [[[1]]]\nlockvar! l\nlet l[0][0][0] = 2";
        assert_eq!(errors(script), vec!["Value is locked: l[0][0][0]"]);
        assert_eq!(errors("lockvar nosuch"), vec!["No such variable: \"nosuch\""]);
    }

    #[test]
    fn assign_from_outside() -> Result<()> {
        let (mut interp, _log) = interp();
        interp.assign("g:greeting", &Value::str("hello"), crate::interp::AssignOp::Set)?;
        interp.assign("g:greeting", &Value::str("!"), crate::interp::AssignOp::Concat)?;
        assert_eq!(interp.eval_to_string("greeting")?, "hello!");
        Ok(())
    }
}
