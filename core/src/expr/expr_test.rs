#[cfg(test)]
mod test {
    use anyhow::Result;

    use crate::exec::test_support::{errors, interp, run};
    use crate::expr::ops::arith;
    use crate::val::Value;

    fn eval_err(text: &str) -> String {
        let (mut interp, _log) = interp();
        match interp.eval_to_value(text) {
            Ok(v) => {
                interp.heap.release(v);
                panic!("expected an error from {text}")
            }
            Err(err) => err.to_string(),
        }
    }

    #[test]
    fn number_literals_and_arithmetic() -> Result<()> {
        let (mut interp, _log) = interp();
        let cases = [
            ("0x1F + 017 + 0b11", 49),
            ("1 + 2 * 3", 7),
            ("(1 + 2) * 3", 9),
            ("-2 * -3", 6),
            ("!0 + 1", 2),
            ("!'abc'", 1),
            ("- '5'", -5),
            ("'3' + '4'", 7),
            ("7 / 2", 3),
            ("-7 / 2", -3),
            ("7 % 3", 1),
            ("10 - 2 - 3", 5),
            ("9223372036854775807 + 1", i64::MIN),
        ];
        for (text, expected) in cases {
            assert_eq!(interp.eval_to_number(text)?, expected, "{text}");
        }
        assert_eq!(interp.eval_to_string("'ab' . 12 . 'c'")?, "ab12c");
        Ok(())
    }

    #[test]
    fn division_by_zero() -> Result<()> {
        let (mut interp, _log) = interp();
        assert_eq!(interp.eval_to_number("1 / 0")?, i64::MAX);
        assert_eq!(interp.eval_to_number("-1 / 0")?, -i64::MAX);
        assert_eq!(interp.eval_to_number("0 / 0")?, i64::MIN);
        assert_eq!(interp.eval_to_number("5 % 0")?, 0);
        assert_eq!(arith(b'*', 6, 7), 42);
        Ok(())
    }

    #[test]
    fn string_literals() -> Result<()> {
        let (mut interp, _log) = interp();
        assert_eq!(interp.eval_to_string(r#""a\tb\x41\101é""#)?, "a\tbAA\u{e9}");
        assert_eq!(interp.eval_to_string(r#""q\"q""#)?, "q\"q");
        assert_eq!(interp.eval_to_string("'it''s'")?, "it's");
        assert_eq!(interp.eval_to_string(r"'no\tescape'")?, r"no\tescape");
        Ok(())
    }

    #[test]
    fn comparisons() -> Result<()> {
        let (mut interp, _log) = interp();
        let cases = [
            ("'10' == 10", 1),
            ("'abc' == 'ABC'", 0),
            ("'abc' ==? 'ABC'", 1),
            ("'abc' ==# 'ABC'", 0),
            ("'b' > 'a'", 1),
            ("'10' < '9'", 1),
            ("10 < 9", 0),
            ("3 >= 3", 1),
            ("[1, 2] == [1, 2]", 1),
            ("[1, 'A'] ==? [1, 'a']", 1),
            ("{'a': 1} != {'a': 2}", 1),
            ("[1] is [1]", 0),
            ("1 is '1'", 0),
            ("1 isnot '1'", 1),
        ];
        for (text, expected) in cases {
            assert_eq!(interp.eval_to_number(text)?, expected, "{text}");
        }

        interp.source_str("let l = [1]\nlet m = l")?;
        assert!(interp.eval_to_bool("l is m")?);
        assert!(interp.eval_to_bool("function('call') == function('call')")?);
        Ok(())
    }

    #[test]
    fn ignorecase_option_sets_the_default() -> Result<()> {
        let (mut interp, _log) = interp();
        interp.source_str("let &ignorecase = 1")?;
        assert!(interp.eval_to_bool("'abc' == 'ABC'")?);
        assert!(!interp.eval_to_bool("'abc' ==# 'ABC'")?);
        assert!(interp.eval_to_bool("'ABC' =~ 'b'")?);
        Ok(())
    }

    #[test]
    fn comparison_errors() {
        assert_eq!(eval_err("[1] == 1"), "Can only compare List with List");
        assert_eq!(eval_err("[1] < [2]"), "Invalid operation for Lists");
        assert_eq!(eval_err("{} == 1"), "Can only compare Dictionary with Dictionary");
        assert_eq!(eval_err("{} > {}"), "Invalid operation for Dictionary");
        assert_eq!(eval_err("function('call') < 1"), "Invalid operation for Funcrefs");
    }

    #[test]
    fn pattern_matching() -> Result<()> {
        let (mut interp, _log) = interp();
        assert!(interp.eval_to_bool(r"'foobar' =~ 'o\+b'")?);
        assert!(!interp.eval_to_bool("'foo' !~ '^f'")?);
        assert!(interp.eval_to_bool("'FOO' =~? 'foo'")?);
        assert!(!interp.eval_to_bool("'FOO' =~# 'foo'")?);
        assert!(interp.eval_to_bool(r"'FOO' =~ '\cfoo'")?);
        assert!(interp.eval_to_bool("'a(b)' =~ '(b)'")?);
        assert_eq!(interp.regex_match_from("foo", "o", 2, false)?, Some((2, 3)));
        assert_eq!(eval_err(r"'x' =~ '\('"), r"Invalid pattern: \(");
        Ok(())
    }

    #[test]
    fn ternary_and_logic() -> Result<()> {
        let (mut interp, _log) = interp();
        assert_eq!(interp.eval_to_string("1 ? 'a' : 'b'")?, "a");
        assert_eq!(interp.eval_to_string("0 ? 'a' : 'b'")?, "b");
        assert_eq!(interp.eval_to_number("0 ? 1 : 0 ? 2 : 3")?, 3);
        assert_eq!(interp.eval_to_number("1 && 2")?, 1);
        assert_eq!(interp.eval_to_number("0 || ''")?, 0);
        assert_eq!(interp.eval_to_number("0 || 0 || 7")?, 1);
        assert_eq!(eval_err("1 ? 2"), "Missing ':' after '?': ");
        Ok(())
    }

    #[test]
    fn short_circuit_skips_evaluation() -> Result<()> {
        let (mut interp, log) = interp();
        interp.source_str("function Noisy()\n  echo 'called'\n  return 1\nendfunction")?;
        assert_eq!(interp.eval_to_number("0 && Noisy()")?, 0);
        assert_eq!(interp.eval_to_number("1 || Noisy()")?, 1);
        assert_eq!(interp.eval_to_number("1 ? 2 : Noisy()")?, 2);
        // Undefined names are not looked up in the skipped part.
        assert_eq!(interp.eval_to_number("0 && nosuch[3].key")?, 0);
        assert_eq!(interp.eval_to_number("1 ? 5 : nosuch")?, 5);
        assert!(log.borrow().messages.is_empty());

        assert_eq!(interp.eval_to_number("1 && Noisy()")?, 1);
        assert_eq!(log.borrow().messages, vec!["called"]);
        Ok(())
    }

    #[test]
    fn string_subscripts() -> Result<()> {
        let (mut interp, _log) = interp();
        let cases = [
            ("'hello'[1]", "e"),
            ("'hello'[1:3]", "ell"),
            ("'hello'[-2:]", "lo"),
            ("'hello'[:1]", "he"),
            ("'hello'[9]", ""),
            ("'hello'[-1]", ""),
            ("'hello'[3:1]", ""),
            ("1234[2]", "3"),
        ];
        for (text, expected) in cases {
            assert_eq!(interp.eval_to_string(text)?, expected, "{text}");
        }
        Ok(())
    }

    #[test]
    fn string_subscripts_count_bytes() -> Result<()> {
        let (mut interp, _log) = interp();
        // 'é' is the two bytes C3 A9
        assert_eq!(interp.eval_to_value("'héllo'[1]")?, Value::String(vec![0xC3]));
        assert_eq!(interp.eval_to_value("'héllo'[1:2]")?, Value::str("é"));
        assert_eq!(interp.eval_to_string("'héllo'[0:1] . 'héllo'[2:]")?, "héllo");
        assert_eq!(interp.eval_to_number("'héllo'[0:1] . 'héllo'[2:] == 'héllo'")?, 1);

        interp.source_str("let s = 'é'\nlet head = s[0]\nlet head .= s[1]")?;
        assert_eq!(interp.eval_to_value("head")?, Value::str("é"));
        Ok(())
    }

    #[test]
    fn list_and_dict_subscripts() -> Result<()> {
        let (mut interp, _log) = interp();
        assert_eq!(interp.eval_to_number("[1, 2, 3][-1]")?, 3);
        assert_eq!(interp.eval_to_number("{'a': {'b': 5}}.a.b")?, 5);
        assert_eq!(interp.eval_to_number("{'a': 1}['a']")?, 1);
        assert_eq!(interp.eval_to_number("{1: 'one'}[1] == 'one'")?, 1);

        let script = "echo [1, 2, 3][1:] [1, 2, 3][5:] [1, 2, 3][2:1] [1, 2, 3][:-2]";
        assert_eq!(run(script), vec!["[2, 3] [] [] [1, 2]"]);
        Ok(())
    }

    #[test]
    fn slices_are_copies() {
        let script = "let l = [1, 2, 3]\nlet s = l[:]\nlet s[0] = 9\necho l s";
        assert_eq!(run(script), vec!["[1, 2, 3] [9, 2, 3]"]);
    }

    #[test]
    fn subscript_errors() {
        assert_eq!(eval_err("[1, 2, 3][5]"), "List index out of range: 5");
        assert_eq!(eval_err("[1, 2, 3][-4]"), "List index out of range: -4");
        assert_eq!(eval_err("{'a': 1}.z"), "Key not present in Dictionary: z");
        assert_eq!(eval_err("{'a': 1}[1:2]"), "Cannot use [:] with a Dictionary");
        assert_eq!(eval_err("function('call')[0]"), "Cannot index a Funcref");
        assert_eq!(eval_err("[1][0"), "Missing ']': ");
    }

    #[test]
    fn list_plus_list_is_a_new_list() {
        let script = "let a = [1]\nlet b = a + [2]\nlet b[0] = 5\necho a b";
        assert_eq!(run(script), vec!["[1] [5, 2]"]);
        assert_eq!(errors("echo [1] - [1]"), vec!["Using a List as a Number"]);
    }

    #[test]
    fn list_literal_errors() {
        assert_eq!(eval_err("[1, "), "Missing end of List ']': [1, ");
        assert_eq!(eval_err("[1 2]"), "Missing comma in List: 2]");
        assert_eq!(eval_err("[1, 2"), "Missing comma in List: ");
    }

    #[test]
    fn dict_literal_errors() {
        assert_eq!(eval_err("{'k': 1, 'k': 2}"), "Duplicate key in Dictionary: \"k\"");
        assert_eq!(eval_err("{'a' 1}"), "Missing colon in Dictionary: 1}");
        assert_eq!(eval_err("{'a': 1,"), "Missing end of Dictionary '}': {'a': 1,");
        assert_eq!(eval_err("{[]: 1}"), "Using a List as a String");
        assert_eq!(eval_err("{'': 1}"), "Cannot use empty key for Dictionary");
        assert_eq!(eval_err("{'a': [1], '': 2}"), "Cannot use empty key for Dictionary");
    }

    #[test]
    fn rejected_dict_literal_frees_its_items() -> Result<()> {
        let (mut interp, _log) = interp();
        let lists = interp.heap.live_lists();
        let dicts = interp.heap.live_dicts();
        assert!(interp.eval_to_value("{'a': [1, 2], '': 3}").is_err());
        assert_eq!(interp.heap.live_lists(), lists);
        assert_eq!(interp.heap.live_dicts(), dicts);
        Ok(())
    }

    #[test]
    fn syntax_errors() {
        assert_eq!(eval_err("1 2"), "Trailing characters: 2");
        assert_eq!(eval_err(""), "Expected an expression");
        assert_eq!(eval_err("1 +"), "Expected an expression");
        assert_eq!(eval_err("'abc"), "Missing quote: 'abc");
        assert_eq!(eval_err("\"abc"), "Missing quote: \"abc");
        assert_eq!(eval_err("(1"), "Missing ')': ");
        assert_eq!(eval_err("nosuch"), "Undefined variable: nosuch");
    }

    #[test]
    fn deep_nesting_is_an_error() {
        let handle = std::thread::Builder::new()
            .stack_size(256 << 20)
            .spawn(|| {
                let text = format!("{}1{}", "(".repeat(1100), ")".repeat(1100));
                eval_err(&text)
            })
            .expect("spawn");
        assert_eq!(handle.join().expect("join"), "Expression too recursive");
    }

    #[test]
    fn options_environment_and_registers() -> Result<()> {
        let (mut interp, _log) = interp();
        assert_eq!(interp.eval_to_number("&tabstop")?, 8);
        assert_eq!(interp.eval_to_number("&g:shiftwidth")?, 8);
        assert_eq!(interp.eval_to_string("$VEX_EXPR_TEST_SURELY_UNSET")?, "");
        assert_eq!(interp.eval_to_string("@z")?, "");
        interp.source_str("let @z = 'reg'\nlet $VEX_EXPR_TEST_SET = 'env'")?;
        assert_eq!(interp.eval_to_string("@z . $VEX_EXPR_TEST_SET")?, "regenv");
        assert_eq!(eval_err("&nosuch"), "Unknown option: nosuch");
        assert_eq!(eval_err("&"), "Option name missing: &");
        Ok(())
    }

    #[test]
    fn values_keep_their_type() -> Result<()> {
        let (mut interp, _log) = interp();
        assert_eq!(interp.eval_to_value("'x'")?, Value::str("x"));
        assert_eq!(interp.eval_to_value("0x10")?, Value::Number(16));
        let list = interp.eval_to_value("[]")?;
        assert!(matches!(list, Value::List(_)));
        interp.heap.release(list);
        Ok(())
    }
}
