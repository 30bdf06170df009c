#[cfg(test)]
mod test {
    use anyhow::Result;

    use crate::exec::test_support::{errors, interp, run};
    use crate::func::{FuncFlags, FuncHeader};
    use crate::val::Value;

    #[test]
    fn header_parsing() -> Result<()> {
        let header = FuncHeader::parse("Add(a, b) abort range")?.expect("header");
        assert_eq!(header.name, "Add");
        assert_eq!(header.params, vec!["a", "b"]);
        assert!(!header.varargs);
        assert_eq!(
            header.flags,
            FuncFlags {
                abort: true,
                range: true,
                dict: false
            }
        );

        let header = FuncHeader::parse("s:Log(msg, ...) dict \" comment")?.expect("header");
        assert_eq!(header.params, vec!["msg"]);
        assert!(header.varargs);
        assert!(header.flags.dict);

        let header = FuncHeader::parse("Empty()")?.expect("header");
        assert!(header.params.is_empty());

        assert_eq!(FuncHeader::parse("JustAName")?, None);
        Ok(())
    }

    #[test]
    fn header_errors() {
        let cases = [
            ("(a)", "Function name required"),
            ("F(a", "Missing ')': F(a"),
            ("F(..., a)", "Illegal argument: a"),
            ("F(1a)", "Illegal argument: 1a"),
            ("F(firstline)", "Illegal argument: firstline"),
            ("F(a, a)", "Duplicate argument name: a"),
            ("F() fast", "Trailing characters: fast"),
        ];
        for (text, message) in cases {
            let err = FuncHeader::parse(text).unwrap_err();
            assert_eq!(err.to_string(), message, "{text}");
        }
    }

    #[test]
    fn signature_and_registry_names() -> Result<()> {
        let (mut interp, _log) = interp();
        interp.source_str("function Zed(...) dict\nendfunction\nfunction Alpha(x, ...)\nendfunction")?;
        let names = interp.funcs.names();
        assert_eq!(names, vec!["Alpha", "Zed"]);
        let zed = interp.funcs.get("Zed").expect("Zed defined");
        assert_eq!(zed.signature(), "function Zed(...) dict");
        assert!(!zed.is_numbered());
        let alpha = interp.funcs.get("Alpha").expect("Alpha defined");
        assert_eq!(alpha.signature(), "function Alpha(x, ...)");
        Ok(())
    }

    #[test]
    fn script_local_names_need_a_script() -> Result<()> {
        let (mut interp, _log) = interp();
        let err = interp.call_function("s:F", &[], false).unwrap_err();
        assert_eq!(err.to_string(), "Using <SID> not in a script context: s:F");

        interp.source_str("function s:Hidden()\n  return 1\nendfunction")?;
        assert!(interp.function_exists("<SNR>1_Hidden"));
        assert_eq!(interp.call_function("<SNR>1_Hidden", &[], false)?, Value::Number(1));
        Ok(())
    }

    #[test]
    fn function_in_use_cannot_be_replaced_or_deleted() {
        let script = "function! R()\n  function! R()\n    return 2\n  endfunction\nendfunction\ncall R()";
        assert_eq!(errors(script), vec!["Cannot redefine function R: It is in use"]);

        let script = "function D()\n  delfunction D\nendfunction\ncall D()";
        assert_eq!(errors(script), vec!["Cannot delete function D: It is in use"]);
    }

    #[test]
    fn function_and_call_builtins() {
        let script = r#"
function Add(a, b)
  return a:a + a:b
endfunction
let d = {'base': 10}
function d.plus(n)
  return self.base + a:n
endfunction
echo call('Add', [1, 2]) call(function('Add'), [3, 4]) call(d.plus, [5], d)
"#;
        assert_eq!(run(script), vec!["3 7 15"]);
        assert_eq!(errors("echo function('Nope')"), vec!["Unknown function: Nope"]);
        assert_eq!(errors("echo call('Add', 1)"), vec!["List required"]);
        assert_eq!(errors("echo call('nosuch', [])"), vec!["Unknown function: nosuch"]);
    }

    #[test]
    fn call_resolves_script_local_names() {
        let script = "function s:Twice(n)\n  return a:n * 2\nendfunction\n\
                      echo call('s:Twice', [4]) call('<SID>Twice', [5]) call(function('s:Twice'), [6])";
        assert_eq!(run(script), vec!["8 10 12"]);
    }

    #[test]
    fn builtin_arity_is_checked() {
        assert_eq!(errors("echo function()"), vec!["Not enough arguments for function: function"]);
        assert_eq!(
            errors("echo call('F', [], {}, 1)"),
            vec!["Too many arguments for function: call"]
        );
    }

    #[test]
    fn escaped_locals_keep_the_frame_until_released() -> Result<()> {
        let (mut interp, _log) = interp();
        let script = r#"
function MakeScope()
  let l:n = 1
  return l:
endfunction
let scope = MakeScope()
"#;
        interp.source_str(script)?;
        assert_eq!(interp.kept_frame_count(), 1);
        assert_eq!(interp.eval_to_number("scope.n")?, 1);

        interp.source_str("unlet scope")?;
        assert_eq!(interp.kept_frame_count(), 0);
        Ok(())
    }

    #[test]
    fn frames_that_do_not_escape_are_freed_at_once() -> Result<()> {
        let (mut interp, _log) = interp();
        interp.source_str("function Plain(x)\n  let y = [a:x]\n  return y[0]\nendfunction\ncall Plain(3)")?;
        assert_eq!(interp.kept_frame_count(), 0);
        Ok(())
    }

    #[test]
    fn cycles_are_collected_at_top_level() -> Result<()> {
        let (mut interp, _log) = interp();
        interp.source_str("let d = {}\nlet d.me = d\nlet keep = [1]\nunlet d")?;
        assert_eq!(interp.collect_garbage(), 1);
        assert_eq!(interp.collect_garbage(), 0);
        assert_eq!(interp.eval_to_number("keep[0]")?, 1);
        Ok(())
    }
}
