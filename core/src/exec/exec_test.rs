#[cfg(test)]
mod test {
    use std::fs;

    use anyhow::Result;

    use crate::config::InterpConfig;
    use crate::exec::test_support::{errors, interp, interp_with, run};
    use crate::exec::{LineSource, Lines};
    use crate::host::StandaloneHost;
    use crate::interp::Interp;
    use crate::val::Value;

    #[test]
    fn if_elseif_else_takes_one_branch() {
        let script = r#"
let x = 2
if x == 1
  echo "one"
elseif x == 2
  echo "two"
elseif x > 1
  echo "also"
else
  echo "other"
endif
"#;
        assert_eq!(run(script), vec!["two"]);
    }

    #[test]
    fn nested_if_inside_skipped_branch_is_not_run() {
        let script = r#"
if 0
  if 1
    echo "inner"
  else
    echo "inner else"
  endif
  echo nosuch_variable
else
  echo "outer else"
endif
"#;
        assert_eq!(run(script), vec!["outer else"]);
        assert!(errors(script).is_empty());
    }

    #[test]
    fn failing_condition_takes_no_branch() {
        let script = "if nosuch\n  echo 'a'\nelse\n  echo 'b'\nendif\necho 'after'";
        assert_eq!(run(script), vec!["after"]);
        assert_eq!(errors(script), vec!["Undefined variable: nosuch"]);
    }

    #[test]
    fn while_with_break_and_continue() {
        let script = r#"
let i = 0
let out = []
while i < 10
  let i += 1
  if i % 2 == 0
    continue
  endif
  if i > 7
    break
  endif
  let out += [i]
endwhile
echo out i
"#;
        assert_eq!(run(script), vec!["[1, 3, 5, 7] 9"]);
    }

    #[test]
    fn nested_loops_break_only_the_inner_one() {
        let script = r#"
let s = ''
for a in [1, 2]
  for b in [1, 2, 3]
    if b == 2
      break
    endif
    let s .= a . b . ' '
  endfor
endfor
echo s
"#;
        assert_eq!(run(script), vec!["11 21 "]);
    }

    #[test]
    fn for_unpacks_list_items() {
        let script = "for [k, v] in [[1, 'a'], [2, 'b']]\n  echo k . v\nendfor";
        assert_eq!(run(script), vec!["1a", "2b"]);

        let script = "for [first; rest] in [[1, 2, 3]]\n  echo first rest\nendfor";
        assert_eq!(run(script), vec!["1 [2, 3]"]);
    }

    #[test]
    fn for_skips_items_removed_while_iterating() {
        let script = r#"
let l = [1, 2, 3, 4]
for x in l
  if x == 1
    unlet l[1]
  endif
  echo x
endfor
echo l
"#;
        assert_eq!(run(script), vec!["1", "3", "4", "[1, 3, 4]"]);
    }

    #[test]
    fn for_requires_a_list() {
        assert_eq!(errors("for x in 5\nendfor"), vec!["List required"]);
        assert_eq!(errors("for x on [1]\nendfor"), vec!["Missing \"in\" after :for: x on [1]"]);
    }

    #[test]
    fn loop_over_empty_list_runs_nothing() {
        assert_eq!(run("for x in []\n  echo x\nendfor\necho 'done'"), vec!["done"]);
    }

    #[test]
    fn block_structure_errors() {
        assert_eq!(errors("endif"), vec![":endif without :if"]);
        assert_eq!(errors("else"), vec![":else without :if"]);
        assert_eq!(errors("elseif 1"), vec![":elseif without :if"]);
        assert_eq!(errors("if 1\nelse\nelse\nendif"), vec!["Multiple :else"]);
        assert_eq!(errors("if 1\nelse\nelseif 1\nendif"), vec![":elseif after :else"]);
        assert_eq!(errors("if 1\necho 1"), vec!["Missing :endif"]);
        assert_eq!(errors("while 0"), vec!["Missing :endwhile"]);
        assert_eq!(errors("endwhile"), vec![":endwhile without :while"]);
        assert_eq!(errors("endfor"), vec![":endfor without :for"]);
        assert_eq!(errors("while 0\nendfor"), vec!["Using :endfor with :while", "Missing :endwhile"]);
        assert_eq!(errors("break"), vec![":break without :while or :for"]);
        assert_eq!(errors("continue"), vec![":continue without :while or :for"]);
        assert_eq!(errors("return 1"), vec![":return not inside a function"]);
        assert_eq!(errors("endfunction"), vec![":endfunction not inside a function"]);
    }

    #[test]
    fn unknown_command_and_bad_arguments() {
        assert_eq!(errors("frobnicate"), vec!["Not an editor command: frobnicate"]);
        assert_eq!(errors("let x ="), vec!["Argument required"]);
        assert_eq!(errors("echo 1 +"), vec!["Expected an expression"]);
        assert_eq!(errors("1echo 'x'"), vec!["No range allowed"]);
        assert_eq!(errors("5call F()"), vec!["Invalid range"]);
    }

    #[test]
    fn script_continues_after_an_error() {
        let script = "echo nosuch\necho 'next'";
        assert_eq!(run(script), vec!["next"]);
        assert_eq!(errors(script), vec!["Undefined variable: nosuch"]);
    }

    #[test]
    fn source_returns_the_first_error() {
        let (mut interp, log) = interp();
        let err = interp.source_str("echo nosuch\nlet 1x = 2\necho 'ok'").unwrap_err();
        assert_eq!(err.to_string(), "Undefined variable: nosuch");
        assert_eq!(log.borrow().errors.len(), 2);
        assert_eq!(log.borrow().messages, vec!["ok"]);
        assert_eq!(interp.error_count(), 2);
    }

    #[test]
    fn commands_may_be_abbreviated() {
        let script = r#"
:let x = 0
wh x < 2
  let x += 1
endw
fu Show(v)
  ec a:v
endf
cal Show(x)
for i in [1]
  echon 'a'
endfo
"#;
        assert_eq!(run(script), vec!["2a"], ":echon continues the message");
        assert_eq!(errors("e 'x'"), vec!["Not an editor command: e 'x'"]);
    }

    #[test]
    fn comments_and_blank_lines_are_skipped() {
        let script = "\" a comment\n\n   \necho 1\n:  \"colon comment";
        assert_eq!(run(script), vec!["1"]);
    }

    #[test]
    fn line_continuation_joins_lines() {
        let script = "let l = [1,\n      \\ 2,\n      \\ 3]\necho l";
        assert_eq!(run(script), vec!["[1, 2, 3]"]);

        let mut lines = Lines::from_text("echo 1\n  \\ + 2\necho 3");
        assert_eq!(lines.next_line().as_deref(), Some("echo 1 + 2"));
        assert_eq!(lines.joined(), 1);
        assert_eq!(lines.next_line().as_deref(), Some("echo 3"));
        assert_eq!(lines.joined(), 0);
        assert_eq!(lines.next_line(), None);
    }

    #[test]
    fn continued_lines_keep_their_line_numbers() {
        let script = r#"
function Sum(a, b)
  let total = a:a
        \ + a:b
  return total
endfunction
echo Sum(1, 2)
function Sum
"#;
        assert_eq!(
            run(script),
            vec![
                "3",
                "   function Sum(a, b)",
                "  1    let total = a:a + a:b",
                "  3    return total",
                "   endfunction",
            ]
        );
    }

    #[test]
    fn loops_with_continued_headers() {
        let script = r#"
let i = 0
while i <
      \ 3
  let i += 1
endwhile
function Count(l)
  let n = 0
  for x in
        \ a:l
    let n += x
  endfor
  return n
endfunction
echo i Count([1, 2, 3])
"#;
        assert_eq!(run(script), vec!["3 6"]);
    }

    #[test]
    fn echo_echon_and_echoerr() {
        let script = "echo 'a' 1 [2]\necho 'b'\nechon 'c' 'd'\necho {'k': 'v'}";
        assert_eq!(run(script), vec!["a 1 [2]", "bcd", "{'k': 'v'}"]);
        assert_eq!(errors("echoerr 'bad' 42"), vec!["bad 42"]);
    }

    #[test]
    fn execute_runs_built_commands() {
        let script = r#"
let name = 'x'
execute 'let ' . name . ' = 5'
exe "echo" x + 1
execute "if 1\necho 'multi'\nendif"
"#;
        assert_eq!(run(script), vec!["6", "multi"]);
        assert_eq!(errors("execute 'nosuch'"), vec!["Not an editor command: nosuch"]);
    }

    #[test]
    fn functions_and_recursion() {
        let script = r#"
function Fact(n)
  if a:n <= 1
    return 1
  endif
  return a:n * Fact(a:n - 1)
endfunction
echo Fact(5)
let F = function('Fact')
echo F(4)
"#;
        assert_eq!(run(script), vec!["120", "24"]);
    }

    #[test]
    fn function_without_return_gives_zero() {
        let script = "function Nothing()\n  let x = 1\nendfunction\necho Nothing()";
        assert_eq!(run(script), vec!["0"]);
    }

    #[test]
    fn locals_do_not_leak() {
        let script = r#"
let x = 'global'
function Shadow()
  let x = 'local'
  let g:seen = x
endfunction
call Shadow()
echo x g:seen
"#;
        assert_eq!(run(script), vec!["global local"]);
    }

    #[test]
    fn varargs() {
        let script = r#"
function Count(first, ...)
  let s = a:first . ':' . a:0
  for v in a:000
    let s .= ',' . v
  endfor
  if a:0 > 1
    let s .= ';' . a:2
  endif
  return s
endfunction
echo Count('x')
echo Count('x', 1, 2)
"#;
        assert_eq!(run(script), vec!["x:0", "x:2,1,2;2"]);
    }

    #[test]
    fn arguments_are_read_only() {
        let script = "function F(a)\n  let a:a = 2\nendfunction\ncall F(1)";
        assert_eq!(errors(script), vec!["Cannot change read-only variable \"a:a\""]);
    }

    #[test]
    fn arity_errors() {
        let script = "function Two(a, b)\nendfunction\ncall Two(1)\ncall Two(1, 2, 3)";
        assert_eq!(
            errors(script),
            vec![
                "Not enough arguments for function: Two",
                "Too many arguments for function: Two",
            ]
        );
    }

    #[test]
    fn error_inside_function_continues_without_abort() {
        let script = r#"
function F()
  let x = nosuch
  echo 'after'
  return 5
endfunction
echo F()
"#;
        assert_eq!(run(script), vec!["after", "5"]);
        assert_eq!(errors(script), vec!["Undefined variable: nosuch"]);
    }

    #[test]
    fn abort_function_returns_minus_one() {
        let script = r#"
function Fail() abort
  let x = nosuch
  echo 'not reached'
  return 1
endfunction
let r = Fail()
echo r
"#;
        assert_eq!(run(script), vec!["-1"]);
        assert_eq!(errors(script), vec!["Undefined variable: nosuch"]);
    }

    #[test]
    fn recursion_is_limited_by_maxfuncdepth() {
        let config = InterpConfig {
            max_func_depth: 10,
            ..InterpConfig::default()
        };
        let (mut interp, log) = interp_with(config);
        let _ = interp.source_str("function R(n)\n  return R(a:n + 1)\nendfunction\ncall R(0)");
        let errors = log.borrow().errors.clone();
        assert_eq!(errors, vec!["Function call depth is higher than 'maxfuncdepth'"]);
    }

    #[test]
    fn define_errors() {
        assert_eq!(
            errors("function lower()\nendfunction"),
            vec!["Function name must start with a capital or contain a colon: lower"]
        );
        assert_eq!(
            errors("function F()\nendfunction\nfunction F()\nendfunction"),
            vec!["Function F already exists, add ! to replace it"]
        );
        assert!(errors("function F()\nendfunction\nfunction! F()\nendfunction").is_empty());
        assert_eq!(errors("function F()\necho 1"), vec!["Missing :endfunction"]);
        assert_eq!(errors("function F(a, a)\nendfunction"), vec!["Duplicate argument name: a"]);
        assert_eq!(errors("function Nope"), vec!["Undefined function: Nope"]);
        assert_eq!(errors("delfunction Nope"), vec!["Undefined function: Nope"]);
        assert_eq!(errors("call Nope()"), vec!["Unknown function: Nope"]);
        assert_eq!(errors("call Nope"), vec!["Missing parentheses: Nope"]);
    }

    #[test]
    fn function_body_is_not_run_when_defined_in_skipped_code() {
        let script = "if 0\nfunction F()\n  echo 'x'\nendfunction\nendif\ncall F()";
        assert_eq!(errors(script), vec!["Unknown function: F"]);
    }

    #[test]
    fn nested_function_definition() {
        let script = r#"
function Outer()
  function Inner()
    return 'inner'
  endfunction
  return 'outer'
endfunction
echo Outer()
echo Inner()
"#;
        assert_eq!(run(script), vec!["outer", "inner"]);
    }

    #[test]
    fn delfunction_removes_function() {
        let script = "function F()\nendfunction\ndelfunction F\ncall F()";
        assert_eq!(errors(script), vec!["Unknown function: F"]);
    }

    #[test]
    fn function_listing() {
        let script = r#"
function Add(a, b) abort
  return a:a + a:b
endfunction
function Vararg(...) range
endfunction
function
function Add
"#;
        assert_eq!(
            run(script),
            vec![
                "function Add(a, b) abort",
                "function Vararg(...) range",
                "   function Add(a, b) abort",
                "  1    return a:a + a:b",
                "   endfunction",
            ]
        );
    }

    #[test]
    fn dict_functions_get_self() {
        let script = r#"
let d = {'n': 3}
function d.get() dict
  return self.n
endfunction
function d.twice()
  return self.get() * 2
endfunction
echo d.get() d.twice()
call d.twice()
call d['get']()
"#;
        assert_eq!(run(script), vec!["3 6"]);
        assert!(errors(script).is_empty());
    }

    #[test]
    fn dict_function_needs_a_dictionary() {
        let script = "function F() dict\n  return 1\nendfunction\ncall F()";
        assert_eq!(errors(script), vec!["Using a Dictionary function without a Dictionary: F"]);

        let script = "let d = {}\nfunction d.f()\nendfunction\nfunction d.f()\nendfunction";
        assert_eq!(errors(script), vec!["Dictionary entry already exists"]);
    }

    #[test]
    fn numbered_function_is_deleted_with_its_last_reference() -> Result<()> {
        let (mut interp, _log) = interp();
        interp.source_str("let d = {}\nfunction d.f()\n  return 7\nendfunction")?;
        assert_eq!(interp.eval_to_number("d.f()")?, 7);
        let funcref = interp.eval_to_value("d.f")?;
        let Value::Funcref(name) = &funcref else {
            panic!("expected a Funcref, got {funcref:?}");
        };
        let name = name.to_string();
        interp.heap.release(funcref);
        assert!(interp.function_exists(&name));
        assert!(name.starts_with(|c: char| c.is_ascii_digit()));

        interp.source_str("unlet d")?;
        assert!(!interp.function_exists(&name));
        Ok(())
    }

    #[test]
    fn call_with_range_calls_once_per_line() -> Result<()> {
        let config = InterpConfig::default();
        let (host, log) = StandaloneHost::captured(&config);
        let mut interp = Interp::new(Box::new(host.with_line_count(5)), config)?;
        let script = r#"
function PerLine()
  echo a:firstline . '-' . a:lastline
endfunction
function Whole() range
  echo 'whole ' . a:firstline . '-' . a:lastline
endfunction
2,4call PerLine()
2,4call Whole()
%call Whole()
.,$call Whole()
"#;
        interp.source_str(script)?;
        assert_eq!(
            log.borrow().messages,
            vec!["2-4", "2-4", "2-4", "whole 2-4", "whole 1-5", "whole 4-5"]
        );
        assert_eq!(interp.host().cursor_line(), 4);

        let err = interp.source_str("3,2call Whole()").unwrap_err();
        assert_eq!(err.to_string(), "Backwards range given");
        Ok(())
    }

    #[test]
    fn script_local_variables_and_functions() -> Result<()> {
        let (mut interp, log) = interp();
        interp.source_str("let s:count = 1\nfunction s:Helper()\n  return s:count\nendfunction\necho s:Helper()\necho <SID>Helper()")?;
        assert_eq!(log.borrow().messages, vec!["1", "1"]);

        // A second script has its own s: scope.
        let err = interp.source_str("echo s:count").unwrap_err();
        assert_eq!(err.to_string(), "Undefined variable: s:count");
        Ok(())
    }

    #[test]
    fn execute_line_keeps_state_between_calls() -> Result<()> {
        let (mut interp, log) = interp();
        interp.execute_line("let g:total = 1")?;
        interp.execute_line("let total += 41")?;
        interp.execute_line("echo total")?;
        assert_eq!(log.borrow().messages, vec!["42"]);
        assert!(interp.execute_line("if 1").is_err());
        Ok(())
    }

    #[test]
    fn autoload_function_is_loaded_on_first_call() -> Result<()> {
        let dir = tempfile::tempdir()?;
        fs::create_dir_all(dir.path().join("mylib"))?;
        fs::write(
            dir.path().join("mylib").join("util.vim"),
            "let mylib#util#loaded = 1\nfunction mylib#util#Twice(n)\n  return a:n * 2\nendfunction\n",
        )?;

        let config = InterpConfig::default();
        let (host, log) = StandaloneHost::captured(&config);
        let mut interp = Interp::new(Box::new(host.with_autoload_dir(dir.path())), config)?;
        interp.source_str("echo mylib#util#Twice(21)\necho mylib#util#loaded")?;
        assert_eq!(log.borrow().messages, vec!["42", "1"]);

        let err = interp.source_str("call other#Missing()").unwrap_err();
        assert_eq!(err.to_string(), "Unknown function: other#Missing");
        Ok(())
    }

    #[test]
    fn call_function_from_outside() -> Result<()> {
        let (mut interp, _log) = interp();
        interp.source_str("function Add(a, b)\n  return a:a + a:b\nendfunction")?;
        let sum = interp.call_function("Add", &[Value::Number(2), Value::Number(3)], false)?;
        assert_eq!(sum, Value::Number(5));

        let err = interp
            .call_function("Add", &[Value::Number(2)], false)
            .unwrap_err();
        assert_eq!(err.to_string(), "Not enough arguments for function: Add");
        Ok(())
    }

    #[test]
    fn sandbox_forbids_defining_functions() -> Result<()> {
        let config = InterpConfig {
            sandbox: true,
            ..InterpConfig::default()
        };
        let (mut interp, log) = interp_with(config);
        let _ = interp.source_str("function F()\nendfunction\nlet g:x = 1");
        assert_eq!(log.borrow().errors[0], "Not allowed in sandbox");
        Ok(())
    }

    #[test]
    fn block_nesting_of_command_lines() {
        use crate::exec::block_nesting;
        let cases = [
            ("if x", 1),
            ("  :while 1", 1),
            ("for i in l", 1),
            ("function! F(a)", 1),
            ("function", 0),
            ("endif", -1),
            ("endfunction", -1),
            ("endfo", -1),
            ("echo 'if'", 0),
            ("\" comment", 0),
        ];
        for (line, delta) in cases {
            assert_eq!(block_nesting(line), delta, "{line}");
        }
    }
}
