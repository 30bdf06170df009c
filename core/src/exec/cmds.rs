//! `:function`, `:return`, `:call`, `:echo` and `:execute`.

use anyhow::Result;
use tracing::trace;

use crate::error::{err_other, err_syntax, err_type, err_undefined};
use crate::expr::Cursor;
use crate::func::FuncHeader;
use crate::interp::Interp;
use crate::lval::LvalKind;
use crate::val::{DictId, Value};

use super::{ExecState, Lines, Program, abbreviates, skip_colons, split_command};

impl Interp {
    /// `:function` lists, `:function Name` shows one function, and
    /// `:function[!] Name(args)` defines one with the lines up to `:endfunction`.
    pub(super) fn ex_function(
        &mut self,
        args: &str,
        forceit: bool,
        skipping: bool,
        program: &mut Program,
        state: &mut ExecState,
    ) -> Result<()> {
        if args.is_empty() {
            if !skipping {
                self.list_functions();
            }
            return Ok(());
        }
        let header = match FuncHeader::parse(args) {
            Ok(header) => header,
            Err(_) if skipping => return Ok(()),
            Err(err) => return Err(err),
        };
        let Some(header) = header else {
            return if skipping { Ok(()) } else { self.show_function(args) };
        };
        let body = read_function_body(program, state)?;
        if skipping {
            return Ok(());
        }
        self.define_function(header, forceit, body)
    }

    fn list_functions(&mut self) {
        for name in self.funcs.names() {
            if let Some(func) = self.funcs.get(&name)
                && !func.is_numbered()
            {
                self.host.echo(&func.signature(), true);
            }
        }
    }

    fn show_function(&mut self, name: &str) -> Result<()> {
        let name = self.script_function_name(name.trim())?;
        let Some(func) = self.funcs.get(&name) else {
            return err_undefined(format!("Undefined function: {name}"));
        };
        self.host.echo(&format!("   {}", func.signature()), true);
        for (i, line) in func.body.iter().enumerate() {
            if let Some(line) = line {
                self.host.echo(&format!("{:>3}  {line}", i + 1), true);
            }
        }
        self.host.echo("   endfunction", true);
        Ok(())
    }

    pub(super) fn ex_return(&mut self, args: &str, skipping: bool, state: &ExecState) -> Result<()> {
        if !state.in_function {
            return err_syntax(":return not inside a function");
        }
        if skipping {
            return Ok(());
        }
        let value = if args.is_empty() || args.starts_with('"') {
            Value::Number(0)
        } else {
            self.eval_cmd_expr(args)?
        };
        match self.ctx.frames.last_mut() {
            Some(frame) => frame.return_value = Some(value),
            None => self.heap.release(value),
        }
        Ok(())
    }

    /// `[range]:call Name(args)`. A function without the `range` flag is
    /// called once per line of the range, with the cursor on that line.
    pub(super) fn ex_call(&mut self, args: &str, range: Option<(i64, i64)>) -> Result<()> {
        let mut cur = Cursor::new(args);
        let (name, selfdict) = self.call_target(&mut cur)?;
        if cur.peek() != Some(b'(') {
            release_dict(self, selfdict);
            return err_syntax(format!("Missing parentheses: {args}"));
        }
        let call_args = match self.eval_call_args(&mut cur, true, &name) {
            Ok(call_args) => call_args,
            Err(err) => {
                release_dict(self, selfdict);
                return Err(err);
            }
        };

        let does_range = range.is_none() || self.funcs.get(&name).is_some_and(|f| f.flags.range);
        let (line1, line2) = range.unwrap_or_else(|| {
            let lnum = self.host.cursor_line();
            (lnum, lnum)
        });
        let mut result = Ok(());
        for lnum in line1..=line2 {
            if !does_range {
                self.host.set_cursor_line(lnum);
            }
            match self.call_func(&name, &call_args, Some((line1, line2)), selfdict) {
                Ok(value) => self.heap.release(value),
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
            if does_range || self.ctx.aborting {
                break;
            }
        }
        self.heap.release_all(call_args);
        release_dict(self, selfdict);
        result?;

        cur.skip_white();
        if !cur.at_end() && cur.peek() != Some(b'"') {
            return err_syntax(format!("Trailing characters: {}", cur.rest()));
        }
        Ok(())
    }

    /// Function a `:call` invokes, and the Dictionary bound to `self` when it
    /// is called through a Dictionary entry.
    fn call_target(&mut self, cur: &mut Cursor) -> Result<(String, Option<DictId>)> {
        let start = cur.pos();
        let name = self.get_name(cur, true)?;
        if name.is_empty() {
            return err_syntax("Function name required");
        }
        if !matches!(cur.peek(), Some(b'.' | b'[')) {
            return Ok((self.deref_func_name(&name)?, None));
        }

        cur.set_pos(start);
        let lval = self.get_lval(cur, true)?;
        let target = match &lval.kind {
            LvalKind::DictItem { dict, key } => {
                let value = self.heap.dict(*dict).get(key).map(|item| item.tv.value.clone());
                match value {
                    Some(Value::Funcref(fname)) => {
                        self.heap.inc_dict(*dict);
                        Ok((fname.to_string(), Some(*dict)))
                    }
                    _ => err_type(format!("Funcref required: {}", lval.text)),
                }
            }
            LvalKind::ListItem { list, node } => match &self.heap.list(*list).item(*node).value {
                Value::Funcref(fname) => Ok((fname.to_string(), None)),
                _ => err_type(format!("Funcref required: {}", lval.text)),
            },
            _ => err_type(format!("Funcref required: {}", lval.text)),
        };
        self.release_lval(lval);
        target
    }

    /// Display forms of the expressions in `args`, in order.
    fn eval_expr_list(&mut self, args: &str, display: bool) -> Result<Vec<String>> {
        let mut cur = Cursor::new(args);
        let mut out = Vec::new();
        loop {
            cur.skip_white();
            if cur.at_end() {
                return Ok(out);
            }
            let value = self.eval1(&mut cur, true)?;
            let text = if display {
                Ok(self.display(&value))
            } else {
                value.to_str().map(|s| s.into_owned())
            };
            self.heap.release(value);
            out.push(text?);
        }
    }

    /// `:echo` (`newline`) and `:echon`.
    pub(super) fn ex_echo(&mut self, args: &str, newline: bool) -> Result<()> {
        let parts = self.eval_expr_list(args, true)?;
        let sep = if newline { " " } else { "" };
        self.host.echo(&parts.join(sep), newline);
        Ok(())
    }

    pub(super) fn ex_echoerr(&mut self, args: &str) -> Result<()> {
        let parts = self.eval_expr_list(args, true)?;
        err_other(parts.join(" "))
    }

    /// `:execute`: run the joined values of the expressions as command lines.
    pub(super) fn ex_execute(&mut self, args: &str, state: &ExecState) -> Result<()> {
        let parts = self.eval_expr_list(args, false)?;
        let text = parts.join(" ");
        trace!(target: "vex::exec", command = %text, "execute");
        let nested = ExecState {
            in_function: state.in_function,
            abort_on_error: state.abort_on_error,
            ..ExecState::default()
        };
        let mut source = Lines::from_text(&text);
        self.run_program(&mut Program::script(&mut source), nested);
        Ok(())
    }
}

fn release_dict(interp: &mut Interp, dict: Option<DictId>) {
    if let Some(d) = dict {
        interp.heap.release(Value::Dict(d));
    }
}

/// Read the lines of a function body up to the matching `:endfunction`.
fn read_function_body(program: &mut Program, state: &mut ExecState) -> Result<Vec<Option<String>>> {
    let mut body = Vec::new();
    let mut nesting = 0usize;
    loop {
        let Some((line, joined)) = program.line(state.idx) else {
            return err_syntax("Missing :endfunction");
        };
        state.idx += 1 + joined;
        let (word, rest) = split_command(skip_colons(&line));
        if abbreviates(word, "endfunction", 4) {
            if nesting == 0 {
                return Ok(body);
            }
            nesting -= 1;
        } else if abbreviates(word, "function", 2) {
            // A nested definition has its own :endfunction.
            let rest = rest.trim_start_matches('!').trim_start();
            if !rest.is_empty() && rest.contains('(') && !rest.starts_with('(') {
                nesting += 1;
            }
        }
        body.push(Some(line));
        body.extend(std::iter::repeat_n(None, joined));
    }
}
