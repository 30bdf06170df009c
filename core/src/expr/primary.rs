use anyhow::Result;

use crate::error::{err_arity, err_recursion, err_syntax, err_undefined};
use crate::func::MAX_FUNC_ARGS;
use crate::host::OptionScope;
use crate::interp::Interp;
use crate::val::{TypVal, Value, check_key, str2nr};

use super::Cursor;

/// Characters of a variable or function name, scope prefix aside.
#[inline]
pub(crate) fn is_name_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_' || b == b'#'
}

#[inline]
fn is_scope_char(b: u8) -> bool {
    matches!(b, b'g' | b'b' | b'w' | b't' | b's' | b'l' | b'a' | b'v')
}

/// Parse a quoted string at the cursor (`"..."` with escapes or `'...'`).
pub(crate) fn parse_string_literal(cur: &mut Cursor) -> Result<String> {
    match cur.peek() {
        Some(b'"') => parse_double_quoted(cur),
        Some(b'\'') => parse_single_quoted(cur),
        _ => err_syntax(format!("Missing quote: {}", cur.rest())),
    }
}

fn parse_single_quoted(cur: &mut Cursor) -> Result<String> {
    let start = cur.pos();
    cur.advance(1);
    let mut out = String::new();
    loop {
        let rest = cur.rest();
        let Some(end) = rest.find('\'') else {
            cur.set_pos(start);
            return err_syntax(format!("Missing quote: {}", cur.rest()));
        };
        out.push_str(&rest[..end]);
        cur.advance(end + 1);
        // '' inside a literal string is one quote.
        if cur.peek() == Some(b'\'') {
            out.push('\'');
            cur.advance(1);
        } else {
            return Ok(out);
        }
    }
}

fn parse_double_quoted(cur: &mut Cursor) -> Result<String> {
    let start = cur.pos();
    let text = cur.rest();
    let mut chars = text.char_indices().skip(1).peekable();
    let mut out = String::new();
    while let Some((i, c)) = chars.next() {
        match c {
            '"' => {
                cur.set_pos(start + i + 1);
                return Ok(out);
            }
            '\\' => {
                let Some((_, esc)) = chars.next() else { break };
                match esc {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'e' => out.push('\x1b'),
                    'b' => out.push('\x08'),
                    'f' => out.push('\x0c'),
                    'x' | 'X' | 'u' | 'U' => {
                        let max = match esc {
                            'x' | 'X' => 2,
                            'u' => 4,
                            _ => 8,
                        };
                        let mut code = 0u32;
                        let mut digits = 0;
                        while digits < max {
                            match chars.peek().and_then(|(_, d)| d.to_digit(16)) {
                                Some(d) => {
                                    code = code * 16 + d;
                                    digits += 1;
                                    chars.next();
                                }
                                None => break,
                            }
                        }
                        if digits == 0 {
                            out.push(esc);
                        } else {
                            out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                        }
                    }
                    '0'..='7' => {
                        let mut code = esc.to_digit(8).unwrap_or(0);
                        for _ in 0..2 {
                            match chars.peek().and_then(|(_, d)| d.to_digit(8)) {
                                Some(d) => {
                                    code = code * 8 + d;
                                    chars.next();
                                }
                                None => break,
                            }
                        }
                        out.push(char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER));
                    }
                    other => out.push(other),
                }
            }
            other => out.push(other),
        }
    }
    err_syntax(format!("Missing quote: {text}"))
}

impl Interp {
    /// `{'!' | '-' | '+'} primary {subscript}`
    pub(super) fn eval7(&mut self, cur: &mut Cursor, evaluate: bool) -> Result<Value> {
        let mut unary = Vec::new();
        while let Some(op @ (b'!' | b'-' | b'+')) = cur.peek() {
            unary.push(op);
            cur.advance(1);
            cur.skip_white();
        }

        let (value, selfdict) = self.eval_primary(cur, evaluate)?;
        let mut value = self.handle_subscripts(cur, value, selfdict, evaluate)?;

        if !evaluate {
            return Ok(Value::Number(0));
        }
        // Unary operators bind looser than subscripts and apply right to left.
        for op in unary.into_iter().rev() {
            let n = value.to_number();
            self.heap.release(value);
            let n = n?;
            value = Value::Number(match op {
                b'!' => (n == 0) as i64,
                b'-' => n.wrapping_neg(),
                _ => n,
            });
        }
        Ok(value)
    }

    /// A primary expression. Also returns the Dictionary a function call on
    /// the result should bind to `self`, which is only ever set by subscripts.
    fn eval_primary(&mut self, cur: &mut Cursor, evaluate: bool) -> Result<(Value, Option<crate::val::DictId>)> {
        let Some(c) = cur.peek() else {
            return err_syntax("Expected an expression");
        };
        let value = match c {
            b'0'..=b'9' => {
                let (n, len) = str2nr(cur.rest());
                cur.advance(len.max(1));
                Value::Number(n)
            }
            b'"' | b'\'' => Value::str(parse_string_literal(cur)?),
            b'[' => self.eval_list(cur, evaluate)?,
            b'{' => match self.eval_dict(cur, evaluate)? {
                Some(v) => v,
                None => return self.eval_name(cur, evaluate),
            },
            b'&' => self.eval_option(cur, evaluate)?,
            b'$' => {
                cur.advance(1);
                let name = cur.take_while(|b| b.is_ascii_alphanumeric() || b == b'_');
                if name.is_empty() {
                    return err_syntax(format!("Invalid expression: ${}", cur.rest()));
                }
                if !evaluate {
                    Value::Number(0)
                } else {
                    Value::str(self.host.env_var(name).unwrap_or_default())
                }
            }
            b'@' => {
                cur.advance(1);
                let Some(reg) = cur.rest().chars().next() else {
                    return err_syntax("Invalid expression: @");
                };
                cur.bump();
                if !evaluate {
                    Value::Number(0)
                } else {
                    Value::str(self.host.register(reg).unwrap_or_default())
                }
            }
            b'(' => {
                cur.advance(1);
                cur.skip_white();
                let v = self.eval1(cur, evaluate)?;
                cur.skip_white();
                if !cur.eat(b')') {
                    self.heap.release(v);
                    return err_syntax(format!("Missing ')': {}", cur.rest()));
                }
                v
            }
            _ => return self.eval_name(cur, evaluate),
        };
        Ok((if evaluate { value } else { Value::Number(0) }, None))
    }

    /// `[expr, ...]`
    fn eval_list(&mut self, cur: &mut Cursor, evaluate: bool) -> Result<Value> {
        let start = cur.pos();
        cur.advance(1);
        cur.skip_white();
        let mut items = Vec::new();
        while cur.peek() != Some(b']') {
            if cur.at_end() {
                self.heap.release_all(items);
                return err_syntax(format!("Missing end of List ']': {}", cur.slice(start, cur.pos())));
            }
            match self.eval1(cur, evaluate) {
                Ok(v) if evaluate => items.push(v),
                Ok(_) => {}
                Err(err) => {
                    self.heap.release_all(items);
                    return Err(err);
                }
            }
            cur.skip_white();
            if cur.peek() == Some(b']') {
                break;
            }
            if !cur.eat(b',') {
                self.heap.release_all(items);
                return err_syntax(format!("Missing comma in List: {}", cur.rest()));
            }
            cur.skip_white();
        }
        cur.advance(1);
        if !evaluate {
            return Ok(Value::Number(0));
        }
        Ok(Value::List(self.heap.new_list_from(items)))
    }

    /// `{key: value, ...}`. Returns `None` when the braces turn out to be part of
    /// a curly-brace variable name such as `{prefix}name`.
    fn eval_dict(&mut self, cur: &mut Cursor, evaluate: bool) -> Result<Option<Value>> {
        let start = cur.pos();
        cur.advance(1);
        cur.skip_white();
        if cur.peek() != Some(b'}') {
            // Trial parse: `{expr}` with nothing else inside is a name.
            let mut probe = cur.clone();
            self.eval1(&mut probe, false)?;
            probe.skip_white();
            if probe.peek() == Some(b'}') {
                cur.set_pos(start);
                return Ok(None);
            }
        }

        let dict = if evaluate { Some(self.heap.new_dict()) } else { None };
        if let Err(err) = self.eval_dict_items(cur, evaluate, dict, start) {
            if let Some(d) = dict {
                self.heap.release(Value::Dict(d));
            }
            return Err(err);
        }
        cur.advance(1);
        Ok(Some(match dict {
            Some(d) => Value::Dict(d),
            None => Value::Number(0),
        }))
    }

    fn eval_dict_items(
        &mut self,
        cur: &mut Cursor,
        evaluate: bool,
        dict: Option<crate::val::DictId>,
        start: usize,
    ) -> Result<()> {
        while cur.peek() != Some(b'}') {
            if cur.at_end() {
                return err_syntax(format!("Missing end of Dictionary '}}': {}", cur.slice(start, cur.pos())));
            }
            let key = self.eval1(cur, evaluate)?;
            cur.skip_white();
            if !cur.eat(b':') {
                self.heap.release(key);
                return err_syntax(format!("Missing colon in Dictionary: {}", cur.rest()));
            }
            cur.skip_white();
            let key_text = key.to_str().map(|s| s.into_owned());
            self.heap.release(key);
            let key_text = key_text?;
            if dict.is_some() {
                check_key(&key_text)?;
            }
            let value = self.eval1(cur, evaluate)?;
            if let Some(d) = dict {
                if self.heap.dict(d).contains_key(&key_text) {
                    self.heap.release(value);
                    return err_syntax(format!("Duplicate key in Dictionary: \"{key_text}\""));
                }
                self.heap.dict_mut(d).insert(&key_text, TypVal::new(value))?;
            }
            cur.skip_white();
            if cur.peek() == Some(b'}') {
                break;
            }
            if !cur.eat(b',') {
                return err_syntax(format!("Missing comma in Dictionary: {}", cur.rest()));
            }
            cur.skip_white();
        }
        Ok(())
    }

    /// `&name`, `&l:name`, `&g:name`
    fn eval_option(&mut self, cur: &mut Cursor, evaluate: bool) -> Result<Value> {
        let (name, scope) = parse_option_name(cur)?;
        if !evaluate {
            return Ok(Value::Number(0));
        }
        match self.host.get_option(&name, scope) {
            Some(v) => Ok(v),
            None => err_undefined(format!("Unknown option: {name}")),
        }
    }

    /// Parse a variable or function name, expanding `{expr}` parts. In skip mode
    /// the braces are parsed but not evaluated and an empty string is returned.
    pub(crate) fn get_name(&mut self, cur: &mut Cursor, evaluate: bool) -> Result<String> {
        let mut name = String::new();
        // <SID> and <SNR> prefixes of script-local functions.
        for prefix in ["<SID>", "<SNR>"] {
            if cur.rest().len() >= 5 && cur.rest()[..5].eq_ignore_ascii_case(prefix) {
                name.push_str(&cur.rest()[..5]);
                cur.advance(5);
                break;
            }
        }
        if name.is_empty()
            && cur.peek().is_some_and(is_scope_char)
            && cur.peek_at(1) == Some(b':')
        {
            name.push_str(cur.slice(cur.pos(), cur.pos() + 2));
            cur.advance(2);
        }
        loop {
            let run = cur.take_while(is_name_char);
            name.push_str(run);
            if cur.peek() != Some(b'{') {
                break;
            }
            self.ctx.brace_depth += 1;
            let part = self.eval_brace_part(cur, evaluate);
            self.ctx.brace_depth -= 1;
            name.push_str(&part?);
        }
        Ok(if evaluate { name } else { String::new() })
    }

    fn eval_brace_part(&mut self, cur: &mut Cursor, evaluate: bool) -> Result<String> {
        if self.ctx.brace_depth > self.config.max_nest {
            return err_recursion("Expression too recursive");
        }
        cur.advance(1);
        cur.skip_white();
        let v = self.eval1(cur, evaluate)?;
        cur.skip_white();
        if !cur.eat(b'}') {
            self.heap.release(v);
            return err_syntax(format!("Missing '}}': {}", cur.rest()));
        }
        if !evaluate {
            return Ok(String::new());
        }
        let text = v.to_str().map(|s| s.into_owned());
        self.heap.release(v);
        text
    }

    /// A variable reference or a function call.
    fn eval_name(&mut self, cur: &mut Cursor, evaluate: bool) -> Result<(Value, Option<crate::val::DictId>)> {
        let start = cur.pos();
        let name = self.get_name(cur, evaluate)?;
        if cur.pos() == start {
            return err_syntax(format!("Invalid expression: {}", cur.rest()));
        }
        if evaluate && name.is_empty() {
            return err_syntax(format!("Invalid expression: {}", cur.slice(start, cur.pos())));
        }

        if cur.peek() == Some(b'(') {
            let args = self.eval_call_args(cur, evaluate, &name)?;
            if !evaluate {
                return Ok((Value::Number(0), None));
            }
            let result = self
                .deref_func_name(&name)
                .and_then(|fname| self.call_func(&fname, &args, None, None));
            self.heap.release_all(args);
            return Ok((result?, None));
        }

        if !evaluate {
            return Ok((Value::Number(0), None));
        }
        Ok((self.get_var(&name)?, None))
    }

    /// The function a call of `name` should invoke: the target of a Funcref
    /// variable of that name, otherwise the function called `name`.
    pub(crate) fn deref_func_name(&mut self, name: &str) -> Result<String> {
        if !name.contains('#') && !name.starts_with('<') {
            if let Some((dict, off)) = self.find_var_dict(name)
                && let Some(item) = self.heap.dict(dict).get(&name[off..])
                && let Value::Funcref(target) = &item.tv.value
            {
                return Ok(target.to_string());
            }
        }
        self.script_function_name(name)
    }

    /// `(arg, ...)` of a function call. The cursor is on the `(`.
    pub(crate) fn eval_call_args(&mut self, cur: &mut Cursor, evaluate: bool, name: &str) -> Result<Vec<Value>> {
        cur.advance(1);
        cur.skip_white();
        let mut args = Vec::new();
        while cur.peek() != Some(b')') {
            if args.len() >= MAX_FUNC_ARGS {
                self.heap.release_all(args);
                return err_arity(format!("Too many arguments for function: {name}"));
            }
            match self.eval1(cur, evaluate) {
                Ok(v) => args.push(v),
                Err(err) => {
                    self.heap.release_all(args);
                    return Err(err);
                }
            }
            cur.skip_white();
            if cur.peek() == Some(b')') {
                break;
            }
            if !cur.eat(b',') {
                self.heap.release_all(args);
                return err_syntax(format!("Invalid arguments for function: {name}"));
            }
            cur.skip_white();
        }
        cur.advance(1);
        Ok(args)
    }
}

/// Name and scope of an `&option` reference; the cursor is on the `&`.
pub(crate) fn parse_option_name(cur: &mut Cursor) -> Result<(String, OptionScope)> {
    cur.advance(1);
    let scope = if cur.eat_str("l:") {
        OptionScope::Local
    } else if cur.eat_str("g:") {
        OptionScope::Global
    } else {
        OptionScope::Both
    };
    let name = cur.take_while(|b| b.is_ascii_alphanumeric() || b == b'_');
    if name.is_empty() {
        return err_syntax(format!("Option name missing: &{}", cur.rest()));
    }
    Ok((name.to_string(), scope))
}
