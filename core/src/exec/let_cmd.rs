//! `:let`, `:unlet`, `:lockvar` and `:unlockvar`.

use anyhow::Result;

use crate::error::{err_range, err_syntax, err_type, err_undefined};
use crate::expr::{Cursor, parse_option_name};
use crate::interp::{AssignOp, Interp};
use crate::scope::ScopeKind;
use crate::val::{DictId, Value};

/// Column where the value starts in a variable listing.
const LIST_VALUE_COLUMN: usize = 22;

fn wrong_type<T>(op: AssignOp) -> Result<T> {
    err_type(format!("Wrong variable type for {}", op.symbol()))
}

/// Operator after the targets of `:let`, with its length.
fn assign_op(cur: &Cursor) -> Option<(AssignOp, usize)> {
    match (cur.peek()?, cur.peek_at(1)) {
        (b'=', Some(b'=')) => None,
        (b'=', _) => Some((AssignOp::Set, 1)),
        (b'+', Some(b'=')) => Some((AssignOp::Add, 2)),
        (b'-', Some(b'=')) => Some((AssignOp::Sub, 2)),
        (b'.', Some(b'=')) => Some((AssignOp::Concat, 2)),
        _ => None,
    }
}

impl Interp {
    pub(super) fn ex_let(&mut self, args: &str) -> Result<()> {
        if args.is_empty() || args.starts_with('"') {
            return self.list_all_vars();
        }
        let mut cur = Cursor::new(args);
        self.skip_var_list(&mut cur)?;
        let targets = cur.slice(0, cur.pos());
        cur.skip_white();
        let Some((op, len)) = assign_op(&cur) else {
            if cur.at_end() || cur.peek() == Some(b'"') || cur.after_white() {
                return self.list_named_vars(args);
            }
            return err_syntax(format!("Unexpected characters in :let: {}", cur.rest()));
        };
        cur.advance(len);
        let value = self.eval_cmd_expr(cur.rest())?;
        let result = self.let_targets(targets, &value, op);
        self.heap.release(value);
        result
    }

    /// Skip one target or a `[a, b; rest]` list of them.
    pub(crate) fn skip_var_list(&mut self, cur: &mut Cursor) -> Result<()> {
        cur.skip_white();
        if !cur.eat(b'[') {
            return self.skip_target(cur);
        }
        loop {
            cur.skip_white();
            self.skip_target(cur)?;
            cur.skip_white();
            if cur.eat(b']') {
                return Ok(());
            }
            if cur.eat(b';') {
                cur.skip_white();
                self.skip_target(cur)?;
                cur.skip_white();
                if !cur.eat(b']') {
                    return err_syntax(format!("Double ; in list of variables: {}", cur.rest()));
                }
                return Ok(());
            }
            if !cur.eat(b',') {
                return err_syntax(format!("Invalid argument: {}", cur.rest()));
            }
        }
    }

    fn skip_target(&mut self, cur: &mut Cursor) -> Result<()> {
        let start = cur.pos();
        match cur.peek() {
            Some(b'$') => {
                cur.advance(1);
                cur.take_while(|b| b.is_ascii_alphanumeric() || b == b'_');
            }
            Some(b'&') => {
                parse_option_name(cur)?;
            }
            Some(b'@') => {
                cur.advance(1);
                cur.bump();
            }
            _ => self.skip_lvalue(cur)?,
        }
        if cur.pos() == start || cur.slice(start, cur.pos()) == "$" {
            return err_syntax(format!("Invalid argument: {}", cur.rest()));
        }
        Ok(())
    }

    /// Assign `value` to the targets of a `:let` or `:for`: one target, or a
    /// list that unpacks a List value.
    pub(crate) fn let_targets(&mut self, targets: &str, value: &Value, op: AssignOp) -> Result<()> {
        let targets = targets.trim();
        if !targets.starts_with('[') {
            return self.let_one(targets, value, op);
        }

        let (names, rest) = split_target_list(targets);
        let Value::List(list) = value else {
            return err_type("List required");
        };
        let items = self.heap.list_snapshot(*list);
        if items.len() < names.len() {
            self.heap.release_all(items);
            return err_range("More targets than List items");
        }
        if rest.is_none() && items.len() > names.len() {
            self.heap.release_all(items);
            return err_range("Less targets than List items");
        }

        let mut items = items.into_iter();
        let mut result = Ok(());
        for name in &names {
            let Some(item) = items.next() else { break };
            result = self.let_one(name, &item, op);
            self.heap.release(item);
            if result.is_err() {
                break;
            }
        }
        let remaining: Vec<Value> = items.collect();
        if result.is_err() {
            self.heap.release_all(remaining);
            return result;
        }
        match rest {
            Some(rest) => {
                let list = Value::List(self.heap.new_list_from(remaining));
                let result = self.let_one(&rest, &list, op);
                self.heap.release(list);
                result
            }
            None => {
                self.heap.release_all(remaining);
                Ok(())
            }
        }
    }

    /// Assign to one target: `$ENV`, `&option`, `@r` or an lvalue.
    pub(crate) fn let_one(&mut self, target: &str, value: &Value, op: AssignOp) -> Result<()> {
        let target = target.trim();
        match target.as_bytes().first() {
            Some(b'$') => self.let_env(&target[1..], value, op),
            Some(b'&') => self.let_option(target, value, op),
            Some(b'@') => {
                let Some(reg) = target[1..].chars().next() else {
                    return err_syntax(format!("Invalid argument: {target}"));
                };
                let text = value.to_str()?;
                let text = match op {
                    AssignOp::Set => text.into_owned(),
                    AssignOp::Concat => self.host.register(reg).unwrap_or_default() + &text,
                    _ => return wrong_type(op),
                };
                self.host.set_register(reg, &text)
            }
            _ => {
                let mut cur = Cursor::new(target);
                let lval = self.get_lval(&mut cur, false)?;
                cur.skip_white();
                if !cur.at_end() {
                    self.release_lval(lval);
                    return err_syntax(format!("Trailing characters: {}", cur.rest()));
                }
                let result = self.set_lval(&lval, value, op);
                self.release_lval(lval);
                result
            }
        }
    }

    fn let_env(&mut self, name: &str, value: &Value, op: AssignOp) -> Result<()> {
        if name.is_empty() || !name.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'_') {
            return err_syntax(format!("Invalid argument: ${name}"));
        }
        let text = value.to_str()?;
        let text = match op {
            AssignOp::Set => text.into_owned(),
            AssignOp::Concat => self.host.env_var(name).unwrap_or_default() + &text,
            _ => return wrong_type(op),
        };
        self.host.set_env_var(name, &text);
        Ok(())
    }

    fn let_option(&mut self, target: &str, value: &Value, op: AssignOp) -> Result<()> {
        let mut cur = Cursor::new(target);
        let (name, scope) = parse_option_name(&mut cur)?;
        if !cur.at_end() {
            return err_syntax(format!("Trailing characters: {}", cur.rest()));
        }
        let Some(current) = self.host.get_option(&name, scope) else {
            return err_undefined(format!("Unknown option: {name}"));
        };
        let new = match (&current, op) {
            (Value::Number(_), AssignOp::Set) => Value::Number(value.to_number()?),
            (Value::Number(n), AssignOp::Add) => Value::Number(n.wrapping_add(value.to_number()?)),
            (Value::Number(n), AssignOp::Sub) => Value::Number(n.wrapping_sub(value.to_number()?)),
            (Value::String(_), AssignOp::Set) => Value::String(value.to_bytes()?.into_owned()),
            (Value::String(s), AssignOp::Concat) => {
                let mut s = s.clone();
                s.extend_from_slice(&value.to_bytes()?);
                Value::String(s)
            }
            _ => return wrong_type(op),
        };
        self.host.set_option(&name, &new, scope)
    }

    pub(super) fn ex_unlet(&mut self, args: &str, forceit: bool) -> Result<()> {
        self.for_each_lval(args, |interp, cur| {
            let lval = interp.get_lval(cur, true)?;
            let result = interp.unlet_lval(&lval, forceit);
            interp.release_lval(lval);
            result
        })
    }

    /// `:lockvar[!] [depth] {name} ..`; with `lock` false `:unlockvar`.
    pub(super) fn ex_lockvar(&mut self, args: &str, forceit: bool, lock: bool) -> Result<()> {
        let mut args = args;
        let depth = if forceit {
            -1
        } else if args.starts_with(|c: char| c.is_ascii_digit()) {
            let end = args.find(|c: char| !c.is_ascii_digit()).unwrap_or(args.len());
            let depth = args[..end].parse().unwrap_or(i32::MAX);
            args = args[end..].trim_start();
            depth
        } else {
            2
        };
        self.for_each_lval(args, |interp, cur| {
            let lval = interp.get_lval(cur, true)?;
            let result = interp.lock_lval(&lval, depth, lock);
            interp.release_lval(lval);
            result
        })
    }

    /// Run `f` on each blank-separated target in `args`.
    fn for_each_lval(
        &mut self,
        args: &str,
        mut f: impl FnMut(&mut Self, &mut Cursor) -> Result<()>,
    ) -> Result<()> {
        if args.is_empty() {
            return err_syntax("Argument required");
        }
        let mut cur = Cursor::new(args);
        loop {
            cur.skip_white();
            if cur.at_end() || cur.peek() == Some(b'"') {
                return Ok(());
            }
            f(self, &mut cur)?;
            if !cur.at_end() && !matches!(cur.peek(), Some(b' ' | b'\t')) {
                return err_syntax(format!("Trailing characters: {}", cur.rest()));
            }
        }
    }

    /// `:let` without arguments: every variable, scope by scope.
    fn list_all_vars(&mut self) -> Result<()> {
        let mut scopes = vec![("", self.scopes.global)];
        for kind in [ScopeKind::Buffer, ScopeKind::Window, ScopeKind::Tab] {
            if let Some((dict, _)) = self.find_var_dict(&format!("{}:", kind.prefix())) {
                scopes.push((prefix_of(kind), dict));
            }
        }
        scopes.push(("v:", self.scopes.vimvars));
        if let Some((dict, _)) = self.find_var_dict("s:") {
            scopes.push(("s:", dict));
        }
        if let Some(frame) = self.ctx.frames.last() {
            scopes.push(("l:", frame.locals));
        }
        for (prefix, dict) in scopes {
            self.list_dict_vars(prefix, dict);
        }
        Ok(())
    }

    fn list_dict_vars(&mut self, prefix: &str, dict: DictId) {
        let vars: Vec<(String, Value)> = self
            .heap
            .dict(dict)
            .entries()
            .into_iter()
            .map(|(k, item)| (k.to_string(), item.tv.value.clone()))
            .collect();
        for (name, value) in vars {
            self.list_one_var(&format!("{prefix}{name}"), &value);
        }
    }

    /// `:let name ..`: the named variables.
    fn list_named_vars(&mut self, args: &str) -> Result<()> {
        for name in args.split_whitespace() {
            if name.starts_with('"') {
                break;
            }
            let value = match name.as_bytes()[0] {
                b'$' => Value::str(self.host.env_var(&name[1..]).unwrap_or_default()),
                b'&' => self.eval_text(name)?,
                _ => self.get_var(name)?,
            };
            self.list_one_var(name, &value);
            self.heap.release(value);
        }
        Ok(())
    }

    fn list_one_var(&mut self, name: &str, value: &Value) {
        let mut line = format!("{name} ");
        while line.len() < LIST_VALUE_COLUMN {
            line.push(' ');
        }
        let text = self.display(value);
        let (mark, text) = match value {
            Value::Number(_) => ('#', text.as_str()),
            Value::Funcref(_) => ('*', text.as_str()),
            Value::List(_) => ('[', text.strip_prefix('[').unwrap_or(&text)),
            Value::Dict(_) => ('{', text.strip_prefix('{').unwrap_or(&text)),
            Value::String(_) => (' ', text.as_str()),
        };
        line.push(mark);
        line.push_str(text);
        self.host.echo(&line, true);
    }
}

fn prefix_of(kind: ScopeKind) -> &'static str {
    match kind {
        ScopeKind::Buffer => "b:",
        ScopeKind::Window => "w:",
        ScopeKind::Tab => "t:",
        _ => "",
    }
}

/// Targets of `[a, b; rest]`, split at the top-level separators.
fn split_target_list(text: &str) -> (Vec<String>, Option<String>) {
    let inner = text.strip_prefix('[').unwrap_or(text);
    let inner = inner.strip_suffix(']').unwrap_or(inner);
    let mut names = Vec::new();
    let mut rest = None;
    let mut depth = 0usize;
    let mut quote = None;
    let mut start = 0;
    let mut after_semicolon = false;
    for (i, c) in inner.char_indices() {
        match c {
            '\'' | '"' if quote.is_none() => quote = Some(c),
            c if quote == Some(c) => quote = None,
            _ if quote.is_some() => {}
            '[' | '(' | '{' => depth += 1,
            ']' | ')' | '}' => depth = depth.saturating_sub(1),
            ',' | ';' if depth == 0 => {
                names.push(inner[start..i].trim().to_string());
                start = i + 1;
                after_semicolon = c == ';';
            }
            _ => {}
        }
    }
    let last = inner[start..].trim().to_string();
    if after_semicolon {
        rest = Some(last);
    } else {
        names.push(last);
    }
    (names, rest)
}
