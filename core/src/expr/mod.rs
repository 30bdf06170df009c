//! Expression evaluator.
//!
//! A recursive-descent evaluator working directly on the source text. Every
//! level takes an `evaluate` flag; with `false` the text is only parsed and
//! the result is `Number(0)`, which is how the untaken branch of `?:` and the
//! right side of a short-circuited `||` / `&&` are skipped.
//!
//! Grammar (abridged):
//! ```text
//! expr1 ::= expr2 [ '?' expr1 ':' expr1 ]
//! expr2 ::= expr3 { '||' expr3 }
//! expr3 ::= expr4 { '&&' expr4 }
//! expr4 ::= expr5 [ cmp ['#' | '?'] expr5 ]
//! expr5 ::= expr6 { ('+' | '-' | '.') expr6 }
//! expr6 ::= expr7 { ('*' | '/' | '%') expr7 }
//! expr7 ::= { '!' | '-' | '+' } primary { subscript }
//! ```

use anyhow::Result;

use crate::error::{err_recursion, err_syntax};
use crate::interp::Interp;
use crate::val::Value;

mod cursor;
mod ops;
mod primary;
mod subscript;

#[cfg(test)]
mod expr_test;

pub use cursor::Cursor;
pub(crate) use primary::{is_name_char, parse_option_name, parse_string_literal};

/// Deepest nesting of sub-expressions before evaluation gives up.
const MAX_EXPR_DEPTH: usize = 1000;

impl Interp {
    /// Evaluate a complete expression; trailing text is an error.
    pub fn eval_text(&mut self, text: &str) -> Result<Value> {
        let mut cur = Cursor::new(text);
        cur.skip_white();
        let value = self.eval1(&mut cur, true)?;
        cur.skip_white();
        if !cur.at_end() {
            self.heap.release(value);
            return err_syntax(format!("Trailing characters: {}", cur.rest()));
        }
        Ok(value)
    }

    /// Evaluate and release, keeping only truthiness.
    pub(crate) fn take_truthy(&mut self, value: Value) -> Result<bool> {
        let result = value.is_truthy();
        self.heap.release(value);
        result
    }

    /// `expr2 ? expr1 : expr1`
    pub(crate) fn eval1(&mut self, cur: &mut Cursor, evaluate: bool) -> Result<Value> {
        self.ctx.expr_depth += 1;
        let result = if self.ctx.expr_depth > MAX_EXPR_DEPTH {
            err_recursion("Expression too recursive")
        } else {
            self.eval1_inner(cur, evaluate)
        };
        self.ctx.expr_depth -= 1;
        result
    }

    fn eval1_inner(&mut self, cur: &mut Cursor, evaluate: bool) -> Result<Value> {
        let cond = self.eval2(cur, evaluate)?;
        cur.skip_white();
        if !cur.eat(b'?') {
            return Ok(cond);
        }
        let take_first = if evaluate { self.take_truthy(cond)? } else { false };

        cur.skip_white();
        let first = self.eval1(cur, evaluate && take_first)?;
        cur.skip_white();
        if !cur.eat(b':') {
            self.heap.release(first);
            return err_syntax(format!("Missing ':' after '?': {}", cur.rest()));
        }
        cur.skip_white();
        let second = match self.eval1(cur, evaluate && !take_first) {
            Ok(v) => v,
            Err(err) => {
                self.heap.release(first);
                return Err(err);
            }
        };
        if take_first {
            self.heap.release(second);
            Ok(first)
        } else {
            self.heap.release(first);
            Ok(second)
        }
    }

    /// `expr3 || expr3 ..`
    fn eval2(&mut self, cur: &mut Cursor, evaluate: bool) -> Result<Value> {
        let lhs = self.eval3(cur, evaluate)?;
        cur.skip_white();
        if !cur.starts_with("||") {
            return Ok(lhs);
        }
        let mut result = if evaluate { self.take_truthy(lhs)? } else { false };
        while cur.eat_str("||") {
            cur.skip_white();
            let rhs = self.eval3(cur, evaluate && !result)?;
            if evaluate && !result {
                result = self.take_truthy(rhs)?;
            } else {
                self.heap.release(rhs);
            }
            cur.skip_white();
        }
        Ok(Value::from(evaluate && result))
    }

    /// `expr4 && expr4 ..`
    fn eval3(&mut self, cur: &mut Cursor, evaluate: bool) -> Result<Value> {
        let lhs = self.eval4(cur, evaluate)?;
        cur.skip_white();
        if !cur.starts_with("&&") {
            return Ok(lhs);
        }
        let mut result = if evaluate { self.take_truthy(lhs)? } else { true };
        while cur.eat_str("&&") {
            cur.skip_white();
            let rhs = self.eval4(cur, evaluate && result)?;
            if evaluate && result {
                result = self.take_truthy(rhs)?;
            } else {
                self.heap.release(rhs);
            }
            cur.skip_white();
        }
        Ok(Value::from(evaluate && result))
    }
}
