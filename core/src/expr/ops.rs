use std::cmp::Ordering;

use anyhow::Result;

use crate::error::{err_syntax, err_type};
use crate::interp::Interp;
use crate::val::{TypVal, Value, str_eq_ignore_case};

use super::Cursor;
use super::primary::is_name_char;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CmpOp {
    Equal,
    NotEqual,
    Greater,
    GreaterEqual,
    Smaller,
    SmallerEqual,
    Match,
    NoMatch,
    Is,
    IsNot,
}

impl CmpOp {
    /// Recognize a comparison operator at the cursor; returns it with its length.
    fn scan(cur: &Cursor) -> Option<(CmpOp, usize)> {
        let op = match (cur.peek()?, cur.peek_at(1)) {
            (b'=', Some(b'=')) => (CmpOp::Equal, 2),
            (b'=', Some(b'~')) => (CmpOp::Match, 2),
            (b'!', Some(b'=')) => (CmpOp::NotEqual, 2),
            (b'!', Some(b'~')) => (CmpOp::NoMatch, 2),
            (b'>', Some(b'=')) => (CmpOp::GreaterEqual, 2),
            (b'>', _) => (CmpOp::Greater, 1),
            (b'<', Some(b'=')) => (CmpOp::SmallerEqual, 2),
            (b'<', _) => (CmpOp::Smaller, 1),
            (b'i', Some(b's')) => {
                if cur.starts_with("isnot") && !cur.peek_at(5).is_some_and(is_name_char) {
                    (CmpOp::IsNot, 5)
                } else if !cur.peek_at(2).is_some_and(is_name_char) {
                    (CmpOp::Is, 2)
                } else {
                    return None;
                }
            }
            _ => return None,
        };
        Some(op)
    }

    fn is_identity(self) -> bool {
        matches!(self, CmpOp::Is | CmpOp::IsNot)
    }

    fn is_equality(self) -> bool {
        matches!(self, CmpOp::Equal | CmpOp::NotEqual)
    }

    /// Turn the outcome of an equality test into the operator's result.
    fn from_equal(self, equal: bool) -> bool {
        match self {
            CmpOp::Equal | CmpOp::Is => equal,
            _ => !equal,
        }
    }

    fn from_ordering(self, ord: Ordering) -> bool {
        match self {
            CmpOp::Equal | CmpOp::Is => ord == Ordering::Equal,
            CmpOp::NotEqual | CmpOp::IsNot => ord != Ordering::Equal,
            CmpOp::Greater => ord == Ordering::Greater,
            CmpOp::GreaterEqual => ord != Ordering::Less,
            CmpOp::Smaller => ord == Ordering::Less,
            CmpOp::SmallerEqual => ord != Ordering::Greater,
            CmpOp::Match | CmpOp::NoMatch => false,
        }
    }
}

/// Byte-wise comparison, folding case when asked.
fn compare_strings(a: &Value, b: &Value, ignore_case: bool) -> Result<Ordering> {
    if ignore_case {
        Ok(a.to_str()?.to_lowercase().cmp(&b.to_str()?.to_lowercase()))
    } else {
        Ok(a.to_bytes()?.cmp(&b.to_bytes()?))
    }
}

/// Result of dividing by zero.
fn div_by_zero(n: i64) -> i64 {
    match n.cmp(&0) {
        Ordering::Equal => i64::MIN,
        Ordering::Less => -i64::MAX,
        Ordering::Greater => i64::MAX,
    }
}

impl Interp {
    /// `expr5 {cmp} expr5`; comparisons do not chain.
    pub(super) fn eval4(&mut self, cur: &mut Cursor, evaluate: bool) -> Result<Value> {
        let lhs = self.eval5(cur, evaluate)?;
        cur.skip_white();
        let Some((op, len)) = CmpOp::scan(cur) else {
            return Ok(lhs);
        };
        cur.advance(len);
        let ignore_case = if cur.eat(b'?') {
            Some(true)
        } else if cur.eat(b'#') {
            Some(false)
        } else {
            None
        };
        cur.skip_white();
        let rhs = match self.eval5(cur, evaluate) {
            Ok(v) => v,
            Err(err) => {
                self.heap.release(lhs);
                return Err(err);
            }
        };
        if !evaluate {
            return Ok(Value::Number(0));
        }
        let ignore_case = ignore_case.unwrap_or_else(|| self.ignorecase());
        let result = self.compare_values(&lhs, &rhs, op, ignore_case);
        self.heap.release(lhs);
        self.heap.release(rhs);
        result.map(Value::from)
    }

    pub(crate) fn compare_values(&mut self, lhs: &Value, rhs: &Value, op: CmpOp, ignore_case: bool) -> Result<bool> {
        if op.is_identity() && lhs.type_code() != rhs.type_code() {
            return Ok(op == CmpOp::IsNot);
        }
        match (lhs, rhs) {
            (Value::List(_), _) | (_, Value::List(_)) => {
                if op.is_identity() {
                    return Ok(op.from_equal(lhs == rhs));
                }
                if lhs.type_code() != rhs.type_code() {
                    return err_type("Can only compare List with List");
                }
                if !op.is_equality() {
                    return err_type("Invalid operation for Lists");
                }
                Ok(op.from_equal(self.heap.values_equal(lhs, rhs, ignore_case)))
            }
            (Value::Dict(_), _) | (_, Value::Dict(_)) => {
                if op.is_identity() {
                    return Ok(op.from_equal(lhs == rhs));
                }
                if lhs.type_code() != rhs.type_code() {
                    return err_type("Can only compare Dictionary with Dictionary");
                }
                if !op.is_equality() {
                    return err_type("Invalid operation for Dictionary");
                }
                Ok(op.from_equal(self.heap.values_equal(lhs, rhs, ignore_case)))
            }
            (Value::Funcref(_), _) | (_, Value::Funcref(_)) => {
                if !op.is_equality() && !op.is_identity() {
                    return err_type("Invalid operation for Funcrefs");
                }
                Ok(op.from_equal(self.heap.values_equal(lhs, rhs, ignore_case)))
            }
            (Value::Number(_), _) | (_, Value::Number(_)) if !matches!(op, CmpOp::Match | CmpOp::NoMatch) => {
                let (a, b) = (lhs.to_number()?, rhs.to_number()?);
                Ok(op.from_ordering(a.cmp(&b)))
            }
            _ => {
                let a = lhs.to_str()?;
                let b = rhs.to_str()?;
                match op {
                    CmpOp::Match | CmpOp::NoMatch => {
                        let found = self.regex_match(&a, &b, ignore_case)?.is_some();
                        Ok(if op == CmpOp::Match { found } else { !found })
                    }
                    CmpOp::Equal | CmpOp::Is | CmpOp::NotEqual | CmpOp::IsNot if ignore_case => {
                        Ok(op.from_equal(str_eq_ignore_case(&a, &b)))
                    }
                    _ => Ok(op.from_ordering(compare_strings(lhs, rhs, ignore_case)?)),
                }
            }
        }
    }

    /// Byte range of the first match of `pattern` in `subject` at or after `start`.
    pub fn regex_match_from(
        &mut self,
        subject: &str,
        pattern: &str,
        start: usize,
        ignore_case: bool,
    ) -> Result<Option<(usize, usize)>> {
        let Some(re) = self.host.compile_regex(pattern, ignore_case) else {
            return err_syntax(format!("Invalid pattern: {pattern}"));
        };
        Ok(re.exec(subject, start))
    }

    /// Match of `pattern` at or after `start` with its groups, entry 0 being the
    /// whole match.
    pub fn regex_groups_from(
        &mut self,
        subject: &str,
        pattern: &str,
        start: usize,
        ignore_case: bool,
    ) -> Result<Option<Vec<Option<(usize, usize)>>>> {
        let Some(re) = self.host.compile_regex(pattern, ignore_case) else {
            return err_syntax(format!("Invalid pattern: {pattern}"));
        };
        Ok(re.exec_groups(subject, start))
    }

    pub(crate) fn regex_match(&mut self, subject: &str, pattern: &str, ignore_case: bool) -> Result<Option<(usize, usize)>> {
        self.regex_match_from(subject, pattern, 0, ignore_case)
    }

    /// `expr6 + expr6 ..`, `-` and `.`
    pub(super) fn eval5(&mut self, cur: &mut Cursor, evaluate: bool) -> Result<Value> {
        let mut lhs = self.eval6(cur, evaluate)?;
        loop {
            cur.skip_white();
            let op = match cur.peek() {
                Some(b'+') => b'+',
                Some(b'-') => b'-',
                // `..` is not an operator; a single dot concatenates.
                Some(b'.') if cur.peek_at(1) != Some(b'.') => b'.',
                _ => return Ok(lhs),
            };
            cur.advance(1);
            cur.skip_white();
            let rhs = match self.eval6(cur, evaluate) {
                Ok(v) => v,
                Err(err) => {
                    self.heap.release(lhs);
                    return Err(err);
                }
            };
            if !evaluate {
                continue;
            }
            let result = self.binary_add(&lhs, &rhs, op);
            self.heap.release(lhs);
            self.heap.release(rhs);
            lhs = result?;
        }
    }

    fn binary_add(&mut self, lhs: &Value, rhs: &Value, op: u8) -> Result<Value> {
        if op == b'.' {
            let mut s = lhs.to_bytes()?.into_owned();
            s.extend_from_slice(&rhs.to_bytes()?);
            return Ok(Value::String(s));
        }
        if let (b'+', Value::List(a), Value::List(b)) = (op, lhs, rhs) {
            let mut items = self.heap.list_snapshot(*a);
            items.extend(self.heap.list_snapshot(*b));
            return Ok(Value::List(self.heap.new_list_from(items)));
        }
        let (a, b) = (lhs.to_number()?, rhs.to_number()?);
        Ok(Value::Number(if op == b'+' {
            a.wrapping_add(b)
        } else {
            a.wrapping_sub(b)
        }))
    }

    /// `expr7 * expr7 ..`, `/` and `%`
    pub(super) fn eval6(&mut self, cur: &mut Cursor, evaluate: bool) -> Result<Value> {
        let mut lhs = self.eval7(cur, evaluate)?;
        loop {
            cur.skip_white();
            let op = match cur.peek() {
                Some(op @ (b'*' | b'/' | b'%')) => op,
                _ => return Ok(lhs),
            };
            cur.advance(1);
            cur.skip_white();
            let rhs = match self.eval7(cur, evaluate) {
                Ok(v) => v,
                Err(err) => {
                    self.heap.release(lhs);
                    return Err(err);
                }
            };
            if !evaluate {
                continue;
            }
            let operands = lhs.to_number().and_then(|a| Ok((a, rhs.to_number()?)));
            self.heap.release(lhs);
            self.heap.release(rhs);
            let (a, b) = operands?;
            lhs = Value::Number(arith(op, a, b));
        }
    }

    /// Concatenation of two lists into a new one, used by `+` and `+=`.
    pub(crate) fn list_extend(&mut self, target: crate::val::ListId, source: crate::val::ListId) {
        // Snapshot first: extending a list with itself must not loop.
        let items = self.heap.list_snapshot(source);
        for v in items {
            self.heap.list_mut(target).append(TypVal::new(v));
        }
    }
}

/// Integer `*`, `/` and `%` with the language's division-by-zero results.
pub(crate) fn arith(op: u8, a: i64, b: i64) -> i64 {
    match op {
        b'*' => a.wrapping_mul(b),
        b'/' if b == 0 => div_by_zero(a),
        b'/' => a.wrapping_div(b),
        b'%' if b == 0 => 0,
        b'%' => a.wrapping_rem(b),
        _ => unreachable!("not an arithmetic operator: {}", op as char),
    }
}
