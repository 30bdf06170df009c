//! String builtins. Offsets are byte offsets, like everywhere else in the
//! language; patterns go through the host's regex engine.

use std::iter::Peekable;
use std::slice::Iter;
use std::str::Chars;

use anyhow::Result;
use vex_core::error::{err_arity, err_other};
use vex_core::module::{Builtin, BuiltinRegistry, Module};
use vex_core::{Interp, Value};

use crate::args::{opt_bool, opt_number, opt_string};

/// Separator `split()` uses when no pattern is given.
const DEFAULT_SPLIT_PATTERN: &str = r"\s\+";

#[derive(Debug)]
pub struct StringModule {
    functions: Vec<Builtin>,
}

impl Default for StringModule {
    fn default() -> Self {
        Self::new()
    }
}

impl StringModule {
    pub fn new() -> Self {
        Self {
            functions: vec![
                Builtin::new("matchstr", 2, 4, matchstr),
                Builtin::new("printf", 1, 20, printf),
                Builtin::new("split", 1, 3, split),
                Builtin::new("stridx", 2, 3, stridx),
                Builtin::new("string", 1, 1, string),
                Builtin::new("strlen", 1, 1, strlen),
                Builtin::new("substitute", 4, 4, substitute),
                Builtin::new("tolower", 1, 1, tolower),
                Builtin::new("toupper", 1, 1, toupper),
            ],
        }
    }
}

impl Module for StringModule {
    fn name(&self) -> &str {
        "string"
    }

    fn description(&self) -> &str {
        "String conversion, searching, formatting and pattern substitution"
    }

    fn register(&self, registry: &mut BuiltinRegistry) -> Result<()> {
        for builtin in &self.functions {
            registry.register(*builtin)?;
        }
        Ok(())
    }
}

/// `string({expr})`: a form that evaluates back to an equal value.
fn string(args: &[Value], interp: &mut Interp) -> Result<Value> {
    Ok(Value::str(interp.string_of(&args[0])?))
}

fn strlen(args: &[Value], _interp: &mut Interp) -> Result<Value> {
    Ok(Value::Number(args[0].to_bytes()?.len() as i64))
}

fn tolower(args: &[Value], _interp: &mut Interp) -> Result<Value> {
    Ok(Value::str(args[0].to_str()?.to_lowercase()))
}

fn toupper(args: &[Value], _interp: &mut Interp) -> Result<Value> {
    Ok(Value::str(args[0].to_str()?.to_uppercase()))
}

/// `stridx({haystack}, {needle} [, {start}])`: byte index of the first
/// occurrence, -1 when there is none.
fn stridx(args: &[Value], _interp: &mut Interp) -> Result<Value> {
    let haystack = args[0].to_str()?;
    let needle = args[1].to_str()?;
    let start = opt_number(args, 2, 0)?.max(0) as usize;
    if start >= haystack.len() {
        return Ok(Value::Number(-1));
    }
    let bytes = &haystack.as_bytes()[start..];
    let found = if needle.is_empty() {
        Some(0)
    } else {
        bytes.windows(needle.len()).position(|w| w == needle.as_bytes())
    };
    Ok(Value::Number(found.map_or(-1, |i| (start + i) as i64)))
}

/// Smallest char boundary of `text` at or after `idx`.
fn ceil_char_boundary(text: &str, idx: usize) -> usize {
    let mut idx = idx.min(text.len());
    while !text.is_char_boundary(idx) {
        idx += 1;
    }
    idx
}

/// Byte length of the character starting at `idx`, 0 at the end.
fn char_len_at(text: &str, idx: usize) -> usize {
    text[idx..].chars().next().map_or(0, char::len_utf8)
}

/// `matchstr({expr}, {pat} [, {start} [, {count}]])`
fn matchstr(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let text = args[0].to_str()?.into_owned();
    let pattern = args[1].to_str()?.into_owned();
    let start = opt_number(args, 2, 0)?.max(0) as usize;
    if start > text.len() {
        return Ok(Value::str(""));
    }
    let mut start = ceil_char_boundary(&text, start);
    let mut count = opt_number(args, 3, 1)?;
    let ignore_case = interp.ignorecase();
    loop {
        let Some((from, to)) = interp.regex_match_from(&text, &pattern, start, ignore_case)? else {
            return Ok(Value::str(""));
        };
        count -= 1;
        if count <= 0 {
            return Ok(Value::str(&text[from..to]));
        }
        // The next match may overlap this one, but not start at the same place.
        let step = char_len_at(&text, from);
        if step == 0 {
            return Ok(Value::str(""));
        }
        start = from + step;
    }
}

/// `substitute({expr}, {pat}, {sub}, {flags})`
fn substitute(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let text = args[0].to_str()?.into_owned();
    let pattern = args[1].to_str()?.into_owned();
    let sub = args[2].to_str()?.into_owned();
    let global = args[3].to_str()?.contains('g');
    let ignore_case = interp.ignorecase();

    let mut out = String::with_capacity(text.len());
    let mut copied = 0;
    loop {
        let Some(groups) = interp.regex_groups_from(&text, &pattern, copied, ignore_case)? else {
            break;
        };
        let Some((from, to)) = groups.first().copied().flatten() else {
            break;
        };
        out.push_str(&text[copied..from]);
        expand_replacement(&mut out, &text, &sub, &groups);
        copied = to;
        if to == text.len() || !global {
            break;
        }
        if from == to {
            // An empty match keeps one character so the search moves on.
            let step = char_len_at(&text, to);
            out.push_str(&text[to..to + step]);
            copied = to + step;
        }
    }
    out.push_str(&text[copied..]);
    Ok(Value::str(out))
}

/// Append `sub` to `out` with `&`, `\0`..`\9` replaced by the matched text.
fn expand_replacement(out: &mut String, text: &str, sub: &str, groups: &[Option<(usize, usize)>]) {
    let group = |n: usize| groups.get(n).copied().flatten().map_or("", |(from, to)| &text[from..to]);
    let mut chars = sub.chars();
    while let Some(c) = chars.next() {
        match c {
            '&' => out.push_str(group(0)),
            '\\' => match chars.next() {
                Some(d @ '0'..='9') => out.push_str(group(d as usize - '0' as usize)),
                Some('n') => out.push('\n'),
                Some('r') => out.push('\r'),
                Some('t') => out.push('\t'),
                Some(other) => out.push(other),
                None => out.push('\\'),
            },
            _ => out.push(c),
        }
    }
}

/// `split({expr} [, {pattern} [, {keepempty}]])`
fn split(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let text = args[0].to_str()?.into_owned();
    let mut pattern = opt_string(args, 1, DEFAULT_SPLIT_PATTERN)?;
    if pattern.is_empty() {
        pattern = DEFAULT_SPLIT_PATTERN.to_string();
    }
    let keep_empty = opt_bool(args, 2)?;

    let len = text.len();
    let mut items: Vec<Value> = Vec::new();
    let (mut pos, mut col) = (0, 0);
    while pos < len || keep_empty {
        let found = if pos == len {
            None
        } else {
            interp.regex_match_from(&text, &pattern, pos + col, false)?
        };
        let end = found.map_or(len, |(from, _)| from);
        // A match right at the start of the remaining text only gives an
        // empty item when it also consumed something.
        let empty_between = !items.is_empty() && pos < len && found.is_some_and(|(_, to)| end < to);
        if keep_empty || end > pos || empty_between {
            items.push(Value::str(&text[pos..end]));
        }
        let Some((_, to)) = found else {
            break;
        };
        col = if to > pos { 0 } else { char_len_at(&text, to) };
        pos = to;
    }
    Ok(Value::List(interp.heap.new_list_from(items)))
}

#[derive(Debug, Default)]
struct FormatSpec {
    left: bool,
    zero: bool,
    plus: bool,
    space: bool,
    alt: bool,
    width: usize,
    precision: Option<usize>,
}

fn next_arg<'a>(args: &mut Iter<'a, Value>) -> Result<&'a Value> {
    match args.next() {
        Some(v) => Ok(v),
        None => err_arity("Not enough arguments for printf()"),
    }
}

fn read_digits(chars: &mut Peekable<Chars>) -> usize {
    let mut n: usize = 0;
    while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
        n = n.saturating_mul(10).saturating_add(d as usize);
        chars.next();
    }
    n
}

/// `printf({fmt}, {expr1} ...)`
fn printf(args: &[Value], _interp: &mut Interp) -> Result<Value> {
    let fmt = args[0].to_str()?.into_owned();
    let mut rest = args[1..].iter();
    let mut out = String::new();
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        if chars.peek() == Some(&'%') {
            chars.next();
            out.push('%');
            continue;
        }

        let mut spec = FormatSpec::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => spec.left = true,
                '0' => spec.zero = true,
                '+' => spec.plus = true,
                ' ' => spec.space = true,
                '#' => spec.alt = true,
                _ => break,
            }
            chars.next();
        }
        if chars.peek() == Some(&'*') {
            chars.next();
            let width = next_arg(&mut rest)?.to_number()?;
            spec.left |= width < 0;
            spec.width = width.unsigned_abs() as usize;
        } else {
            spec.width = read_digits(&mut chars);
        }
        if chars.peek() == Some(&'.') {
            chars.next();
            spec.precision = Some(if chars.peek() == Some(&'*') {
                chars.next();
                next_arg(&mut rest)?.to_number()?.max(0) as usize
            } else {
                read_digits(&mut chars)
            });
        }
        while matches!(chars.peek(), Some('h' | 'l')) {
            chars.next();
        }

        let Some(conv) = chars.next() else {
            return err_other(format!("Incomplete format: {fmt}"));
        };
        match conv {
            'd' | 'i' => {
                let n = next_arg(&mut rest)?.to_number()?;
                let sign = if n < 0 {
                    "-"
                } else if spec.plus {
                    "+"
                } else if spec.space {
                    " "
                } else {
                    ""
                };
                let digits = with_precision(n.unsigned_abs().to_string(), &spec);
                pad_number(&mut out, sign, "", &digits, &spec);
            }
            'x' | 'X' | 'o' => {
                let n = next_arg(&mut rest)?.to_number()? as u64;
                let (digits, prefix) = match conv {
                    'x' => (format!("{n:x}"), "0x"),
                    'X' => (format!("{n:X}"), "0X"),
                    _ => (format!("{n:o}"), "0"),
                };
                let prefix = if spec.alt && n != 0 { prefix } else { "" };
                let digits = with_precision(digits, &spec);
                pad_number(&mut out, "", prefix, &digits, &spec);
            }
            'c' => {
                let n = next_arg(&mut rest)?.to_number()?;
                let c = char::from(n as u8);
                pad_text(&mut out, &c.to_string(), &spec);
            }
            's' => {
                let text = next_arg(&mut rest)?.to_str()?;
                let text: String = match spec.precision {
                    Some(p) => text.chars().take(p).collect(),
                    None => text.into_owned(),
                };
                pad_text(&mut out, &text, &spec);
            }
            other => return err_other(format!("Unsupported format character: %{other}")),
        }
    }
    if rest.next().is_some() {
        return err_arity("Too many arguments for printf()");
    }
    Ok(Value::str(out))
}

/// Zero-extend `digits` to the precision; precision 0 prints nothing for 0.
fn with_precision(digits: String, spec: &FormatSpec) -> String {
    match spec.precision {
        Some(0) if digits == "0" => String::new(),
        Some(p) if digits.len() < p => format!("{}{digits}", "0".repeat(p - digits.len())),
        _ => digits,
    }
}

fn pad_number(out: &mut String, sign: &str, prefix: &str, digits: &str, spec: &FormatSpec) {
    let len = sign.len() + prefix.len() + digits.len();
    let fill = spec.width.saturating_sub(len);
    if spec.left {
        out.extend([sign, prefix, digits]);
        out.extend(std::iter::repeat_n(' ', fill));
    } else if spec.zero && spec.precision.is_none() {
        out.extend([sign, prefix]);
        out.extend(std::iter::repeat_n('0', fill));
        out.push_str(digits);
    } else {
        out.extend(std::iter::repeat_n(' ', fill));
        out.extend([sign, prefix, digits]);
    }
}

fn pad_text(out: &mut String, text: &str, spec: &FormatSpec) {
    let fill = spec.width.saturating_sub(text.chars().count());
    if spec.left {
        out.push_str(text);
        out.extend(std::iter::repeat_n(' ', fill));
    } else {
        out.extend(std::iter::repeat_n(' ', fill));
        out.push_str(text);
    }
}
