//! Services the interpreter borrows from the editor around it.
//!
//! [`StandaloneHost`] provides them without an editor: one buffer, an option
//! table, registers, the `regex` crate and an optional autoload directory.

use std::cell::RefCell;
use std::fs;
use std::path::PathBuf;
use std::rc::Rc;

use anyhow::Result;
use regex::{Regex, RegexBuilder};
use tracing::debug;

use crate::config::InterpConfig;
use crate::error::{err_other, err_type};
use crate::util::fast_map::{FastHashMap, fast_hash_map_new};
use crate::val::Value;

/// Which value of a buffer- or window-local option `&name` refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptionScope {
    /// `&name`: the local value when set, else the global one.
    Both,
    /// `&l:name`
    Local,
    /// `&g:name`
    Global,
}

/// A compiled pattern.
pub trait CompiledRegex {
    /// Byte range of the first match at or after `start`.
    fn exec(&self, subject: &str, start: usize) -> Option<(usize, usize)>;

    /// Like [`CompiledRegex::exec`] but also reports the `\(\)` groups; entry 0
    /// is the whole match.
    fn exec_groups(&self, subject: &str, start: usize) -> Option<Vec<Option<(usize, usize)>>> {
        self.exec(subject, start).map(|m| vec![Some(m)])
    }
}

pub trait Host {
    fn buffer_id(&self) -> u32 {
        1
    }

    fn window_id(&self) -> u32 {
        1
    }

    fn tab_id(&self) -> u32 {
        1
    }

    fn changedtick(&self, _buffer: u32) -> i64 {
        0
    }

    fn cursor_line(&self) -> i64 {
        1
    }

    fn line_count(&self) -> i64 {
        1
    }

    fn set_cursor_line(&mut self, _lnum: i64) {}

    /// Option value (Number or String), `None` for an unknown option.
    fn get_option(&self, name: &str, scope: OptionScope) -> Option<Value>;

    fn set_option(&mut self, name: &str, value: &Value, scope: OptionScope) -> Result<()>;

    fn register(&self, name: char) -> Option<String>;

    fn set_register(&mut self, name: char, text: &str) -> Result<()>;

    fn env_var(&self, name: &str) -> Option<String>;

    fn set_env_var(&mut self, name: &str, value: &str);

    /// `None` when the pattern is invalid.
    fn compile_regex(&self, pattern: &str, ignore_case: bool) -> Option<Box<dyn CompiledRegex>>;

    /// Lines of the script that should define the autoload name `name`
    /// (`foo#bar#Func` or `foo#bar#var`), or `None` when there is none.
    fn autoload(&mut self, name: &str) -> Option<Vec<String>>;

    /// Show a message. `newline` starts a new message line (`:echo`);
    /// otherwise the text continues the current one (`:echon`).
    fn echo(&mut self, text: &str, newline: bool);

    fn error(&mut self, text: &str);

    /// End a message line that is still open, before the prompt or exit.
    fn flush(&mut self) {}

    /// Polled in loops and calls; returning true aborts the running command.
    fn interrupted(&mut self) -> bool {
        false
    }
}

/// Messages written by a [`StandaloneHost`] that captures its output.
#[derive(Debug, Default, Clone)]
pub struct Captured {
    pub messages: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug)]
enum Output {
    Stdio { line_open: bool },
    Capture(Rc<RefCell<Captured>>),
}

/// A buffer-less host for scripts, the REPL and tests.
#[derive(Debug)]
pub struct StandaloneHost {
    options: FastHashMap<String, Value>,
    local_options: FastHashMap<String, Value>,
    registers: FastHashMap<char, String>,
    env: FastHashMap<String, String>,
    autoload_dir: Option<PathBuf>,
    output: Output,
    cursor_line: i64,
    line_count: i64,
    changedtick: i64,
}

const LOCAL_OPTIONS: &[&str] = &["tabstop", "shiftwidth", "filetype"];

impl StandaloneHost {
    pub fn new(config: &InterpConfig) -> Self {
        let mut options = fast_hash_map_new();
        options.insert("ignorecase".to_string(), Value::Number(config.ignorecase as i64));
        options.insert("maxfuncdepth".to_string(), Value::Number(config.max_func_depth as i64));
        options.insert("tabstop".to_string(), Value::Number(8));
        options.insert("shiftwidth".to_string(), Value::Number(8));
        options.insert("filetype".to_string(), Value::str(""));
        Self {
            options,
            local_options: fast_hash_map_new(),
            registers: fast_hash_map_new(),
            env: fast_hash_map_new(),
            autoload_dir: None,
            output: Output::Stdio { line_open: false },
            cursor_line: 1,
            line_count: 1,
            changedtick: 1,
        }
    }

    /// Host that records messages instead of printing them.
    pub fn captured(config: &InterpConfig) -> (Self, Rc<RefCell<Captured>>) {
        let log = Rc::new(RefCell::new(Captured::default()));
        let mut host = Self::new(config);
        host.output = Output::Capture(Rc::clone(&log));
        (host, log)
    }

    pub fn with_autoload_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.autoload_dir = Some(dir.into());
        self
    }

    /// Pretend the buffer has `count` lines.
    pub fn with_line_count(mut self, count: i64) -> Self {
        self.line_count = count.max(1);
        self
    }
}

impl Host for StandaloneHost {
    fn changedtick(&self, _buffer: u32) -> i64 {
        self.changedtick
    }

    fn cursor_line(&self) -> i64 {
        self.cursor_line
    }

    fn line_count(&self) -> i64 {
        self.line_count
    }

    fn set_cursor_line(&mut self, lnum: i64) {
        self.cursor_line = lnum.clamp(1, self.line_count);
    }

    fn get_option(&self, name: &str, scope: OptionScope) -> Option<Value> {
        let local = LOCAL_OPTIONS.contains(&name);
        match scope {
            OptionScope::Local if local => self
                .local_options
                .get(name)
                .or_else(|| self.options.get(name))
                .cloned(),
            OptionScope::Both => self
                .local_options
                .get(name)
                .or_else(|| self.options.get(name))
                .cloned(),
            _ => self.options.get(name).cloned(),
        }
    }

    fn set_option(&mut self, name: &str, value: &Value, scope: OptionScope) -> Result<()> {
        let Some(current) = self.options.get(name) else {
            return err_other(format!("Unknown option: {name}"));
        };
        let value = match current {
            Value::Number(_) => Value::Number(value.to_number()?),
            Value::String(_) => Value::String(value.to_bytes()?.into_owned()),
            _ => return err_type(format!("Invalid value for option: {name}")),
        };
        let local = LOCAL_OPTIONS.contains(&name);
        match scope {
            OptionScope::Local if local => {
                self.local_options.insert(name.to_string(), value);
            }
            OptionScope::Both if local => {
                self.local_options.insert(name.to_string(), value.clone());
                self.options.insert(name.to_string(), value);
            }
            _ => {
                self.options.insert(name.to_string(), value);
            }
        }
        self.changedtick += 1;
        Ok(())
    }

    fn register(&self, name: char) -> Option<String> {
        self.registers.get(&name).cloned()
    }

    fn set_register(&mut self, name: char, text: &str) -> Result<()> {
        match name {
            'a'..='z' | '0'..='9' | '"' | '-' | '/' => {
                self.registers.insert(name, text.to_string());
                // Writing a named register also fills the unnamed one.
                if name != '"' {
                    self.registers.insert('"', text.to_string());
                }
                Ok(())
            }
            'A'..='Z' => {
                let lower = name.to_ascii_lowercase();
                let reg = self.registers.entry(lower).or_default();
                reg.push_str(text);
                let joined = reg.clone();
                self.registers.insert('"', joined);
                Ok(())
            }
            _ => err_other(format!("Invalid register name: '{name}'")),
        }
    }

    fn env_var(&self, name: &str) -> Option<String> {
        self.env.get(name).cloned().or_else(|| std::env::var(name).ok())
    }

    fn set_env_var(&mut self, name: &str, value: &str) {
        self.env.insert(name.to_string(), value.to_string());
    }

    fn compile_regex(&self, pattern: &str, ignore_case: bool) -> Option<Box<dyn CompiledRegex>> {
        let (translated, case) = translate_pattern(pattern);
        let ignore_case = case.unwrap_or(ignore_case);
        match RegexBuilder::new(&translated).case_insensitive(ignore_case).build() {
            Ok(re) => Some(Box::new(RegexMatcher(re))),
            Err(err) => {
                debug!(target: "vex::exec", pattern, %err, "regex compile failed");
                None
            }
        }
    }

    fn autoload(&mut self, name: &str) -> Option<Vec<String>> {
        let dir = self.autoload_dir.as_ref()?;
        let (script, _) = name.rsplit_once('#')?;
        let mut path = dir.clone();
        for part in script.split('#') {
            path.push(part);
        }
        path.set_extension("vim");
        debug!(target: "vex::exec", path = %path.display(), "autoload");
        let text = fs::read_to_string(&path).ok()?;
        Some(text.lines().map(str::to_string).collect())
    }

    fn echo(&mut self, text: &str, newline: bool) {
        match &mut self.output {
            Output::Stdio { line_open } => {
                if newline && *line_open {
                    println!();
                }
                print!("{text}");
                *line_open = true;
            }
            Output::Capture(log) => {
                let mut log = log.borrow_mut();
                match log.messages.last_mut() {
                    Some(last) if !newline => last.push_str(text),
                    _ => log.messages.push(text.to_string()),
                }
            }
        }
    }

    fn error(&mut self, text: &str) {
        match &mut self.output {
            Output::Stdio { line_open } => {
                if *line_open {
                    println!();
                    *line_open = false;
                }
                eprintln!("{text}");
            }
            Output::Capture(log) => log.borrow_mut().errors.push(text.to_string()),
        }
    }

    fn flush(&mut self) {
        if let Output::Stdio { line_open } = &mut self.output
            && *line_open
        {
            println!();
            *line_open = false;
        }
    }
}

struct RegexMatcher(Regex);

impl CompiledRegex for RegexMatcher {
    fn exec(&self, subject: &str, start: usize) -> Option<(usize, usize)> {
        if start > subject.len() || !subject.is_char_boundary(start) {
            return None;
        }
        self.0.find_at(subject, start).map(|m| (m.start(), m.end()))
    }

    fn exec_groups(&self, subject: &str, start: usize) -> Option<Vec<Option<(usize, usize)>>> {
        if start > subject.len() || !subject.is_char_boundary(start) {
            return None;
        }
        let caps = self.0.captures_at(subject, start)?;
        Some(caps.iter().map(|m| m.map(|m| (m.start(), m.end()))).collect())
    }
}

/// Translate a pattern in the editor's "magic" syntax to `regex` syntax. Also
/// returns the case override requested by `\c` / `\C`.
pub fn translate_pattern(pattern: &str) -> (String, Option<bool>) {
    let mut out = String::with_capacity(pattern.len() + 8);
    let mut case = None;
    let mut chars = pattern.chars().peekable();
    let mut in_class = false;
    while let Some(c) = chars.next() {
        if in_class {
            match c {
                ']' => {
                    in_class = false;
                    out.push(']');
                }
                '\\' => match chars.next() {
                    Some(n) => {
                        out.push('\\');
                        out.push(n);
                    }
                    None => out.push_str("\\\\"),
                },
                '[' => out.push_str("\\["),
                _ => out.push(c),
            }
            continue;
        }
        match c {
            '\\' => match chars.next() {
                Some('(') => out.push('('),
                Some(')') => out.push(')'),
                Some('|') => out.push('|'),
                Some('{') => {
                    out.push('{');
                    // `\{-n,m}` is the lazy form.
                    let lazy = chars.peek() == Some(&'-');
                    if lazy {
                        chars.next();
                    }
                    for n in chars.by_ref() {
                        if n == '}' {
                            break;
                        }
                        if n != '\\' {
                            out.push(n);
                        }
                    }
                    if out.ends_with('{') {
                        out.push('0');
                        out.push(',');
                    }
                    out.push('}');
                    if lazy {
                        out.push('?');
                    }
                }
                Some('+') => out.push('+'),
                Some('=') | Some('?') => out.push('?'),
                Some('<') | Some('>') => out.push_str("\\b"),
                Some('c') => case = Some(true),
                Some('C') => case = Some(false),
                Some('a') => out.push_str("[A-Za-z]"),
                Some('A') => out.push_str("[^A-Za-z]"),
                Some('l') => out.push_str("[a-z]"),
                Some('u') => out.push_str("[A-Z]"),
                Some('h') => out.push_str("[A-Za-z_]"),
                Some('e') => out.push_str("\\x1b"),
                Some('t') => out.push_str("\\t"),
                Some('n') => out.push_str("\\n"),
                Some('r') => out.push_str("\\r"),
                Some(n @ ('s' | 'S' | 'd' | 'D' | 'w' | 'W' | '.' | '*' | '[' | ']' | '^' | '$' | '/' | '\\' | '~')) => {
                    out.push('\\');
                    out.push(n);
                }
                Some(n) => out.push(n),
                None => out.push_str("\\\\"),
            },
            '[' => {
                in_class = true;
                out.push('[');
                if chars.peek() == Some(&'^') {
                    out.push('^');
                    chars.next();
                }
                if chars.peek() == Some(&']') {
                    out.push_str("\\]");
                    chars.next();
                }
            }
            '(' | ')' | '|' | '{' | '}' | '+' | '?' => {
                out.push('\\');
                out.push(c);
            }
            _ => out.push(c),
        }
    }
    (out, case)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_magic_groups() {
        assert_eq!(translate_pattern(r"\(ab\)\+").0, "(ab)+");
        assert_eq!(translate_pattern(r"a\|b").0, "a|b");
        assert_eq!(translate_pattern("(x)").0, r"\(x\)");
        assert_eq!(translate_pattern(r"\<word\>").0, r"\bword\b");
        assert_eq!(translate_pattern(r"x\{2,3}").0, "x{2,3}");
        assert_eq!(translate_pattern(r"\cFoo"), ("Foo".to_string(), Some(true)));
    }

    #[test]
    fn test_regex_exec_from_offset() {
        let host = StandaloneHost::new(&InterpConfig::default());
        let re = host.compile_regex("o", false).expect("valid pattern");
        assert_eq!(re.exec("foo", 0), Some((1, 2)));
        assert_eq!(re.exec("foo", 2), Some((2, 3)));
        assert_eq!(re.exec("foo", 3), None);
        assert!(host.compile_regex(r"\(", false).is_none());
    }

    #[test]
    fn test_captured_echo_and_echon() {
        let (mut host, log) = StandaloneHost::captured(&InterpConfig::default());
        host.echo("a", true);
        host.echo("b", false);
        host.echo("c", true);
        host.error("E: bad");
        let log = log.borrow();
        assert_eq!(log.messages, vec!["ab", "c"]);
        assert_eq!(log.errors, vec!["E: bad"]);
    }
}
