//! Command executor.
//!
//! Scripts and function bodies are run line by line. A line holds one command;
//! its name may be abbreviated down to the length listed in [`COMMANDS`].
//! `:if`, `:while` and `:for` keep a block stack per executed program, and
//! loops jump back by line index, so every line read from a [`LineSource`] is
//! kept until the program ends.

use std::rc::Rc;

use anyhow::Result;
use tracing::{debug, trace};

use crate::error::{ErrorKind, VexError, err_range, err_syntax};
use crate::expr::Cursor;
use crate::func::UserFunction;
use crate::interp::Interp;
use crate::val::Value;

mod block;
mod cmds;
mod let_cmd;

#[cfg(test)]
mod exec_test;
#[cfg(test)]
mod let_test;

use block::Block;

/// Where the lines of a script come from.
pub trait LineSource {
    /// The next complete line, `None` at the end.
    fn next_line(&mut self) -> Option<String>;

    /// Continuation lines folded into the line last returned.
    fn joined(&self) -> usize {
        0
    }
}

/// Lines of a script held in memory. A line whose first non-blank character
/// is a backslash continues the line before it.
#[derive(Debug)]
pub struct Lines {
    lines: std::iter::Peekable<std::vec::IntoIter<String>>,
    joined: usize,
}

impl Lines {
    pub fn new(lines: Vec<String>) -> Self {
        Self {
            lines: lines.into_iter().peekable(),
            joined: 0,
        }
    }

    pub fn from_text(text: &str) -> Self {
        Self::new(text.lines().map(str::to_string).collect())
    }
}

impl LineSource for Lines {
    fn next_line(&mut self) -> Option<String> {
        let mut line = self.lines.next()?;
        self.joined = 0;
        while let Some(next) = self.lines.next_if(|l| l.trim_start().starts_with('\\')) {
            line.push_str(&next.trim_start()[1..]);
            self.joined += 1;
        }
        Some(line)
    }

    fn joined(&self) -> usize {
        self.joined
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cmd {
    Let,
    Unlet,
    Lockvar,
    Unlockvar,
    If,
    Elseif,
    Else,
    Endif,
    While,
    Endwhile,
    For,
    Endfor,
    Break,
    Continue,
    Function,
    Endfunction,
    Delfunction,
    Return,
    Call,
    Echo,
    Echon,
    Echoerr,
    Execute,
}

/// Command names with the shortest accepted abbreviation. The first entry a
/// word abbreviates wins.
const COMMANDS: &[(&str, usize, Cmd)] = &[
    ("let", 3, Cmd::Let),
    ("unlet", 3, Cmd::Unlet),
    ("lockvar", 5, Cmd::Lockvar),
    ("unlockvar", 4, Cmd::Unlockvar),
    ("if", 2, Cmd::If),
    ("elseif", 5, Cmd::Elseif),
    ("else", 2, Cmd::Else),
    ("endif", 2, Cmd::Endif),
    ("while", 2, Cmd::While),
    ("endwhile", 4, Cmd::Endwhile),
    ("for", 3, Cmd::For),
    ("endfor", 5, Cmd::Endfor),
    ("break", 4, Cmd::Break),
    ("continue", 3, Cmd::Continue),
    ("function", 2, Cmd::Function),
    ("endfunction", 4, Cmd::Endfunction),
    ("delfunction", 4, Cmd::Delfunction),
    ("return", 4, Cmd::Return),
    ("call", 3, Cmd::Call),
    ("echo", 2, Cmd::Echo),
    ("echon", 5, Cmd::Echon),
    ("echoerr", 5, Cmd::Echoerr),
    ("execute", 3, Cmd::Execute),
];

impl Cmd {
    pub(crate) fn lookup(word: &str) -> Option<Cmd> {
        COMMANDS
            .iter()
            .find(|(name, min, _)| abbreviates(word, name, *min))
            .map(|(_, _, cmd)| *cmd)
    }

    fn takes_bang(self) -> bool {
        matches!(self, Cmd::Function | Cmd::Unlet | Cmd::Lockvar | Cmd::Unlockvar)
    }
}

/// Is `name` (possibly abbreviated) an Ex command?
pub fn command_exists(name: &str) -> bool {
    Cmd::lookup(name).is_some()
}

/// How `line` changes block nesting: 1 when it opens `:if`, `:while`, `:for`
/// or a function definition, -1 when it closes one, else 0.
pub fn block_nesting(line: &str) -> i32 {
    let (name, rest) = split_command(skip_colons(line));
    match Cmd::lookup(name) {
        Some(Cmd::If | Cmd::While | Cmd::For) => 1,
        Some(Cmd::Function) if rest.contains('(') => 1,
        Some(Cmd::Endif | Cmd::Endwhile | Cmd::Endfor | Cmd::Endfunction) => -1,
        _ => 0,
    }
}

/// Strip the colons and blanks a command may start with.
fn skip_colons(line: &str) -> &str {
    line.trim_start_matches(|c: char| c == ':' || c.is_whitespace())
}

/// Split a command line into its name and what follows.
pub(crate) fn split_command(line: &str) -> (&str, &str) {
    let end = line.find(|c: char| !c.is_ascii_alphabetic()).unwrap_or(line.len());
    line.split_at(end)
}

/// Does `word` abbreviate `name` with at least `min` characters?
fn abbreviates(word: &str, name: &str, min: usize) -> bool {
    word.len() >= min && name.starts_with(word)
}

/// Lines being run: a script read on demand, or the body of a function.
/// Both keep a `None` placeholder for every continuation line, so an index
/// is the number of the source line.
pub(crate) enum Program<'a> {
    Script {
        source: &'a mut dyn LineSource,
        lines: Vec<Option<String>>,
    },
    Function(Rc<UserFunction>),
}

impl<'a> Program<'a> {
    fn script(source: &'a mut dyn LineSource) -> Self {
        Program::Script {
            source,
            lines: Vec::new(),
        }
    }

    /// The command starting at line `idx` and how many continuation lines
    /// follow it.
    fn line(&mut self, idx: usize) -> Option<(String, usize)> {
        if let Program::Script { source, lines } = self {
            while lines.len() <= idx {
                lines.push(Some(source.next_line()?));
                lines.extend(std::iter::repeat_n(None, source.joined()));
            }
        }
        let lines: &[Option<String>] = match self {
            Program::Script { lines, .. } => lines,
            Program::Function(func) => &func.body,
        };
        let line = lines.get(idx)?.clone()?;
        let joined = lines[idx + 1..].iter().take_while(|l| l.is_none()).count();
        Some((line, joined))
    }
}

/// State of one running program.
#[derive(Debug, Default)]
pub(crate) struct ExecState {
    blocks: Vec<Block>,
    /// Index of the next line.
    idx: usize,
    /// Index of the line being executed.
    current: usize,
    /// `:return` is allowed.
    in_function: bool,
    /// The first error stops the program (`abort` functions).
    abort_on_error: bool,
}

impl ExecState {
    /// Are commands at the current position executed?
    fn executing(&self) -> bool {
        self.blocks.iter().all(|b| b.active)
    }
}

impl Interp {
    /// Execute a script in a fresh `s:` scope. Every error is reported through
    /// the host as it happens; the first one is also returned.
    pub fn source_lines(&mut self, source: &mut dyn LineSource) -> Result<()> {
        self.begin_command();
        let script_id = self.new_script_id();
        let saved_script = std::mem::replace(&mut self.ctx.script_id, script_id);
        // A script sourced from inside a function does not see its locals.
        let saved_frames = std::mem::take(&mut self.ctx.frames);
        debug!(target: "vex::exec", script_id, "sourcing script");

        let result = self.collect_errors(|interp| {
            let state = ExecState::default();
            interp.run_program(&mut Program::script(source), state);
            Ok(())
        });

        self.ctx.frames = saved_frames;
        self.ctx.script_id = saved_script;
        self.after_call();
        self.collect_if_wanted();
        result
    }

    pub fn source_str(&mut self, text: &str) -> Result<()> {
        self.source_lines(&mut Lines::from_text(text))
    }

    /// Execute command lines typed at the prompt, outside any script. A block
    /// such as `:if` .. `:endif` must be complete within `text`.
    pub fn execute_line(&mut self, text: &str) -> Result<()> {
        self.begin_command();
        let result = self.collect_errors(|interp| {
            let mut source = Lines::from_text(text);
            interp.run_program(&mut Program::script(&mut source), ExecState::default());
            Ok(())
        });
        self.after_call();
        self.collect_if_wanted();
        result
    }

    /// Run the body of the function on top of the call stack.
    pub(crate) fn run_function_body(&mut self) -> Result<()> {
        let Some(frame) = self.ctx.frames.last() else {
            return Ok(());
        };
        let func = frame.func.clone();
        let state = ExecState {
            in_function: true,
            abort_on_error: func.flags.abort,
            ..ExecState::default()
        };
        self.run_program(&mut Program::Function(func), state);
        Ok(())
    }

    /// Run every line of `program`, reporting errors as they happen.
    fn run_program(&mut self, program: &mut Program, mut state: ExecState) {
        self.ctx.exec_depth += 1;
        let outermost = self.ctx.frames.is_empty() && self.ctx.exec_depth == 1;
        let finished = self.run_lines(program, &mut state, outermost);
        self.ctx.exec_depth -= 1;

        if finished && let Some(block) = state.blocks.last() {
            let err = VexError::new(ErrorKind::Syntax, block.missing_end());
            self.report_error(&err.into());
        }
        for block in state.blocks.drain(..).rev() {
            if let Some(cursor) = block.cursor {
                self.end_iteration(cursor);
            }
        }
    }

    /// Returns true when the lines ran out, false when execution stopped early.
    fn run_lines(&mut self, program: &mut Program, state: &mut ExecState, outermost: bool) -> bool {
        loop {
            if self.ctx.got_int {
                return false;
            }
            if outermost {
                self.ctx.did_emsg = false;
                self.ctx.aborting = false;
            } else if self.ctx.aborting {
                return false;
            }
            if state.in_function && self.ctx.frames.last().is_some_and(|f| f.returned()) {
                return false;
            }
            let Some((line, joined)) = program.line(state.idx) else {
                return true;
            };
            if let Program::Function(_) = program
                && let Some(frame) = self.ctx.frames.last_mut()
            {
                frame.line = state.idx;
            }
            state.current = state.idx;
            state.idx += 1 + joined;

            if let Err(err) = self.check_interrupt() {
                self.report_error(&err);
                return false;
            }
            trace!(target: "vex::exec", line = %line, "command");
            if let Err(err) = self.do_one_command(&line, program, state) {
                self.report_error(&err);
                if state.abort_on_error {
                    self.ctx.aborting = true;
                }
            }
        }
    }

    fn do_one_command(&mut self, line: &str, program: &mut Program, state: &mut ExecState) -> Result<()> {
        let text = skip_colons(line);
        if text.is_empty() || text.starts_with('"') {
            return Ok(());
        }
        let line_idx = state.current;
        let skipping = !state.executing();

        let (range, rest) = self.parse_range(text, skipping)?;
        let (word, args) = split_command(rest);
        let Some(cmd) = Cmd::lookup(word) else {
            if skipping {
                return Ok(());
            }
            return err_syntax(format!("Not an editor command: {text}"));
        };
        if range.is_some() && cmd != Cmd::Call && !skipping {
            return err_syntax("No range allowed");
        }
        let (bang, args) = match args.strip_prefix('!') {
            Some(rest) if cmd.takes_bang() => (true, rest),
            _ => (false, args),
        };
        let args = args.trim();

        match cmd {
            Cmd::If => self.ex_if(args, state),
            Cmd::Elseif => self.ex_elseif(args, state),
            Cmd::Else => block::ex_else(state),
            Cmd::Endif => block::ex_endif(state),
            Cmd::While => self.ex_while(args, line_idx, state),
            Cmd::For => self.ex_for(args, line_idx, state),
            Cmd::Endwhile | Cmd::Endfor => self.ex_endloop(cmd, state),
            Cmd::Break => block::ex_break(state, false),
            Cmd::Continue => block::ex_break(state, true),
            Cmd::Function => self.ex_function(args, bang, skipping, program, state),
            Cmd::Endfunction if skipping => Ok(()),
            Cmd::Endfunction => err_syntax(":endfunction not inside a function"),
            Cmd::Return => self.ex_return(args, skipping, state),
            _ if skipping => Ok(()),
            Cmd::Let => self.ex_let(args),
            Cmd::Unlet => self.ex_unlet(args, bang),
            Cmd::Lockvar => self.ex_lockvar(args, bang, true),
            Cmd::Unlockvar => self.ex_lockvar(args, bang, false),
            Cmd::Delfunction => self.delete_function(args),
            Cmd::Call => self.ex_call(args, range),
            Cmd::Echo => self.ex_echo(args, true),
            Cmd::Echon => self.ex_echo(args, false),
            Cmd::Echoerr => self.ex_echoerr(args),
            Cmd::Execute => self.ex_execute(args, state),
        }
    }

    /// Evaluate the expression argument of a command. A `"` comment may follow.
    pub(crate) fn eval_cmd_expr(&mut self, text: &str) -> Result<Value> {
        let mut cur = Cursor::new(text);
        cur.skip_white();
        if cur.at_end() {
            return err_syntax("Argument required");
        }
        let value = self.eval1(&mut cur, true)?;
        cur.skip_white();
        if !cur.at_end() && cur.peek() != Some(b'"') {
            self.heap.release(value);
            return err_syntax(format!("Invalid expression: {text}"));
        }
        Ok(value)
    }

    /// `N`, `N,M`, `%`, `.` and `$`, each with `+N` / `-N` offsets, in front
    /// of a command.
    fn parse_range<'t>(&self, text: &'t str, skipping: bool) -> Result<(Option<(i64, i64)>, &'t str)> {
        let mut cur = Cursor::new(text);
        let line_count = self.host.line_count();
        let (first, second) = if cur.eat(b'%') {
            (1, line_count)
        } else {
            let Some(first) = self.parse_address(&mut cur) else {
                return Ok((None, text));
            };
            let second = if cur.eat(b',') {
                self.parse_address(&mut cur).unwrap_or_else(|| self.host.cursor_line())
            } else {
                first
            };
            (first, second)
        };
        cur.skip_white();
        if !skipping {
            if first > second {
                return err_range("Backwards range given");
            }
            if first < 0 || second > line_count {
                return err_range("Invalid range");
            }
        }
        Ok((Some((first, second)), cur.rest()))
    }

    fn parse_address(&self, cur: &mut Cursor) -> Option<i64> {
        let mut lnum = match cur.peek()? {
            b'.' => {
                cur.advance(1);
                self.host.cursor_line()
            }
            b'$' => {
                cur.advance(1);
                self.host.line_count()
            }
            b'0'..=b'9' => cur.take_while(|b| b.is_ascii_digit()).parse().unwrap_or(i64::MAX),
            b'+' | b'-' => self.host.cursor_line(),
            _ => return None,
        };
        while let Some(sign @ (b'+' | b'-')) = cur.peek() {
            cur.advance(1);
            let digits = cur.take_while(|b| b.is_ascii_digit());
            let n: i64 = if digits.is_empty() { 1 } else { digits.parse().unwrap_or(i64::MAX) };
            lnum = if sign == b'+' { lnum.saturating_add(n) } else { lnum.saturating_sub(n) };
        }
        Some(lnum)
    }
}


#[cfg(test)]
pub use test_support::*;
