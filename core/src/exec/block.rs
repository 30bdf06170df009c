//! `:if`, `:while` and `:for` blocks.

use anyhow::Result;

use crate::error::{err_syntax, err_type};
use crate::expr::Cursor;
use crate::interp::{AssignOp, Interp, ListCursor};
use crate::val::Value;

use super::{Cmd, ExecState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum BlockKind {
    If,
    While,
    For,
}

#[derive(Debug)]
pub(super) struct Block {
    pub(super) kind: BlockKind,
    /// Commands inside are executed.
    pub(super) active: bool,
    /// A branch of this `:if` was taken, or its condition failed.
    done: bool,
    seen_else: bool,
    /// Line of the `:while` or `:for`.
    start: usize,
    /// Jumped back from the loop end; the loop command continues this block.
    again: bool,
    continuing: bool,
    /// Iteration state and targets of a `:for`.
    pub(super) cursor: Option<ListCursor>,
    targets: String,
}

impl Block {
    fn new(kind: BlockKind, active: bool, start: usize) -> Self {
        Self {
            kind,
            active,
            done: active,
            seen_else: false,
            start,
            again: false,
            continuing: false,
            cursor: None,
            targets: String::new(),
        }
    }

    /// A block inside code that is not executed; no branch of it runs.
    fn skipped(kind: BlockKind, start: usize) -> Self {
        Self {
            done: true,
            ..Self::new(kind, false, start)
        }
    }

    fn is_loop(&self) -> bool {
        matches!(self.kind, BlockKind::While | BlockKind::For)
    }

    /// Message for a block left open at the end of a program.
    pub(super) fn missing_end(&self) -> &'static str {
        match self.kind {
            BlockKind::If => "Missing :endif",
            BlockKind::While => "Missing :endwhile",
            BlockKind::For => "Missing :endfor",
        }
    }
}

/// The loop block on top of the stack when the loop command at `line` is
/// reached again from its end.
fn resumed_loop(state: &mut ExecState, kind: BlockKind, line: usize) -> Option<&mut Block> {
    state
        .blocks
        .last_mut()
        .filter(|b| b.kind == kind && b.again && b.start == line)
}

pub(super) fn ex_else(state: &mut ExecState) -> Result<()> {
    let Some(block) = state.blocks.last_mut().filter(|b| b.kind == BlockKind::If) else {
        return err_syntax(":else without :if");
    };
    if block.seen_else {
        return err_syntax("Multiple :else");
    }
    block.seen_else = true;
    block.active = !block.done;
    block.done = true;
    Ok(())
}

pub(super) fn ex_endif(state: &mut ExecState) -> Result<()> {
    if !state.blocks.last().is_some_and(|b| b.kind == BlockKind::If) {
        return err_syntax(":endif without :if");
    }
    state.blocks.pop();
    Ok(())
}

/// `:break`, or `:continue` with `resume`.
pub(super) fn ex_break(state: &mut ExecState, resume: bool) -> Result<()> {
    let executing = state.executing();
    let Some(block) = state.blocks.iter_mut().rev().find(|b| b.is_loop()) else {
        return err_syntax(if resume {
            ":continue without :while or :for"
        } else {
            ":break without :while or :for"
        });
    };
    if executing {
        block.active = false;
        block.continuing = resume;
    }
    Ok(())
}

impl Interp {
    pub(super) fn ex_if(&mut self, args: &str, state: &mut ExecState) -> Result<()> {
        if !state.executing() {
            state.blocks.push(Block::skipped(BlockKind::If, state.idx));
            return Ok(());
        }
        let cond = self.eval_condition(args);
        let active = *cond.as_ref().unwrap_or(&false);
        let mut block = Block::new(BlockKind::If, active, state.idx);
        // A failing condition takes neither branch.
        block.done = active || cond.is_err();
        state.blocks.push(block);
        cond.map(|_| ())
    }

    pub(super) fn ex_elseif(&mut self, args: &str, state: &mut ExecState) -> Result<()> {
        let Some(block) = state.blocks.last() else {
            return err_syntax(":elseif without :if");
        };
        if block.kind != BlockKind::If {
            return err_syntax(":elseif without :if");
        }
        if block.seen_else {
            return err_syntax(":elseif after :else");
        }
        let evaluate = !block.done;
        let cond = if evaluate { self.eval_condition(args) } else { Ok(false) };
        let Some(block) = state.blocks.last_mut() else {
            return Ok(());
        };
        let active = *cond.as_ref().unwrap_or(&false);
        block.active = active;
        block.done = block.done || active || cond.is_err();
        cond.map(|_| ())
    }

    pub(super) fn ex_while(&mut self, args: &str, line: usize, state: &mut ExecState) -> Result<()> {
        let resumed = resumed_loop(state, BlockKind::While, line).is_some();
        if !resumed && !state.executing() {
            state.blocks.push(Block::skipped(BlockKind::While, line));
            return Ok(());
        }
        let cond = self.eval_condition(args);
        let active = *cond.as_ref().unwrap_or(&false);
        match resumed_loop(state, BlockKind::While, line) {
            Some(block) => {
                block.again = false;
                block.active = active;
            }
            None => state.blocks.push(Block::new(BlockKind::While, active, line)),
        }
        cond.map(|_| ())
    }

    pub(super) fn ex_for(&mut self, args: &str, line: usize, state: &mut ExecState) -> Result<()> {
        if let Some(block) = resumed_loop(state, BlockKind::For, line) {
            block.again = false;
            return self.next_for_item(state);
        }
        if !state.executing() {
            state.blocks.push(Block::skipped(BlockKind::For, line));
            return Ok(());
        }

        let mut block = Block::new(BlockKind::For, false, line);
        let started = self.start_for(args, &mut block);
        state.blocks.push(block);
        started?;
        self.next_for_item(state)
    }

    /// Parse `{var} in {expr}` and start iterating over the List.
    fn start_for(&mut self, args: &str, block: &mut Block) -> Result<()> {
        let mut cur = Cursor::new(args);
        self.skip_var_list(&mut cur)?;
        block.targets = cur.slice(0, cur.pos()).trim().to_string();
        cur.skip_white();
        if !(cur.eat_str("in") && matches!(cur.peek(), Some(b' ' | b'\t'))) {
            return err_syntax(format!("Missing \"in\" after :for: {args}"));
        }
        let value = self.eval_cmd_expr(cur.rest())?;
        let Value::List(list) = value else {
            self.heap.release(value);
            return err_type("List required");
        };
        block.cursor = Some(self.begin_iteration(list));
        self.heap.release(value);
        Ok(())
    }

    /// Assign the next item of the `:for` on top of the stack to its targets.
    fn next_for_item(&mut self, state: &mut ExecState) -> Result<()> {
        let Some(block) = state.blocks.last_mut() else {
            return Ok(());
        };
        let item = block.cursor.as_ref().and_then(|c| self.advance(c));
        let Some(item) = item else {
            block.active = false;
            return Ok(());
        };
        let targets = block.targets.clone();
        let result = self.let_targets(&targets, &item, AssignOp::Set);
        self.heap.release(item);
        if let Some(block) = state.blocks.last_mut() {
            block.active = result.is_ok();
        }
        result
    }

    /// `:endwhile` / `:endfor`: jump back to the loop start or leave the loop.
    pub(super) fn ex_endloop(&mut self, cmd: Cmd, state: &mut ExecState) -> Result<()> {
        let (kind, name, other) = match cmd {
            Cmd::Endfor => (BlockKind::For, ":endfor without :for", "Using :endfor with :while"),
            _ => (BlockKind::While, ":endwhile without :while", "Using :endwhile with :for"),
        };
        let Some(block) = state.blocks.last_mut() else {
            return err_syntax(name);
        };
        if block.kind == BlockKind::If {
            return err_syntax("Missing :endif");
        }
        if block.kind != kind {
            return err_syntax(other);
        }
        if block.active || block.continuing {
            block.continuing = false;
            block.again = true;
            state.idx = block.start;
            return Ok(());
        }
        if let Some(block) = state.blocks.pop()
            && let Some(cursor) = block.cursor
        {
            self.end_iteration(cursor);
        }
        Ok(())
    }

    fn eval_condition(&mut self, args: &str) -> Result<bool> {
        let value = self.eval_cmd_expr(args)?;
        self.take_truthy(value)
    }
}
