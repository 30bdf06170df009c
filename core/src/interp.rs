use std::rc::Rc;

use anyhow::Result;
use tracing::{debug, trace};

use crate::config::InterpConfig;
use crate::error::{ErrorKind, VexError, err_interrupted, error_kind};
use crate::func::{CallFrame, FuncRegistry};
use crate::host::{Host, OptionScope, StandaloneHost};
use crate::module::{BuiltinRegistry, CoreModule, Module};
use crate::scope::Scopes;
use crate::util::fast_map::{FastHashSet, fast_hash_set_new};
use crate::val::{DictId, Heap, ListId, Value};

/// 求值上下文：当前调用栈、脚本编号、沙箱计数以及错误状态。
///
/// - `did_emsg`：当前顶层命令中已经报告过错误；
/// - `aborting`：出错后需要停止后续执行（`abort` 函数或中断）。
#[derive(Debug, Default)]
pub struct EvalContext {
    pub(crate) frames: Vec<CallFrame>,
    /// Script whose `s:` variables and `<SID>` functions are visible; 0 outside scripts.
    pub script_id: u32,
    pub sandbox: u32,
    pub did_emsg: bool,
    pub aborting: bool,
    /// An interrupt arrived; unlike `aborting` this survives until the next
    /// command from outside.
    pub(crate) got_int: bool,
    pub(crate) brace_depth: usize,
    pub(crate) expr_depth: usize,
    pub(crate) exec_depth: usize,
    pub(crate) want_gc: bool,
    error_count: usize,
    first_error: Option<VexError>,
    last_script_id: u32,
}

/// Locals of a returned call that are still referenced from outside.
#[derive(Debug)]
pub(crate) struct KeptFrame {
    name: Rc<str>,
    locals: DictId,
    args: DictId,
    varargs: ListId,
}

/// Operator of an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    /// `=`
    Set,
    /// `+=`
    Add,
    /// `-=`
    Sub,
    /// `.=`
    Concat,
}

impl AssignOp {
    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Set => "=",
            AssignOp::Add => "+=",
            AssignOp::Sub => "-=",
            AssignOp::Concat => ".=",
        }
    }
}

/// Position of a running `for` over a List; see [`Interp::begin_iteration`].
#[derive(Debug)]
pub struct ListCursor {
    list: ListId,
    watcher: u32,
}

impl ListCursor {
    pub fn list(&self) -> ListId {
        self.list
    }
}

/// The interpreter: heap, scopes, functions and the host they run against.
pub struct Interp {
    pub heap: Heap,
    pub(crate) scopes: Scopes,
    pub(crate) funcs: FuncRegistry,
    pub(crate) builtins: BuiltinRegistry,
    pub config: InterpConfig,
    pub ctx: EvalContext,
    pub(crate) host: Box<dyn Host>,
    pub(crate) kept_frames: Vec<KeptFrame>,
    pub(crate) autoloaded: FastHashSet<String>,
}

impl std::fmt::Debug for Interp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interp")
            .field("config", &self.config)
            .field("ctx", &self.ctx)
            .field("functions", &self.funcs.len())
            .field("builtins", &self.builtins.len())
            .finish()
    }
}

impl Interp {
    pub fn new(host: Box<dyn Host>, config: InterpConfig) -> Result<Self> {
        let mut heap = Heap::new();
        let scopes = Scopes::new(&mut heap)?;
        let mut builtins = BuiltinRegistry::new();
        builtins.register_module(&CoreModule::new())?;
        let ctx = EvalContext {
            sandbox: config.sandbox as u32,
            ..EvalContext::default()
        };
        Ok(Self {
            heap,
            scopes,
            funcs: FuncRegistry::new(),
            builtins,
            config,
            ctx,
            host,
            kept_frames: Vec::new(),
            autoloaded: fast_hash_set_new(),
        })
    }

    /// Interpreter with a [`StandaloneHost`] writing to stdout/stderr.
    pub fn standalone(config: InterpConfig) -> Result<Self> {
        let host = StandaloneHost::new(&config);
        Self::new(Box::new(host), config)
    }

    pub fn register_module(&mut self, module: &dyn Module) -> Result<()> {
        self.builtins.register_module(module)
    }

    pub fn builtins(&self) -> &BuiltinRegistry {
        &self.builtins
    }

    pub fn host(&self) -> &dyn Host {
        self.host.as_ref()
    }

    pub fn host_mut(&mut self) -> &mut dyn Host {
        self.host.as_mut()
    }

    pub fn scopes(&self) -> &Scopes {
        &self.scopes
    }

    /// Number of errors reported so far.
    pub fn error_count(&self) -> usize {
        self.ctx.error_count
    }

    /// Allocate an id for a newly sourced script.
    pub(crate) fn new_script_id(&mut self) -> u32 {
        self.ctx.last_script_id += 1;
        self.ctx.last_script_id
    }

    #[inline]
    pub(crate) fn at_top_level(&self) -> bool {
        self.ctx.frames.is_empty() && self.ctx.exec_depth == 0 && self.ctx.expr_depth == 0
    }

    /// Start of a command issued from outside: forget the error state of the previous one.
    pub(crate) fn begin_command(&mut self) {
        if self.at_top_level() {
            self.ctx.did_emsg = false;
            self.ctx.aborting = false;
            self.ctx.got_int = false;
        }
    }

    /// Global case setting for comparisons.
    pub fn ignorecase(&self) -> bool {
        match self.host.get_option("ignorecase", OptionScope::Global) {
            Some(v) => v.to_number().is_ok_and(|n| n != 0),
            None => self.config.ignorecase,
        }
    }

    pub(crate) fn max_func_depth(&self) -> usize {
        match self.host.get_option("maxfuncdepth", OptionScope::Global) {
            Some(Value::Number(n)) if n > 0 => n as usize,
            _ => self.config.max_func_depth,
        }
    }

    pub(crate) fn check_interrupt(&mut self) -> Result<()> {
        if self.ctx.got_int || self.host.interrupted() {
            self.ctx.got_int = true;
            self.ctx.aborting = true;
            return err_interrupted();
        }
        Ok(())
    }

    /// Show an error through the host. Errors following the first one are
    /// dropped once the current command is aborting.
    pub fn report_error(&mut self, err: &anyhow::Error) {
        let kind = error_kind(err);
        if kind == ErrorKind::Interrupted {
            self.ctx.got_int = true;
            self.ctx.aborting = true;
        }
        if self.ctx.aborting && self.ctx.did_emsg {
            trace!(target: "vex::exec", %err, "suppressed");
            return;
        }
        self.ctx.did_emsg = true;
        self.ctx.error_count += 1;
        let message = err.to_string();
        if let Some(frame) = self.ctx.frames.last() {
            debug!(target: "vex::exec", function = %frame.func.name, line = frame.line + 1, %message, "error in function");
        }
        if self.ctx.first_error.is_none() {
            self.ctx.first_error = Some(VexError::new(kind, message.clone()));
        }
        // v:errmsg always holds a String, so this cannot fail.
        let _ = self.set_vimvar("errmsg", Value::str(message.clone()));
        self.host.error(&message);
    }

    /// Run `f` and turn the first error reported meanwhile into its result.
    pub(crate) fn collect_errors(&mut self, f: impl FnOnce(&mut Self) -> Result<()>) -> Result<()> {
        let before = self.ctx.error_count;
        let saved = self.ctx.first_error.take();
        let result = f(self);
        let first = std::mem::replace(&mut self.ctx.first_error, saved);
        result?;
        match first {
            Some(err) if self.ctx.error_count > before => Err(err.into()),
            _ => Ok(()),
        }
    }

    /// Evaluate an expression; the whole text must be consumed.
    pub fn eval_to_value(&mut self, text: &str) -> Result<Value> {
        self.begin_command();
        self.eval_text(text)
    }

    pub fn eval_to_bool(&mut self, text: &str) -> Result<bool> {
        let value = self.eval_to_value(text)?;
        let result = value.is_truthy();
        self.heap.release(value);
        result
    }

    pub fn eval_to_number(&mut self, text: &str) -> Result<i64> {
        let value = self.eval_to_value(text)?;
        let result = value.to_number();
        self.heap.release(value);
        result
    }

    pub fn eval_to_string(&mut self, text: &str) -> Result<String> {
        let value = self.eval_to_value(text)?;
        let result = value.to_str().map(|s| s.into_owned());
        self.heap.release(value);
        result
    }

    /// Assign to an lvalue written as text: a variable, `d.key`, `l[i]`,
    /// `l[i:j]`, `&option`, `@r` or `$ENV`.
    pub fn assign(&mut self, target: &str, value: &Value, op: AssignOp) -> Result<()> {
        self.begin_command();
        self.let_one(target.trim(), value, op)
    }

    /// Call a function by name from outside a script.
    pub fn call_function(&mut self, name: &str, args: &[Value], use_sandbox: bool) -> Result<Value> {
        self.begin_command();
        if use_sandbox {
            self.ctx.sandbox += 1;
        }
        let result = self
            .script_function_name(name)
            .and_then(|name| self.call_func(&name, args, None, None));
        if use_sandbox {
            self.ctx.sandbox -= 1;
        }
        self.after_call();
        result
    }

    /// Register an iterator on `list`. Items removed while iterating are skipped.
    pub fn begin_iteration(&mut self, list: ListId) -> ListCursor {
        self.heap.inc_list(list);
        let first = self.heap.list(list).first();
        let watcher = self.heap.list_mut(list).add_watcher(first);
        ListCursor { list, watcher }
    }

    /// Next item with a new reference, `None` when done.
    pub fn advance(&mut self, cursor: &ListCursor) -> Option<Value> {
        let list = self.heap.list(cursor.list);
        let node = list.watcher_node(cursor.watcher)?;
        let next = list.next(node);
        let value = list.item(node).value.clone();
        self.heap.list_mut(cursor.list).set_watcher_node(cursor.watcher, next);
        Some(self.heap.inc_value(&value))
    }

    pub fn end_iteration(&mut self, cursor: ListCursor) {
        self.heap.list_mut(cursor.list).remove_watcher(cursor.watcher);
        self.heap.release(Value::List(cursor.list));
    }

    /// Display form (`:echo`). Reports an error if nesting is too deep.
    pub fn display(&mut self, value: &Value) -> String {
        let rendered = self.heap.echo_string(value, self.config.max_nest);
        if rendered.too_deep {
            self.report_error(&VexError::new(ErrorKind::RecursionLimit, "Variable nested too deep for displaying").into());
        }
        rendered.text
    }

    /// Form that evaluates back to an equal value (`string()`).
    pub fn string_of(&mut self, value: &Value) -> Result<String> {
        let rendered = self.heap.string_repr(value, self.config.max_nest);
        if rendered.too_deep {
            return crate::error::err_recursion("Variable nested too deep for displaying");
        }
        Ok(rendered.text)
    }

    /// Bookkeeping once a call or command returned: free frames nobody refers to
    /// anymore and delete anonymous functions whose last Funcref went away.
    pub(crate) fn after_call(&mut self) {
        self.sweep_kept_frames();
        self.drop_orphaned_functions();
    }

    /// Run a collection postponed by [`Interp::collect_garbage`] once nothing
    /// executes anymore.
    pub(crate) fn collect_if_wanted(&mut self) {
        if self.ctx.want_gc && self.at_top_level() {
            self.collect_garbage();
        }
    }

    pub(crate) fn keep_frame(&mut self, name: Rc<str>, locals: DictId, args: DictId, varargs: ListId) {
        debug!(target: "vex::func", function = %name, "locals escaped, keeping frame");
        self.kept_frames.push(KeptFrame {
            name,
            locals,
            args,
            varargs,
        });
    }

    fn sweep_kept_frames(&mut self) {
        let heap = &self.heap;
        let (done, kept): (Vec<KeptFrame>, Vec<KeptFrame>) = std::mem::take(&mut self.kept_frames)
            .into_iter()
            .partition(|f| {
                heap.is_dict_live(f.locals)
                    && heap.is_dict_live(f.args)
                    && heap.dict_refcount(f.locals) == 1
                    && heap.dict_refcount(f.args) == 1
                    && (!heap.is_list_live(f.varargs) || heap.list_refcount(f.varargs) == 1)
            });
        self.kept_frames = kept;
        for frame in done {
            trace!(target: "vex::func", function = %frame.name, "releasing kept frame");
            self.heap.release(Value::Dict(frame.locals));
            self.heap.release(Value::Dict(frame.args));
        }
    }

    fn drop_orphaned_functions(&mut self) {
        let mut orphans = self.heap.take_orphaned_funcs();
        orphans.append(&mut self.funcs.pending_delete);
        for name in orphans {
            if self.heap.func_refcount(&name) > 0 {
                continue;
            }
            match self.funcs.get(&name) {
                Some(f) if f.calls.get() > 0 => self.funcs.pending_delete.push(name),
                Some(_) => {
                    debug!(target: "vex::func", function = %name, "deleting unreferenced function");
                    self.funcs.remove(&name);
                }
                None => {}
            }
        }
    }

    /// Free containers that are only reachable from each other. Only runs when
    /// nothing is executing; otherwise it is postponed until the running
    /// command finishes. Returns the number of freed containers.
    pub fn collect_garbage(&mut self) -> usize {
        if !self.at_top_level() {
            self.ctx.want_gc = true;
            return 0;
        }
        self.ctx.want_gc = false;
        self.sweep_kept_frames();
        let freed = self.heap.garbage_collect(std::iter::empty());

        // Kept frames are not roots: whatever of them survived is referenced
        // from elsewhere, so give back our references to those parts.
        let heap = &self.heap;
        let (broken, kept): (Vec<KeptFrame>, Vec<KeptFrame>) = std::mem::take(&mut self.kept_frames)
            .into_iter()
            .partition(|f| !heap.is_dict_live(f.locals) || !heap.is_dict_live(f.args));
        self.kept_frames = kept;
        for frame in broken {
            for dict in [frame.locals, frame.args] {
                if self.heap.is_dict_live(dict) {
                    self.heap.release(Value::Dict(dict));
                }
            }
        }
        self.drop_orphaned_functions();
        freed
    }

    /// Number of frames kept alive by escaped locals.
    pub fn kept_frame_count(&self) -> usize {
        self.kept_frames.len()
    }
}
