//! Builtin functions of the vex language, grouped in modules that register
//! into the interpreter's dispatch table.

mod args;
pub mod dict;
pub mod json;
pub mod list;
pub mod misc;
pub mod string;
pub mod time;


use anyhow::Result;
use vex_core::Interp;

/// Register all stdlib modules with the given interpreter
pub fn register_stdlib_modules(interp: &mut Interp) -> Result<()> {
    interp.register_module(&list::ListModule::new())?;
    interp.register_module(&dict::DictModule::new())?;
    interp.register_module(&string::StringModule::new())?;
    interp.register_module(&misc::MiscModule::new())?;
    interp.register_module(&json::JsonModule::new())?;
    interp.register_module(&time::TimeModule::new())?;
    Ok(())
}
