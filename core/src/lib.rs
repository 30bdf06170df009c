pub mod config;
pub mod error;
pub mod exec;
pub mod expr;
pub mod func;
pub mod hashtab;
pub mod host;
pub mod interp;
mod lval;
pub mod module;
pub mod scope;
pub mod util;
pub mod val;

#[cfg(test)]
mod hashtab_test;
#[cfg(test)]
mod lval_test;

pub use config::InterpConfig;
pub use error::{ErrorKind, VexError};
pub use exec::{LineSource, Lines};
pub use host::{Captured, Host, OptionScope, StandaloneHost};
pub use interp::{AssignOp, Interp};
pub use module::{Builtin, BuiltinRegistry, Module};
pub use val::Value;
