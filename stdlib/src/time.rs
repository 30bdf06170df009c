//! Clock access: `localtime()` and `strftime()`.

use anyhow::Result;
use chrono::format::{Item, StrftimeItems};
use chrono::{Local, TimeZone};
use vex_core::error::{err_other, err_range};
use vex_core::module::{Builtin, BuiltinRegistry, Module};
use vex_core::{Interp, Value};

#[derive(Debug)]
pub struct TimeModule {
    functions: Vec<Builtin>,
}

impl Default for TimeModule {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeModule {
    pub fn new() -> Self {
        Self {
            functions: vec![
                Builtin::new("localtime", 0, 0, localtime),
                Builtin::new("strftime", 1, 2, strftime),
            ],
        }
    }
}

impl Module for TimeModule {
    fn name(&self) -> &str {
        "time"
    }

    fn description(&self) -> &str {
        "Current time and time formatting"
    }

    fn register(&self, registry: &mut BuiltinRegistry) -> Result<()> {
        for builtin in &self.functions {
            registry.register(*builtin)?;
        }
        Ok(())
    }
}

/// Seconds since the epoch.
fn localtime(_args: &[Value], _interp: &mut Interp) -> Result<Value> {
    Ok(Value::Number(Local::now().timestamp()))
}

/// `strftime({format} [, {time}])` in the local time zone.
fn strftime(args: &[Value], _interp: &mut Interp) -> Result<Value> {
    let format = args[0].to_str()?.into_owned();
    let secs = match args.get(1) {
        Some(time) => time.to_number()?,
        None => Local::now().timestamp(),
    };
    let Some(time) = Local.timestamp_opt(secs, 0).single() else {
        return err_range(format!("Invalid time: {secs}"));
    };
    let items: Vec<Item> = StrftimeItems::new(&format).collect();
    if items.iter().any(|item| matches!(item, Item::Error)) {
        return err_other(format!("Invalid format: {format}"));
    }
    Ok(Value::str(time.format_with_items(items.iter()).to_string()))
}
