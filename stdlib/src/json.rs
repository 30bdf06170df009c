use anyhow::Result;
use serde_json::{Map, Number};
use vex_core::error::{err_other, err_range, err_recursion, err_syntax, err_type};
use vex_core::module::{Builtin, BuiltinRegistry, Module};
use vex_core::val::{DictId, TypVal};
use vex_core::{Interp, Value};

#[derive(Debug)]
pub struct JsonModule {
    functions: Vec<Builtin>,
}

impl Default for JsonModule {
    fn default() -> Self {
        Self::new()
    }
}

impl JsonModule {
    pub fn new() -> Self {
        Self {
            functions: vec![
                Builtin::new("json_decode", 1, 1, json_decode),
                Builtin::new("json_encode", 1, 1, json_encode),
            ],
        }
    }
}

impl Module for JsonModule {
    fn name(&self) -> &str {
        "json"
    }

    fn description(&self) -> &str {
        "Conversion between values and JSON text"
    }

    fn register(&self, registry: &mut BuiltinRegistry) -> Result<()> {
        for builtin in &self.functions {
            registry.register(*builtin)?;
        }
        Ok(())
    }
}

/// `json_encode({expr})`. Dictionary keys come out sorted.
fn json_encode(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let json = to_json(interp, &args[0], 0)?;
    Ok(Value::str(serde_json::to_string(&json)?))
}

fn to_json(interp: &Interp, value: &Value, depth: usize) -> Result<serde_json::Value> {
    if depth >= interp.config.max_nest {
        return err_recursion("Variable nested too deep for json_encode()");
    }
    Ok(match value {
        Value::Number(n) => serde_json::Value::Number(Number::from(*n)),
        Value::String(s) => serde_json::Value::String(String::from_utf8_lossy(s).into_owned()),
        Value::List(l) => {
            let items = interp
                .heap
                .list(*l)
                .iter()
                .map(|tv| to_json(interp, &tv.value, depth + 1))
                .collect::<Result<Vec<_>>>()?;
            serde_json::Value::Array(items)
        }
        Value::Dict(d) => {
            let mut map = Map::new();
            for (key, item) in interp.heap.dict(*d).entries() {
                map.insert(key.to_string(), to_json(interp, &item.tv.value, depth + 1)?);
            }
            serde_json::Value::Object(map)
        }
        Value::Funcref(_) => return err_type("Cannot encode a Funcref as JSON"),
    })
}

/// `json_decode({string})`. `null` and `false` become 0, `true` becomes 1.
fn json_decode(args: &[Value], interp: &mut Interp) -> Result<Value> {
    let text = args[0].to_str()?;
    let json: serde_json::Value = match serde_json::from_str(&text) {
        Ok(json) => json,
        Err(err) => return err_syntax(format!("Invalid JSON: {err}")),
    };
    from_json(interp, json)
}

fn from_json(interp: &mut Interp, json: serde_json::Value) -> Result<Value> {
    match json {
        serde_json::Value::Null => Ok(Value::Number(0)),
        serde_json::Value::Bool(b) => Ok(Value::from(b)),
        serde_json::Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(Value::Number(i)),
            None if n.is_u64() => err_range(format!("Number too large: {n}")),
            None => err_type(format!("Floats are not supported: {n}")),
        },
        serde_json::Value::String(s) => Ok(Value::str(s)),
        serde_json::Value::Array(items) => {
            let mut values = Vec::with_capacity(items.len());
            for item in items {
                match from_json(interp, item) {
                    Ok(value) => values.push(value),
                    Err(err) => {
                        interp.heap.release_all(values);
                        return Err(err);
                    }
                }
            }
            Ok(Value::List(interp.heap.new_list_from(values)))
        }
        serde_json::Value::Object(map) => {
            let dict = interp.heap.new_dict();
            if let Err(err) = fill_dict(interp, dict, map) {
                interp.heap.release(Value::Dict(dict));
                return Err(err);
            }
            Ok(Value::Dict(dict))
        }
    }
}

fn fill_dict(interp: &mut Interp, dict: DictId, map: Map<String, serde_json::Value>) -> Result<()> {
    for (key, item) in map {
        if key.is_empty() {
            return err_other("Empty key in JSON object");
        }
        let value = from_json(interp, item)?;
        interp.heap.dict_mut(dict).insert(&key, TypVal::new(value))?;
    }
    Ok(())
}
