use super::{Heap, Value};

/// Text form of a value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rendered {
    pub text: String,
    /// Nesting went past the limit; the text holds a placeholder for the rest.
    pub too_deep: bool,
}

struct Render {
    out: String,
    copy_id: u32,
    max_nest: usize,
    too_deep: bool,
}

impl Heap {
    /// Form used by `:echo`: a top-level String is shown as is.
    pub fn echo_string(&mut self, value: &Value, max_nest: usize) -> Rendered {
        self.render(value, false, max_nest)
    }

    /// Form that parses back to an equal value: Strings are quoted.
    pub fn string_repr(&mut self, value: &Value, max_nest: usize) -> Rendered {
        self.render(value, true, max_nest)
    }

    fn render(&mut self, value: &Value, quote: bool, max_nest: usize) -> Rendered {
        let mut r = Render {
            out: String::new(),
            copy_id: self.next_copy_id(),
            max_nest,
            too_deep: false,
        };
        self.render_into(value, quote, 0, &mut r);
        Rendered {
            text: r.out,
            too_deep: r.too_deep,
        }
    }

    fn render_into(&mut self, value: &Value, quote: bool, depth: usize, r: &mut Render) {
        match value {
            Value::Number(n) => {
                let mut buf = itoa::Buffer::new();
                r.out.push_str(buf.format(*n));
            }
            Value::String(s) if quote => {
                r.out.push('\'');
                r.out.push_str(&String::from_utf8_lossy(s).replace('\'', "''"));
                r.out.push('\'');
            }
            Value::String(s) => r.out.push_str(&String::from_utf8_lossy(s)),
            Value::Funcref(name) if quote => {
                r.out.push_str("function('");
                r.out.push_str(name);
                r.out.push_str("')");
            }
            Value::Funcref(name) => r.out.push_str(name),
            Value::List(id) => {
                let list = self.list_mut(*id);
                if list.copy_id == r.copy_id {
                    r.out.push_str("[...]");
                    return;
                }
                if depth >= r.max_nest {
                    r.out.push_str("{E724}");
                    r.too_deep = true;
                    return;
                }
                list.copy_id = r.copy_id;
                let items: Vec<Value> = list.iter().map(|tv| tv.value.clone()).collect();
                r.out.push('[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        r.out.push_str(", ");
                    }
                    self.render_into(item, true, depth + 1, r);
                    if r.too_deep {
                        break;
                    }
                }
                r.out.push(']');
            }
            Value::Dict(id) => {
                let dict = self.dict_mut(*id);
                if dict.copy_id == r.copy_id {
                    r.out.push_str("{...}");
                    return;
                }
                if depth >= r.max_nest {
                    r.out.push_str("{E724}");
                    r.too_deep = true;
                    return;
                }
                dict.copy_id = r.copy_id;
                let entries: Vec<(String, Value)> = dict
                    .entries()
                    .into_iter()
                    .map(|(k, item)| (k.to_string(), item.tv.value.clone()))
                    .collect();
                r.out.push('{');
                for (i, (key, item)) in entries.iter().enumerate() {
                    if i > 0 {
                        r.out.push_str(", ");
                    }
                    r.out.push('\'');
                    r.out.push_str(&key.replace('\'', "''"));
                    r.out.push_str("': ");
                    self.render_into(item, true, depth + 1, r);
                    if r.too_deep {
                        break;
                    }
                }
                r.out.push('}');
            }
        }
    }
}
