//! Argument access for task handlers.
//!
//! A [`TaskParam`] wraps the positional and keyword arguments of one decoded
//! task. The `must_*` accessors panic on a missing or mistyped argument; the
//! executor catches the panic and reports it as an "unexpected task error".
//!
//! ```rust
//! use celeriac::param::TaskParam;
//! use serde_json::json;
//!
//! let mut p = TaskParam::new(vec![json!(2), json!(3)], Default::default());
//! p.name_args(&["a", "b"]);
//! assert_eq!(p.must_int("a") + p.must_int("b"), 5);
//! ```

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Positional and keyword arguments of a task, with typed accessors.
#[derive(Debug, Clone, Default)]
pub struct TaskParam {
    args: Vec<Value>,
    kwargs: Map<String, Value>,
    named: HashMap<String, Value>,
}

impl TaskParam {
    /// Wrap a task's arguments.
    pub fn new(args: Vec<Value>, kwargs: Map<String, Value>) -> Self {
        Self {
            args,
            kwargs,
            named: HashMap::new(),
        }
    }

    /// Positional arguments in the order the producer sent them.
    ///
    /// Indexing past the end panics like any slice access.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Keyword arguments.
    pub fn kwargs(&self) -> &Map<String, Value> {
        &self.kwargs
    }

    /// Give names to the positional arguments, in order.
    ///
    /// Names beyond the number of positional arguments stay unbound and are
    /// looked up in the keyword arguments instead. Calling this again replaces
    /// the previous naming; keyword arguments are never touched.
    pub fn name_args(&mut self, names: &[&str]) {
        self.named = names
            .iter()
            .zip(self.args.iter())
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect();
    }

    /// Look up an argument by name: named positionals first, then kwargs.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.named.get(name).or_else(|| self.kwargs.get(name))
    }

    fn must_get(&self, name: &str) -> &Value {
        match self.get(name) {
            Some(value) => value,
            None => panic!("task param {name:?} not found"),
        }
    }

    /// Integer argument; panics if absent or not a JSON integer fitting `i64`.
    pub fn must_int(&self, name: &str) -> i64 {
        let value = self.must_get(name);
        match value.as_i64() {
            Some(n) => n,
            None => panic!("task param {name:?} is not an integer: {value}"),
        }
    }

    /// Float argument; any JSON number is accepted.
    pub fn must_float(&self, name: &str) -> f64 {
        let value = self.must_get(name);
        match value.as_f64() {
            Some(n) => n,
            None => panic!("task param {name:?} is not a number: {value}"),
        }
    }

    /// String argument; panics if absent or not a JSON string.
    pub fn must_string(&self, name: &str) -> String {
        let value = self.must_get(name);
        match value.as_str() {
            Some(s) => s.to_string(),
            None => panic!("task param {name:?} is not a string: {value}"),
        }
    }

    /// Boolean argument; panics if absent or not a JSON boolean.
    pub fn must_bool(&self, name: &str) -> bool {
        let value = self.must_get(name);
        match value.as_bool() {
            Some(b) => b,
            None => panic!("task param {name:?} is not a boolean: {value}"),
        }
    }

    /// Array argument; panics if absent or not a JSON array.
    pub fn must_array(&self, name: &str) -> &[Value] {
        let value = self.must_get(name);
        match value.as_array() {
            Some(items) => items.as_slice(),
            None => panic!("task param {name:?} is not an array: {value}"),
        }
    }

    /// Object argument; panics if absent or not a JSON object.
    pub fn must_object(&self, name: &str) -> &Map<String, Value> {
        let value = self.must_get(name);
        match value.as_object() {
            Some(fields) => fields,
            None => panic!("task param {name:?} is not an object: {value}"),
        }
    }

    /// Deserialize an argument into `T`; panics if absent or mismatched.
    pub fn must_deserialize<T: DeserializeOwned>(&self, name: &str) -> T {
        let value = self.must_get(name);
        match T::deserialize(value) {
            Ok(v) => v,
            Err(e) => panic!("task param {name:?} has unexpected shape: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    fn param(args: Value, kwargs: Value) -> TaskParam {
        let args = match args {
            Value::Array(items) => items,
            _ => unreachable!(),
        };
        let kwargs = match kwargs {
            Value::Object(fields) => fields,
            _ => unreachable!(),
        };
        TaskParam::new(args, kwargs)
    }

    #[test]
    fn test_name_args() {
        let mut p = param(json!([2, 3]), json!({}));
        p.name_args(&["a", "b"]);

        assert_eq!(p.must_int("a"), 2);
        assert_eq!(p.must_int("b"), 3);
    }

    #[test]
    fn test_extra_names_fall_through_to_kwargs() {
        let mut p = param(json!([2]), json!({"b": 10}));
        p.name_args(&["a", "b"]);

        assert_eq!(p.must_int("a"), 2);
        assert_eq!(p.must_int("b"), 10);
    }

    #[test]
    fn test_named_args_take_precedence_over_kwargs() {
        let mut p = param(json!(["positional"]), json!({"a": "keyword"}));
        assert_eq!(p.must_string("a"), "keyword");

        p.name_args(&["a"]);
        assert_eq!(p.must_string("a"), "positional");
        // kwargs are left untouched
        assert_eq!(p.kwargs().get("a"), Some(&json!("keyword")));
    }

    #[test]
    fn test_renaming_replaces_previous_names() {
        let mut p = param(json!([1, 2]), json!({}));
        p.name_args(&["x", "y"]);
        p.name_args(&["y"]);

        assert_eq!(p.must_int("y"), 1);
        assert!(p.get("x").is_none());
    }

    #[test]
    #[should_panic(expected = "not found")]
    fn test_must_int_absent() {
        let mut p = param(json!([2, 3]), json!({}));
        p.name_args(&["a", "b"]);
        p.must_int("c");
    }

    #[test]
    #[should_panic(expected = "is not an integer")]
    fn test_must_int_rejects_float() {
        let p = param(json!([]), json!({"n": 2.5}));
        p.must_int("n");
    }

    #[test]
    #[should_panic(expected = "is not an integer")]
    fn test_must_int_rejects_numeric_string() {
        let p = param(json!([]), json!({"n": "2"}));
        p.must_int("n");
    }

    #[test]
    #[should_panic]
    fn test_args_out_of_range_panics() {
        let p = param(json!(["fizz"]), json!({}));
        let _ = &p.args()[100];
    }

    #[test]
    fn test_scalar_accessors() {
        let p = param(
            json!([]),
            json!({"f": 1.5, "i": 4, "s": "hi", "b": true, "l": [1, 2], "o": {"k": "v"}}),
        );

        assert_eq!(p.must_float("f"), 1.5);
        assert_eq!(p.must_float("i"), 4.0);
        assert_eq!(p.must_string("s"), "hi");
        assert!(p.must_bool("b"));
        assert_eq!(p.must_array("l").len(), 2);
        assert_eq!(p.must_object("o").get("k"), Some(&json!("v")));
    }

    #[test]
    fn test_must_deserialize() {
        #[derive(Debug, Deserialize, PartialEq)]
        struct Email {
            to: String,
        }

        let p = param(json!([]), json!({"email": {"to": "user@example.com"}}));
        let email: Email = p.must_deserialize("email");
        assert_eq!(
            email,
            Email {
                to: "user@example.com".to_string()
            }
        );
    }
}
