//! Typed access to host attribute bags
//!
//! Hosts hand over loosely typed JSON objects. A value of the wrong type is
//! reported as [`Error::Configuration`] naming the key, never a panic.

use serde_json::{Map, Value};

use truststore_common::{Error, Result};

/// Plain attribute bag exchanged with the host
pub type AttributeBag = Map<String, Value>;

/// Read-only typed view over an [`AttributeBag`] (or a nested object)
#[derive(Clone, Debug)]
pub struct Attributes<'a> {
    bag: &'a Map<String, Value>,
    prefix: Option<String>,
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "list",
        Value::Object(_) => "object",
    }
}

impl<'a> Attributes<'a> {
    /// View the top level of a bag
    pub fn new(bag: &'a Map<String, Value>) -> Self {
        Self { bag, prefix: None }
    }

    fn nested(bag: &'a Map<String, Value>, prefix: String) -> Self {
        Self {
            bag,
            prefix: Some(prefix),
        }
    }

    fn key_path(&self, key: &str) -> String {
        match &self.prefix {
            Some(prefix) => format!("{}.{}", prefix, key),
            None => key.to_string(),
        }
    }

    fn wrong_type(&self, key: &str, expected: &str, got: &Value) -> Error {
        Error::configuration(
            self.key_path(key),
            format!("expected {}, got {}", expected, type_name(got)),
        )
    }

    fn missing(&self, key: &str) -> Error {
        Error::configuration(self.key_path(key), "required attribute is not set")
    }

    /// Value for `key`, treating JSON null as absent
    fn value(&self, key: &str) -> Option<&'a Value> {
        self.bag.get(key).filter(|v| !v.is_null())
    }

    /// Optional string attribute
    pub fn get_str(&self, key: &str) -> Result<Option<&'a str>> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(self.wrong_type(key, "string", other)),
        }
    }

    /// Required, non-empty string attribute
    pub fn require_str(&self, key: &str) -> Result<&'a str> {
        match self.get_str(key)? {
            Some(s) if !s.is_empty() => Ok(s),
            _ => Err(self.missing(key)),
        }
    }

    /// Optional integer attribute; numeric strings are accepted
    pub fn get_i64(&self, key: &str) -> Result<Option<i64>> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::Number(n)) => n
                .as_i64()
                .map(Some)
                .ok_or_else(|| self.wrong_type(key, "integer", &Value::Number(n.clone()))),
            Some(Value::String(s)) => s
                .parse()
                .map(Some)
                .map_err(|_| self.wrong_type(key, "integer", &Value::String(s.clone()))),
            Some(other) => Err(self.wrong_type(key, "integer", other)),
        }
    }

    /// Required integer attribute
    pub fn require_i64(&self, key: &str) -> Result<i64> {
        self.get_i64(key)?.ok_or_else(|| self.missing(key))
    }

    /// Optional boolean attribute
    pub fn get_bool(&self, key: &str) -> Result<Option<bool>> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::Bool(b)) => Ok(Some(*b)),
            Some(other) => Err(self.wrong_type(key, "bool", other)),
        }
    }

    /// List attribute; absent means empty
    pub fn get_list(&self, key: &str) -> Result<&'a [Value]> {
        match self.value(key) {
            None => Ok(&[]),
            Some(Value::Array(items)) => Ok(items.as_slice()),
            Some(other) => Err(self.wrong_type(key, "list", other)),
        }
    }

    /// Optional nested object attribute
    pub fn get_object(&self, key: &str) -> Result<Option<&'a Map<String, Value>>> {
        match self.value(key) {
            None => Ok(None),
            Some(Value::Object(map)) => Ok(Some(map)),
            Some(other) => Err(self.wrong_type(key, "object", other)),
        }
    }

    /// Typed views over each element of a list of objects; absent means empty.
    ///
    /// Errors inside an element name it as `key[i].field`.
    pub fn get_objects(&self, key: &str) -> Result<Vec<Attributes<'a>>> {
        self.get_list(key)?
            .iter()
            .enumerate()
            .map(|(i, item)| {
                let label = format!("{}[{}]", self.key_path(key), i);
                match item {
                    Value::Object(map) => Ok(Attributes::nested(map, label)),
                    other => Err(Error::configuration(
                        label,
                        format!("expected object, got {}", type_name(other)),
                    )),
                }
            })
            .collect()
    }
}
