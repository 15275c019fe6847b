//! Tagged value type for the dynamic evaluation context
//!
//! Policy text relies on permissive lookup semantics: a missing key is
//! `Null`, which coerces to ""/0/false instead of raising an error.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A loosely typed value in the evaluation context tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// Absent or empty; falsy, renders as ""
    Null,
    /// Boolean
    Bool(bool),
    /// Number; all numerics are f64, matching the predicate coercion rules
    Num(f64),
    /// String
    Str(String),
    /// Sequence
    Seq(Vec<Value>),
    /// String-keyed mapping
    Map(BTreeMap<String, Value>),
}

impl Value {
    /// Build a map value from string attribute pairs
    pub fn from_attributes(attributes: &std::collections::HashMap<String, String>) -> Value {
        Value::Map(
            attributes
                .iter()
                .map(|(k, v)| (k.clone(), Value::Str(v.clone())))
                .collect(),
        )
    }

    /// Build a sequence of strings
    pub fn str_seq<I, S>(items: I) -> Value
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Value::Seq(items.into_iter().map(|s| Value::Str(s.into())).collect())
    }

    /// Walk a field path; any miss yields `Null`
    pub fn lookup(&self, path: &[String]) -> &Value {
        let mut current = self;
        for key in path {
            current = match current {
                Value::Map(map) => map.get(key).unwrap_or(&Value::Null),
                _ => &Value::Null,
            };
        }
        current
    }

    /// Boolean coercion: Null is false, numbers are non-zero, strings are
    /// non-empty and not "false", collections are non-empty
    pub fn truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Num(n) => *n != 0.0,
            Value::Str(s) => !s.is_empty() && s != "false",
            Value::Seq(items) => !items.is_empty(),
            Value::Map(map) => !map.is_empty(),
        }
    }

    /// Float coercion: strings parse, unparseable inputs are 0
    pub fn as_f64(&self) -> f64 {
        match self {
            Value::Null => 0.0,
            Value::Bool(b) => {
                if *b {
                    1.0
                } else {
                    0.0
                }
            }
            Value::Num(n) => *n,
            Value::Str(s) => s.trim().parse().unwrap_or(0.0),
            _ => 0.0,
        }
    }

    /// Integer coercion via the float path
    pub fn as_i64(&self) -> i64 {
        self.as_f64() as i64
    }

    /// Render for template output. Whole numbers render without a decimal
    /// point so `{{EQ 1 1}}` style output stays readable.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Num(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{}", n)
                }
            }
            Value::Str(s) => s.clone(),
            Value::Seq(items) => {
                let rendered: Vec<String> = items.iter().map(Value::render).collect();
                format!("[{}]", rendered.join(" "))
            }
            Value::Map(map) => {
                let rendered: Vec<String> =
                    map.iter().map(|(k, v)| format!("{}:{}", k, v.render())).collect();
                format!("{{{}}}", rendered.join(" "))
            }
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Num(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Num(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Num(n as f64)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Seq(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}
