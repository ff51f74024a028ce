use crate::hosting::results::PageResult;
use crate::runtime::error::{RuntimeError, RuntimeResult};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Markup that is written without encoding.
    Html(String),
    List(ListValue),
    Map(MapValue),
    Range(RangeValue),
    Result(Arc<PageResult>),
    /// A completed asynchronous call.
    Task(Box<Value>),
    Object(Arc<dyn ScriptObject>),
}

/// Host-provided objects scripts can call into: injected services,
/// `HtmlHelper`, `Logger<T>`.
pub trait ScriptObject: fmt::Debug + Send + Sync {
    fn type_name(&self) -> &str;

    fn get_field(&self, _name: &str) -> Option<Value> {
        None
    }

    fn call_method(&self, name: &str, _args: Vec<Value>) -> RuntimeResult<Value> {
        Err(RuntimeError::Unsupported {
            message: format!("`{}` has no method `{name}`", self.type_name()),
        })
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[derive(Clone, Debug, Default)]
pub struct ListValue {
    items: Arc<Mutex<Vec<Value>>>,
}

impl ListValue {
    pub fn from_vec(items: Vec<Value>) -> Self {
        Self {
            items: Arc::new(Mutex::new(items)),
        }
    }

    pub fn push(&self, value: Value) {
        lock(&self.items).push(value);
    }

    pub fn len(&self) -> usize {
        lock(&self.items).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, index: usize) -> Option<Value> {
        lock(&self.items).get(index).cloned()
    }

    pub fn set(&self, index: usize, value: Value) -> bool {
        match lock(&self.items).get_mut(index) {
            Some(slot) => {
                *slot = value;
                true
            }
            None => false,
        }
    }

    pub fn snapshot(&self) -> Vec<Value> {
        lock(&self.items).clone()
    }
}

#[derive(Clone, Debug, Default)]
pub struct MapValue {
    entries: Arc<Mutex<BTreeMap<String, Value>>>,
}

impl MapValue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: BTreeMap<String, Value>) -> Self {
        Self {
            entries: Arc::new(Mutex::new(entries)),
        }
    }

    pub fn insert(&self, key: impl Into<String>, value: Value) {
        lock(&self.entries).insert(key.into(), value);
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        lock(&self.entries).get(key).cloned()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        lock(&self.entries).contains_key(key)
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn keys(&self) -> Vec<String> {
        lock(&self.entries).keys().cloned().collect()
    }

    pub fn snapshot(&self) -> BTreeMap<String, Value> {
        lock(&self.entries).clone()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RangeValue {
    pub start: i64,
    pub end: i64,
    pub inclusive: bool,
}

impl RangeValue {
    pub fn values(&self) -> impl Iterator<Item = i64> {
        let end = if self.inclusive {
            self.end.saturating_add(1)
        } else {
            self.end
        };
        self.start..end
    }
}

impl Value {
    pub fn string(text: impl Into<String>) -> Self {
        Value::String(text.into())
    }

    pub fn list(items: Vec<Value>) -> Self {
        Value::List(ListValue::from_vec(items))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_bool(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Int(i) => *i != 0,
            Value::Float(f) => *f != 0.0,
            Value::String(s) | Value::Html(s) => !s.is_empty(),
            Value::List(list) => !list.is_empty(),
            Value::Map(map) => !map.is_empty(),
            Value::Task(inner) => inner.as_bool(),
            Value::Range(_) | Value::Result(_) | Value::Object(_) => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Html(s) => Some(s),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Html(_) => "html",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Range(_) => "range",
            Value::Result(_) => "Result",
            Value::Task(_) => "Task",
            Value::Object(object) => object.type_name(),
        }
    }

    /// Field lookup for `value.name`: map keys and object fields.
    pub fn field(&self, name: &str) -> Option<Value> {
        match self {
            Value::Map(map) => map.get(name),
            Value::Object(object) => object.get_field(name),
            Value::Task(inner) => inner.field(name),
            _ => None,
        }
    }

    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => (*a as f64) == *b,
            (Value::String(a) | Value::Html(a), Value::String(b) | Value::Html(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                let (a, b) = (a.snapshot(), b.snapshot());
                a.len() == b.len() && a.iter().zip(&b).all(|(x, y)| x.loose_eq(y))
            }
            (Value::Map(a), Value::Map(b)) => {
                let (a, b) = (a.snapshot(), b.snapshot());
                a.len() == b.len()
                    && a.iter()
                        .zip(&b)
                        .all(|((ka, va), (kb, vb))| ka == kb && va.loose_eq(vb))
            }
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Object(_) | Value::Result(_) => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::String(s) | Value::Html(s) => serde_json::Value::String(s.clone()),
            Value::List(list) => {
                serde_json::Value::Array(list.snapshot().iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.snapshot()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            Value::Range(range) => {
                serde_json::Value::Array(range.values().map(serde_json::Value::from).collect())
            }
            Value::Task(inner) => inner.to_json(),
        }
    }

    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or_default()),
            },
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(items) => Value::list(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(entries) => Value::Map(MapValue::from_entries(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from_json(v)))
                    .collect(),
            )),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::String(v) | Value::Html(v) => write!(f, "{v}"),
            Value::List(list) => {
                write!(f, "[")?;
                for (idx, value) in list.snapshot().iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{value}")?;
                }
                write!(f, "]")
            }
            Value::Map(map) => {
                write!(f, "{{")?;
                for (idx, (key, value)) in map.snapshot().iter().enumerate() {
                    if idx > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{key}: {value}")?;
                }
                write!(f, "}}")
            }
            Value::Range(range) => write!(
                f,
                "{}{}{}",
                range.start,
                if range.inclusive { "..=" } else { ".." },
                range.end
            ),
            Value::Result(result) => write!(f, "{}", result.kind()),
            Value::Task(inner) => write!(f, "{inner}"),
            Value::Object(object) => write!(f, "{}", object.type_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_share_storage_between_clones() {
        let list = Value::list(vec![Value::Int(1)]);
        let alias = list.clone();
        if let Value::List(items) = &alias {
            items.push(Value::Int(2));
        }
        assert_eq!(list.to_string(), "[1, 2]");
    }

    #[test]
    fn loose_equality_crosses_numeric_types() {
        assert!(Value::Int(2).loose_eq(&Value::Float(2.0)));
        assert!(Value::string("a").loose_eq(&Value::Html("a".into())));
        assert!(!Value::Int(1).loose_eq(&Value::string("1")));
        assert!(Value::Null.loose_eq(&Value::Null));
    }

    #[test]
    fn json_conversion_keeps_structure() {
        let json = serde_json::json!({"name": "Ada", "tags": ["x", 2], "score": 1.5});
        let value = Value::from_json(&json);
        assert_eq!(value.field("name").map(|v| v.to_string()), Some("Ada".into()));
        assert_eq!(value.to_json(), json);
    }
}
