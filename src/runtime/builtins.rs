//! Free functions and value methods available to every page script.

use crate::hosting::results::PageResult;
use crate::runtime::{
    error::{RuntimeError, RuntimeResult},
    value::Value,
};
use std::sync::Arc;

/// `(name, min args, max args)`. Host functions are implemented by the
/// `ScriptHost` the page runs against; the rest are pure.
pub const BUILTIN_FUNCTIONS: &[(&str, usize, usize)] = &[
    ("page", 0, 1),
    ("content", 1, 2),
    ("redirect", 1, 1),
    ("redirect_permanent", 1, 1),
    ("status", 1, 1),
    ("not_found", 0, 0),
    ("json", 1, 2),
    ("len", 1, 1),
    ("str", 1, 1),
    ("int", 1, 1),
    ("float", 1, 1),
    ("raw", 1, 1),
    ("html_encode", 1, 1),
    ("write", 1, 1),
    ("write_literal", 1, 1),
    ("request_method", 0, 0),
    ("route_value", 1, 1),
    ("query", 1, 1),
    ("form", 1, 1),
    ("temp_data", 1, 1),
    ("set_temp_data", 2, 2),
    ("add_error", 2, 2),
    ("is_valid", 0, 0),
    ("tag_helper_begin", 4, 4),
    ("tag_helper_set", 2, 2),
    ("tag_helper_end", 0, 0),
];

pub fn builtin_arity(name: &str) -> Option<(usize, usize)> {
    BUILTIN_FUNCTIONS
        .iter()
        .find(|(builtin, _, _)| *builtin == name)
        .map(|(_, min, max)| (*min, *max))
}

pub fn html_encode(text: &str) -> String {
    let mut encoded = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => encoded.push_str("&amp;"),
            '<' => encoded.push_str("&lt;"),
            '>' => encoded.push_str("&gt;"),
            '"' => encoded.push_str("&quot;"),
            '\'' => encoded.push_str("&#39;"),
            other => encoded.push(other),
        }
    }
    encoded
}

/// Text written for `@value`: markup passes through, everything else is encoded.
pub fn render_value(value: &Value) -> String {
    match value {
        Value::Html(markup) => markup.clone(),
        Value::Task(inner) => render_value(inner),
        other => html_encode(&other.to_string()),
    }
}

fn expect_string(name: &str, value: &Value) -> RuntimeResult<String> {
    match value {
        Value::String(s) | Value::Html(s) => Ok(s.clone()),
        other => Err(RuntimeError::TypeMismatch {
            message: format!("`{name}` expects a string, found {}", other.type_name()),
        }),
    }
}

fn expect_status(name: &str, value: &Value) -> RuntimeResult<u16> {
    match value {
        Value::Int(code) if (100..=999).contains(code) => Ok(*code as u16),
        other => Err(RuntimeError::TypeMismatch {
            message: format!("`{name}` expects a status code, found {other}"),
        }),
    }
}

fn result(page_result: PageResult) -> Value {
    Value::Result(Arc::new(page_result))
}

/// Runs a pure builtin. `None` when `name` is not one.
pub fn call_pure(name: &str, args: &[Value]) -> Option<RuntimeResult<Value>> {
    let value = match (name, args) {
        ("page", []) => Ok(result(PageResult::page(None))),
        ("page", [model]) => Ok(result(PageResult::page(Some(model.clone())))),
        ("content", [text]) => expect_string(name, text).map(|text| result(PageResult::content(text, None))),
        ("content", [text, content_type]) => expect_string(name, text).and_then(|text| {
            let content_type = expect_string(name, content_type)?;
            Ok(result(PageResult::content(text, Some(content_type))))
        }),
        ("redirect", [url]) => expect_string(name, url).map(|url| {
            result(PageResult::Redirect {
                url,
                permanent: false,
            })
        }),
        ("redirect_permanent", [url]) => expect_string(name, url).map(|url| {
            result(PageResult::Redirect {
                url,
                permanent: true,
            })
        }),
        ("status", [code]) => expect_status(name, code).map(|code| result(PageResult::Status { code })),
        ("not_found", []) => Ok(result(PageResult::Status { code: 404 })),
        ("json", [value]) => Ok(result(PageResult::Json {
            value: value.to_json(),
            status_code: None,
        })),
        ("json", [value, code]) => expect_status(name, code).map(|code| {
            result(PageResult::Json {
                value: value.to_json(),
                status_code: Some(code),
            })
        }),
        ("len", [value]) => length(value).map(|n| Value::Int(n as i64)),
        ("str", [value]) => Ok(Value::String(value.to_string())),
        ("int", [value]) => Ok(to_int(value)),
        ("float", [value]) => Ok(to_float(value)),
        ("raw", [value]) => Ok(Value::Html(value.to_string())),
        ("html_encode", [value]) => Ok(Value::String(html_encode(&value.to_string()))),
        _ => return None,
    };
    Some(value)
}

fn length(value: &Value) -> RuntimeResult<usize> {
    match value {
        Value::String(s) | Value::Html(s) => Ok(s.chars().count()),
        Value::List(list) => Ok(list.len()),
        Value::Map(map) => Ok(map.len()),
        Value::Range(range) => Ok(range.values().count()),
        Value::Null => Ok(0),
        other => Err(RuntimeError::TypeMismatch {
            message: format!("`len` is not defined for {}", other.type_name()),
        }),
    }
}

/// Lenient conversion: unparseable text becomes `null`.
fn to_int(value: &Value) -> Value {
    match value {
        Value::Int(i) => Value::Int(*i),
        Value::Float(f) => Value::Int(*f as i64),
        Value::Bool(b) => Value::Int(i64::from(*b)),
        Value::String(s) => s.trim().parse().map(Value::Int).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

fn to_float(value: &Value) -> Value {
    match value {
        Value::Int(i) => Value::Float(*i as f64),
        Value::Float(f) => Value::Float(*f),
        Value::String(s) => s.trim().parse().map(Value::Float).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Methods on plain values: `name.upper()`, `items.join(", ")`.
pub fn call_value_method(receiver: &Value, method: &str, args: &[Value]) -> RuntimeResult<Value> {
    match (receiver, method, args) {
        (Value::Object(object), _, _) => object.call_method(method, args.to_vec()),
        (Value::Task(inner), _, _) => call_value_method(inner, method, args),
        (_, "len", []) => length(receiver).map(|n| Value::Int(n as i64)),
        (_, "is_empty", []) => length(receiver).map(|n| Value::Bool(n == 0)),
        (Value::String(s), "upper", []) => Ok(Value::String(s.to_uppercase())),
        (Value::String(s), "lower", []) => Ok(Value::String(s.to_lowercase())),
        (Value::String(s), "trim", []) => Ok(Value::String(s.trim().to_string())),
        (Value::String(s), "contains", [needle]) => {
            Ok(Value::Bool(s.contains(&expect_string(method, needle)?)))
        }
        (Value::String(s), "starts_with", [prefix]) => {
            Ok(Value::Bool(s.starts_with(&expect_string(method, prefix)?)))
        }
        (Value::String(s), "split", [separator]) => {
            let separator = expect_string(method, separator)?;
            Ok(Value::list(
                s.split(separator.as_str())
                    .map(|part| Value::String(part.to_string()))
                    .collect(),
            ))
        }
        (Value::List(list), "contains", [needle]) => {
            Ok(Value::Bool(list.snapshot().iter().any(|item| item.loose_eq(needle))))
        }
        (Value::List(list), "push", [item]) => {
            list.push(item.clone());
            Ok(Value::Null)
        }
        (Value::List(list), "join", [separator]) => {
            let separator = expect_string(method, separator)?;
            let parts: Vec<String> = list.snapshot().iter().map(ToString::to_string).collect();
            Ok(Value::String(parts.join(&separator)))
        }
        (Value::Map(map), "contains", [key]) => Ok(Value::Bool(map.contains_key(&expect_string(method, key)?))),
        (Value::Map(map), "get", [key]) => Ok(map.get(&expect_string(method, key)?).unwrap_or(Value::Null)),
        (Value::Map(map), "get", [key, fallback]) => {
            Ok(map.get(&expect_string(method, key)?).unwrap_or_else(|| fallback.clone()))
        }
        (Value::Map(map), "keys", []) => Ok(Value::list(map.keys().into_iter().map(Value::String).collect())),
        (other, _, _) => Err(RuntimeError::Unsupported {
            message: format!(
                "{} has no method `{method}` taking {} arguments",
                other.type_name(),
                args.len()
            ),
        }),
    }
}
