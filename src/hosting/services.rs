use crate::runtime::{
    builtins::{html_encode, render_value},
    RuntimeError, RuntimeResult, ScriptObject, Value,
};
use crate::language::types::TypeExpr;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Resolves services by the type name written in the page, e.g. `Clock` or
/// `Logger<Generated_Index>`.
pub trait ServiceProvider: Send + Sync {
    fn get_service(&self, type_name: &str) -> Option<Value>;
}

type ServiceFactory = Arc<dyn Fn() -> Value + Send + Sync>;

/// Registrations keyed by type name.
#[derive(Clone, Default)]
pub struct ServiceCollection {
    services: HashMap<String, ServiceFactory>,
}

impl fmt::Debug for ServiceCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.services.keys().collect();
        names.sort();
        f.debug_struct("ServiceCollection")
            .field("services", &names)
            .finish()
    }
}

impl ServiceCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// The same value for every resolution.
    pub fn add_singleton(&mut self, type_name: &str, value: Value) -> &mut Self {
        self.services
            .insert(type_name.to_string(), Arc::new(move || value.clone()));
        self
    }

    /// A fresh value per resolution.
    pub fn add_transient(
        &mut self,
        type_name: &str,
        factory: impl Fn() -> Value + Send + Sync + 'static,
    ) -> &mut Self {
        self.services.insert(type_name.to_string(), Arc::new(factory));
        self
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.services.contains_key(type_name)
    }
}

impl ServiceProvider for ServiceCollection {
    fn get_service(&self, type_name: &str) -> Option<Value> {
        self.services.get(type_name).map(|factory| factory())
    }
}

/// Services every page can inject without registering them.
pub fn builtin_service(ty: &TypeExpr) -> Option<Value> {
    match ty.base_name() {
        "HtmlHelper" => Some(Value::Object(Arc::new(HtmlHelper))),
        "Logger" => {
            let category = ty
                .args()
                .first()
                .map(TypeExpr::canonical_name)
                .unwrap_or_else(|| "pages".into());
            Some(Value::Object(Arc::new(Logger::new(category))))
        }
        _ => None,
    }
}

/// `Html` on every page.
#[derive(Debug, Default)]
pub struct HtmlHelper;

impl ScriptObject for HtmlHelper {
    fn type_name(&self) -> &str {
        "HtmlHelper"
    }

    fn call_method(&self, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        match (name, args.as_slice()) {
            ("encode", [value]) => Ok(Value::String(html_encode(&value.to_string()))),
            ("raw", [value]) => Ok(Value::Html(value.to_string())),
            ("link", [text, href]) => Ok(Value::Html(format!(
                "<a href=\"{}\">{}</a>",
                html_encode(&href.to_string()),
                render_value(text)
            ))),
            ("display", [value]) => Ok(Value::String(match value {
                Value::Null => String::new(),
                Value::Bool(true) => "Yes".into(),
                Value::Bool(false) => "No".into(),
                other => other.to_string(),
            })),
            _ => Err(RuntimeError::Unsupported {
                message: format!("HtmlHelper has no method `{name}` taking {} arguments", args.len()),
            }),
        }
    }
}

/// `Logger` on every page, writing through the `log` facade under the page's
/// category.
#[derive(Debug)]
pub struct Logger {
    category: String,
}

impl Logger {
    pub fn new(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }
}

impl ScriptObject for Logger {
    fn type_name(&self) -> &str {
        "Logger"
    }

    fn call_method(&self, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        let level = match name {
            "debug" => log::Level::Debug,
            "info" => log::Level::Info,
            "warn" => log::Level::Warn,
            "error" => log::Level::Error,
            _ => {
                return Err(RuntimeError::Unsupported {
                    message: format!("Logger has no method `{name}`"),
                })
            }
        };
        let message: Vec<String> = args.iter().map(ToString::to_string).collect();
        log::log!(target: self.category.as_str(), level, "{}", message.join(" "));
        Ok(Value::Null)
    }
}
