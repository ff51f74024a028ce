//! Handler discovery and the per-handler adapters used at dispatch time.
//!
//! A handler is a public method named `On<Verb>...`. Each one is classified
//! into a `HandlerShape` when the page is loaded and paired with a thunk
//! that invokes it by member index and normalises its return value, so a
//! request never looks a method up by name.

use crate::compilation::{
    compiler::{literal_value, CompiledPageType},
    failure::CompilationError,
};
use crate::hosting::results::PageResult;
use crate::language::{ast::Visibility, types::TypeExpr};
use crate::runtime::{Interpreter, RuntimeError, RuntimeResult, Value};
use std::fmt;
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HandlerShape {
    /// `fn OnGet()`
    SyncVoid,
    /// `fn OnGet() -> Result`
    SyncResult,
    /// `async fn OnGet()` or `-> Task`
    AsyncVoid,
    /// `async fn OnGet() -> Result` or `-> Task<Result>`
    AsyncResult,
}

impl HandlerShape {
    pub fn classify(is_async: bool, returns: Option<&TypeExpr>) -> Option<Self> {
        let returns = match returns {
            None => {
                return Some(if is_async {
                    HandlerShape::AsyncVoid
                } else {
                    HandlerShape::SyncVoid
                })
            }
            Some(ty) => ty,
        };
        let produces_result = |ty: &TypeExpr| ty.base_name() == "Result" && ty.args().is_empty();
        match (returns.base_name(), returns.args()) {
            ("void", []) if is_async => Some(HandlerShape::AsyncVoid),
            ("void", []) => Some(HandlerShape::SyncVoid),
            ("Task", []) => Some(HandlerShape::AsyncVoid),
            ("Task", [inner]) if produces_result(inner) => Some(HandlerShape::AsyncResult),
            _ if produces_result(returns) && is_async => Some(HandlerShape::AsyncResult),
            _ if produces_result(returns) => Some(HandlerShape::SyncResult),
            _ => None,
        }
    }

    pub fn is_async(self) -> bool {
        matches!(self, HandlerShape::AsyncVoid | HandlerShape::AsyncResult)
    }
}

#[derive(Clone, Debug)]
pub struct HandlerParameter {
    pub name: String,
    pub type_name: TypeExpr,
    pub default_value: Option<Value>,
}

#[derive(Clone, Debug)]
pub struct HandlerMethodDescriptor {
    /// Upper-case HTTP verb.
    pub verb: String,
    pub method_name: String,
    pub shape: HandlerShape,
    pub parameters: Vec<HandlerParameter>,
    member_index: usize,
}

/// Verb prefix of `method_name`, e.g. `OnPostAsync` -> `POST`.
fn handler_verb<'v>(method_name: &str, verbs: &'v [String]) -> Option<&'v String> {
    let rest = method_name.strip_prefix("On")?;
    verbs.iter().find(|verb| {
        rest.get(..verb.len())
            .is_some_and(|prefix| prefix.eq_ignore_ascii_case(verb))
    })
}

/// Every handler on `page_type`, at most one per verb.
pub fn discover_handlers(
    page_type: &CompiledPageType,
    verbs: &[String],
) -> Result<Vec<HandlerMethodDescriptor>, CompilationError> {
    let mut handlers: Vec<HandlerMethodDescriptor> = Vec::new();
    for (member_index, method) in page_type.methods() {
        if method.visibility != Visibility::Public {
            continue;
        }
        let Some(verb) = handler_verb(&method.name.name, verbs) else {
            continue;
        };
        let verb = verb.to_ascii_uppercase();
        let returns = method.returns.as_ref().map(|annotation| &annotation.ty);
        let shape = HandlerShape::classify(method.is_async, returns).ok_or_else(|| {
            CompilationError::UnsupportedHandlerShape {
                page: page_type.name.clone(),
                method: method.name.name.clone(),
                return_type: returns.map(TypeExpr::canonical_name).unwrap_or_default(),
            }
        })?;

        if let Some(existing) = handlers.iter().find(|h| h.verb == verb) {
            return Err(CompilationError::AmbiguousHandler {
                page: page_type.name.clone(),
                verb,
                methods: vec![existing.method_name.clone(), method.name.name.clone()],
            });
        }
        handlers.push(HandlerMethodDescriptor {
            verb,
            method_name: method.name.name.clone(),
            shape,
            parameters: method
                .params
                .iter()
                .map(|param| HandlerParameter {
                    name: param.name.name.clone(),
                    type_name: param.ty.ty.clone(),
                    default_value: param.default.as_ref().and_then(literal_value),
                })
                .collect(),
            member_index,
        });
    }
    Ok(handlers)
}

type HandlerThunk =
    Arc<dyn Fn(&mut Interpreter<'_>, Vec<Value>) -> RuntimeResult<Option<Arc<PageResult>>> + Send + Sync>;

fn expect_result(method: &str, value: Value) -> RuntimeResult<Option<Arc<PageResult>>> {
    match value {
        Value::Result(result) => Ok(Some(result)),
        Value::Null => Ok(None),
        other => Err(RuntimeError::TypeMismatch {
            message: format!("handler `{method}` returned {} instead of a Result", other.type_name()),
        }),
    }
}

fn unwrap_task(value: Value) -> Value {
    match value {
        Value::Task(inner) => *inner,
        other => other,
    }
}

fn thunk_for(handler: &HandlerMethodDescriptor) -> HandlerThunk {
    let index = handler.member_index;
    let name = handler.method_name.clone();
    match handler.shape {
        HandlerShape::SyncVoid => Arc::new(move |interpreter: &mut Interpreter<'_>, args: Vec<Value>| {
            interpreter.call_member(index, args)?;
            Ok(None)
        }),
        HandlerShape::SyncResult => Arc::new(move |interpreter: &mut Interpreter<'_>, args: Vec<Value>| {
            expect_result(&name, interpreter.call_member(index, args)?)
        }),
        HandlerShape::AsyncVoid => Arc::new(move |interpreter: &mut Interpreter<'_>, args: Vec<Value>| {
            unwrap_task(interpreter.call_member(index, args)?);
            Ok(None)
        }),
        HandlerShape::AsyncResult => Arc::new(move |interpreter: &mut Interpreter<'_>, args: Vec<Value>| {
            expect_result(&name, unwrap_task(interpreter.call_member(index, args)?))
        }),
    }
}

/// Thunks for a page's handlers, indexed like its descriptors.
#[derive(Clone)]
pub struct HandlerExecutor {
    verbs: Vec<String>,
    thunks: Vec<HandlerThunk>,
}

impl fmt::Debug for HandlerExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlerExecutor")
            .field("verbs", &self.verbs)
            .finish()
    }
}

impl HandlerExecutor {
    pub fn new(handlers: &[HandlerMethodDescriptor]) -> Self {
        Self {
            verbs: handlers.iter().map(|h| h.verb.clone()).collect(),
            thunks: handlers.iter().map(thunk_for).collect(),
        }
    }

    /// Index of the handler for `verb`, matched case-insensitively.
    pub fn select(&self, verb: &str) -> Option<usize> {
        self.verbs.iter().position(|v| v.eq_ignore_ascii_case(verb))
    }

    pub fn invoke(
        &self,
        index: usize,
        interpreter: &mut Interpreter<'_>,
        args: Vec<Value>,
    ) -> RuntimeResult<Option<Arc<PageResult>>> {
        let thunk = self.thunks.get(index).ok_or_else(|| RuntimeError::Unsupported {
            message: format!("no handler at index {index}"),
        })?;
        thunk(interpreter, args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ty(text: &str) -> TypeExpr {
        match text.split_once('<') {
            Some((name, inner)) => TypeExpr::generic(name, vec![ty(inner.trim_end_matches('>'))]),
            None => TypeExpr::named(text),
        }
    }

    #[test]
    fn classifies_supported_shapes() {
        assert_eq!(HandlerShape::classify(false, None), Some(HandlerShape::SyncVoid));
        assert_eq!(
            HandlerShape::classify(false, Some(&ty("Result"))),
            Some(HandlerShape::SyncResult)
        );
        assert_eq!(HandlerShape::classify(true, None), Some(HandlerShape::AsyncVoid));
        assert_eq!(
            HandlerShape::classify(false, Some(&ty("Task"))),
            Some(HandlerShape::AsyncVoid)
        );
        assert_eq!(
            HandlerShape::classify(true, Some(&ty("Task<Result>"))),
            Some(HandlerShape::AsyncResult)
        );
        assert_eq!(
            HandlerShape::classify(true, Some(&ty("Result"))),
            Some(HandlerShape::AsyncResult)
        );
        assert_eq!(HandlerShape::classify(false, Some(&ty("int"))), None);
        assert_eq!(HandlerShape::classify(true, Some(&ty("Task<int>"))), None);
    }

    #[test]
    fn verb_prefix_is_case_insensitive() {
        let verbs: Vec<String> = vec!["GET".into(), "POST".into()];
        assert_eq!(handler_verb("OnGet", &verbs).map(String::as_str), Some("GET"));
        assert_eq!(handler_verb("OnPOSTAsync", &verbs).map(String::as_str), Some("POST"));
        assert_eq!(handler_verb("OnDelete", &verbs), None);
        assert_eq!(handler_verb("Get", &verbs), None);
    }
}
