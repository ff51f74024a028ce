//! Handler parameter binding from route values, form fields and the query string.

use crate::hosting::{context::PageContext, handlers::HandlerParameter};
use crate::language::types::TypeExpr;
use crate::runtime::Value;
use futures::future::{BoxFuture, FutureExt};
use std::collections::BTreeMap;
use thiserror::Error;

/// A request value that could not be converted to the parameter's type.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("The value '{value}' is not valid for {parameter}.")]
pub struct BindingError {
    pub parameter: String,
    pub value: String,
}

#[derive(Clone, Debug)]
pub enum BindingOutcome {
    Bound(Value),
    /// No source had a value for the parameter.
    Missing,
    Failed(BindingError),
}

pub trait ModelBinder: Send + Sync {
    fn bind<'a>(
        &'a self,
        context: &'a PageContext,
        parameter: &'a HandlerParameter,
    ) -> BoxFuture<'a, BindingOutcome>;
}

/// Looks the parameter name up in route values, then the form, then the
/// query string, ignoring case.
#[derive(Clone, Copy, Debug, Default)]
pub struct ValueProviderModelBinder;

fn find<'m>(map: &'m BTreeMap<String, String>, name: &str) -> Option<&'m String> {
    map.iter()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
        .map(|(_, value)| value)
}

impl ValueProviderModelBinder {
    fn raw_value<'c>(&self, context: &'c PageContext, name: &str) -> Option<&'c String> {
        find(&context.route_values, name)
            .or_else(|| find(&context.request.form, name))
            .or_else(|| find(&context.request.query, name))
    }
}

/// Converts request text to `ty`. Empty text is null for nullable types.
pub fn convert(parameter: &str, raw: &str, ty: &TypeExpr) -> Result<Value, BindingError> {
    let failed = || BindingError {
        parameter: parameter.to_string(),
        value: raw.to_string(),
    };
    let trimmed = raw.trim();
    if ty.is_nullable() && trimmed.is_empty() {
        return Ok(Value::Null);
    }
    match ty.base_name() {
        "int" => trimmed.parse().map(Value::Int).map_err(|_| failed()),
        "float" => trimmed.parse().map(Value::Float).map_err(|_| failed()),
        "bool" => match trimmed.to_ascii_lowercase().as_str() {
            "true" | "on" | "1" => Ok(Value::Bool(true)),
            "false" | "off" | "0" | "" => Ok(Value::Bool(false)),
            _ => Err(failed()),
        },
        "list" => Ok(Value::list(
            raw.split(',')
                .filter(|part| !part.is_empty())
                .map(|part| Value::string(part.trim()))
                .collect(),
        )),
        _ => Ok(Value::string(raw)),
    }
}

impl ModelBinder for ValueProviderModelBinder {
    fn bind<'a>(
        &'a self,
        context: &'a PageContext,
        parameter: &'a HandlerParameter,
    ) -> BoxFuture<'a, BindingOutcome> {
        async move {
            let Some(raw) = self.raw_value(context, &parameter.name) else {
                return BindingOutcome::Missing;
            };
            match convert(&parameter.name, raw, &parameter.type_name) {
                Ok(value) => BindingOutcome::Bound(value),
                Err(error) => BindingOutcome::Failed(error),
            }
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosting::context::HttpRequest;

    fn parameter(name: &str, ty: TypeExpr) -> HandlerParameter {
        HandlerParameter {
            name: name.into(),
            type_name: ty,
            default_value: None,
        }
    }

    #[test]
    fn converts_by_declared_type() {
        assert!(matches!(convert("id", " 42 ", &TypeExpr::named("int")), Ok(Value::Int(42))));
        assert!(matches!(convert("on", "on", &TypeExpr::named("bool")), Ok(Value::Bool(true))));
        let nullable = TypeExpr::Nullable(Box::new(TypeExpr::named("int")));
        assert!(matches!(convert("id", "", &nullable), Ok(Value::Null)));
        let err = convert("id", "abc", &TypeExpr::named("int")).expect_err("not a number");
        assert_eq!(err.to_string(), "The value 'abc' is not valid for id.");
    }

    #[tokio::test]
    async fn route_values_win_over_form_and_query() {
        let mut context = PageContext::new(
            HttpRequest::new("POST", "/Widgets/Edit?id=1&name=query").with_form("Name", "form"),
        );
        context.route_values.insert("id".into(), "7".into());
        let binder = ValueProviderModelBinder;

        let id = parameter("Id", TypeExpr::named("int"));
        assert!(matches!(binder.bind(&context, &id).await, BindingOutcome::Bound(Value::Int(7))));
        let name = parameter("name", TypeExpr::named("string"));
        match binder.bind(&context, &name).await {
            BindingOutcome::Bound(value) => assert_eq!(value.to_string(), "form"),
            other => panic!("unexpected {other:?}"),
        }
        let missing = parameter("page", TypeExpr::named("int"));
        assert!(matches!(binder.bind(&context, &missing).await, BindingOutcome::Missing));
    }
}
