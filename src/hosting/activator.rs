use crate::compilation::compiler::CompiledPageType;
use crate::hosting::services::{builtin_service, ServiceProvider};
use crate::runtime::{Interpreter, RuntimeError, ScriptHost, Value};
use log::debug;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ActivationError {
    #[error("no service registered for '{type_name}' required by {page}.{member}")]
    MissingService {
        page: String,
        member: String,
        type_name: String,
    },
    #[error("initialising {page} failed: {error}")]
    Initializer { page: String, error: RuntimeError },
}

/// Field values of one page instance.
pub type PageInstance = BTreeMap<String, Value>;

/// Creates page instances: constructor arguments and `inject` members come
/// from the service provider, then field initialisers run.
#[derive(Clone)]
pub struct PageActivator {
    services: Arc<dyn ServiceProvider>,
}

impl std::fmt::Debug for PageActivator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageActivator").finish_non_exhaustive()
    }
}

impl PageActivator {
    pub fn new(services: Arc<dyn ServiceProvider>) -> Self {
        Self { services }
    }

    fn resolve(&self, ty: &crate::language::types::TypeExpr) -> Option<Value> {
        self.services
            .get_service(&ty.canonical_name())
            .or_else(|| builtin_service(ty))
    }

    pub fn activate(
        &self,
        page_type: &CompiledPageType,
        host: &mut dyn ScriptHost,
    ) -> Result<PageInstance, ActivationError> {
        let mut fields = PageInstance::new();
        let initializer_error = |error| ActivationError::Initializer {
            page: page_type.name.clone(),
            error,
        };

        for inject in page_type.injects() {
            let value = self
                .resolve(&inject.ty.ty)
                .ok_or_else(|| ActivationError::MissingService {
                    page: page_type.name.clone(),
                    member: inject.name.name.clone(),
                    type_name: inject.ty.ty.canonical_name(),
                })?;
            fields.insert(inject.name.name.clone(), value);
        }
        if let Some(model) = page_type.model() {
            fields.insert(model.name.name.clone(), Value::Null);
        }

        let mut interpreter = Interpreter::new(&page_type.class, &mut fields, host);
        if let Some(ctor) = page_type.constructor() {
            let bindings: Vec<(String, Value)> = ctor
                .params
                .iter()
                .map(|param| {
                    let value = self.resolve(&param.ty.ty).unwrap_or_else(|| {
                        debug!(
                            "no service for constructor parameter {}: {}; passing null",
                            param.name.name, param.ty.ty
                        );
                        Value::Null
                    });
                    (param.name.name.clone(), value)
                })
                .collect();
            let base_values = interpreter
                .evaluate_with(bindings, &ctor.base_args)
                .map_err(initializer_error)?;
            let base_params = page_type.base_type.single_constructor().unwrap_or_default();
            for (param, value) in base_params.iter().zip(base_values) {
                interpreter.set_field(&param.name, value);
            }
        }
        interpreter.initialize_fields().map_err(initializer_error)?;
        drop(interpreter);
        debug!("activated {} with {} fields", page_type.name, fields.len());
        Ok(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compilation::{pipeline::CompilerPipeline, references::ReferenceSet};
    use crate::hosting::services::ServiceCollection;
    use crate::project::{item::MemoryProject, options::PagesOptions, ProjectItem};
    use crate::runtime::RuntimeResult;

    #[derive(Default)]
    struct Sink(String);

    impl ScriptHost for Sink {
        fn write(&mut self, text: &str) {
            self.0.push_str(text);
        }

        fn call_host(&mut self, _name: &str, _args: Vec<Value>) -> Option<RuntimeResult<Value>> {
            None
        }
    }

    fn compile(template: &str, references: &ReferenceSet) -> CompiledPageType {
        let project = MemoryProject::new();
        let item = ProjectItem::new("/Pages", "/Pages/Index.razor", template);
        CompilerPipeline::new(PagesOptions::default())
            .compile(&project, &item, references)
            .expect("compiles")
    }

    #[test]
    fn injects_resolve_from_services_then_builtins() {
        let page = compile(
            "@using Samples\n@inject Clock Clock\n@functions { let Greeting = \"hi\"; }\n<p>@Greeting</p>",
            &ReferenceSet::runtime().with_declarations(
                &toml::from_str(
                    r#"[[types]]
                    name = "Clock"
                    namespace = "Samples""#,
                )
                .expect("declarations"),
            ),
        );
        let mut services = ServiceCollection::new();
        services.add_singleton("Clock", Value::string("noon"));
        let activator = PageActivator::new(Arc::new(services));
        let mut sink = Sink::default();
        let fields = activator.activate(&page, &mut sink).expect("activate");
        assert_eq!(fields.get("Clock").map(|v| v.to_string()), Some("noon".into()));
        assert_eq!(fields.get("Html").map(Value::type_name), Some("HtmlHelper"));
        assert_eq!(fields.get("Greeting").map(|v| v.to_string()), Some("hi".into()));

        let empty = PageActivator::new(Arc::new(ServiceCollection::new()));
        let err = empty.activate(&page, &mut sink).expect_err("missing clock");
        assert!(matches!(err, ActivationError::MissingService { ref type_name, .. } if type_name == "Clock"));
    }
}
