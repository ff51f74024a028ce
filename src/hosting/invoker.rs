//! Request dispatch: route match, cached compilation, handler selection,
//! argument binding, handler invocation and result execution.

use crate::compilation::{
    cache::CompiledPageCache,
    failure::CompilationError,
    loader::{CompiledPageActionDescriptor, PageLoader},
    pipeline::CompilerPipeline,
    references::DeclaredReferences,
};
use crate::hosting::{
    activator::{ActivationError, PageActivator},
    binding::{BindingOutcome, ModelBinder, ValueProviderModelBinder},
    context::PageContext,
    handlers::HandlerMethodDescriptor,
    host::RequestHost,
    results::{PageResult, PageResultExecutor},
    services::ServiceProvider,
    tag_helpers::TagHelperRegistry,
};
use crate::project::{descriptors::RouteTable, item::TemplateProject, options::PagesOptions};
use crate::runtime::{Interpreter, RuntimeError, Value};
use crate::tools::diagnostics::{compilation_error_page, generic_error_page};
use log::{debug, error, warn};
use miette::Diagnostic;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum DispatchError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Compilation(#[from] CompilationError),
    #[error("failed to activate {page}: {message}")]
    #[diagnostic(code(pages::activation))]
    Activation { page: String, message: String },
    #[error("{page} failed: {error}")]
    #[diagnostic(code(pages::runtime))]
    Runtime { page: String, error: RuntimeError },
    #[error("the request was aborted")]
    Aborted,
}

fn runtime_error(page: &str, error: RuntimeError) -> DispatchError {
    match error {
        RuntimeError::Aborted => DispatchError::Aborted,
        error => DispatchError::Runtime {
            page: page.to_string(),
            error,
        },
    }
}

fn ensure_active(context: &PageContext) -> Result<(), DispatchError> {
    if context.is_aborted() {
        Err(DispatchError::Aborted)
    } else {
        Ok(())
    }
}

/// Serves requests against the pages of one project.
pub struct PageInvoker {
    routes: RouteTable,
    cache: Arc<CompiledPageCache>,
    activator: PageActivator,
    binder: Arc<dyn ModelBinder>,
    tag_helpers: TagHelperRegistry,
    result_executor: PageResultExecutor,
    include_compilation_details: bool,
}

impl std::fmt::Debug for PageInvoker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageInvoker")
            .field("routes", &self.routes.descriptors().count())
            .field("tag_helpers", &self.tag_helpers)
            .finish_non_exhaustive()
    }
}

impl PageInvoker {
    pub fn new(
        routes: RouteTable,
        cache: Arc<CompiledPageCache>,
        activator: PageActivator,
        include_compilation_details: bool,
    ) -> Self {
        Self {
            routes,
            cache,
            activator,
            binder: Arc::new(ValueProviderModelBinder),
            tag_helpers: TagHelperRegistry::with_builtins(),
            result_executor: PageResultExecutor,
            include_compilation_details,
        }
    }

    /// Route table, compiler pipeline and cache for `project`, configured by
    /// `options`.
    pub fn for_project(
        project: Arc<dyn TemplateProject>,
        options: PagesOptions,
        services: Arc<dyn ServiceProvider>,
    ) -> Self {
        let routes = RouteTable::from_project(project.as_ref(), &options);
        let include_details = options.include_compilation_details;
        let references = Arc::new(DeclaredReferences::new(options.references.clone()));
        let loader = PageLoader::new(Arc::new(CompilerPipeline::new(options)), project, references);
        Self::new(
            routes,
            Arc::new(CompiledPageCache::new(loader)),
            PageActivator::new(services),
            include_details,
        )
    }

    pub fn with_binder(mut self, binder: Arc<dyn ModelBinder>) -> Self {
        self.binder = binder;
        self
    }

    pub fn with_tag_helpers(mut self, tag_helpers: TagHelperRegistry) -> Self {
        self.tag_helpers = tag_helpers;
        self
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn cache(&self) -> &Arc<CompiledPageCache> {
        &self.cache
    }

    /// Dispatches and turns failures into error responses.
    pub async fn handle(&self, context: &mut PageContext) {
        match self.dispatch(context).await {
            Ok(()) => {}
            Err(DispatchError::Aborted) => debug!("{} {} aborted", context.request.method, context.request.path),
            Err(DispatchError::Compilation(compilation)) => {
                error!("{compilation}");
                self.write_error(
                    context,
                    compilation_error_page(&compilation, self.include_compilation_details),
                );
            }
            Err(other) => {
                error!("{other}");
                self.write_error(context, generic_error_page());
            }
        }
    }

    fn write_error(&self, context: &mut PageContext, page: String) {
        if context.response.has_started() {
            return;
        }
        let result = PageResult::Content {
            content: page,
            content_type: None,
            status_code: Some(500),
        };
        self.result_executor
            .execute(&result, None, &mut context.response);
    }

    /// Serves `context.request`. An unmatched path answers 404.
    pub async fn dispatch(&self, context: &mut PageContext) -> Result<(), DispatchError> {
        let Some(route) = self.routes.match_path(&context.request.path) else {
            debug!("no page matches {}", context.request.path);
            context.response.status_code = 404;
            return Ok(());
        };
        context.route_values = route.values;
        ensure_active(context)?;
        let compiled = self.cache.get_or_compile(&route.descriptor).await?;
        self.invoke(&compiled, context).await
    }

    pub async fn invoke(
        &self,
        compiled: &CompiledPageActionDescriptor,
        context: &mut PageContext,
    ) -> Result<(), DispatchError> {
        let page_type = &compiled.page_type;
        let handler = compiled.executor.select(&context.request.method);
        let args = match handler.and_then(|index| compiled.handler_methods.get(index)) {
            Some(descriptor) => self.bind_arguments(descriptor, context).await?,
            None => {
                debug!("{} has no handler for {}", page_type.name, context.request.method);
                Vec::new()
            }
        };
        ensure_active(context)?;
        tokio::task::yield_now().await;
        ensure_active(context)?;

        let (result, rendered) = {
            let mut host = RequestHost::new(context, &self.tag_helpers);
            let mut fields = self
                .activator
                .activate(page_type, &mut host)
                .map_err(|error| match error {
                    ActivationError::Initializer {
                        error: RuntimeError::Aborted,
                        ..
                    } => DispatchError::Aborted,
                    error => DispatchError::Activation {
                        page: page_type.name.clone(),
                        message: error.to_string(),
                    },
                })?;
            let result = {
                let mut interpreter = Interpreter::new(&page_type.class, &mut fields, &mut host);
                let result = match handler {
                    Some(index) => compiled
                        .executor
                        .invoke(index, &mut interpreter, args)
                        .map_err(|error| runtime_error(&page_type.name, error))?,
                    None => None,
                };
                let result = result.unwrap_or_else(|| Arc::new(PageResult::page(None)));
                if let PageResult::Page { model: Some(model), .. } = result.as_ref() {
                    match page_type.model() {
                        Some(decl) => interpreter.set_field(&decl.name.name, model.clone()),
                        None => warn!("{} has no @model; ignoring the result's model", page_type.name),
                    }
                }
                if result.is_page() {
                    interpreter
                        .call_method(&page_type.execute_method_name, Vec::new())
                        .map_err(|error| runtime_error(&page_type.name, error))?;
                }
                result
            };
            let rendered = result.is_page().then(|| host.take_output());
            (result, rendered)
        };

        ensure_active(context)?;
        self.result_executor
            .execute(&result, rendered.as_deref(), &mut context.response);
        Ok(())
    }

    /// Binds each parameter in order. Conversion failures are recorded in
    /// model state and the parameter falls back to its default.
    async fn bind_arguments(
        &self,
        handler: &HandlerMethodDescriptor,
        context: &mut PageContext,
    ) -> Result<Vec<Value>, DispatchError> {
        let mut args = Vec::with_capacity(handler.parameters.len());
        for parameter in &handler.parameters {
            ensure_active(context)?;
            let fallback = || parameter.default_value.clone().unwrap_or(Value::Null);
            let value = match self.binder.bind(context, parameter).await {
                BindingOutcome::Bound(value) => value,
                BindingOutcome::Missing => fallback(),
                BindingOutcome::Failed(error) => {
                    warn!("binding {}.{} failed: {error}", handler.method_name, parameter.name);
                    context.model_state.add_error(&parameter.name, error.to_string());
                    fallback()
                }
            };
            args.push(value);
        }
        Ok(args)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosting::{context::HttpRequest, services::ServiceCollection};
    use crate::project::item::MemoryProject;

    fn invoker(files: &[(&str, &str)]) -> PageInvoker {
        let mut project = MemoryProject::new();
        for (path, content) in files {
            project.add(path, *content);
        }
        PageInvoker::for_project(
            Arc::new(project),
            PagesOptions::default(),
            Arc::new(ServiceCollection::new()),
        )
    }

    #[tokio::test]
    async fn unmatched_path_is_not_found() {
        let invoker = invoker(&[("/Pages/Index.razor", "<h1>Home</h1>")]);
        let mut context = PageContext::new(HttpRequest::new("GET", "/missing"));
        invoker.dispatch(&mut context).await.expect("dispatch");
        assert_eq!(context.response.status_code, 404);
        assert_eq!(context.response.body(), "");
    }

    #[tokio::test]
    async fn binding_failures_fall_back_and_are_recorded() {
        let invoker = invoker(&[(
            "/Pages/Count.razor",
            "@functions {\n    let Total = 0;\n    fn OnGet(n: int = 5) { this.Total = n; }\n}\n<p>@Total</p>",
        )]);
        let mut context = PageContext::new(HttpRequest::new("GET", "/Count?n=lots"));
        invoker.dispatch(&mut context).await.expect("dispatch");
        assert_eq!(context.response.body(), "<p>5</p>");
        assert_eq!(context.model_state.errors("n").len(), 1);

        let mut context = PageContext::new(HttpRequest::new("GET", "/Count?n=12"));
        invoker.dispatch(&mut context).await.expect("dispatch");
        assert_eq!(context.response.body(), "<p>12</p>");
        assert!(context.model_state.is_valid());
    }

    #[tokio::test]
    async fn aborted_requests_stop_before_rendering() {
        let invoker = invoker(&[("/Pages/Index.razor", "<h1>Home</h1>")]);
        let mut context = PageContext::new(HttpRequest::new("GET", "/"));
        context.abort();
        let err = invoker.dispatch(&mut context).await.expect_err("aborted");
        assert!(matches!(err, DispatchError::Aborted));
        assert!(!context.response.has_started());
    }

    #[tokio::test]
    async fn compilation_errors_render_the_diagnostic_page() {
        let invoker = invoker(&[("/Pages/Index.razor", "<p>@missing</p>")]);
        let mut context = PageContext::new(HttpRequest::new("GET", "/"));
        invoker.handle(&mut context).await;
        assert_eq!(context.response.status_code, 500);
        assert!(context.response.body().contains("/Pages/Index.razor"));
        assert!(context.response.body().contains("missing"));
    }
}
