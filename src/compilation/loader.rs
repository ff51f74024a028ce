use crate::compilation::{
    compiler::CompiledPageType, failure::CompilationError, pipeline::CompilerPipeline,
    references::ReferenceProvider,
};
use crate::hosting::handlers::{discover_handlers, HandlerExecutor, HandlerMethodDescriptor};
use crate::project::{descriptors::PageActionDescriptor, item::TemplateProject};
use log::info;
use std::sync::Arc;

/// A route descriptor together with its compiled page and handlers.
#[derive(Clone, Debug)]
pub struct CompiledPageActionDescriptor {
    pub descriptor: Arc<PageActionDescriptor>,
    pub page_type: Arc<CompiledPageType>,
    pub handler_methods: Vec<HandlerMethodDescriptor>,
    pub executor: HandlerExecutor,
}

/// Compiles the template behind a descriptor and discovers its handlers.
#[derive(Clone)]
pub struct PageLoader {
    pipeline: Arc<CompilerPipeline>,
    project: Arc<dyn TemplateProject>,
    references: Arc<dyn ReferenceProvider>,
}

impl std::fmt::Debug for PageLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageLoader")
            .field("passes", &self.pipeline.pass_names())
            .finish_non_exhaustive()
    }
}

impl PageLoader {
    pub fn new(
        pipeline: Arc<CompilerPipeline>,
        project: Arc<dyn TemplateProject>,
        references: Arc<dyn ReferenceProvider>,
    ) -> Self {
        Self {
            pipeline,
            project,
            references,
        }
    }

    pub fn pipeline(&self) -> &CompilerPipeline {
        &self.pipeline
    }

    pub fn load(
        &self,
        descriptor: Arc<PageActionDescriptor>,
    ) -> Result<CompiledPageActionDescriptor, CompilationError> {
        let item = self
            .project
            .get_item(&descriptor.relative_path)
            .ok_or_else(|| CompilationError::NotFound(descriptor.relative_path.clone()))?;
        let references = self.references.references();
        let page_type = self
            .pipeline
            .compile(self.project.as_ref(), &item, &references)?;
        let handler_methods = discover_handlers(&page_type, &self.pipeline.options().handler_verbs)?;
        info!(
            "loaded {} as {} with handlers [{}]",
            descriptor.display_name,
            page_type.name,
            handler_methods
                .iter()
                .map(|h| h.method_name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        let executor = HandlerExecutor::new(&handler_methods);
        Ok(CompiledPageActionDescriptor {
            descriptor,
            page_type: Arc::new(page_type),
            handler_methods,
            executor,
        })
    }
}
