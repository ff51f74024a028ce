use crate::compilation::{
    compiler::{CompiledPageType, NativeCompiler},
    failure::{CompilationError, CompilationException, CompilationFailure, DiagnosticMessage},
    references::ReferenceSet,
};
use crate::project::{item::ProjectItem, item::TemplateProject, options::PagesOptions};
use crate::template::{
    chunk_passes::{ChunkTreePass, DirectiveNormalizationPass, TagHelperBindingPass},
    codegen::{generate, CodeGenContext, GeneratedSource},
    lowering::lower,
    parser::parse_template,
    passes::{PassContext, SyntaxTreePass, TagHelperBinderPass, VirtualDocumentPass},
    source::SourceDocument,
    syntax::SyntaxTree,
};
use log::{debug, warn};
use std::sync::Arc;

/// Generated unit for one page along with every document that contributed to it.
#[derive(Clone, Debug)]
pub struct GeneratedPage {
    pub source: GeneratedSource,
    pub documents: Vec<Arc<SourceDocument>>,
    pub warnings: Vec<DiagnosticMessage>,
}

/// Parse, syntax passes, lowering, chunk passes and code generation for a
/// page. Built once and shared; passes are fixed at construction.
pub struct CompilerPipeline {
    options: PagesOptions,
    syntax_passes: Vec<Box<dyn SyntaxTreePass>>,
    chunk_passes: Vec<Box<dyn ChunkTreePass>>,
    compiler: NativeCompiler,
}

pub struct CompilerPipelineBuilder {
    options: PagesOptions,
    syntax_passes: Vec<Box<dyn SyntaxTreePass>>,
    chunk_passes: Vec<Box<dyn ChunkTreePass>>,
}

impl CompilerPipelineBuilder {
    pub fn syntax_pass(mut self, pass: impl SyntaxTreePass + 'static) -> Self {
        self.syntax_passes.push(Box::new(pass));
        self
    }

    pub fn chunk_pass(mut self, pass: impl ChunkTreePass + 'static) -> Self {
        self.chunk_passes.push(Box::new(pass));
        self
    }

    pub fn build(mut self) -> CompilerPipeline {
        self.syntax_passes.sort_by_key(|pass| pass.order());
        self.chunk_passes.sort_by_key(|pass| pass.order());
        CompilerPipeline {
            options: self.options,
            syntax_passes: self.syntax_passes,
            chunk_passes: self.chunk_passes,
            compiler: NativeCompiler,
        }
    }
}

impl CompilerPipeline {
    /// A pipeline with no passes.
    pub fn builder(options: PagesOptions) -> CompilerPipelineBuilder {
        CompilerPipelineBuilder {
            options,
            syntax_passes: Vec::new(),
            chunk_passes: Vec::new(),
        }
    }

    /// The standard pass set: imports, tag helper binding, directive normalisation.
    pub fn new(options: PagesOptions) -> Self {
        let import_file_name = options.import_file_name.clone();
        let tag_helpers = options.tag_helpers.clone();
        Self::builder(options)
            .syntax_pass(VirtualDocumentPass::new(import_file_name))
            .syntax_pass(TagHelperBinderPass::new(tag_helpers))
            .chunk_pass(TagHelperBindingPass)
            .chunk_pass(DirectiveNormalizationPass)
            .build()
    }

    pub fn options(&self) -> &PagesOptions {
        &self.options
    }

    pub fn pass_names(&self) -> Vec<&'static str> {
        self.syntax_passes
            .iter()
            .map(|pass| pass.name())
            .chain(self.chunk_passes.iter().map(|pass| pass.name()))
            .collect()
    }

    pub fn generate(
        &self,
        project: &dyn TemplateProject,
        item: &ProjectItem,
        references: &ReferenceSet,
    ) -> Result<GeneratedPage, CompilationError> {
        let document = Arc::new(SourceDocument::new(item.path.clone(), item.content.clone()));
        let mut tree = parse_template(document.clone());
        debug!("parsed {} ({} nodes)", item.path, tree.root.children.len());

        let context = PassContext {
            project,
            page_path: &item.path,
        };
        for pass in &self.syntax_passes {
            debug!("running syntax pass {} on {}", pass.name(), item.path);
            tree = pass.execute(&context, tree);
        }

        let lowered = lower(&tree);
        let mut messages = template_messages(&tree, &lowered.diagnostics);
        let mut chunks = lowered.chunks;
        for pass in &self.chunk_passes {
            debug!("running chunk pass {} on {}", pass.name(), item.path);
            chunks = pass.execute(chunks, &mut messages);
        }

        if messages.iter().any(DiagnosticMessage::is_error) {
            return Err(CompilationError::Compilation(group_by_file(
                &tree.documents,
                messages,
            )));
        }
        for message in &messages {
            warn!("{message}");
        }

        let codegen_context = CodeGenContext::for_page(&item.path, &self.options);
        let source = generate(&document, &chunks, &codegen_context, references)?;
        Ok(GeneratedPage {
            source,
            documents: tree.documents,
            warnings: messages,
        })
    }

    pub fn compile(
        &self,
        project: &dyn TemplateProject,
        item: &ProjectItem,
        references: &ReferenceSet,
    ) -> Result<CompiledPageType, CompilationError> {
        let generated = self.generate(project, item, references)?;
        self.compiler.compile(
            &generated.source,
            references,
            &self.options.execute_method_name,
            &generated.documents,
        )
    }
}

fn template_messages(
    tree: &SyntaxTree,
    diagnostics: &[crate::template::syntax::TemplateDiagnostic],
) -> Vec<DiagnosticMessage> {
    tree.diagnostics
        .iter()
        .chain(diagnostics)
        .map(|diagnostic| {
            let location = tree
                .document(diagnostic.document)
                .location(diagnostic.error.span.start);
            DiagnosticMessage {
                message: diagnostic.error.message.clone(),
                severity: diagnostic.error.severity,
                location: Some(location),
                length: diagnostic.error.span.len(),
            }
        })
        .collect()
}

fn group_by_file(
    documents: &[Arc<SourceDocument>],
    messages: Vec<DiagnosticMessage>,
) -> CompilationException {
    let mut failures: Vec<CompilationFailure> = Vec::new();
    for message in messages {
        let path = message
            .location
            .as_ref()
            .map(|location| location.file_path.clone())
            .unwrap_or_else(|| documents[0].path().to_string());
        match failures.iter_mut().find(|f| f.source_file_path == path) {
            Some(failure) => failure.messages.push(message),
            None => failures.push(CompilationFailure {
                source_file_content: documents
                    .iter()
                    .find(|doc| doc.path() == path)
                    .map(|doc| doc.content().to_string()),
                compiled_content: None,
                source_file_path: path,
                messages: vec![message],
            }),
        }
    }
    CompilationException { failures }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::item::MemoryProject;

    fn item(project: &MemoryProject, path: &str) -> ProjectItem {
        project.get_item(path).expect("item")
    }

    #[test]
    fn passes_run_in_order() {
        let pipeline = CompilerPipeline::new(PagesOptions::default());
        assert_eq!(
            pipeline.pass_names(),
            vec![
                "virtual-documents",
                "tag-helper-binder",
                "tag-helper-binding",
                "directive-normalization"
            ]
        );
    }

    #[test]
    fn imports_contribute_usings_and_injects() {
        let mut project = MemoryProject::new();
        project
            .add("/Pages/_PageImports.razor", "@using Tasks\n@inject HtmlHelper Helper\n")
            .add("/Pages/Shop/Cart.razor", "<p>@Helper.encode(\"<\")</p>");
        let pipeline = CompilerPipeline::new(PagesOptions::default());
        let generated = pipeline
            .generate(&project, &item(&project, "/Pages/Shop/Cart.razor"), &ReferenceSet::runtime())
            .expect("generated");
        assert_eq!(generated.documents.len(), 2);
        assert!(generated.source.text.contains("inject Helper: HtmlHelper;"));
        assert_eq!(generated.source.text.matches("using Tasks;").count(), 1);
        pipeline
            .compile(&project, &item(&project, "/Pages/Shop/Cart.razor"), &ReferenceSet::runtime())
            .expect("compiled");
    }

    #[test]
    fn template_errors_stop_before_codegen() {
        let mut project = MemoryProject::new();
        project.add("/Pages/Broken.razor", "@{ let x = 1;\n<p>never closed</p>");
        let pipeline = CompilerPipeline::new(PagesOptions::default());
        let err = pipeline
            .generate(&project, &item(&project, "/Pages/Broken.razor"), &ReferenceSet::runtime())
            .expect_err("unbalanced");
        let exception = err.exception().expect("failure");
        assert_eq!(exception.failures[0].source_file_path, "/Pages/Broken.razor");
        assert!(exception.failures[0].compiled_content.is_none());
    }
}
