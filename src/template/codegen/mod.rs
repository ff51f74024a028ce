//! Emits the page script unit for a chunk tree.
//!
//! Layout of a generated unit:
//!
//! ```text
//! // checksum sha256 <hex> "<template path>"
//! namespace <ns>;
//! using <import>;
//! class Generated_<stem> : <base> {
//!     new(<base ctor params>) : base(<names>);
//!     inject Html: HtmlHelper;
//!     inject Logger: Logger<Generated_<stem>>;
//!     model Model: <T>;
//! <@functions members>
//!     async fn <execute>() -> Task { ... }
//! }
//! ```
//!
//! Authored code is copied verbatim and recorded in the line mappings so
//! compiler diagnostics can be reported against the template.

pub mod writer;

use crate::compilation::{
    failure::CompilationError,
    references::{ReferenceSet, TASKS_NAMESPACE},
};
use crate::project::{item::normalize_path, options::PagesOptions};
use crate::template::{
    chunks::{Chunk, ChunkNode, ChunkTree, HtmlAttributeValue, PropertyValue},
    source::{SourceDocument, SourceLocation},
};
use log::debug;
use writer::{string_literal, LineMapping, SourceWriter};

pub const CLASS_PREFIX: &str = "Generated_";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeGenContext {
    pub namespace: String,
    pub class_name: String,
    pub default_base_type: String,
    pub default_imports: Vec<String>,
    pub execute_method_name: String,
}

impl CodeGenContext {
    /// Class and namespace for the template at `relative_path`, e.g.
    /// `/Pages/Widgets/Edit.razor` -> `Pages.Widgets.Generated_Edit`.
    pub fn for_page(relative_path: &str, options: &PagesOptions) -> Self {
        let path = normalize_path(relative_path);
        let root = normalize_path(&options.root_directory);
        let within_root = path
            .strip_prefix(root.trim_end_matches('/'))
            .filter(|rest| rest.starts_with('/'))
            .unwrap_or(&path);
        let mut segments: Vec<&str> = within_root.split('/').filter(|s| !s.is_empty()).collect();
        let file_name = segments.pop().unwrap_or_default();
        let stem = match file_name.rfind('.') {
            Some(dot) if dot > 0 => &file_name[..dot],
            _ => file_name,
        };

        let mut namespace = options.default_namespace.clone();
        for segment in segments {
            if !namespace.is_empty() {
                namespace.push('.');
            }
            namespace.push_str(&sanitize_identifier(segment));
        }
        Self {
            namespace,
            class_name: format!("{CLASS_PREFIX}{}", sanitize_identifier(stem)),
            default_base_type: options.default_base_type.clone(),
            default_imports: options.default_imports.clone(),
            execute_method_name: options.execute_method_name.clone(),
        }
    }
}

fn sanitize_identifier(text: &str) -> String {
    let mut out: String = text
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.chars().next().map_or(true, |c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GeneratedSource {
    pub text: String,
    pub line_mappings: Vec<LineMapping>,
    pub class_name: String,
    pub namespace: String,
    /// Path of the template the unit was generated from.
    pub file_path: String,
    pub base_type: String,
    pub model_type: Option<String>,
}

impl GeneratedSource {
    pub fn qualified_class_name(&self) -> String {
        format!("{}.{}", self.namespace, self.class_name)
    }

    pub fn mapping_for_line(&self, line: usize) -> Option<&LineMapping> {
        self.line_mappings
            .iter()
            .rev()
            .find(|mapping| mapping.generated_line == line)
    }

    /// Authored location of a generated `(line, column)`, when the line was
    /// copied from a template.
    pub fn map_location(&self, line: usize, column: usize) -> Option<SourceLocation> {
        self.line_mappings
            .iter()
            .filter(|mapping| mapping.generated_line == line)
            .filter(|mapping| mapping.generated_column <= column)
            .max_by_key(|mapping| mapping.generated_column)
            .or_else(|| self.mapping_for_line(line))
            .map(|mapping| mapping.map_column(column))
    }
}

pub fn generate(
    document: &SourceDocument,
    chunks: &ChunkTree,
    context: &CodeGenContext,
    references: &ReferenceSet,
) -> Result<GeneratedSource, CompilationError> {
    let imports = collect_imports(chunks, context);
    let base_type = chunks
        .base_type()
        .unwrap_or(context.default_base_type.as_str())
        .to_string();
    let base_name = base_type.split('<').next().unwrap_or_default().trim();
    let page_base = references
        .resolve_base_type(base_name, &imports)
        .ok_or_else(|| CompilationError::InvalidBaseType {
            type_name: base_type.clone(),
            reason: "is not a known page base type".into(),
        })?;
    let constructor = page_base
        .single_constructor()
        .ok_or_else(|| CompilationError::InvalidBaseType {
            type_name: base_type.clone(),
            reason: format!("declares {} constructors", page_base.constructors.len()),
        })?;

    let mut out = SourceWriter::new();
    out.write_line(&format!(
        "// checksum sha256 {} {}",
        document.checksum_hex(),
        string_literal(document.path())
    ));
    out.write_line(&format!("namespace {};", context.namespace));
    out.new_line();
    for import in &imports {
        out.write_line(&format!("using {import};"));
    }
    out.new_line();

    out.write_line(&format!("class {} : {} {{", context.class_name, base_type))
        .indent();
    let params: Vec<String> = constructor
        .iter()
        .map(|p| format!("{}: {}", p.name, p.type_name))
        .collect();
    let names: Vec<&str> = constructor.iter().map(|p| p.name.as_str()).collect();
    out.write_line(&format!(
        "new({}) : base({});",
        params.join(", "),
        names.join(", ")
    ));
    out.new_line();

    out.write_line("inject Html: HtmlHelper;");
    out.write_line(&format!("inject Logger: Logger<{}>;", context.class_name));
    for node in &chunks.children {
        if let Chunk::Inject {
            type_name,
            member_name,
        } = &node.chunk
        {
            out.write("inject ");
            out.write_mapped(member_name, &node.origin);
            out.write_line(&format!(": {type_name};"));
        }
    }
    let model_type = chunks.model_type().map(str::to_string);
    if let Some(model) = &model_type {
        out.write_line(&format!("model Model: {model};"));
    }
    out.new_line();

    for node in &chunks.children {
        if let Chunk::TypeMember { code } = &node.chunk {
            out.write_mapped_block(code, &node.origin);
        }
    }

    out.write_line(&format!(
        "async fn {}() -> Task {{",
        context.execute_method_name
    ))
    .indent();
    render_nodes(&mut out, &chunks.children);
    out.dedent().write_line("}");
    out.dedent().write_line("}");

    let (text, line_mappings) = out.finish();
    debug!(
        "generated {}.{} ({} lines, {} mappings)",
        context.namespace,
        context.class_name,
        text.lines().count(),
        line_mappings.len()
    );
    Ok(GeneratedSource {
        text,
        line_mappings,
        class_name: context.class_name.clone(),
        namespace: context.namespace.clone(),
        file_path: document.path().to_string(),
        base_type,
        model_type,
    })
}

/// Defaults first, then template imports not already present; `Tasks` exactly once.
fn collect_imports(chunks: &ChunkTree, context: &CodeGenContext) -> Vec<String> {
    let mut imports: Vec<String> = Vec::new();
    let defaults = context.default_imports.iter().map(String::as_str);
    for import in defaults.chain(chunks.usings()) {
        if !imports.iter().any(|existing| existing == import) {
            imports.push(import.to_string());
        }
    }
    if !imports.iter().any(|import| import == TASKS_NAMESPACE) {
        imports.push(TASKS_NAMESPACE.to_string());
    }
    imports
}

fn render_nodes(out: &mut SourceWriter, nodes: &[ChunkNode]) {
    for node in nodes {
        match &node.chunk {
            Chunk::Literal { text } => {
                out.write_line(&format!("write_literal({});", string_literal(text)));
            }
            Chunk::Expression { code } => {
                out.write("write(");
                out.write_mapped(code, &node.origin);
                out.write_line(");");
            }
            Chunk::Statement { code } => {
                out.write_mapped_block(code, &node.origin);
            }
            Chunk::TagHelper {
                type_name,
                tag_name,
                html_attributes,
                self_closing,
                children,
            } => {
                out.write(&format!(
                    "tag_helper_begin({}, {}, [",
                    string_literal(type_name),
                    string_literal(tag_name)
                ));
                for (index, (name, value)) in html_attributes.iter().enumerate() {
                    if index > 0 {
                        out.write(", ");
                    }
                    out.write(&format!("[{}, ", string_literal(name)));
                    match value {
                        HtmlAttributeValue::Literal(text) => {
                            out.write(&string_literal(text));
                        }
                        HtmlAttributeValue::Expression(code) => {
                            out.write_mapped(code, &node.origin);
                        }
                        HtmlAttributeValue::Minimized => {
                            out.write("null");
                        }
                    }
                    out.write("]");
                }
                out.write_line(&format!("], {self_closing});"));
                for child in children {
                    if let Chunk::TagHelperProperty {
                        property_name,
                        value,
                        ..
                    } = &child.chunk
                    {
                        out.write(&format!("tag_helper_set({}, ", string_literal(property_name)));
                        match value {
                            PropertyValue::Code(code) => {
                                out.write_mapped(code, &child.origin);
                            }
                            PropertyValue::Literal(text) => {
                                out.write(&string_literal(text));
                            }
                        }
                        out.write_line(");");
                    }
                }
                render_nodes(out, children);
                out.write_line("tag_helper_end();");
            }
            Chunk::TagHelperProperty { .. }
            | Chunk::Using { .. }
            | Chunk::SetBaseType { .. }
            | Chunk::SetModelType { .. }
            | Chunk::Inject { .. }
            | Chunk::TypeMember { .. } => {}
        }
    }
}
