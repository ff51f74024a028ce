//! Syntax tree to chunk tree, in source order.

use crate::language::errors::SyntaxError;
use crate::template::{
    chunks::{Chunk, ChunkNode, ChunkTree, HtmlAttributeValue, PropertyValue},
    directives::{parse_inject, parse_namespace, parse_page, parse_type},
    syntax::{CodeKind, DirectiveKind, SyntaxKind, SyntaxNode, SyntaxTree, TemplateDiagnostic},
    tag_helpers::{AttributeValue, TagHelperBinding},
};
use std::collections::HashSet;

pub struct LoweredTree {
    pub chunks: ChunkTree,
    pub diagnostics: Vec<TemplateDiagnostic>,
}

pub fn lower(tree: &SyntaxTree) -> LoweredTree {
    let mut lowering = Lowering {
        tree,
        diagnostics: Vec::new(),
        usings: HashSet::new(),
    };
    let children = lowering.lower_nodes(&tree.root.children);
    LoweredTree {
        chunks: ChunkTree { children },
        diagnostics: lowering.diagnostics,
    }
}

struct Lowering<'a> {
    tree: &'a SyntaxTree,
    diagnostics: Vec<TemplateDiagnostic>,
    usings: HashSet<String>,
}

impl<'a> Lowering<'a> {
    fn lower_nodes(&mut self, nodes: &[SyntaxNode]) -> Vec<ChunkNode> {
        nodes.iter().filter_map(|node| self.lower_node(node)).collect()
    }

    fn chunk(&self, node: &SyntaxNode, chunk: Chunk) -> ChunkNode {
        let origin = self.tree.document(node.document).location(node.span.start);
        ChunkNode::new(chunk, origin, node.span.len())
    }

    fn report(&mut self, node: &SyntaxNode, message: String) {
        self.diagnostics.push(TemplateDiagnostic {
            document: node.document,
            error: SyntaxError::new(message, node.span),
        });
    }

    fn lower_node(&mut self, node: &SyntaxNode) -> Option<ChunkNode> {
        let chunk = match &node.kind {
            SyntaxKind::Root | SyntaxKind::Comment => return None,
            SyntaxKind::Markup if node.content.is_empty() => return None,
            SyntaxKind::Markup => Chunk::Literal {
                text: node.content.clone(),
            },
            SyntaxKind::Code(CodeKind::Expression) => Chunk::Expression {
                code: node.content.clone(),
            },
            SyntaxKind::Code(_) => Chunk::Statement {
                code: node.content.clone(),
            },
            SyntaxKind::Directive(kind) => return self.lower_directive(node, *kind),
            SyntaxKind::TagHelper(binding) => {
                let mut children = self.lower_properties(node, binding);
                children.extend(self.lower_nodes(&node.children));
                Chunk::TagHelper {
                    type_name: binding.type_name.clone(),
                    tag_name: binding.tag_name.clone(),
                    html_attributes: binding
                        .attributes
                        .iter()
                        .filter(|attr| attr.bound.is_none())
                        .map(|attr| {
                            let value = match &attr.value {
                                AttributeValue::Literal(text) => HtmlAttributeValue::Literal(text.clone()),
                                AttributeValue::Expression(code) => {
                                    HtmlAttributeValue::Expression(code.clone())
                                }
                                AttributeValue::Minimized => HtmlAttributeValue::Minimized,
                            };
                            (attr.name.clone(), value)
                        })
                        .collect(),
                    self_closing: binding.self_closing,
                    children,
                }
            }
        };
        Some(self.chunk(node, chunk))
    }

    fn lower_properties(&mut self, node: &SyntaxNode, binding: &TagHelperBinding) -> Vec<ChunkNode> {
        binding
            .attributes
            .iter()
            .filter_map(|attr| {
                let (property, property_type) = attr.bound.as_ref()?;
                let value = match &attr.value {
                    AttributeValue::Literal(text) => PropertyValue::Literal(text.clone()),
                    AttributeValue::Expression(code) => PropertyValue::Code(code.clone()),
                    AttributeValue::Minimized => PropertyValue::Literal(String::new()),
                };
                Some(self.chunk(
                    node,
                    Chunk::TagHelperProperty {
                        type_name: binding.type_name.clone(),
                        property_name: property.clone(),
                        property_type: property_type.clone(),
                        attribute_name: attr.name.clone(),
                        value,
                    },
                ))
            })
            .collect()
    }

    fn lower_directive(&mut self, node: &SyntaxNode, kind: DirectiveKind) -> Option<ChunkNode> {
        let chunk = match kind {
            DirectiveKind::Page => {
                if let Err(error) = parse_page(&node.content) {
                    self.report(node, error.message);
                }
                return None;
            }
            DirectiveKind::Model => match parse_type("model", &node.content) {
                Ok(type_name) => Chunk::SetModelType { type_name },
                Err(error) => {
                    self.report(node, error.message);
                    return None;
                }
            },
            DirectiveKind::Inherits => match parse_type("inherits", &node.content) {
                Ok(type_name) => Chunk::SetBaseType { type_name },
                Err(error) => {
                    self.report(node, error.message);
                    return None;
                }
            },
            DirectiveKind::Using => match parse_namespace(&node.content) {
                Ok(namespace) if self.usings.insert(namespace.clone()) => Chunk::Using { namespace },
                Ok(_) => return None,
                Err(error) => {
                    self.report(node, error.message);
                    return None;
                }
            },
            DirectiveKind::Inject => match parse_inject(&node.content) {
                Ok((type_name, member_name)) => Chunk::Inject {
                    type_name,
                    member_name,
                },
                Err(error) => {
                    self.report(node, error.message);
                    return None;
                }
            },
            DirectiveKind::Functions => Chunk::TypeMember {
                code: node.content.clone(),
            },
        };
        Some(self.chunk(node, chunk))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{parser::parse_template, source::SourceDocument};
    use std::sync::Arc;

    fn lower_text(text: &str) -> LoweredTree {
        lower(&parse_template(Arc::new(SourceDocument::new(
            "/Pages/Index.razor",
            text,
        ))))
    }

    #[test]
    fn lowers_in_source_order_with_origins() {
        let lowered = lower_text("@model Customer\n<h1>@Model.Name</h1>");
        let chunks: Vec<&Chunk> = lowered.chunks.children.iter().map(|c| &c.chunk).collect();
        assert_eq!(
            chunks,
            vec![
                &Chunk::SetModelType {
                    type_name: "Customer".into()
                },
                &Chunk::Literal { text: "<h1>".into() },
                &Chunk::Expression {
                    code: "Model.Name".into()
                },
                &Chunk::Literal { text: "</h1>".into() },
            ]
        );
        let expression = &lowered.chunks.children[2];
        assert_eq!(expression.origin.line, 2);
        assert_eq!(expression.origin.column, 6);
        assert_eq!(expression.length, "Model.Name".len());
    }

    #[test]
    fn duplicate_usings_keep_first() {
        let lowered = lower_text("@using Samples\n@using Samples.Data\n@using Samples\n");
        let usings: Vec<&str> = lowered.chunks.usings().collect();
        assert_eq!(usings, vec!["Samples", "Samples.Data"]);
    }

    #[test]
    fn malformed_directive_reports_and_continues() {
        let lowered = lower_text("@model\n<p>after</p>");
        assert_eq!(lowered.diagnostics.len(), 1);
        assert!(lowered.diagnostics[0]
            .error
            .message
            .contains("'@model' directive expects a type name"));
        assert!(lowered
            .chunks
            .children
            .iter()
            .any(|c| c.chunk == Chunk::Literal { text: "<p>after</p>".into() }));
    }
}
