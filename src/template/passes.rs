use crate::language::{errors::SyntaxError, span::Span};
use crate::project::item::TemplateProject;
use crate::template::{
    parser::parse_template,
    source::SourceDocument,
    syntax::{CodeKind, DirectiveKind, SyntaxKind, SyntaxNode, SyntaxTree, TemplateDiagnostic},
    tag_helpers::{
        find_end_tag, find_start_tag, parse_start_tag, AttributeValue, TagHelperAttribute,
        TagHelperBinding, TagHelperDescriptor, EXPRESSION_MARKER,
    },
};
use log::{debug, warn};
use std::collections::VecDeque;
use std::sync::Arc;

/// What a pass may consult besides the tree it rewrites.
pub struct PassContext<'a> {
    pub project: &'a dyn TemplateProject,
    pub page_path: &'a str,
}

/// A pure tree-to-tree rewrite. Passes run in ascending `order`.
pub trait SyntaxTreePass: Send + Sync {
    fn name(&self) -> &'static str;

    fn order(&self) -> i32;

    fn execute(&self, context: &PassContext<'_>, tree: SyntaxTree) -> SyntaxTree;
}

/// Merges the directives of every `_PageImports` file between the project
/// root and the page's directory into the page tree, root-most first.
pub struct VirtualDocumentPass {
    import_file_name: String,
}

impl VirtualDocumentPass {
    pub fn new(import_file_name: impl Into<String>) -> Self {
        Self {
            import_file_name: import_file_name.into(),
        }
    }
}

impl SyntaxTreePass for VirtualDocumentPass {
    fn name(&self) -> &'static str {
        "virtual-documents"
    }

    fn order(&self) -> i32 {
        0
    }

    fn execute(&self, context: &PassContext<'_>, mut tree: SyntaxTree) -> SyntaxTree {
        let imports = context
            .project
            .find_hierarchical_items(context.page_path, &self.import_file_name);
        if imports.is_empty() {
            return tree;
        }

        let mut merged = Vec::new();
        for item in imports {
            let index = tree.documents.len();
            let document = Arc::new(SourceDocument::new(item.path.clone(), item.content));
            let imported = parse_template(document.clone());
            debug!("merging imports from {} into {}", item.path, context.page_path);
            tree.documents.push(document);
            tree.diagnostics.extend(imported.diagnostics.into_iter().map(|d| {
                TemplateDiagnostic {
                    document: index,
                    error: d.error,
                }
            }));
            merged.extend(
                imported
                    .root
                    .children
                    .into_iter()
                    .filter(|node| {
                        matches!(
                            node.directive_kind(),
                            Some(kind) if kind != DirectiveKind::Page
                        )
                    })
                    .map(|node| node.with_document(index)),
            );
        }
        merged.append(&mut tree.root.children);
        tree.root.children = merged;
        tree
    }
}

/// Rewrites markup elements that match a registered descriptor into
/// `TagHelper` nodes owning their body.
pub struct TagHelperBinderPass {
    descriptors: Vec<TagHelperDescriptor>,
}

impl TagHelperBinderPass {
    pub fn new(descriptors: Vec<TagHelperDescriptor>) -> Self {
        Self { descriptors }
    }

    fn descriptor_for(&self, tag_name: &str) -> Option<&TagHelperDescriptor> {
        self.descriptors
            .iter()
            .find(|d| d.tag_name.eq_ignore_ascii_case(tag_name))
    }

    fn bind_nodes(
        &self,
        nodes: Vec<SyntaxNode>,
        diagnostics: &mut Vec<TemplateDiagnostic>,
    ) -> Vec<SyntaxNode> {
        let mut queue: VecDeque<SyntaxNode> = nodes.into();
        let mut out = Vec::new();
        while let Some(node) = queue.pop_front() {
            if !node.is_markup() {
                out.push(node);
                continue;
            }
            let Some((start, name)) =
                find_start_tag(&node.content, 0, |n| self.descriptor_for(n).is_some())
            else {
                out.push(node);
                continue;
            };
            let (before, tag_start) = split_markup(node, start);
            out.extend(before);
            match self.bind_element(tag_start, &name, &mut queue, diagnostics) {
                Some(bound) => out.push(bound),
                None => {
                    // Leave the element as plain markup, minus the '<' already examined.
                    if let Some(unbound) = queue.pop_front() {
                        let (head, tail) = split_markup(unbound, 1);
                        out.extend(head);
                        queue.push_front(tail);
                    }
                }
            }
        }
        out
    }

    /// On failure every consumed node is pushed back onto `queue`.
    fn bind_element(
        &self,
        first: SyntaxNode,
        name: &str,
        queue: &mut VecDeque<SyntaxNode>,
        diagnostics: &mut Vec<TemplateDiagnostic>,
    ) -> Option<SyntaxNode> {
        let Some(descriptor) = self.descriptor_for(name) else {
            queue.push_front(first);
            return None;
        };
        let document = first.document;
        let tag_span = Span::new(first.span.start, first.span.start + 1 + name.len());

        let mut joined = first.content.clone();
        let mut expressions = Vec::new();
        let mut consumed = vec![first];
        let parsed = loop {
            if let Some(parsed) = parse_start_tag(&joined) {
                break parsed;
            }
            match queue.pop_front() {
                Some(next) if next.is_markup() => {
                    joined.push_str(&next.content);
                    consumed.push(next);
                }
                Some(next) if next.kind == SyntaxKind::Code(CodeKind::Expression) => {
                    joined.push(EXPRESSION_MARKER);
                    expressions.push(next.content.clone());
                    consumed.push(next);
                }
                other => {
                    if let Some(other) = other {
                        queue.push_front(other);
                    }
                    diagnostics.push(TemplateDiagnostic {
                        document,
                        error: SyntaxError::new(
                            format!("The start tag of tag helper '{name}' is not closed"),
                            tag_span,
                        ),
                    });
                    for node in consumed.into_iter().rev() {
                        queue.push_front(node);
                    }
                    return None;
                }
            }
        };

        // The tag ends inside the last consumed markup node; requeue the remainder.
        if let Some(last) = consumed.pop() {
            let last_start_in_joined = joined.len() - last.content.len();
            let (_, remainder) = split_markup(last, parsed.end - last_start_in_joined);
            if !remainder.content.is_empty() {
                queue.push_front(remainder);
            }
        }

        let mut expressions = expressions.into_iter();
        let mut attributes = Vec::new();
        for (attr_name, raw) in parsed.attributes {
            let value = match raw {
                None => AttributeValue::Minimized,
                Some(text) if text == EXPRESSION_MARKER.to_string() => {
                    AttributeValue::Expression(expressions.next().unwrap_or_default())
                }
                Some(text) if text.contains(EXPRESSION_MARKER) => {
                    diagnostics.push(TemplateDiagnostic {
                        document,
                        error: SyntaxError::new(
                            format!(
                                "Attribute '{attr_name}' of tag helper '{name}' must be literal text or a single expression"
                            ),
                            tag_span,
                        ),
                    });
                    for _ in text.matches(EXPRESSION_MARKER) {
                        expressions.next();
                    }
                    AttributeValue::Literal(text.replace(EXPRESSION_MARKER, ""))
                }
                Some(text) => AttributeValue::Literal(text),
            };
            let bound = descriptor
                .bound_attribute(&attr_name)
                .map(|b| (b.property.clone(), b.type_name.clone()));
            attributes.push(TagHelperAttribute {
                name: attr_name,
                value,
                bound,
            });
        }

        let mut children = Vec::new();
        if !parsed.self_closing {
            match take_element_body(queue, name) {
                Some(body) => children = self.bind_nodes(body, diagnostics),
                None => {
                    diagnostics.push(TemplateDiagnostic {
                        document,
                        error: SyntaxError::new(
                            format!(
                                "Found a malformed '{name}' tag helper. Tag helpers must have a start and end tag or be self closing"
                            ),
                            tag_span,
                        ),
                    });
                }
            }
        }

        let binding = TagHelperBinding {
            type_name: descriptor.type_name.clone(),
            tag_name: name.to_string(),
            attributes,
            self_closing: parsed.self_closing,
        };
        let mut node = SyntaxNode::new(SyntaxKind::TagHelper(binding), tag_span, document, name);
        node.children = children;
        Some(node)
    }
}

impl SyntaxTreePass for TagHelperBinderPass {
    fn name(&self) -> &'static str {
        "tag-helper-binder"
    }

    fn order(&self) -> i32 {
        100
    }

    fn execute(&self, _context: &PassContext<'_>, mut tree: SyntaxTree) -> SyntaxTree {
        if self.descriptors.is_empty() {
            return tree;
        }
        let children = std::mem::take(&mut tree.root.children);
        let mut diagnostics = Vec::new();
        tree.root.children = self.bind_nodes(children, &mut diagnostics);
        if !diagnostics.is_empty() {
            warn!("{} tag helper diagnostics", diagnostics.len());
        }
        tree.diagnostics.extend(diagnostics);
        tree
    }
}

/// Splits a markup node at byte `at` of its content.
fn split_markup(node: SyntaxNode, at: usize) -> (Option<SyntaxNode>, SyntaxNode) {
    let at = at.min(node.content.len());
    let before = (at > 0).then(|| {
        SyntaxNode::markup(
            Span::new(node.span.start, node.span.start + at),
            node.document,
            &node.content[..at],
        )
    });
    let after = SyntaxNode::markup(
        Span::new(node.span.start + at, node.span.end),
        node.document,
        &node.content[at..],
    );
    (before, after)
}

/// Pops nodes up to the matching `</name>`, which is consumed. Returns `None`
/// and restores the queue when no end tag exists.
fn take_element_body(queue: &mut VecDeque<SyntaxNode>, name: &str) -> Option<Vec<SyntaxNode>> {
    let mut body = Vec::new();
    let mut depth = 0usize;
    while let Some(node) = queue.pop_front() {
        if !node.is_markup() {
            body.push(node);
            continue;
        }
        let mut cursor = 0;
        let mut found = None;
        loop {
            let end = find_end_tag(&node.content, cursor, name);
            let nested = find_start_tag(&node.content, cursor, |n| n.eq_ignore_ascii_case(name))
                .filter(|(start, _)| end.map_or(true, |(end_start, _)| *start < end_start));
            if let Some((start, _)) = nested {
                let self_closing = parse_start_tag(&node.content[start..])
                    .map(|tag| tag.self_closing)
                    .unwrap_or(false);
                if !self_closing {
                    depth += 1;
                }
                cursor = start + 1;
                continue;
            }
            match end {
                Some((end_start, end_end)) if depth == 0 => {
                    found = Some((end_start, end_end));
                    break;
                }
                Some((_, end_end)) => {
                    depth -= 1;
                    cursor = end_end;
                }
                None => break,
            }
        }
        match found {
            Some((end_start, end_end)) => {
                let (before, rest) = split_markup(node, end_start);
                body.extend(before);
                let (_, after) = split_markup(rest, end_end - end_start);
                if !after.content.is_empty() {
                    queue.push_front(after);
                }
                return Some(body);
            }
            None => body.push(node),
        }
    }
    for node in body.into_iter().rev() {
        queue.push_front(node);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::item::MemoryProject;
    use crate::template::tag_helpers::BoundAttributeDescriptor;

    fn alert_descriptor() -> TagHelperDescriptor {
        TagHelperDescriptor {
            type_name: "AlertTagHelper".into(),
            tag_name: "alert".into(),
            attributes: vec![BoundAttributeDescriptor {
                name: "kind".into(),
                property: "Kind".into(),
                type_name: "string".into(),
            }],
        }
    }

    fn bind(text: &str) -> SyntaxTree {
        let project = MemoryProject::new();
        let tree = parse_template(Arc::new(SourceDocument::new("/Pages/T.razor", text)));
        let context = PassContext {
            project: &project,
            page_path: "/Pages/T.razor",
        };
        TagHelperBinderPass::new(vec![alert_descriptor()]).execute(&context, tree)
    }

    #[test]
    fn imports_are_merged_root_first_and_before_page_nodes() {
        let mut project = MemoryProject::new();
        project.add("/_PageImports.razor", "@using Root\n<p>ignored</p>");
        project.add("/Pages/_PageImports.razor", "@using Pages.Shared\n@page \"/x\"");
        let page = "@using Local\n<h1>Hi</h1>";
        project.add("/Pages/Index.razor", page);
        let tree = parse_template(Arc::new(SourceDocument::new("/Pages/Index.razor", page)));
        let context = PassContext {
            project: &project,
            page_path: "/Pages/Index.razor",
        };
        let tree = VirtualDocumentPass::new("_PageImports.razor").execute(&context, tree);

        let usings: Vec<(&str, usize)> = tree
            .directives(DirectiveKind::Using)
            .map(|n| (n.content.as_str(), n.document))
            .collect();
        assert_eq!(usings, vec![("Root", 1), ("Pages.Shared", 2), ("Local", 0)]);
        assert_eq!(tree.documents.len(), 3);
        assert!(tree.page_directive().is_none());
    }

    #[test]
    fn binds_element_with_literal_and_expression_attributes() {
        let tree = bind("<div><alert kind=\"@Model.Level\" class=\"x\">Saved @name</alert></div>");
        let kinds: Vec<&SyntaxKind> = tree.root.children.iter().map(|n| &n.kind).collect();
        assert_eq!(kinds.len(), 3);
        let helper = &tree.root.children[1];
        let SyntaxKind::TagHelper(binding) = &helper.kind else {
            panic!("expected tag helper, got {:?}", helper.kind);
        };
        assert_eq!(binding.type_name, "AlertTagHelper");
        assert_eq!(
            binding.attributes[0].value,
            AttributeValue::Expression("Model.Level".into())
        );
        assert_eq!(binding.attributes[0].bound, Some(("Kind".into(), "string".into())));
        assert_eq!(binding.attributes[1].value, AttributeValue::Literal("x".into()));
        assert_eq!(binding.attributes[1].bound, None);
        assert_eq!(helper.children.len(), 2);
        assert_eq!(helper.children[0].content, "Saved ");
        assert_eq!(tree.root.children[2].content, "</div>");
        assert!(tree.diagnostics.is_empty());
    }

    #[test]
    fn nested_same_name_elements_pair_correctly() {
        let tree = bind("<alert><alert/><alert>in</alert></alert>tail");
        let helper = &tree.root.children[0];
        assert!(matches!(helper.kind, SyntaxKind::TagHelper(_)));
        assert_eq!(helper.children.len(), 2);
        assert_eq!(tree.root.children[1].content, "tail");
    }

    #[test]
    fn missing_end_tag_is_reported() {
        let tree = bind("<alert kind=\"info\">never closed");
        assert!(tree.has_errors());
        assert!(matches!(tree.root.children[0].kind, SyntaxKind::TagHelper(_)));
        assert_eq!(tree.root.children[1].content, "never closed");
    }
}
