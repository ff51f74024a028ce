use crate::language::{errors::SyntaxError, span::Span};
use crate::template::{source::SourceDocument, tag_helpers::TagHelperBinding};
use std::sync::Arc;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DirectiveKind {
    Page,
    Model,
    Inherits,
    Using,
    Inject,
    Functions,
}

impl DirectiveKind {
    pub fn from_keyword(word: &str) -> Option<Self> {
        match word {
            "page" => Some(DirectiveKind::Page),
            "model" => Some(DirectiveKind::Model),
            "inherits" => Some(DirectiveKind::Inherits),
            "using" => Some(DirectiveKind::Using),
            "inject" => Some(DirectiveKind::Inject),
            "functions" => Some(DirectiveKind::Functions),
            _ => None,
        }
    }

    pub fn keyword(self) -> &'static str {
        match self {
            DirectiveKind::Page => "page",
            DirectiveKind::Model => "model",
            DirectiveKind::Inherits => "inherits",
            DirectiveKind::Using => "using",
            DirectiveKind::Inject => "inject",
            DirectiveKind::Functions => "functions",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CodeKind {
    /// `@name.member` or `@( ... )`.
    Expression,
    /// `@{ ... }`.
    Statement,
    /// `@if cond {` and `@for x in xs {`.
    ControlHeader,
    /// `}` or `} else {` closing a control block.
    ControlClose,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SyntaxKind {
    Root,
    Markup,
    Comment,
    Code(CodeKind),
    Directive(DirectiveKind),
    TagHelper(TagHelperBinding),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SyntaxNode {
    pub kind: SyntaxKind,
    /// Span of `content` inside `documents[document]`.
    pub span: Span,
    pub document: usize,
    pub content: String,
    pub children: Vec<SyntaxNode>,
}

impl SyntaxNode {
    pub fn new(kind: SyntaxKind, span: Span, document: usize, content: impl Into<String>) -> Self {
        Self {
            kind,
            span,
            document,
            content: content.into(),
            children: Vec::new(),
        }
    }

    pub fn markup(span: Span, document: usize, content: impl Into<String>) -> Self {
        Self::new(SyntaxKind::Markup, span, document, content)
    }

    pub fn is_markup(&self) -> bool {
        self.kind == SyntaxKind::Markup
    }

    pub fn directive_kind(&self) -> Option<DirectiveKind> {
        match self.kind {
            SyntaxKind::Directive(kind) => Some(kind),
            _ => None,
        }
    }

    /// Re-homes this node and its children under another document index.
    pub fn with_document(mut self, document: usize) -> Self {
        self.document = document;
        self.children = self
            .children
            .into_iter()
            .map(|child| child.with_document(document))
            .collect();
        self
    }
}

#[derive(Clone, Debug)]
pub struct TemplateDiagnostic {
    pub document: usize,
    pub error: SyntaxError,
}

/// Parse result for one page plus any documents merged into it.
#[derive(Clone, Debug)]
pub struct SyntaxTree {
    pub root: SyntaxNode,
    pub diagnostics: Vec<TemplateDiagnostic>,
    /// `documents[0]` is the page itself.
    pub documents: Vec<Arc<SourceDocument>>,
}

impl SyntaxTree {
    pub fn primary(&self) -> &Arc<SourceDocument> {
        &self.documents[0]
    }

    pub fn document(&self, index: usize) -> &Arc<SourceDocument> {
        self.documents.get(index).unwrap_or(&self.documents[0])
    }

    pub fn has_errors(&self) -> bool {
        self.diagnostics.iter().any(|d| d.error.is_error())
    }

    pub fn directives(&self, kind: DirectiveKind) -> impl Iterator<Item = &SyntaxNode> {
        self.root
            .children
            .iter()
            .filter(move |node| node.directive_kind() == Some(kind))
    }

    /// Argument text of the last `@page` directive declared by the page itself.
    pub fn page_directive(&self) -> Option<&SyntaxNode> {
        self.directives(DirectiveKind::Page)
            .filter(|node| node.document == 0)
            .last()
    }
}
