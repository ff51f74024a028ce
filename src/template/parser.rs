use crate::language::{errors::SyntaxError, span::Span};
use crate::template::{
    source::{SourceDocument, SourceReader},
    syntax::{CodeKind, DirectiveKind, SyntaxKind, SyntaxNode, SyntaxTree, TemplateDiagnostic},
};
use log::debug;
use std::sync::Arc;

/// Parses a template into a syntax tree. Never fails: problems are recorded as
/// diagnostics on the returned tree.
pub fn parse_template(document: Arc<SourceDocument>) -> SyntaxTree {
    let (children, errors) = {
        let mut parser = TemplateParser::new(&document);
        let children = parser.parse_nodes(false);
        (children, parser.diagnostics)
    };
    debug!(
        "parsed {}: {} nodes, {} diagnostics",
        document.path(),
        children.len(),
        errors.len()
    );
    let mut root = SyntaxNode::new(
        SyntaxKind::Root,
        Span::new(0, document.content().len()),
        0,
        String::new(),
    );
    root.children = children;
    SyntaxTree {
        root,
        diagnostics: errors
            .into_iter()
            .map(|error| TemplateDiagnostic { document: 0, error })
            .collect(),
        documents: vec![document],
    }
}

const CONTROL_KEYWORDS: &[&str] = &["if", "for", "while"];

struct TemplateParser<'a> {
    reader: SourceReader<'a>,
    diagnostics: Vec<SyntaxError>,
}

enum Scan {
    Closed { content_end: usize },
    Unclosed,
}

impl<'a> TemplateParser<'a> {
    fn new(document: &'a SourceDocument) -> Self {
        Self {
            reader: document.reader(),
            diagnostics: Vec::new(),
        }
    }

    fn error(&mut self, span: Span, message: impl Into<String>) {
        self.diagnostics.push(SyntaxError::new(message, span));
    }

    fn warning(&mut self, span: Span, message: impl Into<String>) {
        self.diagnostics.push(SyntaxError::warning(message, span));
    }

    fn flush_markup(&self, nodes: &mut Vec<SyntaxNode>, start: usize, end: usize) {
        if end > start {
            let text = self.reader.slice(start, end);
            nodes.push(SyntaxNode::markup(Span::new(start, end), 0, text));
        }
    }

    /// Markup with transitions. Inside a control block body the first `}` at
    /// markup level ends the body and is left unconsumed.
    fn parse_nodes(&mut self, in_block: bool) -> Vec<SyntaxNode> {
        let mut nodes = Vec::new();
        let mut markup_start = self.reader.offset();
        while let Some(ch) = self.reader.peek() {
            match ch {
                '}' if in_block => break,
                '@' if self.reader.previous().is_some_and(char::is_alphanumeric)
                    && self.reader.peek_nth(1).is_some_and(char::is_alphanumeric) =>
                {
                    // e-mail addresses and similar stay markup
                    self.reader.bump();
                }
                '@' if self.reader.peek_nth(1) == Some('@') => {
                    self.reader.bump();
                    self.flush_markup(&mut nodes, markup_start, self.reader.offset());
                    self.reader.bump();
                    markup_start = self.reader.offset();
                }
                '@' => {
                    let at = self.reader.offset();
                    self.flush_markup(&mut nodes, markup_start, at);
                    self.parse_transition(&mut nodes, in_block);
                    markup_start = self.reader.offset();
                }
                _ => {
                    self.reader.bump();
                }
            }
        }
        self.flush_markup(&mut nodes, markup_start, self.reader.offset());
        nodes
    }

    fn parse_transition(&mut self, nodes: &mut Vec<SyntaxNode>, in_block: bool) {
        let at = self.reader.offset();
        self.reader.bump();
        match self.reader.peek() {
            Some('*') => self.parse_comment(nodes, at),
            Some('{') => {
                let kind = SyntaxKind::Code(CodeKind::Statement);
                if let Some(node) = self.parse_braced_code(at, kind) {
                    nodes.push(node);
                }
            }
            Some('(') => self.parse_explicit_expression(nodes, at),
            Some(ch) if ch.is_alphabetic() || ch == '_' => {
                let word_start = self.reader.offset();
                let word = self
                    .reader
                    .eat_while(|c| c.is_alphanumeric() || c == '_')
                    .to_string();
                match DirectiveKind::from_keyword(&word) {
                    Some(kind) if !in_block => self.parse_directive(nodes, at, kind),
                    _ if CONTROL_KEYWORDS.contains(&word.as_str()) => {
                        self.parse_control_block(nodes, at, word_start)
                    }
                    _ => {
                        self.reader.seek(word_start);
                        self.parse_implicit_expression(nodes);
                    }
                }
            }
            _ => {
                self.warning(
                    Span::new(at, self.reader.offset()),
                    "Unexpected character after '@'; the '@' is rendered as markup",
                );
                nodes.push(SyntaxNode::markup(Span::new(at, at + 1), 0, "@"));
            }
        }
    }

    fn parse_comment(&mut self, nodes: &mut Vec<SyntaxNode>, at: usize) {
        self.reader.bump();
        let body_start = self.reader.offset();
        match self.reader.rest().find("*@") {
            Some(rel) => {
                let body_end = body_start + rel;
                self.reader.seek(body_end + 2);
                nodes.push(SyntaxNode::new(
                    SyntaxKind::Comment,
                    Span::new(body_start, body_end),
                    0,
                    self.reader.slice(body_start, body_end),
                ));
            }
            None => {
                self.error(
                    Span::new(at, body_start),
                    "The comment is not terminated; expected '*@'",
                );
                let end = body_start + self.reader.rest().len();
                self.reader.seek(end);
            }
        }
    }

    /// Reader is on `{`. Produces a node whose content is the text between the
    /// braces.
    fn parse_braced_code(&mut self, at: usize, kind: SyntaxKind) -> Option<SyntaxNode> {
        let open = self.reader.offset();
        match self.scan_balanced('{', '}') {
            Scan::Closed { content_end } => {
                let content_start = open + 1;
                Some(SyntaxNode::new(
                    kind,
                    Span::new(content_start, content_end),
                    0,
                    self.reader.slice(content_start, content_end),
                ))
            }
            Scan::Unclosed => {
                self.error(
                    Span::new(at, open + 1),
                    "The code block is missing a closing '}' character",
                );
                None
            }
        }
    }

    fn parse_explicit_expression(&mut self, nodes: &mut Vec<SyntaxNode>, at: usize) {
        let open = self.reader.offset();
        match self.scan_balanced('(', ')') {
            Scan::Closed { content_end } => {
                let content_start = open + 1;
                let code = self.reader.slice(content_start, content_end);
                if code.trim().is_empty() {
                    self.error(Span::new(at, content_end + 1), "Expression is empty");
                    return;
                }
                nodes.push(SyntaxNode::new(
                    SyntaxKind::Code(CodeKind::Expression),
                    Span::new(content_start, content_end),
                    0,
                    code,
                ));
            }
            Scan::Unclosed => self.error(
                Span::new(at, open + 1),
                "The explicit expression is missing a closing ')' character",
            ),
        }
    }

    fn parse_implicit_expression(&mut self, nodes: &mut Vec<SyntaxNode>) {
        let start = self.reader.offset();
        self.reader.eat_while(|c| c.is_alphanumeric() || c == '_');
        loop {
            match self.reader.peek() {
                Some('.')
                    if self
                        .reader
                        .peek_nth(1)
                        .is_some_and(|c| c.is_alphabetic() || c == '_') =>
                {
                    self.reader.bump();
                    self.reader.eat_while(|c| c.is_alphanumeric() || c == '_');
                }
                Some('(') => {
                    let checkpoint = self.reader.offset();
                    if let Scan::Unclosed = self.scan_balanced('(', ')') {
                        self.error(
                            Span::new(checkpoint, checkpoint + 1),
                            "The expression is missing a closing ')' character",
                        );
                        self.reader.seek(checkpoint);
                        break;
                    }
                }
                Some('[') => {
                    let checkpoint = self.reader.offset();
                    if let Scan::Unclosed = self.scan_balanced('[', ']') {
                        self.error(
                            Span::new(checkpoint, checkpoint + 1),
                            "The expression is missing a closing ']' character",
                        );
                        self.reader.seek(checkpoint);
                        break;
                    }
                }
                _ => break,
            }
        }
        let end = self.reader.offset();
        nodes.push(SyntaxNode::new(
            SyntaxKind::Code(CodeKind::Expression),
            Span::new(start, end),
            0,
            self.reader.slice(start, end),
        ));
    }

    fn parse_directive(&mut self, nodes: &mut Vec<SyntaxNode>, at: usize, kind: DirectiveKind) {
        if kind == DirectiveKind::Functions {
            self.reader.eat_while(char::is_whitespace);
            if self.reader.peek() != Some('{') {
                let here = self.reader.offset();
                self.error(
                    Span::new(at, here),
                    "The '@functions' directive must be followed by a '{' block",
                );
                return;
            }
            if let Some(node) = self.parse_braced_code(at, SyntaxKind::Directive(kind)) {
                nodes.push(node);
            }
            self.eat_line_end();
            return;
        }

        self.reader.eat_while(|c| c == ' ' || c == '\t');
        let line = self.reader.eat_while(|c| c != '\n' && c != '\r');
        let trimmed = line.trim_end();
        let start = self.reader.offset() - line.len();
        nodes.push(SyntaxNode::new(
            SyntaxKind::Directive(kind),
            Span::new(start, start + trimmed.len()),
            0,
            trimmed,
        ));
        self.eat_line_end();
    }

    fn parse_control_block(&mut self, nodes: &mut Vec<SyntaxNode>, at: usize, header_start: usize) {
        let Some(header_end) = self.scan_to_block_open() else {
            self.error(
                Span::new(at, self.reader.offset()),
                "Expected '{' to open the block body",
            );
            return;
        };
        nodes.push(SyntaxNode::new(
            SyntaxKind::Code(CodeKind::ControlHeader),
            Span::new(header_start, header_end),
            0,
            self.reader.slice(header_start, header_end),
        ));

        loop {
            let body = self.parse_nodes(true);
            nodes.extend(body);
            if self.reader.peek() != Some('}') {
                self.error(
                    Span::new(at, header_end),
                    "The block is missing a closing '}' character",
                );
                return;
            }
            let close = self.reader.offset();
            self.reader.bump();

            let after_close = self.reader.offset();
            self.reader.eat_while(char::is_whitespace);
            let else_start = self.reader.offset();
            let is_else = self.reader.starts_with("else")
                && !self
                    .reader
                    .peek_nth(4)
                    .is_some_and(|c| c.is_alphanumeric() || c == '_');
            if !is_else {
                self.reader.seek(after_close);
                nodes.push(SyntaxNode::new(
                    SyntaxKind::Code(CodeKind::ControlClose),
                    Span::new(close, after_close),
                    0,
                    "}",
                ));
                self.eat_line_end();
                return;
            }

            let Some(else_end) = self.scan_to_block_open() else {
                self.error(
                    Span::new(else_start, self.reader.offset()),
                    "Expected '{' after 'else'",
                );
                return;
            };
            let content = format!("}} {}", self.reader.slice(else_start, else_end));
            nodes.push(SyntaxNode::new(
                SyntaxKind::Code(CodeKind::ControlClose),
                Span::new(close, else_end),
                0,
                content,
            ));
        }
    }

    /// Advances past the first `{` outside parentheses and string literals and
    /// returns the offset just after it.
    fn scan_to_block_open(&mut self) -> Option<usize> {
        let checkpoint = self.reader.offset();
        let mut parens = 0usize;
        while let Some(ch) = self.reader.bump() {
            match ch {
                '"' => {
                    if !self.skip_string() {
                        break;
                    }
                }
                '(' => parens += 1,
                ')' => parens = parens.saturating_sub(1),
                '{' if parens == 0 => return Some(self.reader.offset()),
                '\n' | '}' if parens == 0 => break,
                _ => {}
            }
        }
        self.reader.seek(checkpoint);
        None
    }

    /// Reader is on `open`. On success the reader ends past the matching
    /// `close`.
    fn scan_balanced(&mut self, open: char, close: char) -> Scan {
        let mut depth = 0usize;
        while let Some(ch) = self.reader.peek() {
            if ch == '"' {
                self.reader.bump();
                self.skip_string();
                continue;
            }
            if ch == '/' && self.reader.peek_nth(1) == Some('/') {
                self.reader.eat_while(|c| c != '\n');
                continue;
            }
            self.reader.bump();
            if ch == open {
                depth += 1;
            } else if ch == close {
                depth -= 1;
                if depth == 0 {
                    return Scan::Closed {
                        content_end: self.reader.offset() - close.len_utf8(),
                    };
                }
            }
        }
        let end = self.reader.offset() + self.reader.rest().len();
        self.reader.seek(end);
        Scan::Unclosed
    }

    /// Reader is just past an opening quote.
    fn skip_string(&mut self) -> bool {
        while let Some(ch) = self.reader.bump() {
            match ch {
                '\\' => {
                    self.reader.bump();
                }
                '"' => return true,
                '\n' => return false,
                _ => {}
            }
        }
        false
    }

    fn eat_line_end(&mut self) {
        let checkpoint = self.reader.offset();
        self.reader.eat_while(|c| c == ' ' || c == '\t');
        if self.reader.starts_with("\r\n") {
            self.reader.advance_by(2);
        } else if self.reader.starts_with("\n") {
            self.reader.advance_by(1);
        } else if !self.reader.is_eof() {
            self.reader.seek(checkpoint);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> SyntaxTree {
        parse_template(Arc::new(SourceDocument::new("/Pages/Test.razor", text)))
    }

    fn kinds(tree: &SyntaxTree) -> Vec<SyntaxKind> {
        tree.root.children.iter().map(|n| n.kind.clone()).collect()
    }

    #[test]
    fn splits_markup_and_implicit_expressions() {
        let tree = parse("<h1>Hello @Model.Name!</h1>");
        assert_eq!(
            kinds(&tree),
            vec![
                SyntaxKind::Markup,
                SyntaxKind::Code(CodeKind::Expression),
                SyntaxKind::Markup
            ]
        );
        assert_eq!(tree.root.children[1].content, "Model.Name");
        assert_eq!(tree.root.children[2].content, "!</h1>");
        assert!(tree.diagnostics.is_empty());
    }

    #[test]
    fn implicit_expression_includes_calls_and_indexers() {
        let tree = parse("@items[0].Format(\"x)\").Length.");
        assert_eq!(tree.root.children[0].content, "items[0].Format(\"x)\").Length");
        assert_eq!(tree.root.children[1].content, ".");
    }

    #[test]
    fn email_addresses_and_escaped_at_stay_markup() {
        let tree = parse("mail me@example.com or @@handle");
        let text: String = tree.root.children.iter().map(|n| n.content.as_str()).collect();
        assert!(tree.root.children.iter().all(SyntaxNode::is_markup));
        assert_eq!(text, "mail me@example.com or @handle");
    }

    #[test]
    fn directives_capture_their_argument_line() {
        let tree = parse("@page \"{id?}\"\n@model Customer  \n<p></p>");
        let page = tree.page_directive().expect("page directive");
        assert_eq!(page.content, "\"{id?}\"");
        let model = tree.directives(DirectiveKind::Model).next().expect("model");
        assert_eq!(model.content, "Customer");
        let last = tree.root.children.last().expect("markup");
        assert_eq!(last.content, "<p></p>");
    }

    #[test]
    fn functions_block_tracks_nested_braces_and_strings() {
        let source = "@functions {\n    fn OnGet() { let s = \"}\"; }\n}\n<p>after</p>";
        let tree = parse(source);
        let functions = tree
            .directives(DirectiveKind::Functions)
            .next()
            .expect("functions");
        assert_eq!(functions.content, "\n    fn OnGet() { let s = \"}\"; }\n");
        assert_eq!(&source[functions.span.start..functions.span.end], functions.content);
        assert_eq!(tree.root.children.last().expect("tail").content, "<p>after</p>");
    }

    #[test]
    fn unclosed_code_block_reports_error_at_transition() {
        let tree = parse("<p>\n@{ let x = 1;\n");
        assert_eq!(tree.diagnostics.len(), 1);
        let diagnostic = &tree.diagnostics[0].error;
        assert!(diagnostic.is_error());
        assert_eq!(diagnostic.span.start, 4);
    }

    #[test]
    fn control_blocks_interleave_code_and_markup() {
        let tree = parse("@if ok {<b>yes</b>} else {<i>no</i>}\n<p/>");
        let summary: Vec<(SyntaxKind, String)> = tree
            .root
            .children
            .iter()
            .map(|n| (n.kind.clone(), n.content.clone()))
            .collect();
        assert_eq!(
            summary,
            vec![
                (SyntaxKind::Code(CodeKind::ControlHeader), "if ok {".to_string()),
                (SyntaxKind::Markup, "<b>yes</b>".to_string()),
                (SyntaxKind::Code(CodeKind::ControlClose), "} else {".to_string()),
                (SyntaxKind::Markup, "<i>no</i>".to_string()),
                (SyntaxKind::Code(CodeKind::ControlClose), "}".to_string()),
                (SyntaxKind::Markup, "<p/>".to_string()),
            ]
        );
    }

    #[test]
    fn unknown_transition_is_tolerated_as_markup() {
        let tree = parse("cost @ 5");
        assert!(!tree.has_errors());
        assert_eq!(tree.diagnostics.len(), 1);
        let text: String = tree.root.children.iter().map(|n| n.content.as_str()).collect();
        assert_eq!(text, "cost @ 5");
    }

    #[test]
    fn comments_are_separate_nodes() {
        let tree = parse("a@* note *@b");
        assert_eq!(
            kinds(&tree),
            vec![SyntaxKind::Markup, SyntaxKind::Comment, SyntaxKind::Markup]
        );
    }
}
