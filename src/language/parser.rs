use crate::language::{
    ast::*,
    errors::{SyntaxError, SyntaxErrors},
    lexer::lex,
    span::Span,
    token::{Token, TokenKind},
    types::{Mutability, TypeAnnotation, TypeExpr},
};

pub fn parse_unit(source: &str) -> Result<CompilationUnit, SyntaxErrors> {
    let tokens = match lex(source) {
        Ok(tokens) => tokens,
        Err(errors) => {
            let errs = errors
                .into_iter()
                .map(|err| SyntaxError::new(err.message, err.span))
                .collect();
            return Err(SyntaxErrors::new(errs));
        }
    };
    Parser::new(tokens).parse()
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<SyntaxError>,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            errors: Vec::new(),
        }
    }

    fn parse(mut self) -> Result<CompilationUnit, SyntaxErrors> {
        let mut namespace = None;
        let mut usings = Vec::new();
        let mut classes = Vec::new();

        while !self.is_eof() {
            if self.matches(TokenKind::Semi) {
                continue;
            }
            let result = if self.matches(TokenKind::Namespace) {
                self.parse_qualified_name("Expected namespace name")
                    .and_then(|name| {
                        self.expect(TokenKind::Semi)?;
                        namespace = Some(name);
                        Ok(())
                    })
            } else if self.matches(TokenKind::Using) {
                self.parse_qualified_name("Expected namespace after 'using'")
                    .and_then(|name| {
                        self.expect(TokenKind::Semi)?;
                        usings.push(name);
                        Ok(())
                    })
            } else if self.check(TokenKind::Class) {
                self.parse_class().map(|class| classes.push(class))
            } else {
                Err(self.error_here("Expected `namespace`, `using` or `class` declaration"))
            };
            if let Err(err) = result {
                self.report(err);
                self.synchronize_top_level();
            }
        }

        if self.errors.is_empty() {
            Ok(CompilationUnit {
                namespace,
                usings,
                classes,
            })
        } else {
            Err(SyntaxErrors::new(self.errors))
        }
    }

    fn parse_qualified_name(&mut self, msg: &str) -> Result<QualifiedName, SyntaxError> {
        let first = self.expect_identifier(msg)?;
        let mut span = first.span;
        let mut segments = vec![first.name];
        while self.matches(TokenKind::Dot) {
            let next = self.expect_identifier("Expected identifier after '.'")?;
            span = span.union(next.span);
            segments.push(next.name);
        }
        Ok(QualifiedName { segments, span })
    }

    fn parse_class(&mut self) -> Result<ClassDecl, SyntaxError> {
        let start = self.expect(TokenKind::Class)?.span.start;
        let name = self.expect_identifier("Expected class name")?;
        let base = if self.matches(TokenKind::Colon) {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };
        self.expect(TokenKind::LBrace)?;

        let mut members = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_eof() {
            if self.matches(TokenKind::Semi) {
                continue;
            }
            match self.parse_member() {
                Ok(member) => members.push(member),
                Err(err) => {
                    self.report(err);
                    self.synchronize_member();
                }
            }
        }
        if self.is_eof() && !self.errors.is_empty() {
            // Recovery already reported the real problem.
            let end = self.current_span_start();
            return Ok(ClassDecl {
                name,
                base,
                members,
                span: Span::new(start, end),
            });
        }
        let end = self.expect(TokenKind::RBrace)?.span.end;
        Ok(ClassDecl {
            name,
            base,
            members,
            span: Span::new(start, end),
        })
    }

    fn parse_member(&mut self) -> Result<Member, SyntaxError> {
        let start = self.current_span_start();
        if self.matches(TokenKind::New) {
            return self.parse_constructor(start).map(Member::Constructor);
        }
        if let Some(TokenKind::Identifier(word)) = self.peek_kind() {
            let followed_by_name = matches!(self.peek_kind_n(1), Some(TokenKind::Identifier(_)));
            if word == "inject" && followed_by_name {
                self.advance();
                let (name, ty) = self.parse_typed_name("Expected injected property name")?;
                let end = self.expect(TokenKind::Semi)?.span.end;
                return Ok(Member::Inject(InjectDecl {
                    name,
                    ty,
                    span: Span::new(start, end),
                }));
            }
            if word == "model" && followed_by_name {
                self.advance();
                let (name, ty) = self.parse_typed_name("Expected model property name")?;
                let end = self.expect(TokenKind::Semi)?.span.end;
                return Ok(Member::Model(ModelDecl {
                    name,
                    ty,
                    span: Span::new(start, end),
                }));
            }
        }

        let visibility = if self.matches(TokenKind::Private) {
            Visibility::Private
        } else {
            Visibility::Public
        };
        if self.matches(TokenKind::Let) {
            return self.parse_field(start, visibility).map(Member::Field);
        }
        let is_async = self.matches(TokenKind::Async);
        if self.matches(TokenKind::Fn) {
            return self
                .parse_method(start, visibility, is_async)
                .map(Member::Method);
        }
        Err(self.error_here("Expected member declaration (`let`, `fn` or `new`)"))
    }

    fn parse_typed_name(&mut self, msg: &str) -> Result<(Identifier, TypeAnnotation), SyntaxError> {
        let name = self.expect_identifier(msg)?;
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type_annotation()?;
        Ok((name, ty))
    }

    fn parse_constructor(&mut self, start: usize) -> Result<ConstructorDecl, SyntaxError> {
        let params = self.parse_params()?;
        let mut base_args = Vec::new();
        if self.matches(TokenKind::Colon) {
            match self.peek_kind() {
                Some(TokenKind::Identifier(word)) if word == "base" => {
                    self.advance();
                }
                _ => return Err(self.error_here("Expected `base` initializer")),
            }
            base_args = self.parse_args()?;
        }
        let end = self.expect(TokenKind::Semi)?.span.end;
        Ok(ConstructorDecl {
            params,
            base_args,
            span: Span::new(start, end),
        })
    }

    fn parse_field(&mut self, start: usize, visibility: Visibility) -> Result<FieldDecl, SyntaxError> {
        // Page fields are always mutable; accept the keyword for symmetry with locals.
        self.consume_optional(TokenKind::Mut);
        let name = self.expect_identifier("Expected field name")?;
        let ty = if self.matches(TokenKind::Colon) {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };
        let value = if self.matches(TokenKind::Eq) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let end = self.expect(TokenKind::Semi)?.span.end;
        Ok(FieldDecl {
            name,
            ty,
            value,
            visibility,
            span: Span::new(start, end),
        })
    }

    fn parse_method(
        &mut self,
        start: usize,
        visibility: Visibility,
        is_async: bool,
    ) -> Result<MethodDecl, SyntaxError> {
        let name = self.expect_identifier("Expected method name")?;
        let params = self.parse_params()?;
        let returns = if self.matches(TokenKind::Arrow) {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };
        let body = self.parse_block()?;
        let span = Span::new(start, body.span.end);
        Ok(MethodDecl {
            name,
            params,
            returns,
            is_async,
            visibility,
            body,
            span,
        })
    }

    fn parse_params(&mut self) -> Result<Vec<Param>, SyntaxError> {
        self.expect(TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                params.push(self.parse_param()?);
                if self.matches(TokenKind::Comma) {
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_param(&mut self) -> Result<Param, SyntaxError> {
        let span_start = self.current_span_start();
        let name = self.expect_identifier("Expected parameter name")?;
        self.expect(TokenKind::Colon)?;
        let ty = self.parse_type_annotation()?;
        let default = if self.matches(TokenKind::Eq) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let end = self.last_span_end(ty.span.end);
        Ok(Param {
            name,
            ty,
            default,
            span: Span::new(span_start, end),
        })
    }

    fn parse_args(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        self.expect(TokenKind::LParen)?;
        let mut args = Vec::new();
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expression()?);
                if self.matches(TokenKind::Comma) {
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_block(&mut self) -> Result<Block, SyntaxError> {
        let start = self.expect(TokenKind::LBrace)?.span.start;
        let mut statements = Vec::new();
        while !self.check(TokenKind::RBrace) && !self.is_eof() {
            if self.matches(TokenKind::Semi) {
                continue;
            }
            statements.push(self.parse_statement()?);
        }
        let end = self.expect(TokenKind::RBrace)?.span.end;
        Ok(Block {
            statements,
            span: Span::new(start, end),
        })
    }

    fn parse_statement(&mut self) -> Result<Statement, SyntaxError> {
        let start = self.current_span_start();
        if self.matches(TokenKind::Let) {
            let stmt = self.parse_let(start)?;
            return Ok(Statement::Let(stmt));
        }
        if self.matches(TokenKind::Return) {
            let value = if self.check(TokenKind::Semi) {
                None
            } else {
                Some(self.parse_expression()?)
            };
            let end = self.expect(TokenKind::Semi)?.span.end;
            return Ok(Statement::Return(ReturnStmt {
                value,
                span: Span::new(start, end),
            }));
        }
        if self.matches(TokenKind::If) {
            return self.parse_if(start).map(Statement::If);
        }
        if self.matches(TokenKind::For) {
            let binding = self.expect_identifier("Expected loop binding")?;
            self.expect(TokenKind::In)?;
            let iterable = self.parse_expression()?;
            let body = self.parse_block()?;
            let span = Span::new(start, body.span.end);
            return Ok(Statement::For(ForStmt {
                binding,
                iterable,
                body,
                span,
            }));
        }
        if self.matches(TokenKind::While) {
            let condition = self.parse_expression()?;
            let body = self.parse_block()?;
            let span = Span::new(start, body.span.end);
            return Ok(Statement::While(WhileStmt {
                condition,
                body,
                span,
            }));
        }
        if self.matches(TokenKind::Break) {
            let end = self.expect(TokenKind::Semi)?.span.end;
            return Ok(Statement::Break(Span::new(start, end)));
        }
        if self.matches(TokenKind::Continue) {
            let end = self.expect(TokenKind::Semi)?.span.end;
            return Ok(Statement::Continue(Span::new(start, end)));
        }
        if self.check(TokenKind::LBrace) {
            let block = self.parse_block()?;
            return Ok(Statement::Block(Box::new(block)));
        }

        let expr = self.parse_expression()?;
        let op = match self.peek_kind() {
            Some(TokenKind::Eq) => Some(AssignOp::Assign),
            Some(TokenKind::PlusEq) => Some(AssignOp::AddAssign),
            Some(TokenKind::MinusEq) => Some(AssignOp::SubAssign),
            _ => None,
        };
        if let Some(op) = op {
            if !is_assignable(&expr) {
                return Err(SyntaxError::new("Invalid assignment target", expr.span())
                    .with_help("only variables, fields and indexed elements can be assigned"));
            }
            self.advance();
            let value = self.parse_expression()?;
            let end = self.expect(TokenKind::Semi)?.span.end;
            return Ok(Statement::Assign(AssignStmt {
                target: expr,
                op,
                value,
                span: Span::new(start, end),
            }));
        }
        let end = self.expect(TokenKind::Semi)?.span.end;
        Ok(Statement::Expr(ExprStmt {
            expr,
            span: Span::new(start, end),
        }))
    }

    fn parse_let(&mut self, start: usize) -> Result<LetStmt, SyntaxError> {
        let mutability = if self.matches(TokenKind::Mut) {
            Mutability::Mutable
        } else {
            Mutability::Immutable
        };
        let name = self.expect_identifier("Expected binding name")?;
        let ty = if self.matches(TokenKind::Colon) {
            Some(self.parse_type_annotation()?)
        } else {
            None
        };
        let value = if self.matches(TokenKind::Eq) {
            Some(self.parse_expression()?)
        } else {
            None
        };
        let end = self.expect(TokenKind::Semi)?.span.end;
        Ok(LetStmt {
            name,
            ty,
            value,
            mutability,
            span: Span::new(start, end),
        })
    }

    fn parse_if(&mut self, start: usize) -> Result<IfStmt, SyntaxError> {
        let condition = self.parse_expression()?;
        let then_branch = self.parse_block()?;
        let mut end = then_branch.span.end;
        let else_branch = if self.matches(TokenKind::Else) {
            if self.check(TokenKind::If) {
                let nested_start = self.current_span_start();
                self.advance();
                let nested = self.parse_if(nested_start)?;
                end = nested.span.end;
                Some(ElseBranch::If(Box::new(nested)))
            } else {
                let block = self.parse_block()?;
                end = block.span.end;
                Some(ElseBranch::Block(block))
            }
        } else {
            None
        };
        Ok(IfStmt {
            condition,
            then_branch,
            else_branch,
            span: Span::new(start, end),
        })
    }

    fn parse_expression(&mut self) -> Result<Expr, SyntaxError> {
        let expr = self.parse_binary(0)?;
        let inclusive = if self.matches(TokenKind::DotDot) {
            false
        } else if self.matches(TokenKind::DotDotEq) {
            true
        } else {
            return Ok(expr);
        };
        let end_expr = self.parse_binary(0)?;
        let span = expr.span().union(end_expr.span());
        Ok(Expr::Range {
            start: Box::new(expr),
            end: Box::new(end_expr),
            inclusive,
            span,
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_unary()?;

        loop {
            let (op, prec) = match self.current_binary_op() {
                Some(info) => info,
                None => break,
            };
            if prec < min_prec {
                break;
            }
            self.advance();
            let right = self.parse_binary(prec + 1)?;
            let span = left.span().union(right.span());
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                span,
            };
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        let start = self.current_span_start();
        if self.matches(TokenKind::Minus) {
            let expr = self.parse_unary()?;
            let span = Span::new(start, expr.span().end);
            return Ok(Expr::Unary {
                op: UnaryOp::Neg,
                expr: Box::new(expr),
                span,
            });
        }
        if self.matches(TokenKind::Bang) {
            let expr = self.parse_unary()?;
            let span = Span::new(start, expr.span().end);
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
                span,
            });
        }
        if self.matches(TokenKind::Await) {
            let expr = self.parse_unary()?;
            let span = Span::new(start, expr.span().end);
            return Ok(Expr::Await {
                expr: Box::new(expr),
                span,
            });
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_primary()?;
        loop {
            if self.check(TokenKind::LParen) {
                let span_start = expr.span().start;
                let args = self.parse_args()?;
                let end = self.last_span_end(span_start);
                expr = Expr::Call {
                    callee: Box::new(expr),
                    args,
                    span: Span::new(span_start, end),
                };
                continue;
            }
            if self.matches(TokenKind::Dot) {
                let field = self.expect_identifier("Expected member name after '.'")?;
                let span = expr.span().union(field.span);
                expr = Expr::FieldAccess {
                    base: Box::new(expr),
                    field,
                    span,
                };
                continue;
            }
            if self.matches(TokenKind::LBracket) {
                let index = self.parse_expression()?;
                let end = self.expect(TokenKind::RBracket)?.span.end;
                let span = Span::new(expr.span().start, end);
                expr = Expr::Index {
                    base: Box::new(expr),
                    index: Box::new(index),
                    span,
                };
                continue;
            }
            break;
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        let span = self.current_span();
        match self.peek_kind() {
            Some(TokenKind::Integer(value)) => {
                self.advance();
                Ok(Expr::Literal(Literal::Int(value, span)))
            }
            Some(TokenKind::Float(value)) => {
                self.advance();
                Ok(Expr::Literal(Literal::Float(value, span)))
            }
            Some(TokenKind::String(value)) => {
                self.advance();
                Ok(Expr::Literal(Literal::String(value, span)))
            }
            Some(TokenKind::True) => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(true, span)))
            }
            Some(TokenKind::False) => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(false, span)))
            }
            Some(TokenKind::Null) => {
                self.advance();
                Ok(Expr::Literal(Literal::Null(span)))
            }
            Some(TokenKind::This) => {
                self.advance();
                Ok(Expr::This(span))
            }
            Some(TokenKind::Identifier(name)) => {
                self.advance();
                Ok(Expr::Identifier(Identifier { name, span }))
            }
            Some(TokenKind::LParen) => {
                self.advance();
                let expr = self.parse_expression()?;
                self.expect(TokenKind::RParen)?;
                Ok(expr)
            }
            Some(TokenKind::LBracket) => {
                self.advance();
                let mut items = Vec::new();
                if !self.check(TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expression()?);
                        if self.matches(TokenKind::Comma) {
                            if self.check(TokenKind::RBracket) {
                                break;
                            }
                            continue;
                        }
                        break;
                    }
                }
                let end = self.expect(TokenKind::RBracket)?.span.end;
                Ok(Expr::List(items, Span::new(span.start, end)))
            }
            _ => Err(self.error_here("Expected expression")),
        }
    }

    fn parse_type_annotation(&mut self) -> Result<TypeAnnotation, SyntaxError> {
        let start = self.current_span_start();
        let ty = self.parse_type_expr()?;
        let end = self.last_span_end(start);
        Ok(TypeAnnotation::new(ty, Span::new(start, end)))
    }

    fn parse_type_expr(&mut self) -> Result<TypeExpr, SyntaxError> {
        let name = self.parse_qualified_name("Expected type")?;
        let mut args = Vec::new();
        if self.matches(TokenKind::Lt) {
            loop {
                args.push(self.parse_type_expr()?);
                if self.matches(TokenKind::Comma) {
                    continue;
                }
                break;
            }
            self.expect(TokenKind::Gt)?;
        }
        let ty = TypeExpr::generic(name.to_dotted(), args);
        if self.matches(TokenKind::Question) {
            return Ok(TypeExpr::Nullable(Box::new(ty)));
        }
        Ok(ty)
    }

    fn current_binary_op(&self) -> Option<(BinaryOp, u8)> {
        match self.peek_kind() {
            Some(TokenKind::Plus) => Some((BinaryOp::Add, 10)),
            Some(TokenKind::Minus) => Some((BinaryOp::Sub, 10)),
            Some(TokenKind::Star) => Some((BinaryOp::Mul, 20)),
            Some(TokenKind::Slash) => Some((BinaryOp::Div, 20)),
            Some(TokenKind::Percent) => Some((BinaryOp::Rem, 20)),
            Some(TokenKind::AmpersandAmpersand) => Some((BinaryOp::And, 4)),
            Some(TokenKind::PipePipe) => Some((BinaryOp::Or, 3)),
            Some(TokenKind::EqEq) => Some((BinaryOp::Eq, 5)),
            Some(TokenKind::BangEq) => Some((BinaryOp::NotEq, 5)),
            Some(TokenKind::Lt) => Some((BinaryOp::Lt, 9)),
            Some(TokenKind::LtEq) => Some((BinaryOp::LtEq, 9)),
            Some(TokenKind::Gt) => Some((BinaryOp::Gt, 9)),
            Some(TokenKind::GtEq) => Some((BinaryOp::GtEq, 9)),
            _ => None,
        }
    }

    fn expect_identifier(&mut self, msg: &str) -> Result<Identifier, SyntaxError> {
        match self.peek_kind() {
            Some(TokenKind::Identifier(name)) => {
                let span = self.advance().span;
                Ok(Identifier { name, span })
            }
            _ => Err(self.error_here(msg)),
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&Token, SyntaxError> {
        if self.check(kind.clone()) {
            Ok(self.advance())
        } else {
            let found = self
                .peek_kind()
                .map(|found| found.describe())
                .unwrap_or_else(|| "end of file".into());
            Err(self.error_here(&format!("Expected {}, found {}", kind.describe(), found)))
        }
    }

    fn consume_optional(&mut self, kind: TokenKind) -> bool {
        self.matches(kind)
    }

    fn matches(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn check(&self, kind: TokenKind) -> bool {
        matches!(self.peek_kind(), Some(tk) if tk == kind)
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.tokens.get(self.pos).map(|t| t.kind.clone())
    }

    fn peek_kind_n(&self, n: usize) -> Option<TokenKind> {
        self.tokens.get(self.pos + n).map(|t| t.kind.clone())
    }

    fn advance(&mut self) -> &Token {
        let index = self.pos.min(self.tokens.len().saturating_sub(1));
        self.pos = (self.pos + 1).min(self.tokens.len());
        &self.tokens[index]
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek_kind(), Some(TokenKind::Eof) | None)
    }

    fn current_span(&self) -> Span {
        self.tokens
            .get(self.pos)
            .map(|t| t.span)
            .unwrap_or_else(|| Span::empty(self.current_span_start()))
    }

    fn current_span_start(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map(|t| t.span.start)
            .unwrap_or_else(|| self.tokens.last().map(|t| t.span.end).unwrap_or(0))
    }

    fn last_span_end(&self, fallback: usize) -> usize {
        if self.pos == 0 {
            return fallback;
        }
        self.tokens
            .get(self.pos - 1)
            .map(|t| t.span.end)
            .unwrap_or(fallback)
    }

    fn error_here(&self, message: &str) -> SyntaxError {
        SyntaxError::new(message.to_string(), self.current_span())
    }

    fn report(&mut self, err: SyntaxError) {
        self.errors.push(err);
    }

    fn synchronize_top_level(&mut self) {
        while !self.is_eof() {
            match self.peek_kind() {
                Some(TokenKind::Namespace | TokenKind::Using | TokenKind::Class) => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn synchronize_member(&mut self) {
        while !self.is_eof() {
            match self.peek_kind() {
                Some(TokenKind::Fn | TokenKind::Async | TokenKind::Private | TokenKind::New) => {
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }
}

fn is_assignable(expr: &Expr) -> bool {
    match expr {
        Expr::Identifier(_) => true,
        Expr::FieldAccess { base, .. } | Expr::Index { base, .. } => {
            matches!(base.as_ref(), Expr::This(_)) || is_assignable(base)
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> CompilationUnit {
        parse_unit(source).expect("parse")
    }

    #[test]
    fn parses_page_class_with_members() {
        let unit = parse(
            r#"
namespace Pages.Admin;
using Task;
class Generated_Edit : Page {
    new(db: AppDbContext) : base(db);
    inject Html: HtmlHelper;
    model Model: Customer;
    let message: string = "";
    async fn OnPostAsync(id: int = 0) -> Task<Result> {
        message += "saved";
        return page();
    }
}
"#,
        );
        assert_eq!(
            unit.namespace.as_ref().map(|n| n.to_dotted()).as_deref(),
            Some("Pages.Admin")
        );
        assert_eq!(unit.usings.len(), 1);
        let class = &unit.classes[0];
        assert_eq!(class.name.name, "Generated_Edit");
        assert_eq!(class.members.len(), 5);
        let Member::Method(method) = &class.members[4] else {
            panic!("expected method");
        };
        assert!(method.is_async);
        assert_eq!(method.required_params(), 0);
        assert_eq!(
            method.returns.as_ref().map(|r| r.ty.canonical_name()).as_deref(),
            Some("Task<Result>")
        );
    }

    #[test]
    fn inject_and_model_stay_usable_as_identifiers() {
        let unit = parse(
            "class P : Page { fn OnGet() { let model = 1; let inject = model + 1; } }",
        );
        let Member::Method(method) = &unit.classes[0].members[0] else {
            panic!("expected method");
        };
        assert_eq!(method.body.statements.len(), 2);
    }

    #[test]
    fn precedence_binds_multiplication_tighter() {
        let unit = parse("class P : Page { fn F() { let x = 1 + 2 * 3; } }");
        let Member::Method(method) = &unit.classes[0].members[0] else {
            panic!("expected method");
        };
        let Statement::Let(stmt) = &method.body.statements[0] else {
            panic!("expected let");
        };
        match stmt.value.as_ref() {
            Some(Expr::Binary {
                op: BinaryOp::Add,
                right,
                ..
            }) => assert!(matches!(
                right.as_ref(),
                Expr::Binary {
                    op: BinaryOp::Mul,
                    ..
                }
            )),
            other => panic!("unexpected expression {other:?}"),
        }
    }

    #[test]
    fn reports_error_at_offending_token() {
        let source = "class P : Page {\n    fn OnGet( {\n    }\n}";
        let errors = parse_unit(source).expect_err("should fail").errors;
        assert!(!errors.is_empty());
        let offset = source.find("( {").expect("paren") + 2;
        assert_eq!(errors[0].span.start, offset);
        assert_eq!(errors[0].message, "Expected parameter name");
    }

    #[test]
    fn rejects_assignment_to_call() {
        let errors = parse_unit("class P : Page { fn F() { g() = 1; } }")
            .expect_err("should fail")
            .errors;
        assert_eq!(errors[0].message, "Invalid assignment target");
    }
}
