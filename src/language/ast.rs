use crate::language::{
    span::Span,
    types::{Mutability, TypeAnnotation},
};

/// One generated page unit: header declarations followed by the page class.
#[derive(Clone, Debug)]
pub struct CompilationUnit {
    pub namespace: Option<QualifiedName>,
    pub usings: Vec<QualifiedName>,
    pub classes: Vec<ClassDecl>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct QualifiedName {
    pub segments: Vec<String>,
    pub span: Span,
}

impl QualifiedName {
    pub fn to_dotted(&self) -> String {
        self.segments.join(".")
    }
}

#[derive(Clone, Debug)]
pub struct Identifier {
    pub name: String,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Visibility {
    #[default]
    Public,
    Private,
}

#[derive(Clone, Debug)]
pub struct ClassDecl {
    pub name: Identifier,
    pub base: Option<TypeAnnotation>,
    pub members: Vec<Member>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum Member {
    Constructor(ConstructorDecl),
    Inject(InjectDecl),
    Model(ModelDecl),
    Field(FieldDecl),
    Method(MethodDecl),
}

impl Member {
    pub fn name(&self) -> Option<&Identifier> {
        match self {
            Member::Constructor(_) => None,
            Member::Inject(inject) => Some(&inject.name),
            Member::Model(model) => Some(&model.name),
            Member::Field(field) => Some(&field.name),
            Member::Method(method) => Some(&method.name),
        }
    }

    pub fn span(&self) -> Span {
        match self {
            Member::Constructor(ctor) => ctor.span,
            Member::Inject(inject) => inject.span,
            Member::Model(model) => model.span,
            Member::Field(field) => field.span,
            Member::Method(method) => method.span,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ConstructorDecl {
    pub params: Vec<Param>,
    pub base_args: Vec<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct InjectDecl {
    pub name: Identifier,
    pub ty: TypeAnnotation,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ModelDecl {
    pub name: Identifier,
    pub ty: TypeAnnotation,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct FieldDecl {
    pub name: Identifier,
    pub ty: Option<TypeAnnotation>,
    pub value: Option<Expr>,
    pub visibility: Visibility,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct MethodDecl {
    pub name: Identifier,
    pub params: Vec<Param>,
    pub returns: Option<TypeAnnotation>,
    pub is_async: bool,
    pub visibility: Visibility,
    pub body: Block,
    pub span: Span,
}

impl MethodDecl {
    pub fn required_params(&self) -> usize {
        self.params.iter().filter(|p| p.default.is_none()).count()
    }
}

#[derive(Clone, Debug)]
pub struct Param {
    pub name: Identifier,
    pub ty: TypeAnnotation,
    pub default: Option<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct Block {
    pub statements: Vec<Statement>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum Statement {
    Let(LetStmt),
    Assign(AssignStmt),
    Expr(ExprStmt),
    Return(ReturnStmt),
    If(IfStmt),
    For(ForStmt),
    While(WhileStmt),
    Break(Span),
    Continue(Span),
    Block(Box<Block>),
}

#[derive(Clone, Debug)]
pub struct LetStmt {
    pub name: Identifier,
    pub ty: Option<TypeAnnotation>,
    pub value: Option<Expr>,
    pub mutability: Mutability,
    pub span: Span,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
}

#[derive(Clone, Debug)]
pub struct AssignStmt {
    pub target: Expr,
    pub op: AssignOp,
    pub value: Expr,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ExprStmt {
    pub expr: Expr,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct ReturnStmt {
    pub value: Option<Expr>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct IfStmt {
    pub condition: Expr,
    pub then_branch: Block,
    pub else_branch: Option<ElseBranch>,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum ElseBranch {
    Block(Block),
    If(Box<IfStmt>),
}

#[derive(Clone, Debug)]
pub struct ForStmt {
    pub binding: Identifier,
    pub iterable: Expr,
    pub body: Block,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub struct WhileStmt {
    pub condition: Expr,
    pub body: Block,
    pub span: Span,
}

#[derive(Clone, Debug)]
pub enum Expr {
    Identifier(Identifier),
    This(Span),
    Literal(Literal),
    List(Vec<Expr>, Span),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        span: Span,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        span: Span,
    },
    Await {
        expr: Box<Expr>,
        span: Span,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
        span: Span,
    },
    FieldAccess {
        base: Box<Expr>,
        field: Identifier,
        span: Span,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
        span: Span,
    },
    Range {
        start: Box<Expr>,
        end: Box<Expr>,
        inclusive: bool,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Identifier(ident) => ident.span,
            Expr::This(span) | Expr::List(_, span) => *span,
            Expr::Literal(literal) => literal.span(),
            Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Await { span, .. }
            | Expr::Call { span, .. }
            | Expr::FieldAccess { span, .. }
            | Expr::Index { span, .. }
            | Expr::Range { span, .. } => *span,
        }
    }
}

#[derive(Clone, Debug)]
pub enum Literal {
    Int(i64, Span),
    Float(f64, Span),
    Bool(bool, Span),
    String(String, Span),
    Null(Span),
}

impl Literal {
    pub fn span(&self) -> Span {
        match self {
            Literal::Int(_, span)
            | Literal::Float(_, span)
            | Literal::Bool(_, span)
            | Literal::String(_, span)
            | Literal::Null(span) => *span,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}
