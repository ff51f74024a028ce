//! Checks a generated page unit and turns it into a `CompiledPageType`.
//!
//! Diagnostics are reported against the generated text and then translated
//! through the unit's line mappings, so errors in authored code point at the
//! template while errors in scaffolding point at the generated class.

use crate::compilation::{
    failure::{CompilationError, CompilationException, CompilationFailure, DiagnosticMessage},
    references::{PageBaseType, ReferenceSet},
};
use crate::language::{
    ast::*,
    errors::SyntaxError,
    parser::parse_unit,
    span::Span,
    types::{TypeAnnotation, TypeExpr},
};
use crate::runtime::{builtins::builtin_arity, Value};
use crate::template::{codegen::GeneratedSource, source::SourceDocument};
use log::{debug, info};
use std::collections::HashSet;
use std::sync::Arc;

/// A checked page class ready to be activated.
#[derive(Clone, Debug)]
pub struct CompiledPageType {
    /// Namespace-qualified class name.
    pub name: String,
    pub class: ClassDecl,
    pub base_type: PageBaseType,
    pub model_type: Option<String>,
    pub execute_method_name: String,
    pub source: GeneratedSource,
}

impl CompiledPageType {
    /// The single constructor; checking guarantees it exists.
    pub fn constructor(&self) -> Option<&ConstructorDecl> {
        self.class.members.iter().find_map(|member| match member {
            Member::Constructor(ctor) => Some(ctor),
            _ => None,
        })
    }

    /// Methods with their member index, in declaration order.
    pub fn methods(&self) -> impl Iterator<Item = (usize, &MethodDecl)> {
        self.class
            .members
            .iter()
            .enumerate()
            .filter_map(|(index, member)| match member {
                Member::Method(method) => Some((index, method)),
                _ => None,
            })
    }

    pub fn method_index(&self, name: &str) -> Option<usize> {
        self.methods()
            .find(|(_, method)| method.name.name == name)
            .map(|(index, _)| index)
    }

    pub fn injects(&self) -> impl Iterator<Item = &InjectDecl> {
        self.class.members.iter().filter_map(|member| match member {
            Member::Inject(inject) => Some(inject),
            _ => None,
        })
    }

    pub fn model(&self) -> Option<&ModelDecl> {
        self.class.members.iter().find_map(|member| match member {
            Member::Model(model) => Some(model),
            _ => None,
        })
    }
}

/// Lexes, parses and checks generated units.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeCompiler;

impl NativeCompiler {
    /// `authored` are the documents the unit was generated from; their text is
    /// attached to failures reported against them.
    pub fn compile(
        &self,
        generated: &GeneratedSource,
        references: &ReferenceSet,
        execute_method_name: &str,
        authored: &[Arc<SourceDocument>],
    ) -> Result<CompiledPageType, CompilationError> {
        let qualified = generated.qualified_class_name();
        debug!("compiling {qualified}");

        let (unit, errors) = match parse_unit(&generated.text) {
            Ok(unit) => {
                let mut checker = Checker::new(references, &generated.class_name);
                checker.check_unit(&unit, execute_method_name);
                (Some(unit), checker.errors)
            }
            Err(errors) => (None, errors.errors),
        };

        let error_count = errors.iter().filter(|e| e.is_error()).count();
        if error_count > 0 {
            info!("compilation of {qualified} failed with {error_count} errors");
            return Err(CompilationError::Compilation(group_failures(
                generated, &errors, authored,
            )));
        }

        let unit = unit.ok_or_else(|| CompilationError::NotFound(qualified.clone()))?;
        let class = unit
            .classes
            .into_iter()
            .next()
            .ok_or_else(|| CompilationError::NotFound(qualified.clone()))?;
        let imports = import_names(&unit.usings);
        let base_name = class
            .base
            .as_ref()
            .map(|base| base.ty.base_name().to_string())
            .unwrap_or_default();
        let base_type = references
            .resolve_base_type(&base_name, &imports)
            .cloned()
            .ok_or_else(|| CompilationError::InvalidBaseType {
                type_name: base_name.clone(),
                reason: "is not a known page base type".into(),
            })?;
        info!("compiled {qualified} : {}", base_type.qualified_name());
        Ok(CompiledPageType {
            name: qualified,
            class,
            base_type,
            model_type: generated.model_type.clone(),
            execute_method_name: execute_method_name.to_string(),
            source: generated.clone(),
        })
    }
}

fn import_names(usings: &[QualifiedName]) -> Vec<String> {
    usings.iter().map(QualifiedName::to_dotted).collect()
}

/// Buckets messages by the file they map to: a template when a line mapping
/// covers the location, the generated class otherwise.
fn group_failures(
    generated: &GeneratedSource,
    errors: &[SyntaxError],
    authored: &[Arc<SourceDocument>],
) -> CompilationException {
    let unit_document = SourceDocument::new(generated.qualified_class_name(), generated.text.clone());
    let mut failures: Vec<CompilationFailure> = Vec::new();
    for error in errors {
        let generated_location = unit_document.location(error.span.start);
        let mapped = generated.map_location(generated_location.line, generated_location.column);
        let (group, location) = match mapped {
            Some(location) => (location.file_path.clone(), location),
            None => (generated.qualified_class_name(), generated_location),
        };
        let message = DiagnosticMessage {
            message: match &error.help {
                Some(help) => format!("{} ({help})", error.message),
                None => error.message.clone(),
            },
            severity: error.severity,
            location: Some(location),
            length: error.span.len(),
        };
        match failures.iter_mut().find(|f| f.source_file_path == group) {
            Some(failure) => failure.messages.push(message),
            None => failures.push(CompilationFailure {
                source_file_content: authored
                    .iter()
                    .find(|doc| doc.path() == group)
                    .map(|doc| doc.content().to_string()),
                compiled_content: Some(generated.text.clone()),
                source_file_path: group,
                messages: vec![message],
            }),
        }
    }
    CompilationException { failures }
}

struct MethodSignature {
    required: usize,
    total: usize,
}

struct Checker<'a> {
    references: &'a ReferenceSet,
    class_name: &'a str,
    imports: Vec<String>,
    fields: HashSet<String>,
    methods: Vec<(String, MethodSignature)>,
    scopes: Vec<HashSet<String>>,
    loop_depth: usize,
    errors: Vec<SyntaxError>,
}

impl<'a> Checker<'a> {
    fn new(references: &'a ReferenceSet, class_name: &'a str) -> Self {
        Self {
            references,
            class_name,
            imports: Vec::new(),
            fields: HashSet::new(),
            methods: Vec::new(),
            scopes: Vec::new(),
            loop_depth: 0,
            errors: Vec::new(),
        }
    }

    fn error(&mut self, message: impl Into<String>, span: Span) {
        self.errors.push(SyntaxError::new(message, span));
    }

    fn check_unit(&mut self, unit: &CompilationUnit, execute_method_name: &str) {
        for using in &unit.usings {
            let namespace = using.to_dotted();
            if !self.references.has_namespace(&namespace) {
                self.error(
                    format!("The type or namespace name '{namespace}' could not be found"),
                    using.span,
                );
            }
        }
        self.imports = import_names(&unit.usings);

        let class = match unit.classes.as_slice() {
            [class] => class,
            [] => {
                self.error("The generated unit declares no page class", Span::empty(0));
                return;
            }
            [_, extra, ..] => {
                self.error("The generated unit declares more than one class", extra.span);
                return;
            }
        };
        self.check_class(class, execute_method_name);
    }

    fn check_class(&mut self, class: &ClassDecl, execute_method_name: &str) {
        let base = match &class.base {
            Some(base) => match self
                .references
                .resolve_base_type(base.ty.base_name(), &self.imports)
            {
                Some(page_base) => Some(page_base.clone()),
                None => {
                    self.error(
                        format!("'{}' is not a known page base type", base.ty),
                        base.span,
                    );
                    None
                }
            },
            None => {
                self.error(
                    format!("'{}' must derive from a page base type", class.name.name),
                    class.name.span,
                );
                None
            }
        };
        let base_parameters: Vec<String> = base
            .as_ref()
            .and_then(|b| b.single_constructor())
            .map(|params| params.iter().map(|p| p.name.clone()).collect())
            .unwrap_or_default();
        self.fields.extend(base_parameters.iter().cloned());

        let mut seen: HashSet<String> = HashSet::new();
        let mut constructors = Vec::new();
        for member in &class.members {
            if let Some(name) = member.name() {
                if !seen.insert(name.name.clone()) || base_parameters.contains(&name.name) {
                    self.error(
                        format!(
                            "The type '{}' already contains a definition for '{}'",
                            class.name.name, name.name
                        ),
                        name.span,
                    );
                }
            }
            match member {
                Member::Constructor(ctor) => constructors.push(ctor),
                Member::Inject(inject) => {
                    self.fields.insert(inject.name.name.clone());
                }
                Member::Model(model) => {
                    self.fields.insert(model.name.name.clone());
                }
                Member::Field(field) => {
                    self.fields.insert(field.name.name.clone());
                }
                Member::Method(method) => self.methods.push((
                    method.name.name.clone(),
                    MethodSignature {
                        required: method.required_params(),
                        total: method.params.len(),
                    },
                )),
            }
        }
        if constructors.len() != 1 {
            self.error(
                format!(
                    "'{}' declares {} constructors; a page type requires exactly one",
                    class.name.name,
                    constructors.len()
                ),
                constructors.get(1).map_or(class.name.span, |ctor| ctor.span),
            );
        }
        if !self
            .methods
            .iter()
            .any(|(name, _)| name == execute_method_name)
        {
            self.error(
                format!("'{}' does not define '{execute_method_name}'", class.name.name),
                class.name.span,
            );
        }

        for member in &class.members {
            match member {
                Member::Constructor(ctor) => self.check_constructor(ctor, base.as_ref()),
                Member::Inject(inject) => self.check_type(&inject.ty),
                Member::Model(model) => self.check_type(&model.ty),
                Member::Field(field) => {
                    if let Some(ty) = &field.ty {
                        self.check_type(ty);
                    }
                    if let Some(value) = &field.value {
                        self.scopes.push(HashSet::new());
                        self.check_expr(value);
                        self.scopes.pop();
                    }
                }
                Member::Method(method) => self.check_method(method),
            }
        }
    }

    fn check_constructor(&mut self, ctor: &ConstructorDecl, base: Option<&PageBaseType>) {
        let mut scope = HashSet::new();
        for param in &ctor.params {
            self.check_type(&param.ty);
            scope.insert(param.name.name.clone());
        }
        if let Some(expected) = base.and_then(|b| b.single_constructor()) {
            if expected.len() != ctor.base_args.len() {
                self.error(
                    format!(
                        "The base constructor takes {} arguments but {} were supplied",
                        expected.len(),
                        ctor.base_args.len()
                    ),
                    ctor.span,
                );
            }
        }
        self.scopes.push(scope);
        for arg in &ctor.base_args {
            self.check_expr(arg);
        }
        self.scopes.pop();
    }

    fn check_method(&mut self, method: &MethodDecl) {
        let mut scope = HashSet::new();
        for param in &method.params {
            self.check_type(&param.ty);
            if let Some(default) = &param.default {
                if !is_literal(default) {
                    self.error(
                        format!(
                            "Default value for parameter '{}' must be a literal",
                            param.name.name
                        ),
                        default.span(),
                    );
                }
            }
            if !scope.insert(param.name.name.clone()) {
                self.error(
                    format!("Duplicate parameter '{}'", param.name.name),
                    param.name.span,
                );
            }
        }
        if let Some(returns) = &method.returns {
            self.check_type(returns);
        }
        self.scopes.push(scope);
        self.check_block(&method.body);
        self.scopes.pop();
    }

    fn check_type(&mut self, annotation: &TypeAnnotation) {
        let mut unknown = Vec::new();
        self.collect_unknown_types(&annotation.ty, &mut unknown);
        for name in unknown {
            self.error(
                format!("The type or namespace name '{name}' could not be found"),
                annotation.span,
            );
        }
    }

    fn collect_unknown_types(&self, ty: &TypeExpr, unknown: &mut Vec<String>) {
        let name = ty.base_name();
        if name != self.class_name && !self.references.is_known_type(name, &self.imports) {
            unknown.push(name.to_string());
        }
        for arg in ty.args() {
            self.collect_unknown_types(arg, unknown);
        }
    }

    fn check_block(&mut self, block: &Block) {
        self.scopes.push(HashSet::new());
        for statement in &block.statements {
            self.check_statement(statement);
        }
        self.scopes.pop();
    }

    fn declare(&mut self, name: &str) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string());
        }
    }

    fn is_local(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains(name))
    }

    fn check_statement(&mut self, statement: &Statement) {
        match statement {
            Statement::Let(stmt) => {
                if let Some(ty) = &stmt.ty {
                    self.check_type(ty);
                }
                if let Some(value) = &stmt.value {
                    self.check_expr(value);
                }
                self.declare(&stmt.name.name);
            }
            Statement::Assign(stmt) => {
                self.check_expr(&stmt.target);
                self.check_expr(&stmt.value);
            }
            Statement::Expr(stmt) => self.check_expr(&stmt.expr),
            Statement::Return(stmt) => {
                if let Some(value) = &stmt.value {
                    self.check_expr(value);
                }
            }
            Statement::If(stmt) => self.check_if(stmt),
            Statement::For(stmt) => {
                self.check_expr(&stmt.iterable);
                self.scopes.push(HashSet::from([stmt.binding.name.clone()]));
                self.loop_depth += 1;
                self.check_block(&stmt.body);
                self.loop_depth -= 1;
                self.scopes.pop();
            }
            Statement::While(stmt) => {
                self.check_expr(&stmt.condition);
                self.loop_depth += 1;
                self.check_block(&stmt.body);
                self.loop_depth -= 1;
            }
            Statement::Break(span) | Statement::Continue(span) => {
                if self.loop_depth == 0 {
                    self.error("No enclosing loop out of which to break or continue", *span);
                }
            }
            Statement::Block(block) => self.check_block(block),
        }
    }

    fn check_if(&mut self, stmt: &IfStmt) {
        self.check_expr(&stmt.condition);
        self.check_block(&stmt.then_branch);
        match &stmt.else_branch {
            Some(ElseBranch::Block(block)) => self.check_block(block),
            Some(ElseBranch::If(nested)) => self.check_if(nested),
            None => {}
        }
    }

    fn check_expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Identifier(ident) => {
                if !self.is_local(&ident.name) && !self.fields.contains(&ident.name) {
                    self.error(
                        format!("The name '{}' does not exist in the current context", ident.name),
                        ident.span,
                    );
                }
            }
            Expr::This(span) => {
                self.error("'this' can only be used to access members", *span);
            }
            Expr::Literal(_) => {}
            Expr::List(items, _) => {
                for item in items {
                    self.check_expr(item);
                }
            }
            Expr::Binary { left, right, .. } => {
                self.check_expr(left);
                self.check_expr(right);
            }
            Expr::Unary { expr, .. } | Expr::Await { expr, .. } => self.check_expr(expr),
            Expr::Call { callee, args, span } => {
                self.check_call(callee, args.len(), *span);
                for arg in args {
                    self.check_expr(arg);
                }
            }
            Expr::FieldAccess { base, field, .. } => {
                if matches!(**base, Expr::This(_)) {
                    if !self.fields.contains(&field.name) {
                        self.error(
                            format!(
                                "'{}' does not contain a definition for '{}'",
                                self.class_name, field.name
                            ),
                            field.span,
                        );
                    }
                } else {
                    self.check_expr(base);
                }
            }
            Expr::Index { base, index, .. } => {
                self.check_expr(base);
                self.check_expr(index);
            }
            Expr::Range { start, end, .. } => {
                self.check_expr(start);
                self.check_expr(end);
            }
        }
    }

    fn check_call(&mut self, callee: &Expr, arg_count: usize, span: Span) {
        let name = match callee {
            Expr::Identifier(ident) => ident,
            Expr::FieldAccess { base, field, .. } if matches!(**base, Expr::This(_)) => {
                if !self.methods.iter().any(|(name, _)| *name == field.name) {
                    self.error(
                        format!(
                            "'{}' does not contain a method '{}'",
                            self.class_name, field.name
                        ),
                        field.span,
                    );
                    return;
                }
                field
            }
            Expr::FieldAccess { base, .. } => {
                self.check_expr(base);
                return;
            }
            other => {
                self.check_expr(other);
                return;
            }
        };

        let arity = self
            .methods
            .iter()
            .find(|(method, _)| *method == name.name)
            .map(|(_, sig)| (sig.required, sig.total))
            .or_else(|| builtin_arity(&name.name));
        match arity {
            Some((min, max)) if arg_count < min || arg_count > max => {
                let expected = if min == max {
                    min.to_string()
                } else {
                    format!("{min} to {max}")
                };
                self.error(
                    format!(
                        "'{}' takes {expected} arguments but {arg_count} were supplied",
                        name.name
                    ),
                    span,
                );
            }
            Some(_) => {}
            None => self.error(
                format!("The name '{}' does not exist in the current context", name.name),
                name.span,
            ),
        }
    }
}

fn is_literal(expr: &Expr) -> bool {
    match expr {
        Expr::Literal(_) => true,
        Expr::Unary {
            op: UnaryOp::Neg,
            expr,
            ..
        } => matches!(**expr, Expr::Literal(Literal::Int(..) | Literal::Float(..))),
        _ => false,
    }
}

/// Value of a literal parameter default, as bound when no request value is present.
pub fn literal_value(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Literal(Literal::Int(v, _)) => Some(Value::Int(*v)),
        Expr::Literal(Literal::Float(v, _)) => Some(Value::Float(*v)),
        Expr::Literal(Literal::Bool(v, _)) => Some(Value::Bool(*v)),
        Expr::Literal(Literal::String(v, _)) => Some(Value::String(v.clone())),
        Expr::Literal(Literal::Null(_)) => Some(Value::Null),
        Expr::Unary {
            op: UnaryOp::Neg,
            expr,
            ..
        } => match literal_value(expr)? {
            Value::Int(v) => Some(Value::Int(-v)),
            Value::Float(v) => Some(Value::Float(-v)),
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::options::PagesOptions;
    use crate::template::{codegen::{generate, CodeGenContext}, lowering::lower, parser::parse_template};

    const PATH: &str = "/Pages/Widgets/Edit.razor";

    fn compile(text: &str) -> Result<CompiledPageType, CompilationError> {
        let document = Arc::new(SourceDocument::new(PATH, text));
        let lowered = lower(&parse_template(document.clone()));
        let options = PagesOptions::default();
        let context = CodeGenContext::for_page(PATH, &options);
        let references = ReferenceSet::runtime();
        let generated = generate(&document, &lowered.chunks, &context, &references)?;
        NativeCompiler.compile(&generated, &references, &options.execute_method_name, &[document])
    }

    #[test]
    fn compiles_page_with_handlers() {
        let page = compile(
            "@functions {\n    fn OnGet() { }\n    async fn OnPostAsync(id: int = 3) -> Task<Result> { return redirect(\"/\"); }\n}\n<p>@Html.encode(\"x\")</p>",
        )
        .expect("compiled");
        assert_eq!(page.name, "Pages.Widgets.Generated_Edit");
        assert_eq!(page.base_type.name, "Page");
        assert!(page.constructor().is_some());
        assert!(page.method_index("OnPostAsync").is_some());
        assert_eq!(page.injects().count(), 2);
    }

    #[test]
    fn unknown_names_map_back_to_the_template() {
        let err = compile("<p>\n  @missing</p>").expect_err("unknown name");
        let exception = err.exception().expect("compilation failure");
        assert_eq!(exception.failures.len(), 1);
        let failure = &exception.failures[0];
        assert_eq!(failure.source_file_path, PATH);
        assert_eq!(failure.source_file_content.as_deref(), Some("<p>\n  @missing</p>"));
        let location = failure.messages[0].location.as_ref().expect("location");
        assert_eq!((location.line, location.column), (2, 4));
        assert!(failure.messages[0].message.contains("'missing' does not exist"));
    }

    #[test]
    fn unknown_namespace_is_reported_against_generated_class() {
        let err = compile("@using Nowhere\n<p/>").expect_err("unknown namespace");
        let exception = err.exception().expect("compilation failure");
        assert!(exception
            .failures
            .iter()
            .any(|f| f.source_file_path == "Pages.Widgets.Generated_Edit"));
        assert!(err.to_string().contains("'Nowhere' could not be found"));
    }

    #[test]
    fn duplicate_members_and_bad_arity_are_errors() {
        let err = compile(
            "@functions {\n    fn A() { }\n    fn A() { }\n    fn B() { A(1); len(); }\n}",
        )
        .expect_err("errors");
        let text = err.to_string();
        assert!(text.contains("already contains a definition for 'A'"));
        assert!(text.contains("'len' takes 1 arguments but 0 were supplied"));
    }

    #[test]
    fn parameter_defaults_must_be_literals() {
        let err = compile("@functions {\n    fn OnGet(id: int = len(\"x\")) { }\n}").expect_err("default");
        assert!(err.to_string().contains("must be a literal"));
    }
}
