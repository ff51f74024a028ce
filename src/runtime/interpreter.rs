use crate::language::{
    ast::*,
    types::Mutability,
};
use crate::runtime::{
    builtins::{call_pure, call_value_method, render_value},
    environment::Environment,
    error::{RuntimeError, RuntimeResult},
    value::{RangeValue, Value},
};
use std::collections::BTreeMap;

pub const MAX_CALL_DEPTH: usize = 128;

/// Per-request services the interpreter calls out to: output, request data,
/// model state and tag helpers.
pub trait ScriptHost {
    fn write(&mut self, text: &str);

    /// Host builtin `name`; `None` when the host does not provide it.
    fn call_host(&mut self, name: &str, args: Vec<Value>) -> Option<RuntimeResult<Value>>;

    fn is_aborted(&self) -> bool {
        false
    }
}

enum FlowSignal {
    Break,
    Continue,
    Return(Value),
}

/// Executes members of one page class against an instance's fields.
pub struct Interpreter<'a> {
    class: &'a ClassDecl,
    fields: &'a mut BTreeMap<String, Value>,
    host: &'a mut dyn ScriptHost,
    env: Environment,
    depth: usize,
}

impl<'a> Interpreter<'a> {
    pub fn new(
        class: &'a ClassDecl,
        fields: &'a mut BTreeMap<String, Value>,
        host: &'a mut dyn ScriptHost,
    ) -> Self {
        Self {
            class,
            fields,
            host,
            env: Environment::new(),
            depth: 0,
        }
    }

    fn find_method(&self, name: &str) -> Option<&'a MethodDecl> {
        self.class.members.iter().find_map(|member| match member {
            Member::Method(method) if method.name.name == name => Some(method),
            _ => None,
        })
    }

    /// Evaluates field initialisers in declaration order.
    pub fn initialize_fields(&mut self) -> RuntimeResult<()> {
        let class = self.class;
        for member in &class.members {
            if let Member::Field(field) = member {
                let value = match &field.value {
                    Some(expr) => self.eval_expression(expr)?,
                    None => Value::Null,
                };
                self.fields.insert(field.name.name.clone(), value);
            }
        }
        Ok(())
    }

    pub fn call_method(&mut self, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        let method = self
            .find_method(name)
            .ok_or_else(|| RuntimeError::UnknownSymbol {
                name: name.to_string(),
            })?;
        self.invoke(method, args)
    }

    /// Calls the method at `index` in the class's member list.
    pub fn call_member(&mut self, index: usize, args: Vec<Value>) -> RuntimeResult<Value> {
        let class = self.class;
        match class.members.get(index) {
            Some(Member::Method(method)) => self.invoke(method, args),
            _ => Err(RuntimeError::UnknownSymbol {
                name: format!("member #{index}"),
            }),
        }
    }

    pub fn set_field(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }

    /// Evaluates `exprs` with `bindings` as the only locals.
    pub fn evaluate_with(
        &mut self,
        bindings: Vec<(String, Value)>,
        exprs: &[Expr],
    ) -> RuntimeResult<Vec<Value>> {
        let caller_env = std::mem::take(&mut self.env);
        for (name, value) in bindings {
            self.env.declare(&name, value, false);
        }
        let result = exprs.iter().map(|expr| self.eval_expression(expr)).collect();
        self.env = caller_env;
        result
    }

    fn invoke(&mut self, method: &'a MethodDecl, args: Vec<Value>) -> RuntimeResult<Value> {
        if args.len() > method.params.len() || args.len() < method.required_params() {
            return Err(RuntimeError::ArityMismatch {
                name: method.name.name.clone(),
                expected: method.params.len(),
                received: args.len(),
            });
        }
        if self.depth >= MAX_CALL_DEPTH {
            return Err(RuntimeError::StackOverflow {
                method: method.name.name.clone(),
                limit: MAX_CALL_DEPTH,
            });
        }
        self.check_aborted()?;

        let caller_env = std::mem::take(&mut self.env);
        self.depth += 1;
        let result = self.run_method(method, args);
        self.depth -= 1;
        self.env = caller_env;

        let value = result?;
        Ok(if method.is_async {
            Value::Task(Box::new(value))
        } else {
            value
        })
    }

    fn run_method(&mut self, method: &'a MethodDecl, args: Vec<Value>) -> RuntimeResult<Value> {
        let mut args = args.into_iter();
        for param in &method.params {
            let value = match (args.next(), &param.default) {
                (Some(value), _) => value,
                (None, Some(default)) => self.eval_expression(default)?,
                (None, None) => Value::Null,
            };
            self.env.declare(&param.name.name, value, true);
        }
        match self.eval_block(&method.body)? {
            Some(FlowSignal::Return(value)) => Ok(value),
            _ => Ok(Value::Null),
        }
    }

    fn check_aborted(&self) -> RuntimeResult<()> {
        if self.host.is_aborted() {
            Err(RuntimeError::Aborted)
        } else {
            Ok(())
        }
    }

    fn eval_block(&mut self, block: &Block) -> RuntimeResult<Option<FlowSignal>> {
        self.env.push_scope();
        let mut flow = None;
        for statement in &block.statements {
            match self.eval_statement(statement) {
                Ok(None) => {}
                Ok(signal @ Some(_)) => {
                    flow = signal;
                    break;
                }
                Err(error) => {
                    self.env.pop_scope();
                    return Err(error);
                }
            }
        }
        self.env.pop_scope();
        Ok(flow)
    }

    fn eval_statement(&mut self, statement: &Statement) -> RuntimeResult<Option<FlowSignal>> {
        match statement {
            Statement::Let(stmt) => {
                let value = match &stmt.value {
                    Some(expr) => self.eval_expression(expr)?,
                    None => Value::Null,
                };
                self.env.declare(
                    &stmt.name.name,
                    value,
                    stmt.mutability == Mutability::Mutable,
                );
                Ok(None)
            }
            Statement::Assign(stmt) => {
                let value = self.eval_expression(&stmt.value)?;
                let value = match stmt.op {
                    AssignOp::Assign => value,
                    AssignOp::AddAssign => {
                        let current = self.eval_expression(&stmt.target)?;
                        self.eval_binary(BinaryOp::Add, current, value)?
                    }
                    AssignOp::SubAssign => {
                        let current = self.eval_expression(&stmt.target)?;
                        self.eval_binary(BinaryOp::Sub, current, value)?
                    }
                };
                self.assign(&stmt.target, value)?;
                Ok(None)
            }
            Statement::Expr(stmt) => {
                self.eval_expression(&stmt.expr)?;
                Ok(None)
            }
            Statement::Return(stmt) => {
                let value = match &stmt.value {
                    Some(expr) => self.eval_expression(expr)?,
                    None => Value::Null,
                };
                Ok(Some(FlowSignal::Return(value)))
            }
            Statement::If(stmt) => self.eval_if(stmt),
            Statement::For(stmt) => {
                let iterable = self.eval_expression(&stmt.iterable)?;
                let items = self.iterate(iterable)?;
                for item in items {
                    self.check_aborted()?;
                    self.env.push_scope();
                    self.env.declare(&stmt.binding.name, item, false);
                    let result = self.eval_block(&stmt.body);
                    self.env.pop_scope();
                    match result? {
                        None | Some(FlowSignal::Continue) => {}
                        Some(FlowSignal::Break) => break,
                        Some(flow @ FlowSignal::Return(_)) => return Ok(Some(flow)),
                    }
                }
                Ok(None)
            }
            Statement::While(stmt) => {
                loop {
                    self.check_aborted()?;
                    if !self.eval_expression(&stmt.condition)?.as_bool() {
                        break;
                    }
                    match self.eval_block(&stmt.body)? {
                        None | Some(FlowSignal::Continue) => {}
                        Some(FlowSignal::Break) => break,
                        Some(flow @ FlowSignal::Return(_)) => return Ok(Some(flow)),
                    }
                }
                Ok(None)
            }
            Statement::Break(_) => Ok(Some(FlowSignal::Break)),
            Statement::Continue(_) => Ok(Some(FlowSignal::Continue)),
            Statement::Block(block) => self.eval_block(block),
        }
    }

    fn eval_if(&mut self, stmt: &IfStmt) -> RuntimeResult<Option<FlowSignal>> {
        if self.eval_expression(&stmt.condition)?.as_bool() {
            return self.eval_block(&stmt.then_branch);
        }
        match &stmt.else_branch {
            Some(ElseBranch::Block(block)) => self.eval_block(block),
            Some(ElseBranch::If(nested)) => self.eval_if(nested),
            None => Ok(None),
        }
    }

    fn iterate(&self, value: Value) -> RuntimeResult<Vec<Value>> {
        match value {
            Value::List(list) => Ok(list.snapshot()),
            Value::Range(range) => Ok(range.values().map(Value::Int).collect()),
            Value::Map(map) => Ok(map.keys().into_iter().map(Value::String).collect()),
            Value::String(text) => Ok(text.chars().map(|c| Value::String(c.to_string())).collect()),
            Value::Null => Ok(Vec::new()),
            Value::Task(inner) => self.iterate(*inner),
            other => Err(RuntimeError::TypeMismatch {
                message: format!("cannot iterate over {}", other.type_name()),
            }),
        }
    }

    fn assign(&mut self, target: &Expr, value: Value) -> RuntimeResult<()> {
        match target {
            Expr::Identifier(ident) => {
                if self.env.contains(&ident.name) {
                    self.env.assign(&ident.name, value)
                } else if self.fields.contains_key(&ident.name) {
                    self.fields.insert(ident.name.clone(), value);
                    Ok(())
                } else {
                    Err(RuntimeError::UnknownSymbol {
                        name: ident.name.clone(),
                    })
                }
            }
            Expr::FieldAccess { base, field, .. } if matches!(**base, Expr::This(_)) => {
                self.fields.insert(field.name.clone(), value);
                Ok(())
            }
            Expr::FieldAccess { base, field, .. } => match self.eval_expression(base)? {
                Value::Map(map) => {
                    map.insert(field.name.clone(), value);
                    Ok(())
                }
                other => Err(RuntimeError::TypeMismatch {
                    message: format!("cannot set `{}` on {}", field.name, other.type_name()),
                }),
            },
            Expr::Index { base, index, .. } => {
                let container = self.eval_expression(base)?;
                let index = self.eval_expression(index)?;
                match (container, index) {
                    (Value::List(list), Value::Int(i)) => {
                        let len = list.len();
                        if i < 0 || !list.set(i as usize, value) {
                            return Err(RuntimeError::IndexOutOfRange { index: i, len });
                        }
                        Ok(())
                    }
                    (Value::Map(map), key) => {
                        map.insert(key.to_string(), value);
                        Ok(())
                    }
                    (other, _) => Err(RuntimeError::TypeMismatch {
                        message: format!("cannot index into {}", other.type_name()),
                    }),
                }
            }
            _ => Err(RuntimeError::Unsupported {
                message: "invalid assignment target".into(),
            }),
        }
    }

    fn eval_expression(&mut self, expr: &Expr) -> RuntimeResult<Value> {
        match expr {
            Expr::Identifier(ident) => self
                .env
                .get(&ident.name)
                .or_else(|| self.fields.get(&ident.name).cloned())
                .ok_or_else(|| RuntimeError::UnknownSymbol {
                    name: ident.name.clone(),
                }),
            Expr::This(_) => Err(RuntimeError::Unsupported {
                message: "`this` can only be used for member access".into(),
            }),
            Expr::Literal(literal) => Ok(match literal {
                Literal::Int(v, _) => Value::Int(*v),
                Literal::Float(v, _) => Value::Float(*v),
                Literal::Bool(v, _) => Value::Bool(*v),
                Literal::String(v, _) => Value::String(v.clone()),
                Literal::Null(_) => Value::Null,
            }),
            Expr::List(items, _) => {
                let values = items
                    .iter()
                    .map(|item| self.eval_expression(item))
                    .collect::<RuntimeResult<Vec<_>>>()?;
                Ok(Value::list(values))
            }
            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
                ..
            } => Ok(Value::Bool(
                self.eval_expression(left)?.as_bool() && self.eval_expression(right)?.as_bool(),
            )),
            Expr::Binary {
                op: BinaryOp::Or,
                left,
                right,
                ..
            } => Ok(Value::Bool(
                self.eval_expression(left)?.as_bool() || self.eval_expression(right)?.as_bool(),
            )),
            Expr::Binary {
                op, left, right, ..
            } => {
                let left = self.eval_expression(left)?;
                let right = self.eval_expression(right)?;
                self.eval_binary(*op, left, right)
            }
            Expr::Unary { op, expr, .. } => {
                let value = self.eval_expression(expr)?;
                match (op, value) {
                    (UnaryOp::Not, value) => Ok(Value::Bool(!value.as_bool())),
                    (UnaryOp::Neg, Value::Int(v)) => Ok(Value::Int(v.wrapping_neg())),
                    (UnaryOp::Neg, Value::Float(v)) => Ok(Value::Float(-v)),
                    (UnaryOp::Neg, other) => Err(RuntimeError::TypeMismatch {
                        message: format!("cannot negate {}", other.type_name()),
                    }),
                }
            }
            Expr::Await { expr, .. } => match self.eval_expression(expr)? {
                Value::Task(inner) => Ok(*inner),
                other => Ok(other),
            },
            Expr::Call { callee, args, .. } => self.eval_call(callee, args),
            Expr::FieldAccess { base, field, .. } => {
                if matches!(**base, Expr::This(_)) {
                    return self.fields.get(&field.name).cloned().ok_or_else(|| {
                        RuntimeError::UnknownSymbol {
                            name: field.name.clone(),
                        }
                    });
                }
                match self.eval_expression(base)? {
                    Value::Map(map) => Ok(map.get(&field.name).unwrap_or(Value::Null)),
                    Value::Null => Err(RuntimeError::TypeMismatch {
                        message: format!("cannot read `{}` of null", field.name),
                    }),
                    other => other.field(&field.name).ok_or_else(|| RuntimeError::Unsupported {
                        message: format!("{} has no field `{}`", other.type_name(), field.name),
                    }),
                }
            }
            Expr::Index { base, index, .. } => {
                let container = self.eval_expression(base)?;
                let index = self.eval_expression(index)?;
                match (container, index) {
                    (Value::List(list), Value::Int(i)) => {
                        let len = list.len();
                        usize::try_from(i)
                            .ok()
                            .and_then(|idx| list.get(idx))
                            .ok_or(RuntimeError::IndexOutOfRange { index: i, len })
                    }
                    (Value::Map(map), key) => Ok(map.get(&key.to_string()).unwrap_or(Value::Null)),
                    (other, _) => Err(RuntimeError::TypeMismatch {
                        message: format!("cannot index into {}", other.type_name()),
                    }),
                }
            }
            Expr::Range {
                start,
                end,
                inclusive,
                ..
            } => {
                let start = self.eval_expression(start)?;
                let end = self.eval_expression(end)?;
                match (start, end) {
                    (Value::Int(start), Value::Int(end)) => Ok(Value::Range(RangeValue {
                        start,
                        end,
                        inclusive: *inclusive,
                    })),
                    _ => Err(RuntimeError::TypeMismatch {
                        message: "range bounds must be integers".into(),
                    }),
                }
            }
        }
    }

    fn eval_arguments(&mut self, args: &[Expr]) -> RuntimeResult<Vec<Value>> {
        args.iter().map(|expr| self.eval_expression(expr)).collect()
    }

    fn eval_call(&mut self, callee: &Expr, args: &[Expr]) -> RuntimeResult<Value> {
        match callee {
            Expr::Identifier(ident) => {
                let args = self.eval_arguments(args)?;
                self.call_function(&ident.name, args)
            }
            Expr::FieldAccess { base, field, .. } if matches!(**base, Expr::This(_)) => {
                let args = self.eval_arguments(args)?;
                self.call_method(&field.name, args)
            }
            Expr::FieldAccess { base, field, .. } => {
                let receiver = self.eval_expression(base)?;
                let args = self.eval_arguments(args)?;
                call_value_method(&receiver, &field.name, &args)
            }
            other => Err(RuntimeError::Unsupported {
                message: format!("expression at {}..{} is not callable", other.span().start, other.span().end),
            }),
        }
    }

    fn call_function(&mut self, name: &str, args: Vec<Value>) -> RuntimeResult<Value> {
        if let Some(method) = self.find_method(name) {
            return self.invoke(method, args);
        }
        match (name, args.as_slice()) {
            ("write", [value]) => {
                self.host.write(&render_value(value));
                return Ok(Value::Null);
            }
            ("write_literal", [value]) => {
                self.host.write(&value.to_string());
                return Ok(Value::Null);
            }
            _ => {}
        }
        if let Some(result) = call_pure(name, &args) {
            return result;
        }
        self.host
            .call_host(name, args)
            .unwrap_or_else(|| {
                Err(RuntimeError::UnknownSymbol {
                    name: name.to_string(),
                })
            })
    }

    fn eval_binary(&self, op: BinaryOp, left: Value, right: Value) -> RuntimeResult<Value> {
        use BinaryOp::*;
        match op {
            Add => match (&left, &right) {
                (Value::String(_) | Value::Html(_), _) | (_, Value::String(_) | Value::Html(_)) => {
                    Ok(Value::String(format!("{left}{right}")))
                }
                (Value::List(a), Value::List(b)) => {
                    let mut items = a.snapshot();
                    items.extend(b.snapshot());
                    Ok(Value::list(items))
                }
                _ => self.eval_numeric(op, left, right),
            },
            Sub | Mul | Div | Rem => self.eval_numeric(op, left, right),
            And => Ok(Value::Bool(left.as_bool() && right.as_bool())),
            Or => Ok(Value::Bool(left.as_bool() || right.as_bool())),
            Eq => Ok(Value::Bool(left.loose_eq(&right))),
            NotEq => Ok(Value::Bool(!left.loose_eq(&right))),
            Lt => self.eval_compare(left, right, |o| o.is_lt()),
            LtEq => self.eval_compare(left, right, |o| o.is_le()),
            Gt => self.eval_compare(left, right, |o| o.is_gt()),
            GtEq => self.eval_compare(left, right, |o| o.is_ge()),
        }
    }

    fn eval_numeric(&self, op: BinaryOp, left: Value, right: Value) -> RuntimeResult<Value> {
        match (left, right) {
            (Value::Int(a), Value::Int(b)) => {
                let result = match op {
                    BinaryOp::Add => a.checked_add(b),
                    BinaryOp::Sub => a.checked_sub(b),
                    BinaryOp::Mul => a.checked_mul(b),
                    BinaryOp::Div | BinaryOp::Rem if b == 0 => {
                        return Err(RuntimeError::DivisionByZero)
                    }
                    BinaryOp::Div => a.checked_div(b),
                    BinaryOp::Rem => a.checked_rem(b),
                    _ => None,
                };
                result.map(Value::Int).ok_or_else(|| RuntimeError::TypeMismatch {
                    message: "integer overflow".into(),
                })
            }
            (Value::Float(a), Value::Float(b)) => Ok(Value::Float(match op {
                BinaryOp::Add => a + b,
                BinaryOp::Sub => a - b,
                BinaryOp::Mul => a * b,
                BinaryOp::Div => a / b,
                _ => a % b,
            })),
            (Value::Int(a), Value::Float(b)) => {
                self.eval_numeric(op, Value::Float(a as f64), Value::Float(b))
            }
            (Value::Float(a), Value::Int(b)) => {
                self.eval_numeric(op, Value::Float(a), Value::Float(b as f64))
            }
            (left, right) => Err(RuntimeError::TypeMismatch {
                message: format!(
                    "numeric operation expects numbers, found {} and {}",
                    left.type_name(),
                    right.type_name()
                ),
            }),
        }
    }

    fn eval_compare<F>(&self, left: Value, right: Value, cmp: F) -> RuntimeResult<Value>
    where
        F: Fn(std::cmp::Ordering) -> bool,
    {
        let ordering = match (&left, &right) {
            (Value::Int(a), Value::Int(b)) => Some(a.cmp(b)),
            (Value::Int(a), Value::Float(b)) => (*a as f64).partial_cmp(b),
            (Value::Float(a), Value::Int(b)) => a.partial_cmp(&(*b as f64)),
            (Value::Float(a), Value::Float(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => {
                return Err(RuntimeError::TypeMismatch {
                    message: format!(
                        "cannot compare {} with {}",
                        left.type_name(),
                        right.type_name()
                    ),
                })
            }
        };
        Ok(Value::Bool(ordering.is_some_and(cmp)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::language::parser::parse_unit;

    #[derive(Default)]
    struct Recorder {
        output: String,
        aborted: bool,
    }

    impl ScriptHost for Recorder {
        fn write(&mut self, text: &str) {
            self.output.push_str(text);
        }

        fn call_host(&mut self, name: &str, _args: Vec<Value>) -> Option<RuntimeResult<Value>> {
            (name == "request_method").then(|| Ok(Value::string("GET")))
        }

        fn is_aborted(&self) -> bool {
            self.aborted
        }
    }

    fn class(source: &str) -> ClassDecl {
        let unit = parse_unit(source).expect("parse");
        unit.classes.into_iter().next().expect("class")
    }

    fn run(source: &str, method: &str) -> (RuntimeResult<Value>, String) {
        let class = class(source);
        let mut fields = BTreeMap::new();
        let mut host = Recorder::default();
        let result = {
            let mut interpreter = Interpreter::new(&class, &mut fields, &mut host);
            interpreter
                .initialize_fields()
                .and_then(|_| interpreter.call_method(method, Vec::new()))
        };
        (result, host.output)
    }

    #[test]
    fn renders_loops_and_conditionals() {
        let (result, output) = run(
            r#"class P : Page {
                private let items: list = ["a", "<b>"];
                fn Render() {
                    for item in items {
                        if item == "a" { write_literal("<li>"); } else { write("*"); }
                        write(item);
                    }
                    let mut total = 0;
                    for i in 1..=3 { total += i; }
                    write(total);
                }
            }"#,
            "Render",
        );
        result.expect("render");
        assert_eq!(output, "<li>a*&lt;b&gt;6");
    }

    #[test]
    fn async_methods_return_tasks_and_await_unwraps() {
        let (result, _) = run(
            r#"class P : Page {
                async fn Load() -> Task<Result> { return redirect("/x"); }
                async fn OnGet() -> Task<Result> { let r = await Load(); return r; }
            }"#,
            "OnGet",
        );
        let Value::Task(inner) = result.expect("call") else {
            panic!("expected task");
        };
        assert!(matches!(*inner, Value::Result(_)));
    }

    #[test]
    fn recursion_is_bounded() {
        let (result, _) = run("class P : Page { fn Loop() { Loop(); } }", "Loop");
        assert!(matches!(result, Err(RuntimeError::StackOverflow { .. })));
    }

    #[test]
    fn host_builtins_and_value_methods() {
        let (result, output) = run(
            r#"class P : Page {
                fn Render() {
                    let names = ["ada", "bob"];
                    names.push(request_method().lower());
                    write(names.join(","));
                    write(raw("<br>"));
                }
            }"#,
            "Render",
        );
        result.expect("render");
        assert_eq!(output, "ada,bob,get<br>");
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let (result, _) = run("class P : Page { fn F() -> int { return 1 / 0; } }", "F");
        assert_eq!(result.expect_err("div"), RuntimeError::DivisionByZero);
    }
}
