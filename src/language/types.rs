use crate::language::span::Span;
use std::fmt;

/// Types every page script can name without an import.
pub const BUILTIN_TYPES: &[&str] = &[
    "string", "int", "float", "bool", "list", "map", "any", "void", "Result",
];

#[derive(Clone, Debug, PartialEq)]
pub enum TypeExpr {
    Named(String, Vec<TypeExpr>),
    Nullable(Box<TypeExpr>),
}

impl TypeExpr {
    pub fn named(name: impl Into<String>) -> Self {
        TypeExpr::Named(name.into(), Vec::new())
    }

    pub fn generic(name: impl Into<String>, args: Vec<TypeExpr>) -> Self {
        TypeExpr::Named(name.into(), args)
    }

    /// Name without generic arguments or nullability.
    pub fn base_name(&self) -> &str {
        match self {
            TypeExpr::Named(name, _) => name,
            TypeExpr::Nullable(inner) => inner.base_name(),
        }
    }

    pub fn args(&self) -> &[TypeExpr] {
        match self {
            TypeExpr::Named(_, args) => args,
            TypeExpr::Nullable(inner) => inner.args(),
        }
    }

    pub fn is_nullable(&self) -> bool {
        matches!(self, TypeExpr::Nullable(_))
    }

    pub fn is_builtin(&self) -> bool {
        BUILTIN_TYPES.contains(&self.base_name())
    }

    pub fn canonical_name(&self) -> String {
        match self {
            TypeExpr::Named(name, args) => {
                if args.is_empty() {
                    name.clone()
                } else {
                    let rendered: Vec<String> = args.iter().map(|ty| ty.canonical_name()).collect();
                    format!("{}<{}>", name, rendered.join(", "))
                }
            }
            TypeExpr::Nullable(inner) => format!("{}?", inner.canonical_name()),
        }
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.canonical_name())
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct TypeAnnotation {
    pub ty: TypeExpr,
    pub span: Span,
}

impl TypeAnnotation {
    pub fn new(ty: TypeExpr, span: Span) -> Self {
        Self { ty, span }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Mutability {
    Immutable,
    Mutable,
}

impl Mutability {
    pub fn is_mutable(self) -> bool {
        matches!(self, Mutability::Mutable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_name_renders_generics_and_nullability() {
        let ty = TypeExpr::Nullable(Box::new(TypeExpr::generic(
            "Task",
            vec![TypeExpr::named("Result")],
        )));
        assert_eq!(ty.canonical_name(), "Task<Result>?");
        assert_eq!(ty.base_name(), "Task");
        assert_eq!(ty.args().len(), 1);
    }
}
