//! Type and namespace metadata visible to generated page units.
//!
//! Page base types are plain declarations: name, namespace and the list of
//! public constructors. The code generator mirrors the single constructor of
//! the chosen base type, and the compiler resolves every type annotation in
//! the unit against the namespaces imported by it.

use crate::language::types::BUILTIN_TYPES;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};

/// Namespace holding the page runtime surface (`Page`, `HtmlHelper`, `Logger`).
pub const RUNTIME_NAMESPACE: &str = "Runtime";
/// Namespace holding `Task`; always imported by generated units.
pub const TASKS_NAMESPACE: &str = "Tasks";

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ReferenceDeclarations {
    pub namespaces: Vec<String>,
    pub types: Vec<TypeDeclaration>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TypeDeclaration {
    pub name: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    /// Whether generated pages may inherit from this type.
    #[serde(default)]
    pub page: bool,
    #[serde(default)]
    pub constructors: Vec<ConstructorDeclaration>,
}

fn default_namespace() -> String {
    RUNTIME_NAMESPACE.to_string()
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ConstructorDeclaration {
    pub parameters: Vec<ParameterDeclaration>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ParameterDeclaration {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

impl ParameterDeclaration {
    pub fn new(name: &str, type_name: &str) -> Self {
        Self {
            name: name.to_string(),
            type_name: type_name.to_string(),
        }
    }
}

/// A page base type with its public constructors.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageBaseType {
    pub name: String,
    pub namespace: String,
    pub constructors: Vec<Vec<ParameterDeclaration>>,
}

impl PageBaseType {
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// The constructor parameters, when exactly one constructor is declared.
    pub fn single_constructor(&self) -> Option<&[ParameterDeclaration]> {
        match self.constructors.as_slice() {
            [only] => Some(only),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReferencedType {
    pub name: String,
    pub namespace: String,
}

/// Everything a generated unit can name.
#[derive(Clone, Debug, Default)]
pub struct ReferenceSet {
    namespaces: BTreeSet<String>,
    /// Keyed by simple name; one simple name may live in several namespaces.
    types: BTreeMap<String, Vec<ReferencedType>>,
    base_types: BTreeMap<String, PageBaseType>,
}

impl ReferenceSet {
    /// The runtime namespace with `Page` (one parameterless constructor),
    /// `HtmlHelper` and `Logger`, and `Tasks.Task`.
    pub fn runtime() -> Self {
        let mut set = Self::default();
        set.add_namespace(TASKS_NAMESPACE);
        set.add_type(TASKS_NAMESPACE, "Task");
        set.add_namespace(RUNTIME_NAMESPACE);
        for name in ["HtmlHelper", "Logger", "PageContext"] {
            set.add_type(RUNTIME_NAMESPACE, name);
        }
        set.add_base_type(PageBaseType {
            name: "Page".into(),
            namespace: RUNTIME_NAMESPACE.into(),
            constructors: vec![Vec::new()],
        });
        set
    }

    pub fn with_declarations(mut self, declarations: &ReferenceDeclarations) -> Self {
        for namespace in &declarations.namespaces {
            self.add_namespace(namespace);
        }
        for decl in &declarations.types {
            self.add_namespace(&decl.namespace);
            if decl.page {
                self.add_base_type(PageBaseType {
                    name: decl.name.clone(),
                    namespace: decl.namespace.clone(),
                    constructors: decl
                        .constructors
                        .iter()
                        .map(|ctor| ctor.parameters.clone())
                        .collect(),
                });
            } else {
                self.add_type(&decl.namespace, &decl.name);
            }
        }
        self
    }

    pub fn add_namespace(&mut self, namespace: &str) {
        self.namespaces.insert(namespace.to_string());
    }

    pub fn add_type(&mut self, namespace: &str, name: &str) {
        let entry = self.types.entry(name.to_string()).or_default();
        if !entry.iter().any(|t| t.namespace == namespace) {
            entry.push(ReferencedType {
                name: name.to_string(),
                namespace: namespace.to_string(),
            });
        }
    }

    pub fn add_base_type(&mut self, base: PageBaseType) {
        self.add_namespace(&base.namespace);
        self.add_type(&base.namespace, &base.name);
        self.base_types.insert(base.qualified_name(), base);
    }

    pub fn has_namespace(&self, namespace: &str) -> bool {
        self.namespaces.contains(namespace)
    }

    /// Resolves a possibly qualified type name against `imports`.
    pub fn resolve_type(&self, name: &str, imports: &[String]) -> Option<&ReferencedType> {
        if let Some((namespace, simple)) = name.rsplit_once('.') {
            return self
                .types
                .get(simple)?
                .iter()
                .find(|t| t.namespace == namespace);
        }
        self.types
            .get(name)?
            .iter()
            .find(|t| imports.iter().any(|import| *import == t.namespace))
    }

    pub fn is_known_type(&self, name: &str, imports: &[String]) -> bool {
        BUILTIN_TYPES.contains(&name) || self.resolve_type(name, imports).is_some()
    }

    pub fn resolve_base_type(&self, name: &str, imports: &[String]) -> Option<&PageBaseType> {
        let resolved = self.resolve_type(name, imports)?;
        self.base_types
            .get(&format!("{}.{}", resolved.namespace, resolved.name))
    }
}

/// Supplies the reference set new compilations are checked against.
pub trait ReferenceProvider: Send + Sync {
    fn references(&self) -> ReferenceSet;
}

/// Runtime references plus declarations loaded from configuration.
#[derive(Clone, Debug, Default)]
pub struct DeclaredReferences {
    declarations: ReferenceDeclarations,
}

impl DeclaredReferences {
    pub fn new(declarations: ReferenceDeclarations) -> Self {
        Self { declarations }
    }
}

impl ReferenceProvider for DeclaredReferences {
    fn references(&self) -> ReferenceSet {
        ReferenceSet::runtime().with_declarations(&self.declarations)
    }
}
