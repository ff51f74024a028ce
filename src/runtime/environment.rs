use crate::runtime::{error::RuntimeError, value::Value};
use std::collections::HashMap;

#[derive(Clone, Debug)]
struct Binding {
    value: Value,
    mutable: bool,
}

/// Lexical scopes of one method activation.
#[derive(Clone, Debug)]
pub struct Environment {
    scopes: Vec<HashMap<String, Binding>>,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment {
    pub fn new() -> Self {
        Self {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        self.scopes.pop();
        if self.scopes.is_empty() {
            self.scopes.push(HashMap::new());
        }
    }

    /// Declares in the innermost scope, shadowing outer bindings.
    pub fn declare(&mut self, name: &str, value: Value, mutable: bool) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), Binding { value, mutable });
        }
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
            .map(|binding| binding.value.clone())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.scopes.iter().any(|scope| scope.contains_key(name))
    }

    pub fn assign(&mut self, name: &str, value: Value) -> Result<(), RuntimeError> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(binding) = scope.get_mut(name) {
                if !binding.mutable {
                    return Err(RuntimeError::ImmutableBinding {
                        name: name.to_string(),
                    });
                }
                binding.value = value;
                return Ok(());
            }
        }
        Err(RuntimeError::UnknownSymbol {
            name: name.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inner_scopes_shadow_and_release() {
        let mut env = Environment::new();
        env.declare("x", Value::Int(1), true);
        env.push_scope();
        env.declare("x", Value::Int(2), false);
        assert_eq!(env.get("x").map(|v| v.to_string()), Some("2".into()));
        assert!(matches!(
            env.assign("x", Value::Int(3)),
            Err(RuntimeError::ImmutableBinding { .. })
        ));
        env.pop_scope();
        env.assign("x", Value::Int(4)).expect("mutable outer");
        assert_eq!(env.get("x").map(|v| v.to_string()), Some("4".into()));
        assert!(env.assign("missing", Value::Null).is_err());
    }
}
