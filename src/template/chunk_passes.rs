use crate::compilation::failure::DiagnosticMessage;
use crate::template::{
    chunks::{Chunk, ChunkNode, ChunkTree, PropertyValue},
    codegen::writer::string_literal,
};
use log::debug;
use std::collections::HashMap;

/// A pure chunk-tree rewrite. Passes run in ascending `order`.
pub trait ChunkTreePass: Send + Sync {
    fn name(&self) -> &'static str;

    fn order(&self) -> i32;

    fn execute(&self, tree: ChunkTree, diagnostics: &mut Vec<DiagnosticMessage>) -> ChunkTree;
}

/// Converts literal attribute values of bound tag helper properties into
/// page script of the property's declared type.
pub struct TagHelperBindingPass;

impl TagHelperBindingPass {
    fn bind(&self, nodes: Vec<ChunkNode>, diagnostics: &mut Vec<DiagnosticMessage>) -> Vec<ChunkNode> {
        nodes
            .into_iter()
            .map(|mut node| {
                let location = node.origin.clone();
                let length = node.length;
                match &mut node.chunk {
                    Chunk::TagHelper { children, .. } => {
                        *children = self.bind(std::mem::take(children), diagnostics);
                    }
                    Chunk::TagHelperProperty {
                        property_name,
                        property_type,
                        attribute_name,
                        value,
                        ..
                    } => {
                        if let PropertyValue::Literal(text) = value {
                            match convert_literal(text, property_type) {
                                Ok(code) => *value = PropertyValue::Code(code),
                                Err(reason) => diagnostics.push(DiagnosticMessage::error(
                                    format!(
                                        "Cannot bind attribute '{attribute_name}' to property '{property_name}': {reason}"
                                    ),
                                    Some(location),
                                    length,
                                )),
                            }
                        }
                    }
                    _ => {}
                }
                node
            })
            .collect()
    }
}

fn convert_literal(text: &str, property_type: &str) -> Result<String, String> {
    let trimmed = text.trim();
    match property_type.trim_end_matches('?') {
        "string" | "any" => Ok(string_literal(text)),
        "bool" => match trimmed.to_ascii_lowercase().as_str() {
            "" | "true" => Ok("true".into()),
            "false" => Ok("false".into()),
            _ => Err(format!("'{text}' is not a bool")),
        },
        "int" => trimmed
            .parse::<i64>()
            .map(|n| n.to_string())
            .map_err(|_| format!("'{text}' is not an int")),
        "float" => trimmed
            .parse::<f64>()
            .ok()
            .filter(|n| n.is_finite())
            .map(|n| format!("{n:?}"))
            .ok_or_else(|| format!("'{text}' is not a float")),
        other => Err(format!(
            "literal text cannot be converted to '{other}'; use an @expression"
        )),
    }
}

impl ChunkTreePass for TagHelperBindingPass {
    fn name(&self) -> &'static str {
        "tag-helper-binding"
    }

    fn order(&self) -> i32 {
        0
    }

    fn execute(&self, mut tree: ChunkTree, diagnostics: &mut Vec<DiagnosticMessage>) -> ChunkTree {
        tree.children = self.bind(std::mem::take(&mut tree.children), diagnostics);
        tree
    }
}

/// `@inherits`, `@model` and same-named `@inject`s may be declared several
/// times across imports and the page; the last declaration wins.
pub struct DirectiveNormalizationPass;

#[derive(Clone, PartialEq, Eq, Hash)]
enum DirectiveSlot {
    BaseType,
    ModelType,
    Inject(String),
}

impl DirectiveSlot {
    fn of(chunk: &Chunk) -> Option<Self> {
        match chunk {
            Chunk::SetBaseType { .. } => Some(DirectiveSlot::BaseType),
            Chunk::SetModelType { .. } => Some(DirectiveSlot::ModelType),
            Chunk::Inject { member_name, .. } => Some(DirectiveSlot::Inject(member_name.clone())),
            _ => None,
        }
    }

    fn describe(&self) -> String {
        match self {
            DirectiveSlot::BaseType => "'@inherits' directive".into(),
            DirectiveSlot::ModelType => "'@model' directive".into(),
            DirectiveSlot::Inject(name) => format!("'@inject' of '{name}'"),
        }
    }
}

impl ChunkTreePass for DirectiveNormalizationPass {
    fn name(&self) -> &'static str {
        "directive-normalization"
    }

    fn order(&self) -> i32 {
        100
    }

    fn execute(&self, mut tree: ChunkTree, diagnostics: &mut Vec<DiagnosticMessage>) -> ChunkTree {
        let mut last: HashMap<DirectiveSlot, usize> = HashMap::new();
        for (index, node) in tree.children.iter().enumerate() {
            if let Some(slot) = DirectiveSlot::of(&node.chunk) {
                last.insert(slot, index);
            }
        }

        let children = std::mem::take(&mut tree.children);
        tree.children = children
            .into_iter()
            .enumerate()
            .filter_map(|(index, node)| match DirectiveSlot::of(&node.chunk) {
                Some(slot) if last.get(&slot) != Some(&index) => {
                    debug!("dropping superseded {}", slot.describe());
                    diagnostics.push(DiagnosticMessage::warning(
                        format!(
                            "The {} is declared more than once; the last declaration wins",
                            slot.describe()
                        ),
                        Some(node.origin.clone()),
                        node.length,
                    ));
                    None
                }
                _ => Some(node),
            })
            .collect();
        tree
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::source::SourceLocation;

    fn at(line: usize) -> SourceLocation {
        SourceLocation {
            file_path: "/Pages/Index.razor".into(),
            absolute_index: 0,
            line,
            column: 1,
        }
    }

    fn node(chunk: Chunk, line: usize) -> ChunkNode {
        ChunkNode::new(chunk, at(line), 1)
    }

    fn property(property_type: &str, value: &str) -> ChunkNode {
        node(
            Chunk::TagHelperProperty {
                type_name: "AlertTagHelper".into(),
                property_name: "Level".into(),
                property_type: property_type.into(),
                attribute_name: "level".into(),
                value: PropertyValue::Literal(value.into()),
            },
            1,
        )
    }

    fn helper(children: Vec<ChunkNode>) -> ChunkTree {
        ChunkTree {
            children: vec![node(
                Chunk::TagHelper {
                    type_name: "AlertTagHelper".into(),
                    tag_name: "alert".into(),
                    html_attributes: Vec::new(),
                    self_closing: false,
                    children,
                },
                1,
            )],
        }
    }

    fn bound_value(tree: &ChunkTree, index: usize) -> PropertyValue {
        match &tree.children[0].children()[index].chunk {
            Chunk::TagHelperProperty { value, .. } => value.clone(),
            other => panic!("unexpected chunk {other:?}"),
        }
    }

    #[test]
    fn converts_literals_by_declared_type() {
        let mut diagnostics = Vec::new();
        let tree = TagHelperBindingPass.execute(
            helper(vec![
                property("string", "say \"hi\""),
                property("int", " 42 "),
                property("bool", ""),
                property("float", "1"),
            ]),
            &mut diagnostics,
        );
        assert!(diagnostics.is_empty());
        assert_eq!(
            bound_value(&tree, 0),
            PropertyValue::Code("\"say \\\"hi\\\"\"".into())
        );
        assert_eq!(bound_value(&tree, 1), PropertyValue::Code("42".into()));
        assert_eq!(bound_value(&tree, 2), PropertyValue::Code("true".into()));
        assert_eq!(bound_value(&tree, 3), PropertyValue::Code("1.0".into()));
    }

    #[test]
    fn unconvertible_literal_is_an_error() {
        let mut diagnostics = Vec::new();
        TagHelperBindingPass.execute(helper(vec![property("int", "many")]), &mut diagnostics);
        assert_eq!(diagnostics.len(), 1);
        assert!(diagnostics[0].message.contains("'many' is not an int"));
    }

    #[test]
    fn last_inherits_and_model_win_with_warnings() {
        let tree = ChunkTree {
            children: vec![
                node(Chunk::SetBaseType { type_name: "A".into() }, 1),
                node(Chunk::SetModelType { type_name: "M".into() }, 2),
                node(Chunk::SetBaseType { type_name: "B".into() }, 3),
                node(Chunk::Literal { text: "x".into() }, 4),
            ],
        };
        let mut diagnostics = Vec::new();
        let tree = DirectiveNormalizationPass.execute(tree, &mut diagnostics);
        assert_eq!(tree.base_type(), Some("B"));
        assert_eq!(tree.model_type(), Some("M"));
        assert_eq!(tree.children.len(), 3);
        assert_eq!(diagnostics.len(), 1);
        assert!(!diagnostics[0].is_error());
        assert_eq!(diagnostics[0].location.as_ref().map(|l| l.line), Some(1));
    }
}
