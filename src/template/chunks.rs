use crate::template::source::SourceLocation;

#[derive(Clone, Debug, PartialEq)]
pub enum Chunk {
    Using {
        namespace: String,
    },
    SetBaseType {
        type_name: String,
    },
    SetModelType {
        type_name: String,
    },
    Inject {
        type_name: String,
        member_name: String,
    },
    Literal {
        text: String,
    },
    Expression {
        code: String,
    },
    Statement {
        code: String,
    },
    /// Members of a `@functions` block, transcluded into the class body.
    TypeMember {
        code: String,
    },
    TagHelper {
        type_name: String,
        tag_name: String,
        /// Unbound attributes, rendered onto the output element.
        html_attributes: Vec<(String, HtmlAttributeValue)>,
        self_closing: bool,
        children: Vec<ChunkNode>,
    },
    TagHelperProperty {
        type_name: String,
        property_name: String,
        /// Declared type of the property, `string` unless the descriptor says otherwise.
        property_type: String,
        attribute_name: String,
        value: PropertyValue,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum HtmlAttributeValue {
    Literal(String),
    Expression(String),
    Minimized,
}

/// Value assigned to a tag helper property. `Literal` values of non-string
/// properties are converted by `TagHelperBindingPass`.
#[derive(Clone, Debug, PartialEq)]
pub enum PropertyValue {
    Literal(String),
    /// Page script source producing the value.
    Code(String),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ChunkNode {
    pub chunk: Chunk,
    pub origin: SourceLocation,
    /// Length in bytes of the authored text the chunk came from.
    pub length: usize,
}

impl ChunkNode {
    pub fn new(chunk: Chunk, origin: SourceLocation, length: usize) -> Self {
        Self {
            chunk,
            origin,
            length,
        }
    }

    pub fn children(&self) -> &[ChunkNode] {
        match &self.chunk {
            Chunk::TagHelper { children, .. } => children,
            _ => &[],
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ChunkTree {
    pub children: Vec<ChunkNode>,
}

impl ChunkTree {
    /// Depth-first, source-ordered walk over every node.
    pub fn walk(&self) -> Vec<&ChunkNode> {
        fn visit<'a>(nodes: &'a [ChunkNode], out: &mut Vec<&'a ChunkNode>) {
            for node in nodes {
                out.push(node);
                visit(node.children(), out);
            }
        }
        let mut out = Vec::new();
        visit(&self.children, &mut out);
        out
    }

    pub fn base_type(&self) -> Option<&str> {
        self.children.iter().rev().find_map(|node| match &node.chunk {
            Chunk::SetBaseType { type_name } => Some(type_name.as_str()),
            _ => None,
        })
    }

    pub fn model_type(&self) -> Option<&str> {
        self.children.iter().rev().find_map(|node| match &node.chunk {
            Chunk::SetModelType { type_name } => Some(type_name.as_str()),
            _ => None,
        })
    }

    pub fn usings(&self) -> impl Iterator<Item = &str> {
        self.children.iter().filter_map(|node| match &node.chunk {
            Chunk::Using { namespace } => Some(namespace.as_str()),
            _ => None,
        })
    }
}
