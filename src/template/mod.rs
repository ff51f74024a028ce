//! Template front end: parse, rewrite, lower and emit page script.

pub mod chunk_passes;
pub mod chunks;
pub mod codegen;
pub mod directives;
pub mod lowering;
pub mod parser;
pub mod passes;
pub mod source;
pub mod syntax;
pub mod tag_helpers;

pub use codegen::{CodeGenContext, GeneratedSource};
pub use parser::parse_template;
pub use source::{SourceDocument, SourceLocation};
pub use syntax::SyntaxTree;
