pub mod cache;
pub mod compiler;
pub mod failure;
pub mod loader;
pub mod pipeline;
pub mod references;

pub use cache::CompiledPageCache;
pub use compiler::{CompiledPageType, NativeCompiler};
pub use failure::{CompilationError, CompilationException, CompilationFailure, DiagnosticMessage};
pub use loader::{CompiledPageActionDescriptor, PageLoader};
pub use pipeline::{CompilerPipeline, GeneratedPage};
pub use references::{DeclaredReferences, ReferenceProvider, ReferenceSet};
