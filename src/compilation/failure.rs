use crate::language::errors::Severity;
use crate::template::source::SourceLocation;
use miette::Diagnostic;
use std::{fmt, path::PathBuf};
use thiserror::Error;

/// One compiler or template message with the authored location it maps to.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DiagnosticMessage {
    pub message: String,
    pub severity: Severity,
    /// `None` for messages inside generated code with no line mapping.
    pub location: Option<SourceLocation>,
    pub length: usize,
}

impl DiagnosticMessage {
    pub fn error(message: impl Into<String>, location: Option<SourceLocation>, length: usize) -> Self {
        Self {
            message: message.into(),
            severity: Severity::Error,
            location,
            length,
        }
    }

    pub fn warning(
        message: impl Into<String>,
        location: Option<SourceLocation>,
        length: usize,
    ) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(message, location, length)
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for DiagnosticMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(location) => write!(f, "{location}: {}: {}", self.severity, self.message),
            None => write!(f, "{}: {}", self.severity, self.message),
        }
    }
}

/// Messages originating from one file: a template, an import, or the
/// generated unit itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilationFailure {
    pub source_file_path: String,
    /// Authored text of `source_file_path`, when it is a template.
    pub source_file_content: Option<String>,
    pub compiled_content: Option<String>,
    pub messages: Vec<DiagnosticMessage>,
}

/// All failures of one page compilation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompilationException {
    pub failures: Vec<CompilationFailure>,
}

impl fmt::Display for CompilationException {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let count: usize = self
            .failures
            .iter()
            .map(|failure| failure.messages.iter().filter(|m| m.is_error()).count())
            .sum();
        write!(f, "One or more compilation failures occurred ({count} errors)")?;
        for failure in &self.failures {
            for message in failure.messages.iter().filter(|m| m.is_error()) {
                write!(f, "\n  {message}")?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for CompilationException {}

impl CompilationException {
    pub fn messages(&self) -> impl Iterator<Item = &DiagnosticMessage> {
        self.failures.iter().flat_map(|failure| failure.messages.iter())
    }
}

#[derive(Clone, Debug, Error, Diagnostic)]
pub enum CompilationError {
    #[error("{0}")]
    #[diagnostic(code(pages::compilation))]
    Compilation(CompilationException),
    #[error("page base type requires a single constructor: '{type_name}' {reason}")]
    #[diagnostic(code(pages::invalid_base_type))]
    InvalidBaseType { type_name: String, reason: String },
    #[error("multiple handlers match the {verb} verb on {page}: {}", .methods.join(", "))]
    #[diagnostic(
        code(pages::ambiguous_handler),
        help("keep a single On{verb} method or rename one of them")
    )]
    AmbiguousHandler {
        page: String,
        verb: String,
        methods: Vec<String>,
    },
    #[error("handler {method} on {page} has unsupported return type '{return_type}'")]
    #[diagnostic(
        code(pages::unsupported_handler),
        help("handlers return nothing, Result, Task or Task<Result>")
    )]
    UnsupportedHandlerShape {
        page: String,
        method: String,
        return_type: String,
    },
    #[error("no page at {0}")]
    NotFound(String),
    #[error("failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },
    /// The compilation task panicked or was cancelled.
    #[error("compilation of {path} did not complete: {message}")]
    Interrupted { path: String, message: String },
}

impl CompilationError {
    pub fn exception(&self) -> Option<&CompilationException> {
        match self {
            CompilationError::Compilation(exception) => Some(exception),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exception_display_lists_errors_only() {
        let location = SourceLocation {
            file_path: "/Pages/Index.razor".into(),
            absolute_index: 4,
            line: 2,
            column: 3,
        };
        let exception = CompilationException {
            failures: vec![CompilationFailure {
                source_file_path: "/Pages/Index.razor".into(),
                source_file_content: Some("..".into()),
                compiled_content: None,
                messages: vec![
                    DiagnosticMessage::error("Unknown name 'x'", Some(location), 1),
                    DiagnosticMessage::warning("Unused", None, 0),
                ],
            }],
        };
        let text = exception.to_string();
        assert!(text.contains("(1 errors)"));
        assert!(text.contains("/Pages/Index.razor(2,3): error: Unknown name 'x'"));
        assert!(!text.contains("Unused"));
    }
}
