use crate::compilation::failure::{CompilationError, CompilationException, DiagnosticMessage};
use crate::language::errors::Severity;
use crate::runtime::{builtins::html_encode, RuntimeError};
use miette::{Diagnostic, NamedSource, Report, SourceSpan};
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic, Clone)]
#[error("{message}")]
pub struct TemplateDiagnostic {
    #[source_code]
    src: NamedSource<String>,
    #[label("{label}")]
    span: SourceSpan,
    message: String,
    label: String,
}

impl TemplateDiagnostic {
    pub fn from_message(src: NamedSource<String>, message: &DiagnosticMessage) -> Self {
        let offset = message.location.as_ref().map_or(0, |l| l.absolute_index);
        Self {
            src,
            span: SourceSpan::from((offset, message.length)),
            message: message.message.clone(),
            label: match message.severity {
                Severity::Error => "error here".into(),
                Severity::Warning => "warning here".into(),
            },
        }
    }
}

/// Reports for every message in `exception`. Messages with an authored
/// source get a labelled snippet; the rest are rendered as text.
pub fn compilation_reports(exception: &CompilationException) -> Vec<Report> {
    let mut reports = Vec::new();
    for failure in &exception.failures {
        let source = failure
            .source_file_content
            .as_ref()
            .map(|content| NamedSource::new(failure.source_file_path.clone(), content.clone()));
        for message in &failure.messages {
            match (&source, &message.location) {
                (Some(src), Some(_)) => reports.push(Report::new(TemplateDiagnostic::from_message(
                    src.clone(),
                    message,
                ))),
                _ => reports.push(miette::miette!("{}: {message}", failure.source_file_path)),
            }
        }
    }
    reports
}

pub fn emit_compilation_error(error: &CompilationError) {
    match error.exception() {
        Some(exception) => {
            for report in compilation_reports(exception) {
                eprintln!("{report:?}");
            }
        }
        None => eprintln!("{:?}", Report::new(error.clone())),
    }
}

pub fn report_runtime_error(error: &RuntimeError) {
    eprintln!("Runtime error: {}", error);
}

pub fn report_io_error(path: &Path, error: &dyn std::fmt::Display) {
    eprintln!("Failed to access {}: {}", path.display(), error);
}

const PAGE_STYLE: &str = "body{font-family:sans-serif;margin:2em}\
pre{background:#f6f6f6;padding:1em;overflow:auto}\
.error{color:#b00020}.warning{color:#8a6d00}";

/// The page shown for a request whose page failed to compile.
pub fn compilation_error_page(error: &CompilationError, include_details: bool) -> String {
    if !include_details {
        return generic_error_page();
    }
    let mut html = format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Compilation failed</title>\
         <style>{PAGE_STYLE}</style></head><body>\n<h1>An error occurred during the compilation of a page</h1>\n"
    );
    match error.exception() {
        Some(exception) => {
            for failure in &exception.failures {
                html.push_str(&format!("<h2>{}</h2>\n<ul>\n", html_encode(&failure.source_file_path)));
                for message in &failure.messages {
                    let class = match message.severity {
                        Severity::Error => "error",
                        Severity::Warning => "warning",
                    };
                    html.push_str(&format!(
                        "<li class=\"{class}\">{}</li>\n",
                        html_encode(&message.to_string())
                    ));
                }
                html.push_str("</ul>\n");
                if let Some(content) = &failure.source_file_content {
                    html.push_str(&format!("<pre>{}</pre>\n", html_encode(content)));
                }
                if let Some(compiled) = &failure.compiled_content {
                    html.push_str(&format!(
                        "<details><summary>Generated code</summary><pre>{}</pre></details>\n",
                        html_encode(compiled)
                    ));
                }
            }
        }
        None => html.push_str(&format!("<p class=\"error\">{}</p>\n", html_encode(&error.to_string()))),
    }
    html.push_str("</body></html>\n");
    html
}

pub fn generic_error_page() -> String {
    "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\"><title>Error</title></head>\
     <body><h1>An error occurred while processing your request.</h1></body></html>\n"
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compilation::failure::CompilationFailure;
    use crate::template::source::SourceLocation;

    fn failure() -> CompilationError {
        CompilationError::Compilation(CompilationException {
            failures: vec![CompilationFailure {
                source_file_path: "/Pages/Index.razor".into(),
                source_file_content: Some("<p>@missing</p>".into()),
                compiled_content: Some("class Generated_Index : Page {}".into()),
                messages: vec![DiagnosticMessage::error(
                    "The name 'missing' does not exist in the current context",
                    Some(SourceLocation {
                        file_path: "/Pages/Index.razor".into(),
                        absolute_index: 4,
                        line: 1,
                        column: 5,
                    }),
                    7,
                )],
            }],
        })
    }

    #[test]
    fn detailed_page_lists_messages_and_source() {
        let page = compilation_error_page(&failure(), true);
        assert!(page.contains("<h2>/Pages/Index.razor</h2>"));
        assert!(page.contains("(1,5): error: The name &#39;missing&#39; does not exist"));
        assert!(page.contains("&lt;p&gt;@missing&lt;/p&gt;"));
        assert!(page.contains("Generated code"));
    }

    #[test]
    fn details_can_be_hidden() {
        let page = compilation_error_page(&failure(), false);
        assert_eq!(page, generic_error_page());
        assert!(!page.contains("missing"));
    }

    #[test]
    fn reports_carry_labels_for_located_messages() {
        let error = failure();
        let reports = compilation_reports(error.exception().expect("exception"));
        assert_eq!(reports.len(), 1);
        assert!(reports[0].to_string().contains("does not exist"));
    }
}
