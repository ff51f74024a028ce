//! Results returned by handlers and how they are written to the response.

use crate::hosting::context::HttpResponse;
use crate::runtime::Value;
use log::debug;
use std::fmt;

pub const DEFAULT_CONTENT_TYPE: &str = "text/html; charset=utf-8";
pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

#[derive(Clone, Debug)]
pub enum PageResult {
    /// Render the page itself.
    Page {
        content_type: Option<String>,
        status_code: Option<u16>,
        model: Option<Value>,
    },
    Content {
        content: String,
        content_type: Option<String>,
        status_code: Option<u16>,
    },
    Redirect {
        url: String,
        permanent: bool,
    },
    Status {
        code: u16,
    },
    Json {
        value: serde_json::Value,
        status_code: Option<u16>,
    },
}

impl PageResult {
    pub fn page(model: Option<Value>) -> Self {
        PageResult::Page {
            content_type: None,
            status_code: None,
            model,
        }
    }

    pub fn content(content: String, content_type: Option<String>) -> Self {
        PageResult::Content {
            content,
            content_type,
            status_code: None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            PageResult::Page { .. } => "PageResult",
            PageResult::Content { .. } => "ContentResult",
            PageResult::Redirect { .. } => "RedirectResult",
            PageResult::Status { .. } => "StatusCodeResult",
            PageResult::Json { .. } => "JsonResult",
        }
    }

    pub fn is_page(&self) -> bool {
        matches!(self, PageResult::Page { .. })
    }
}

impl fmt::Display for PageResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.kind())
    }
}

/// Explicit value, then whatever the response already carries, then HTML.
pub fn resolve_content_type(explicit: Option<&str>, existing: Option<&str>) -> String {
    explicit
        .or(existing)
        .unwrap_or(DEFAULT_CONTENT_TYPE)
        .to_string()
}

/// Collects body text and hands it to the response in one flush. Dropping
/// the writer flushes whatever was buffered.
pub struct BufferedResponseWriter<'a> {
    response: &'a mut HttpResponse,
    buffer: String,
    flushed: bool,
}

impl<'a> BufferedResponseWriter<'a> {
    pub fn new(response: &'a mut HttpResponse) -> Self {
        Self {
            response,
            buffer: String::new(),
            flushed: false,
        }
    }

    pub fn write(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed
    }

    /// Moves the buffer into the response. Later calls do nothing.
    pub fn flush(&mut self) {
        if self.flushed {
            return;
        }
        self.flushed = true;
        let body = std::mem::take(&mut self.buffer);
        self.response.append_body(&body);
    }
}

impl Drop for BufferedResponseWriter<'_> {
    fn drop(&mut self) {
        self.flush();
    }
}

/// Applies a `PageResult` to the response. `rendered` is the page output,
/// used only by `PageResult::Page`.
#[derive(Clone, Copy, Debug, Default)]
pub struct PageResultExecutor;

impl PageResultExecutor {
    pub fn execute(&self, result: &PageResult, rendered: Option<&str>, response: &mut HttpResponse) {
        debug!("executing {}", result.kind());
        match result {
            PageResult::Page {
                content_type,
                status_code,
                ..
            } => {
                if let Some(code) = status_code {
                    response.status_code = *code;
                }
                response.content_type = Some(resolve_content_type(
                    content_type.as_deref(),
                    response.content_type.as_deref(),
                ));
                let mut writer = BufferedResponseWriter::new(response);
                writer.write(rendered.unwrap_or_default());
                writer.flush();
            }
            PageResult::Content {
                content,
                content_type,
                status_code,
            } => {
                if let Some(code) = status_code {
                    response.status_code = *code;
                }
                response.content_type = Some(resolve_content_type(
                    content_type.as_deref(),
                    response.content_type.as_deref(),
                ));
                let mut writer = BufferedResponseWriter::new(response);
                writer.write(content);
            }
            PageResult::Redirect { url, permanent } => {
                response.status_code = if *permanent { 301 } else { 302 };
                response.set_header("Location", url.clone());
            }
            PageResult::Status { code } => {
                response.status_code = *code;
            }
            PageResult::Json { value, status_code } => {
                if let Some(code) = status_code {
                    response.status_code = *code;
                }
                response.content_type = Some(JSON_CONTENT_TYPE.to_string());
                let mut writer = BufferedResponseWriter::new(response);
                writer.write(&value.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_type_precedence() {
        assert_eq!(resolve_content_type(Some("text/plain"), Some("text/csv")), "text/plain");
        assert_eq!(resolve_content_type(None, Some("text/csv")), "text/csv");
        assert_eq!(resolve_content_type(None, None), DEFAULT_CONTENT_TYPE);
    }

    #[test]
    fn writer_flushes_once_and_on_drop() {
        let mut response = HttpResponse::default();
        {
            let mut writer = BufferedResponseWriter::new(&mut response);
            writer.write("a");
            writer.flush();
            writer.write("b");
            writer.flush();
            assert!(writer.is_flushed());
        }
        assert_eq!(response.body(), "a");

        let mut response = HttpResponse::default();
        {
            let mut writer = BufferedResponseWriter::new(&mut response);
            writer.write("dropped");
        }
        assert_eq!(response.body(), "dropped");
    }

    #[test]
    fn executes_non_page_results() {
        let executor = PageResultExecutor;
        let mut response = HttpResponse::default();
        executor.execute(
            &PageResult::Redirect {
                url: "/done".into(),
                permanent: false,
            },
            None,
            &mut response,
        );
        assert_eq!(response.status_code, 302);
        assert_eq!(response.header("location"), Some("/done"));

        let mut response = HttpResponse::default();
        executor.execute(
            &PageResult::Json {
                value: serde_json::json!({"ok": true}),
                status_code: Some(201),
            },
            None,
            &mut response,
        );
        assert_eq!(response.status_code, 201);
        assert_eq!(response.body(), r#"{"ok":true}"#);
        assert_eq!(response.content_type.as_deref(), Some(JSON_CONTENT_TYPE));

        let mut response = HttpResponse::default();
        response.content_type = Some("text/plain".into());
        executor.execute(&PageResult::page(None), Some("<p>hi</p>"), &mut response);
        assert_eq!(response.content_type.as_deref(), Some("text/plain"));
        assert_eq!(response.body(), "<p>hi</p>");
    }
}
