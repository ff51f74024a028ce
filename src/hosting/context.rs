use crate::project::descriptors::RouteValues;
use crate::runtime::Value;
use std::collections::BTreeMap;
use url::form_urlencoded;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

#[derive(Clone, Debug, Default)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub form: BTreeMap<String, String>,
    pub headers: BTreeMap<String, String>,
}

impl HttpRequest {
    /// Splits `url` into path and query string.
    pub fn new(method: &str, url: &str) -> Self {
        let (path, query) = match url.split_once('?') {
            Some((path, query)) => (path, parse_pairs(query)),
            None => (url, BTreeMap::new()),
        };
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            query,
            ..Self::default()
        }
    }

    pub fn with_form(mut self, name: &str, value: &str) -> Self {
        self.form.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Replaces the form with `application/x-www-form-urlencoded` pairs.
    pub fn with_form_body(mut self, body: &str) -> Self {
        self.form = parse_pairs(body);
        self
    }
}

fn parse_pairs(text: &str) -> BTreeMap<String, String> {
    form_urlencoded::parse(text.as_bytes()).into_owned().collect()
}

#[derive(Clone, Debug)]
pub struct HttpResponse {
    pub status_code: u16,
    pub content_type: Option<String>,
    pub headers: BTreeMap<String, String>,
    body: String,
    has_started: bool,
}

impl Default for HttpResponse {
    fn default() -> Self {
        Self {
            status_code: 200,
            content_type: None,
            headers: BTreeMap::new(),
            body: String::new(),
            has_started: false,
        }
    }
}

impl HttpResponse {
    pub fn body(&self) -> &str {
        &self.body
    }

    pub fn has_started(&self) -> bool {
        self.has_started
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn set_header(&mut self, name: &str, value: impl Into<String>) {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
    }

    pub(crate) fn append_body(&mut self, text: &str) {
        self.has_started = true;
        self.body.push_str(text);
    }
}

/// Validation errors keyed by field name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ModelState {
    errors: BTreeMap<String, Vec<String>>,
}

impl ModelState {
    pub fn add_error(&mut self, key: &str, message: impl Into<String>) {
        self.errors
            .entry(key.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self, key: &str) -> &[String] {
        self.errors.get(key).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.errors.iter()
    }
}

/// Values carried to the next request, e.g. across a redirect.
#[derive(Clone, Debug, Default)]
pub struct TempData {
    values: BTreeMap<String, Value>,
}

impl TempData {
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn set(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Cancels binding and rendering of the request it was taken from.
#[derive(Clone, Debug, Default)]
pub struct AbortHandle(Arc<AtomicBool>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-request state shared by binding, handlers and rendering.
#[derive(Debug, Default)]
pub struct PageContext {
    pub request: HttpRequest,
    pub response: HttpResponse,
    pub route_values: RouteValues,
    pub temp_data: TempData,
    pub model_state: ModelState,
    abort: AbortHandle,
}

impl PageContext {
    pub fn new(request: HttpRequest) -> Self {
        Self {
            request,
            ..Self::default()
        }
    }

    pub fn abort(&self) {
        self.abort.abort();
    }

    pub fn is_aborted(&self) -> bool {
        self.abort.is_aborted()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.abort.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_splits_query_string() {
        let request = HttpRequest::new("get", "/Widgets/Edit?id=4&name=a%20b+c");
        assert_eq!(request.method, "GET");
        assert_eq!(request.path, "/Widgets/Edit");
        assert_eq!(request.query.get("id").map(String::as_str), Some("4"));
        assert_eq!(request.query.get("name").map(String::as_str), Some("a b c"));
    }

    #[test]
    fn form_body_decodes_escapes_and_bare_names() {
        let request =
            HttpRequest::new("POST", "/Widgets").with_form_body("title=a%41&pct=%4&flag&&note=caf%C3%A9+au+lait");
        assert_eq!(request.form.get("title").map(String::as_str), Some("aA"));
        assert_eq!(request.form.get("pct").map(String::as_str), Some("%4"));
        assert_eq!(request.form.get("flag").map(String::as_str), Some(""));
        assert_eq!(request.form.get("note").map(String::as_str), Some("café au lait"));
        assert_eq!(request.form.len(), 4);
    }

    #[test]
    fn model_state_collects_errors() {
        let mut state = ModelState::default();
        assert!(state.is_valid());
        state.add_error("id", "The value 'x' is not valid for id.");
        assert!(!state.is_valid());
        assert_eq!(state.errors("id").len(), 1);
        assert!(state.errors("name").is_empty());
    }

    #[test]
    fn abort_handle_is_shared() {
        let context = PageContext::default();
        let handle = context.abort_handle();
        handle.abort();
        assert!(context.is_aborted());
    }
}
