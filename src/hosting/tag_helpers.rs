use crate::runtime::{builtins::html_encode, RuntimeResult, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// What a tag helper sees: the element as authored plus its bound properties.
#[derive(Clone, Debug, Default)]
pub struct TagHelperContext {
    pub tag_name: String,
    pub properties: BTreeMap<String, Value>,
}

impl TagHelperContext {
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}

/// The element a helper renders. `tag_name = None` writes only the content.
#[derive(Clone, Debug, Default)]
pub struct TagHelperOutput {
    pub tag_name: Option<String>,
    /// `None` value renders a minimised attribute.
    pub attributes: Vec<(String, Option<String>)>,
    pub pre_content: String,
    pub content: String,
    pub post_content: String,
    pub self_closing: bool,
}

impl TagHelperOutput {
    pub fn set_attribute(&mut self, name: &str, value: impl Into<String>) {
        let value = Some(value.into());
        match self
            .attributes
            .iter_mut()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
        {
            Some(slot) => slot.1 = value,
            None => self.attributes.push((name.to_string(), value)),
        }
    }

    pub fn suppress(&mut self) {
        self.tag_name = None;
        self.pre_content.clear();
        self.content.clear();
        self.post_content.clear();
    }

    pub fn render(&self) -> String {
        let mut html = String::new();
        if let Some(tag) = &self.tag_name {
            html.push('<');
            html.push_str(tag);
            for (name, value) in &self.attributes {
                html.push(' ');
                html.push_str(name);
                if let Some(value) = value {
                    html.push_str("=\"");
                    html.push_str(&html_encode(value));
                    html.push('"');
                }
            }
            if self.self_closing && self.content.is_empty() {
                html.push_str(" />");
                return html;
            }
            html.push('>');
        }
        html.push_str(&self.pre_content);
        html.push_str(&self.content);
        html.push_str(&self.post_content);
        if let Some(tag) = &self.tag_name {
            html.push_str("</");
            html.push_str(tag);
            html.push('>');
        }
        html
    }
}

pub trait TagHelper: Send + Sync {
    fn process(&self, context: &TagHelperContext, output: &mut TagHelperOutput) -> RuntimeResult<()>;
}

/// `<a page="/Widgets/Edit">` -> `<a href="/Widgets/Edit">`.
#[derive(Debug, Default)]
pub struct AnchorTagHelper;

impl TagHelper for AnchorTagHelper {
    fn process(&self, context: &TagHelperContext, output: &mut TagHelperOutput) -> RuntimeResult<()> {
        if let Some(page) = context.property("Page").filter(|v| !v.is_null()) {
            output.set_attribute("href", page.to_string());
        }
        Ok(())
    }
}

/// Runtime tag helpers keyed by the `type_name` of their descriptors.
#[derive(Clone, Default)]
pub struct TagHelperRegistry {
    helpers: HashMap<String, Arc<dyn TagHelper>>,
}

impl std::fmt::Debug for TagHelperRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&String> = self.helpers.keys().collect();
        names.sort();
        f.debug_struct("TagHelperRegistry").field("helpers", &names).finish()
    }
}

impl TagHelperRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the built-in helpers.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register("AnchorTagHelper", AnchorTagHelper);
        registry
    }

    pub fn register(&mut self, type_name: &str, helper: impl TagHelper + 'static) -> &mut Self {
        self.helpers.insert(type_name.to_string(), Arc::new(helper));
        self
    }

    pub fn get(&self, type_name: &str) -> Option<Arc<dyn TagHelper>> {
        self.helpers.get(type_name).cloned()
    }
}
