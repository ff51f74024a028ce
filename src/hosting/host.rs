use crate::hosting::{
    context::PageContext,
    tag_helpers::{TagHelperContext, TagHelperOutput, TagHelperRegistry},
};
use crate::runtime::{RuntimeError, RuntimeResult, ScriptHost, Value};
use log::debug;
use std::collections::BTreeMap;

struct TagHelperFrame {
    type_name: String,
    tag_name: String,
    attributes: Vec<(String, Option<String>)>,
    properties: BTreeMap<String, Value>,
    self_closing: bool,
    /// Output length when the element started; everything after is its content.
    start: usize,
}

/// Connects a running page to its request: output buffer, request values,
/// temp data, model state and tag helpers.
pub struct RequestHost<'a> {
    context: &'a mut PageContext,
    tag_helpers: &'a TagHelperRegistry,
    output: String,
    frames: Vec<TagHelperFrame>,
}

fn lookup<'m>(map: &'m BTreeMap<String, String>, name: &str) -> Option<&'m String> {
    map.get(name).or_else(|| {
        map.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value)
    })
}

fn optional_string(value: Option<&String>) -> Value {
    value.map_or(Value::Null, |v| Value::String(v.clone()))
}

impl<'a> RequestHost<'a> {
    pub fn new(context: &'a mut PageContext, tag_helpers: &'a TagHelperRegistry) -> Self {
        Self {
            context,
            tag_helpers,
            output: String::new(),
            frames: Vec::new(),
        }
    }

    /// Takes what has been written so far.
    pub fn take_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }

    fn begin_tag_helper(&mut self, args: &[Value]) -> RuntimeResult<Value> {
        let [type_name, tag_name, attributes, self_closing] = args else {
            return Err(RuntimeError::ArityMismatch {
                name: "tag_helper_begin".into(),
                expected: 4,
                received: args.len(),
            });
        };
        let attributes = match attributes {
            Value::List(list) => list
                .snapshot()
                .into_iter()
                .filter_map(|pair| match pair {
                    Value::List(pair) => {
                        let name = pair.get(0)?.to_string();
                        let value = pair.get(1).filter(|v| !v.is_null()).map(|v| v.to_string());
                        Some((name, value))
                    }
                    _ => None,
                })
                .collect(),
            _ => Vec::new(),
        };
        self.frames.push(TagHelperFrame {
            type_name: type_name.to_string(),
            tag_name: tag_name.to_string(),
            attributes,
            properties: BTreeMap::new(),
            self_closing: self_closing.as_bool(),
            start: self.output.len(),
        });
        Ok(Value::Null)
    }

    fn end_tag_helper(&mut self) -> RuntimeResult<Value> {
        let frame = self.frames.pop().ok_or_else(|| RuntimeError::Unsupported {
            message: "tag_helper_end without a matching tag_helper_begin".into(),
        })?;
        let content = self.output.split_off(frame.start.min(self.output.len()));
        let context = TagHelperContext {
            tag_name: frame.tag_name.clone(),
            properties: frame.properties,
        };
        let mut output = TagHelperOutput {
            tag_name: Some(frame.tag_name),
            attributes: frame.attributes,
            content,
            self_closing: frame.self_closing,
            ..TagHelperOutput::default()
        };
        match self.tag_helpers.get(&frame.type_name) {
            Some(helper) => helper.process(&context, &mut output)?,
            None => debug!("no runtime tag helper registered for {}", frame.type_name),
        }
        self.output.push_str(&output.render());
        Ok(Value::Null)
    }
}

impl ScriptHost for RequestHost<'_> {
    fn write(&mut self, text: &str) {
        self.output.push_str(text);
    }

    fn call_host(&mut self, name: &str, args: Vec<Value>) -> Option<RuntimeResult<Value>> {
        let result = match (name, args.as_slice()) {
            ("request_method", []) => Ok(Value::String(self.context.request.method.clone())),
            ("route_value", [key]) => Ok(optional_string(lookup(
                &self.context.route_values,
                &key.to_string(),
            ))),
            ("query", [key]) => Ok(optional_string(lookup(
                &self.context.request.query,
                &key.to_string(),
            ))),
            ("form", [key]) => Ok(optional_string(lookup(
                &self.context.request.form,
                &key.to_string(),
            ))),
            ("temp_data", [key]) => Ok(self
                .context
                .temp_data
                .get(&key.to_string())
                .cloned()
                .unwrap_or(Value::Null)),
            ("set_temp_data", [key, value]) => {
                self.context.temp_data.set(&key.to_string(), value.clone());
                Ok(Value::Null)
            }
            ("add_error", [key, message]) => {
                self.context
                    .model_state
                    .add_error(&key.to_string(), message.to_string());
                Ok(Value::Null)
            }
            ("is_valid", []) => Ok(Value::Bool(self.context.model_state.is_valid())),
            ("tag_helper_begin", args) => self.begin_tag_helper(args),
            ("tag_helper_set", [property, value]) => match self.frames.last_mut() {
                Some(frame) => {
                    frame.properties.insert(property.to_string(), value.clone());
                    Ok(Value::Null)
                }
                None => Err(RuntimeError::Unsupported {
                    message: "tag_helper_set outside a tag helper".into(),
                }),
            },
            ("tag_helper_end", []) => self.end_tag_helper(),
            _ => return None,
        };
        Some(result)
    }

    fn is_aborted(&self) -> bool {
        self.context.is_aborted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hosting::context::HttpRequest;

    #[test]
    fn request_values_are_case_insensitive() {
        let mut context = PageContext::new(HttpRequest::new("POST", "/x?Id=3").with_form("Name", "Ada"));
        context.route_values.insert("slug".into(), "intro".into());
        let registry = TagHelperRegistry::new();
        let mut host = RequestHost::new(&mut context, &registry);
        let call = |host: &mut RequestHost<'_>, name: &str, args: Vec<Value>| {
            host.call_host(name, args).expect("host builtin").expect("ok").to_string()
        };
        assert_eq!(call(&mut host, "query", vec![Value::string("id")]), "3");
        assert_eq!(call(&mut host, "form", vec![Value::string("name")]), "Ada");
        assert_eq!(call(&mut host, "route_value", vec![Value::string("SLUG")]), "intro");
        assert_eq!(call(&mut host, "request_method", vec![]), "POST");
        call(&mut host, "add_error", vec![Value::string("Name"), Value::string("taken")]);
        assert_eq!(call(&mut host, "is_valid", vec![]), "false");
        assert!(host.call_host("unknown", vec![]).is_none());
    }

    #[test]
    fn tag_helpers_wrap_their_content() {
        let mut context = PageContext::default();
        let registry = TagHelperRegistry::with_builtins();
        let mut host = RequestHost::new(&mut context, &registry);
        host.write("<nav>");
        let attributes = Value::list(vec![Value::list(vec![Value::string("class"), Value::string("x")])]);
        host.call_host(
            "tag_helper_begin",
            vec![Value::string("AnchorTagHelper"), Value::string("a"), attributes, Value::Bool(false)],
        )
        .expect("builtin")
        .expect("begin");
        host.call_host("tag_helper_set", vec![Value::string("Page"), Value::string("/Home")])
            .expect("builtin")
            .expect("set");
        host.write("Home");
        host.call_host("tag_helper_end", vec![]).expect("builtin").expect("end");
        host.write("</nav>");
        assert_eq!(host.take_output(), "<nav><a class=\"x\" href=\"/Home\">Home</a></nav>");
    }
}
