use serde::Deserialize;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct TagHelperDescriptor {
    /// Runtime type resolved through the tag helper registry.
    pub type_name: String,
    /// Element name the helper targets, matched case-insensitively.
    pub tag_name: String,
    #[serde(default)]
    pub attributes: Vec<BoundAttributeDescriptor>,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct BoundAttributeDescriptor {
    pub name: String,
    pub property: String,
    #[serde(rename = "type", default = "default_attribute_type")]
    pub type_name: String,
}

fn default_attribute_type() -> String {
    "string".into()
}

impl TagHelperDescriptor {
    pub fn bound_attribute(&self, name: &str) -> Option<&BoundAttributeDescriptor> {
        self.attributes
            .iter()
            .find(|attr| attr.name.eq_ignore_ascii_case(name))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum AttributeValue {
    Literal(String),
    Expression(String),
    /// Attribute written without a value, e.g. `<alert dismissible>`.
    Minimized,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TagHelperAttribute {
    pub name: String,
    pub value: AttributeValue,
    /// `(property, type)` when the attribute maps onto a helper property.
    pub bound: Option<(String, String)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TagHelperBinding {
    pub type_name: String,
    pub tag_name: String,
    pub attributes: Vec<TagHelperAttribute>,
    pub self_closing: bool,
}

/// Placeholder standing in for an `@expression` inside joined tag text.
pub(crate) const EXPRESSION_MARKER: char = '\u{E000}';

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct ParsedStartTag {
    pub name: String,
    pub attributes: Vec<(String, Option<String>)>,
    pub self_closing: bool,
    /// Byte offset just past the closing `>`.
    pub end: usize,
}

fn is_name_char(ch: char) -> bool {
    ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | ':' | '.')
}

/// Finds the next `<name` start tag at or after `from` whose name satisfies `accept`.
pub(crate) fn find_start_tag(
    text: &str,
    from: usize,
    mut accept: impl FnMut(&str) -> bool,
) -> Option<(usize, String)> {
    let mut search = from;
    while let Some(rel) = text.get(search..)?.find('<') {
        let start = search + rel;
        let name: String = text[start + 1..].chars().take_while(|c| is_name_char(*c)).collect();
        if !name.is_empty() && accept(&name) {
            let after = text[start + 1 + name.len()..].chars().next();
            if matches!(after, None | Some('>') | Some('/')) || after.is_some_and(char::is_whitespace) {
                return Some((start, name));
            }
        }
        search = start + 1;
    }
    None
}

/// Finds `</name>` at or after `from`, returning `(start, end)`.
pub(crate) fn find_end_tag(text: &str, from: usize, name: &str) -> Option<(usize, usize)> {
    let mut search = from;
    while let Some(rel) = text.get(search..)?.find("</") {
        let start = search + rel;
        let rest = &text[start + 2..];
        let candidate: String = rest.chars().take_while(|c| is_name_char(*c)).collect();
        if candidate.eq_ignore_ascii_case(name) {
            let tail = &rest[candidate.len()..];
            let trimmed = tail.trim_start();
            if trimmed.starts_with('>') {
                let end = start + 2 + candidate.len() + (tail.len() - trimmed.len()) + 1;
                return Some((start, end));
            }
        }
        search = start + 2;
    }
    None
}

/// Parses a start tag beginning at `text[0] == '<'`. Returns `None` when the
/// tag is not closed within `text`.
pub(crate) fn parse_start_tag(text: &str) -> Option<ParsedStartTag> {
    let mut chars = text.char_indices().peekable();
    chars.next().filter(|(_, c)| *c == '<')?;
    let mut name = String::new();
    while let Some((_, ch)) = chars.peek().copied() {
        if !is_name_char(ch) {
            break;
        }
        name.push(ch);
        chars.next();
    }

    let mut attributes = Vec::new();
    loop {
        while chars.peek().is_some_and(|(_, c)| c.is_whitespace()) {
            chars.next();
        }
        let (idx, ch) = chars.next()?;
        match ch {
            '>' => {
                return Some(ParsedStartTag {
                    name,
                    attributes,
                    self_closing: false,
                    end: idx + 1,
                })
            }
            '/' => {
                let (close, next) = chars.next()?;
                if next != '>' {
                    return None;
                }
                return Some(ParsedStartTag {
                    name,
                    attributes,
                    self_closing: true,
                    end: close + 1,
                });
            }
            _ => {
                let mut attr_name = String::from(ch);
                while let Some((_, next)) = chars.peek().copied() {
                    if next.is_whitespace() || matches!(next, '=' | '>' | '/') {
                        break;
                    }
                    attr_name.push(next);
                    chars.next();
                }
                while chars.peek().is_some_and(|(_, c)| c.is_whitespace()) {
                    chars.next();
                }
                if chars.peek().map(|(_, c)| *c) != Some('=') {
                    attributes.push((attr_name, None));
                    continue;
                }
                chars.next();
                while chars.peek().is_some_and(|(_, c)| c.is_whitespace()) {
                    chars.next();
                }
                let value = match chars.peek().map(|(_, c)| *c)? {
                    quote @ ('"' | '\'') => {
                        chars.next();
                        let mut value = String::new();
                        loop {
                            let (_, c) = chars.next()?;
                            if c == quote {
                                break;
                            }
                            value.push(c);
                        }
                        value
                    }
                    _ => {
                        let mut value = String::new();
                        while let Some((_, c)) = chars.peek().copied() {
                            if c.is_whitespace() || c == '>' {
                                break;
                            }
                            value.push(c);
                            chars.next();
                        }
                        value
                    }
                };
                attributes.push((attr_name, Some(value)));
            }
        }
    }
}
