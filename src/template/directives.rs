//! Argument grammar for single-line directives.

use nom::{
    branch::alt,
    bytes::complete::{escaped, is_not, tag},
    character::complete::{alpha1, alphanumeric1, char, one_of, space0, space1},
    combinator::{all_consuming, map, opt, recognize},
    multi::{many0, separated_list1},
    sequence::{delimited, pair, terminated, tuple},
    IResult,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct DirectiveError {
    pub message: String,
}

impl DirectiveError {
    fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

fn identifier(input: &str) -> IResult<&str, &str> {
    recognize(pair(
        alt((alpha1, tag("_"))),
        many0(alt((alphanumeric1, tag("_")))),
    ))(input)
}

fn qualified_name(input: &str) -> IResult<&str, &str> {
    recognize(separated_list1(char('.'), identifier))(input)
}

fn type_arguments(input: &str) -> IResult<&str, Vec<&str>> {
    delimited(
        pair(char('<'), space0),
        separated_list1(delimited(space0, char(','), space0), type_name),
        pair(space0, char('>')),
    )(input)
}

fn type_name(input: &str) -> IResult<&str, &str> {
    recognize(tuple((qualified_name, opt(type_arguments), opt(char('?')))))(input)
}

fn string_literal(input: &str) -> IResult<&str, String> {
    map(
        delimited(
            char('"'),
            opt(escaped(is_not("\\\""), '\\', one_of("\"\\"))),
            char('"'),
        ),
        |raw: Option<&str>| raw.unwrap_or_default().replace("\\\"", "\"").replace("\\\\", "\\"),
    )(input)
}

fn finish<'a, T>(
    text: &'a str,
    parser: impl FnMut(&'a str) -> IResult<&'a str, T>,
    expected: &str,
) -> Result<T, DirectiveError> {
    all_consuming(terminated(parser, space0))(text.trim_start())
        .map(|(_, value)| value)
        .map_err(|_| DirectiveError::new(expected))
}

/// `@page` takes an optional quoted route template.
pub fn parse_page(text: &str) -> Result<Option<String>, DirectiveError> {
    if text.trim().is_empty() {
        return Ok(None);
    }
    finish(
        text,
        string_literal,
        "The '@page' directive expects an optional quoted route template",
    )
    .map(Some)
}

/// Type argument of `@model` and `@inherits`.
pub fn parse_type(keyword: &str, text: &str) -> Result<String, DirectiveError> {
    if text.trim().is_empty() {
        return Err(DirectiveError::new(format!(
            "The '@{keyword}' directive expects a type name"
        )));
    }
    finish(
        text,
        type_name,
        &format!("The '@{keyword}' directive expects a type name"),
    )
    .map(str::to_string)
}

pub fn parse_namespace(text: &str) -> Result<String, DirectiveError> {
    finish(
        text,
        qualified_name,
        "The '@using' directive expects a namespace",
    )
    .map(str::to_string)
}

/// `@inject <Type> <PropertyName>`.
pub fn parse_inject(text: &str) -> Result<(String, String), DirectiveError> {
    finish(
        text,
        map(tuple((type_name, space1, identifier)), |(ty, _, name)| {
            (ty.to_string(), name.to_string())
        }),
        "The '@inject' directive expects a type name followed by a property name",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_accepts_empty_and_quoted_templates() {
        assert_eq!(parse_page("").expect("empty"), None);
        assert_eq!(
            parse_page(" \"{id?}\" ").expect("quoted"),
            Some("{id?}".to_string())
        );
        assert!(parse_page("custom").is_err());
    }

    #[test]
    fn type_names_allow_generics_and_nullability() {
        assert_eq!(
            parse_type("model", "Paged<Samples.Customer, int>?").expect("type"),
            "Paged<Samples.Customer, int>?"
        );
        assert!(parse_type("model", "").is_err());
        assert!(parse_type("inherits", "Page extra").is_err());
    }

    #[test]
    fn inject_requires_type_and_property() {
        assert_eq!(
            parse_inject("Clock clock").expect("inject"),
            ("Clock".to_string(), "clock".to_string())
        );
        assert!(parse_inject("Clock").is_err());
    }

    #[test]
    fn namespace_is_dotted_identifier() {
        assert_eq!(parse_namespace("Samples.Data").expect("ns"), "Samples.Data");
        assert!(parse_namespace("Samples..Data").is_err());
    }
}
