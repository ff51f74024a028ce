#![allow(clippy::collapsible_if)]

pub mod compilation;
pub mod hosting;
pub mod language;
pub mod project;
pub mod runtime;
pub mod template;
pub mod tools;

#[cfg(test)]
mod tests;
