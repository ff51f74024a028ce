use crate::compilation::references::{ReferenceDeclarations, RUNTIME_NAMESPACE};
use crate::template::tag_helpers::TagHelperDescriptor;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const OPTIONS_FILE_NAME: &str = "pages.toml";

#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("failed to read {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("invalid {path}: {message}")]
    Parse { path: PathBuf, message: String },
}

/// Settings read from `pages.toml`; every field has a default.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PagesOptions {
    pub root_directory: String,
    pub file_extension: String,
    pub default_namespace: String,
    pub default_base_type: String,
    pub default_imports: Vec<String>,
    pub execute_method_name: String,
    pub import_file_name: String,
    pub handler_verbs: Vec<String>,
    /// Render compilation failures with source and messages; otherwise a generic 500 page.
    pub include_compilation_details: bool,
    /// Global filters copied onto every page descriptor.
    pub filters: Vec<String>,
    pub tag_helpers: Vec<TagHelperDescriptor>,
    pub references: ReferenceDeclarations,
}

impl Default for PagesOptions {
    fn default() -> Self {
        Self {
            root_directory: "/Pages".into(),
            file_extension: ".razor".into(),
            default_namespace: "Pages".into(),
            default_base_type: "Page".into(),
            default_imports: vec![RUNTIME_NAMESPACE.into()],
            execute_method_name: "ExecuteAsync".into(),
            import_file_name: "_PageImports.razor".into(),
            handler_verbs: ["GET", "POST", "PUT", "DELETE", "PATCH"]
                .into_iter()
                .map(String::from)
                .collect(),
            include_compilation_details: true,
            filters: Vec::new(),
            tag_helpers: Vec::new(),
            references: ReferenceDeclarations::default(),
        }
    }
}

impl PagesOptions {
    pub fn from_toml(path: &Path, content: &str) -> Result<Self, OptionsError> {
        toml::from_str(content).map_err(|error| OptionsError::Parse {
            path: path.to_path_buf(),
            message: error.to_string(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, OptionsError> {
        let content = fs::read_to_string(path).map_err(|error| OptionsError::Io {
            path: path.to_path_buf(),
            error,
        })?;
        Self::from_toml(path, &content)
    }

    /// Loads `pages.toml` from `root`, falling back to defaults when absent.
    pub fn load_from_dir(root: &Path) -> Result<Self, OptionsError> {
        let path = root.join(OPTIONS_FILE_NAME);
        if path.is_file() {
            Self::load(&path)
        } else {
            log::debug!("{} not found, using default options", path.display());
            Ok(Self::default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let options = PagesOptions::from_toml(
            Path::new(OPTIONS_FILE_NAME),
            r#"
            default_namespace = "Samples"
            filters = ["Antiforgery"]

            [[tag_helpers]]
            type_name = "AlertTagHelper"
            tag_name = "alert"
            attributes = [{ name = "kind", property = "Kind" }]
            "#,
        )
        .expect("options");
        assert_eq!(options.default_namespace, "Samples");
        assert_eq!(options.root_directory, "/Pages");
        assert_eq!(options.handler_verbs.len(), 5);
        assert_eq!(options.filters, vec!["Antiforgery".to_string()]);
        assert_eq!(options.tag_helpers[0].attributes[0].type_name, "string");
    }

    #[test]
    fn reports_invalid_toml_with_path() {
        let err = PagesOptions::from_toml(Path::new("pages.toml"), "root_directory = 3")
            .expect_err("invalid");
        assert!(err.to_string().starts_with("invalid pages.toml"));
    }

    #[test]
    fn absent_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let options = PagesOptions::load_from_dir(dir.path()).expect("defaults");
        assert_eq!(options, PagesOptions::default());
    }
}
