use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("failed to read {path}: {error}")]
    Io {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
    #[error("no template at {0}")]
    NotFound(String),
}

/// A template file addressed by its application-relative path (`/Pages/Index.razor`).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProjectItem {
    /// Directory the item was enumerated from, e.g. `/Pages`.
    pub base_path: String,
    pub path: String,
    pub content: String,
}

impl ProjectItem {
    pub fn new(base_path: &str, path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            base_path: normalize_path(base_path),
            path: normalize_path(&path.into()),
            content: content.into(),
        }
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn path_without_extension(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(dot) if dot > 0 => &self.path[..self.path.len() - (name.len() - dot)],
            _ => &self.path,
        }
    }

    /// `path_without_extension` relative to `base_path`, without a leading slash.
    pub fn relative_path_without_extension(&self) -> &str {
        let path = self.path_without_extension();
        let base = self.base_path.trim_end_matches('/');
        path.strip_prefix(base)
            .filter(|rest| rest.starts_with('/'))
            .unwrap_or(path)
            .trim_start_matches('/')
    }

    /// Directory part of `path`, `/` for root items.
    pub fn directory(&self) -> &str {
        parent_directory(&self.path)
    }
}

/// Source of template files. Paths are `/`-separated and rooted at the
/// application root.
pub trait TemplateProject: Send + Sync {
    /// Every item under `base_path` (recursively) whose name ends with `extension`.
    fn enumerate_items(&self, base_path: &str, extension: &str) -> Vec<ProjectItem>;

    fn get_item(&self, path: &str) -> Option<ProjectItem>;

    /// Items named `file_name` in the directory of `path` and each of its
    /// ancestors, root-most first.
    fn find_hierarchical_items(&self, path: &str, file_name: &str) -> Vec<ProjectItem> {
        let path = normalize_path(path);
        let mut directories = Vec::new();
        let mut current = parent_directory(&path);
        loop {
            directories.push(current.to_string());
            if current == "/" {
                break;
            }
            current = parent_directory(current);
        }
        directories
            .iter()
            .rev()
            .filter_map(|dir| {
                let candidate = if dir == "/" {
                    format!("/{file_name}")
                } else {
                    format!("{dir}/{file_name}")
                };
                (candidate != path).then(|| self.get_item(&candidate)).flatten()
            })
            .collect()
    }
}

/// Templates read from a directory on disk.
#[derive(Clone, Debug)]
pub struct FileSystemProject {
    root: PathBuf,
}

impl FileSystemProject {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn physical_path(&self, path: &str) -> PathBuf {
        let mut physical = self.root.clone();
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            physical.push(segment);
        }
        physical
    }

    pub fn read(&self, path: &str) -> Result<String, ProjectError> {
        let physical = self.physical_path(path);
        fs::read_to_string(&physical).map_err(|error| ProjectError::Io {
            path: physical,
            error,
        })
    }

    fn walk(&self, dir: &Path, relative: &str, extension: &str, out: &mut Vec<(String, PathBuf)>) {
        let Ok(entries) = fs::read_dir(dir) else {
            return;
        };
        let mut entries: Vec<_> = entries.flatten().collect();
        entries.sort_by_key(|entry| entry.file_name());
        for entry in entries {
            let name = entry.file_name().to_string_lossy().to_string();
            let child = format!("{}/{}", relative.trim_end_matches('/'), name);
            let path = entry.path();
            if path.is_dir() {
                self.walk(&path, &child, extension, out);
            } else if name.ends_with(extension) {
                out.push((child, path));
            }
        }
    }
}

impl TemplateProject for FileSystemProject {
    fn enumerate_items(&self, base_path: &str, extension: &str) -> Vec<ProjectItem> {
        let base = normalize_path(base_path);
        let mut files = Vec::new();
        self.walk(&self.physical_path(&base), &base, extension, &mut files);
        files
            .into_iter()
            .filter_map(|(path, physical)| match fs::read_to_string(&physical) {
                Ok(content) => Some(ProjectItem::new(&base, path, content)),
                Err(error) => {
                    log::warn!("skipping {}: {error}", physical.display());
                    None
                }
            })
            .collect()
    }

    fn get_item(&self, path: &str) -> Option<ProjectItem> {
        let path = normalize_path(path);
        let content = self.read(&path).ok()?;
        let parent = parent_directory(&path).to_string();
        Some(ProjectItem::new(&parent, path, content))
    }
}

/// In-memory project, used by tests and embedders.
#[derive(Clone, Debug, Default)]
pub struct MemoryProject {
    files: BTreeMap<String, String>,
}

impl MemoryProject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, path: &str, content: impl Into<String>) -> &mut Self {
        self.files.insert(normalize_path(path), content.into());
        self
    }
}

impl TemplateProject for MemoryProject {
    fn enumerate_items(&self, base_path: &str, extension: &str) -> Vec<ProjectItem> {
        let base = normalize_path(base_path);
        let prefix = format!("{}/", base.trim_end_matches('/'));
        self.files
            .iter()
            .filter(|(path, _)| path.starts_with(&prefix) && path.ends_with(extension))
            .map(|(path, content)| ProjectItem::new(&base, path.clone(), content.clone()))
            .collect()
    }

    fn get_item(&self, path: &str) -> Option<ProjectItem> {
        let path = normalize_path(path);
        self.files
            .get(&path)
            .map(|content| ProjectItem::new(parent_directory(&path), path.clone(), content.clone()))
    }
}

/// Rooted, `/`-separated, without `~`, backslashes or a trailing slash.
pub fn normalize_path(path: &str) -> String {
    let path = path.replace('\\', "/");
    let path = path.trim_start_matches('~');
    let trimmed = path.trim_matches('/');
    let mut normalized = String::with_capacity(trimmed.len() + 1);
    for segment in trimmed.split('/').filter(|s| !s.is_empty()) {
        normalized.push('/');
        normalized.push_str(segment);
    }
    if normalized.is_empty() {
        normalized.push('/');
    }
    normalized
}

fn parent_directory(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) | None => "/",
        Some(idx) => &path[..idx],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn item_paths() {
        let item = ProjectItem::new("/Pages", "/Pages/Widgets/Edit.razor", "");
        assert_eq!(item.file_name(), "Edit.razor");
        assert_eq!(item.path_without_extension(), "/Pages/Widgets/Edit");
        assert_eq!(item.relative_path_without_extension(), "Widgets/Edit");
        assert_eq!(item.directory(), "/Pages/Widgets");
    }

    #[test]
    fn normalizes_separators_and_home_prefix() {
        assert_eq!(normalize_path("~/Pages\\Index.razor"), "/Pages/Index.razor");
        assert_eq!(normalize_path("Pages/"), "/Pages");
        assert_eq!(normalize_path(""), "/");
    }

    #[test]
    fn hierarchical_items_are_root_first() {
        let mut project = MemoryProject::new();
        project
            .add("/_PageImports.razor", "root")
            .add("/Pages/_PageImports.razor", "pages")
            .add("/Pages/Admin/Users.razor", "page");
        let found: Vec<String> = project
            .find_hierarchical_items("/Pages/Admin/Users.razor", "_PageImports.razor")
            .into_iter()
            .map(|item| item.content)
            .collect();
        assert_eq!(found, vec!["root", "pages"]);
    }

    #[test]
    fn file_system_project_enumerates_recursively() {
        let dir = tempfile::tempdir().expect("tempdir");
        let pages = dir.path().join("Pages").join("Widgets");
        fs::create_dir_all(&pages).expect("mkdir");
        fs::write(dir.path().join("Pages").join("Index.razor"), "<h1>Home</h1>").expect("write");
        fs::write(pages.join("Edit.razor"), "edit").expect("write");
        fs::write(pages.join("notes.txt"), "skip").expect("write");

        let project = FileSystemProject::new(dir.path());
        let paths: Vec<String> = project
            .enumerate_items("/Pages", ".razor")
            .into_iter()
            .map(|item| item.path)
            .collect();
        assert_eq!(paths, vec!["/Pages/Index.razor", "/Pages/Widgets/Edit.razor"]);
        assert_eq!(
            project.get_item("/Pages/Widgets/Edit.razor").map(|i| i.content),
            Some("edit".to_string())
        );
        let edit = project.get_item("Pages/Widgets/Edit.razor").expect("item");
        assert_eq!(edit.base_path, "/Pages/Widgets");
        assert_eq!(edit.path, "/Pages/Widgets/Edit.razor");
        assert!(project.get_item("/Pages/Missing.razor").is_none());
    }
}
