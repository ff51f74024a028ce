//! Route metadata for every routable template. Nothing here compiles a page:
//! descriptors only need the `@page` directive, which is read with the
//! template parser.

use crate::project::{
    item::{ProjectItem, TemplateProject},
    options::PagesOptions,
};
use crate::template::{directives::parse_page, parser::parse_template, source::SourceDocument};
use log::{debug, warn};
use std::{collections::BTreeMap, sync::Arc};

/// Route values are compared case-insensitively by key; keys are stored lowercase.
pub type RouteValues = BTreeMap<String, String>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PageActionDescriptor {
    /// Application-relative path, `/Pages/Widgets/Edit.razor`.
    pub relative_path: String,
    /// Path relative to the pages root, `/Widgets/Edit.razor`.
    pub view_engine_path: String,
    pub route_template: String,
    pub display_name: String,
    pub filters: Vec<String>,
    pub route_values: RouteValues,
}

impl PageActionDescriptor {
    pub fn page_name(&self) -> &str {
        self.route_values
            .get("page")
            .map(String::as_str)
            .unwrap_or_default()
    }
}

pub struct PageActionDescriptorProvider<'a> {
    project: &'a dyn TemplateProject,
    options: &'a PagesOptions,
}

impl<'a> PageActionDescriptorProvider<'a> {
    pub fn new(project: &'a dyn TemplateProject, options: &'a PagesOptions) -> Self {
        Self { project, options }
    }

    pub fn descriptors(&self) -> Vec<PageActionDescriptor> {
        self.project
            .enumerate_items(&self.options.root_directory, &self.options.file_extension)
            .into_iter()
            .filter(|item| !item.file_name().starts_with('_'))
            .map(|item| self.describe(&item))
            .collect()
    }

    fn describe(&self, item: &ProjectItem) -> PageActionDescriptor {
        let view_engine_path = format!("/{}", relative_path(item));
        let page = format!("/{}", item.relative_path_without_extension());
        let directive = page_route_template(item);
        let route_template = derive_route_template(item.relative_path_without_extension(), directive.as_deref());
        debug!("{} -> route '{}'", item.path, route_template);

        let mut route_values = RouteValues::new();
        route_values.insert("page".into(), page);
        PageActionDescriptor {
            relative_path: item.path.clone(),
            display_name: format!("Page: {view_engine_path}"),
            view_engine_path,
            route_template,
            filters: self.options.filters.clone(),
            route_values,
        }
    }
}

fn relative_path(item: &ProjectItem) -> &str {
    let base = item.base_path.trim_end_matches('/');
    item.path
        .strip_prefix(base)
        .unwrap_or(&item.path)
        .trim_start_matches('/')
}

fn page_route_template(item: &ProjectItem) -> Option<String> {
    let document = Arc::new(SourceDocument::new(item.path.clone(), item.content.clone()));
    let tree = parse_template(document);
    let node = tree.page_directive()?;
    match parse_page(&node.content) {
        Ok(template) => template,
        Err(error) => {
            warn!("{}: {error}; using the path-derived route", item.path);
            None
        }
    }
}

/// `base` is the page path relative to the pages root without extension.
pub fn derive_route_template(base: &str, directive: Option<&str>) -> String {
    if let Some(template) = directive {
        if let Some(rooted) = template.strip_prefix("~/") {
            return rooted.to_string();
        }
        if let Some(rooted) = template.strip_prefix('/') {
            return rooted.to_string();
        }
    }

    // Only the root index page collapses; nested index pages keep their name.
    let base = if base.eq_ignore_ascii_case("index") { "" } else { base };
    match directive.filter(|t| !t.is_empty()) {
        None => base.to_string(),
        Some(template) if base.is_empty() => template.to_string(),
        Some(template) => format!("{base}/{template}"),
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
enum RouteSegment {
    Literal(String),
    Parameter { name: String, optional: bool },
}

fn parse_route_template(template: &str) -> Vec<RouteSegment> {
    template
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|segment| match segment.strip_prefix('{').and_then(|s| s.strip_suffix('}')) {
            Some(param) => match param.strip_suffix('?') {
                Some(name) => RouteSegment::Parameter {
                    name: name.to_ascii_lowercase(),
                    optional: true,
                },
                None => RouteSegment::Parameter {
                    name: param.to_ascii_lowercase(),
                    optional: false,
                },
            },
            None => RouteSegment::Literal(segment.to_string()),
        })
        .collect()
}

#[derive(Clone, Debug)]
struct RouteEntry {
    segments: Vec<RouteSegment>,
    descriptor: Arc<PageActionDescriptor>,
}

impl RouteEntry {
    fn literal_count(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| matches!(s, RouteSegment::Literal(_)))
            .count()
    }

    fn matches(&self, path: &[&str]) -> Option<RouteValues> {
        let mut values = self.descriptor.route_values.clone();
        let mut parts = path.iter();
        for segment in &self.segments {
            match (segment, parts.next()) {
                (RouteSegment::Literal(literal), Some(part)) if literal.eq_ignore_ascii_case(part) => {}
                (RouteSegment::Parameter { name, .. }, Some(part)) => {
                    values.insert(name.clone(), (*part).to_string());
                }
                (RouteSegment::Parameter { optional: true, .. }, None) => {}
                _ => return None,
            }
        }
        parts.next().is_none().then_some(values)
    }
}

#[derive(Clone, Debug)]
pub struct RouteMatch {
    pub descriptor: Arc<PageActionDescriptor>,
    pub values: RouteValues,
}

/// The route table handed to the router. Routes with more literal segments win.
#[derive(Clone, Debug, Default)]
pub struct RouteTable {
    entries: Vec<RouteEntry>,
}

impl RouteTable {
    pub fn new(descriptors: Vec<PageActionDescriptor>) -> Self {
        let mut entries: Vec<RouteEntry> = descriptors
            .into_iter()
            .map(|descriptor| RouteEntry {
                segments: parse_route_template(&descriptor.route_template),
                descriptor: Arc::new(descriptor),
            })
            .collect();
        entries.sort_by(|a, b| {
            b.literal_count()
                .cmp(&a.literal_count())
                .then(a.segments.len().cmp(&b.segments.len()))
        });
        Self { entries }
    }

    pub fn from_project(project: &dyn TemplateProject, options: &PagesOptions) -> Self {
        Self::new(PageActionDescriptorProvider::new(project, options).descriptors())
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &Arc<PageActionDescriptor>> {
        self.entries.iter().map(|entry| &entry.descriptor)
    }

    pub fn find_by_path(&self, relative_path: &str) -> Option<&Arc<PageActionDescriptor>> {
        self.descriptors().find(|d| d.relative_path == relative_path)
    }

    pub fn match_path(&self, url_path: &str) -> Option<RouteMatch> {
        let path = url_path.split('?').next().unwrap_or_default();
        let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        self.entries.iter().find_map(|entry| {
            entry.matches(&parts).map(|values| RouteMatch {
                descriptor: entry.descriptor.clone(),
                values,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::project::item::MemoryProject;

    fn table(files: &[(&str, &str)]) -> RouteTable {
        let mut project = MemoryProject::new();
        for (path, content) in files {
            project.add(path, *content);
        }
        RouteTable::from_project(&project, &PagesOptions::default())
    }

    #[test]
    fn derives_routes_from_paths() {
        assert_eq!(derive_route_template("Index", None), "");
        assert_eq!(derive_route_template("Widgets/Edit", None), "Widgets/Edit");
        assert_eq!(derive_route_template("index", None), "");
        assert_eq!(derive_route_template("Widgets/Index", None), "Widgets/Index");
        assert_eq!(derive_route_template("Widgets/Index", Some("{id?}")), "Widgets/Index/{id?}");
        assert_eq!(derive_route_template("Widgets/Edit", Some("/custom")), "custom");
        assert_eq!(derive_route_template("Widgets/Edit", Some("~/custom")), "custom");
        assert_eq!(derive_route_template("Widgets/Edit", Some("{id}")), "Widgets/Edit/{id}");
        assert_eq!(derive_route_template("Index", Some("{id?}")), "{id?}");
        assert_eq!(derive_route_template("About", Some("")), "About");
    }

    #[test]
    fn provider_skips_includes_and_reads_page_directive() {
        let routes = table(&[
            ("/Pages/Index.razor", "<h1>Home</h1>"),
            ("/Pages/_PageImports.razor", "@using Runtime"),
            ("/Pages/Widgets/Edit.razor", "@page \"{id}\"\n<form></form>"),
            ("/Pages/Widgets/Index.razor", "<ul></ul>"),
            ("/Pages/Custom.razor", "@page \"/custom\""),
            ("/Other/Skipped.razor", ""),
        ]);
        let mut found: Vec<(String, String)> = routes
            .descriptors()
            .map(|d| (d.relative_path.clone(), d.route_template.clone()))
            .collect();
        found.sort();
        assert_eq!(
            found,
            vec![
                ("/Pages/Custom.razor".into(), "custom".into()),
                ("/Pages/Index.razor".into(), "".into()),
                ("/Pages/Widgets/Edit.razor".into(), "Widgets/Edit/{id}".into()),
                ("/Pages/Widgets/Index.razor".into(), "Widgets/Index".into()),
            ]
        );
        let edit = routes.find_by_path("/Pages/Widgets/Edit.razor").expect("edit");
        assert_eq!(edit.display_name, "Page: /Widgets/Edit.razor");
        assert_eq!(edit.view_engine_path, "/Widgets/Edit.razor");
        assert_eq!(edit.page_name(), "/Widgets/Edit");
    }

    #[test]
    fn matches_urls_with_parameters() {
        let routes = table(&[
            ("/Pages/Index.razor", ""),
            ("/Pages/Widgets/Edit.razor", "@page \"{id}\""),
            ("/Pages/Widgets/Details.razor", "@page \"{id?}\""),
        ]);
        let root = routes.match_path("/").expect("root");
        assert_eq!(root.descriptor.relative_path, "/Pages/Index.razor");

        let edit = routes.match_path("/widgets/edit/42?x=1").expect("edit");
        assert_eq!(edit.values.get("id").map(String::as_str), Some("42"));
        assert_eq!(edit.values.get("page").map(String::as_str), Some("/Widgets/Edit"));

        assert!(routes.match_path("/Widgets/Edit").is_none());
        let details = routes.match_path("/Widgets/Details").expect("details");
        assert!(!details.values.contains_key("id"));
        assert!(routes.match_path("/nope").is_none());
    }
}
