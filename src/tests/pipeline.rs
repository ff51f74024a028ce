use super::project;
use crate::compilation::{
    failure::CompilationError,
    loader::PageLoader,
    pipeline::CompilerPipeline,
    references::{DeclaredReferences, ReferenceDeclarations, ReferenceProvider},
};
use crate::project::{options::PagesOptions, RouteTable, TemplateProject};
use std::sync::Arc;

fn samples() -> ReferenceDeclarations {
    toml::from_str(
        r#"
        [[types]]
        name = "Clock"
        namespace = "Samples.Data"

        [[types]]
        name = "LayoutPage"
        namespace = "Samples"
        page = true
        constructors = [{ parameters = [{ name = "clock", type = "Clock" }] }]
        "#,
    )
    .expect("declarations")
}

fn loader(files: &[(&str, &str)], declarations: ReferenceDeclarations) -> (PageLoader, RouteTable) {
    let options = PagesOptions::default();
    let project = Arc::new(project(files));
    let routes = RouteTable::from_project(project.as_ref(), &options);
    let loader = PageLoader::new(
        Arc::new(CompilerPipeline::new(options)),
        project,
        Arc::new(DeclaredReferences::new(declarations)),
    );
    (loader, routes)
}

#[test]
fn pages_without_directives_use_the_default_base_type() {
    let (loader, routes) = loader(&[("/Pages/About.razor", "<h1>About</h1>")], samples());
    let descriptor = routes.find_by_path("/Pages/About.razor").expect("route");
    let compiled = loader.load(descriptor.clone()).expect("compiled");
    assert_eq!(compiled.page_type.base_type.qualified_name(), "Runtime.Page");
    assert_eq!(compiled.page_type.name, "Pages.Generated_About");
    assert!(compiled.handler_methods.is_empty());
}

#[test]
fn inherits_mirrors_the_base_constructor() {
    let (loader, routes) = loader(
        &[(
            "/Pages/Dashboard.razor",
            "@using Samples\n@using Samples.Data\n@inherits LayoutPage\n<p>@clock</p>",
        )],
        samples(),
    );
    let descriptor = routes.find_by_path("/Pages/Dashboard.razor").expect("route");
    let compiled = loader.load(descriptor.clone()).expect("compiled");
    let page = &compiled.page_type;
    assert_eq!(page.base_type.qualified_name(), "Samples.LayoutPage");

    let ctor = page.constructor().expect("constructor");
    let declared: Vec<(String, String)> = ctor
        .params
        .iter()
        .map(|p| (p.name.name.clone(), p.ty.ty.canonical_name()))
        .collect();
    let expected: Vec<(String, String)> = page
        .base_type
        .single_constructor()
        .expect("single constructor")
        .iter()
        .map(|p| (p.name.clone(), p.type_name.clone()))
        .collect();
    assert_eq!(declared, expected);
}

#[test]
fn two_handlers_for_one_verb_are_ambiguous() {
    let (loader, routes) = loader(
        &[(
            "/Pages/Index.razor",
            "@functions {\n    fn OnGet() { }\n    async fn OnGetAsync() { }\n}\n<p>home</p>",
        )],
        ReferenceDeclarations::default(),
    );
    let descriptor = routes.find_by_path("/Pages/Index.razor").expect("route");
    let err = loader.load(descriptor.clone()).expect_err("ambiguous");
    match err {
        CompilationError::AmbiguousHandler { verb, methods, .. } => {
            assert_eq!(verb, "GET");
            assert_eq!(methods, vec!["OnGet".to_string(), "OnGetAsync".to_string()]);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn unsupported_handler_return_types_are_rejected() {
    let (loader, routes) = loader(
        &[(
            "/Pages/Index.razor",
            "@functions {\n    fn OnGet() -> int { return 1; }\n}",
        )],
        ReferenceDeclarations::default(),
    );
    let descriptor = routes.find_by_path("/Pages/Index.razor").expect("route");
    let err = loader.load(descriptor.clone()).expect_err("shape");
    assert!(matches!(
        err,
        CompilationError::UnsupportedHandlerShape { ref return_type, .. } if return_type == "int"
    ));
}

#[test]
fn routes_follow_paths_and_page_directives() {
    let (_, routes) = loader(
        &[
            ("/Pages/Index.razor", ""),
            ("/Pages/Widgets/Edit.razor", ""),
            ("/Pages/Legacy.razor", "@page \"/custom\""),
            ("/Pages/_Layout.razor", ""),
        ],
        ReferenceDeclarations::default(),
    );
    let route = |path: &str| {
        routes
            .find_by_path(path)
            .map(|d| d.route_template.clone())
            .expect("descriptor")
    };
    assert_eq!(route("/Pages/Index.razor"), "");
    assert_eq!(route("/Pages/Widgets/Edit.razor"), "Widgets/Edit");
    assert_eq!(route("/Pages/Legacy.razor"), "custom");
    assert!(routes.find_by_path("/Pages/_Layout.razor").is_none());
}

#[test]
fn syntax_errors_in_functions_map_to_the_template() {
    let template = "<h1>Title</h1>\n@functions {\n    fn Helper() {\n        let x = ;\n    }\n}\n";
    let files = [("/Pages/Broken.razor", template)];
    let (loader, routes) = loader(&files, ReferenceDeclarations::default());
    let descriptor = routes.find_by_path("/Pages/Broken.razor").expect("route");
    let err = loader.load(descriptor.clone()).expect_err("syntax error");
    let exception = err.exception().expect("compilation failure");
    let failure = exception
        .failures
        .iter()
        .find(|f| f.source_file_path == "/Pages/Broken.razor")
        .expect("failure against the template");
    assert_eq!(failure.source_file_content.as_deref(), Some(template));
    let location = failure.messages[0].location.as_ref().expect("mapped");
    assert_eq!(location.line, 4);
    assert!(location.column > 8);

    let project = project(&files);
    let item = project.get_item("/Pages/Broken.razor").expect("item");
    let references = DeclaredReferences::default().references();
    let generated = CompilerPipeline::new(PagesOptions::default())
        .generate(&project, &item, &references)
        .expect("templates parse; only the script is broken");
    assert!(generated.source.text.contains("let x = ;"));
}
