use super::invoker_with;
use crate::compilation::failure::CompilationError;
use crate::hosting::{DispatchError, HttpRequest, PageContext, ServiceCollection};
use crate::project::options::PagesOptions;
use crate::runtime::Value;
use futures::future::join_all;

const EDIT: &str = r#"@page "{id}"
@functions {
    let Message = "";

    fn OnGet(id: int) {
        this.Message = "editing " + str(id);
    }

    fn OnPost(id: int, name: string) -> Result {
        set_temp_data("saved", name);
        return redirect("/Widgets");
    }
}
<h1>@Message</h1>
"#;

fn widgets() -> crate::hosting::PageInvoker {
    invoker_with(
        &[
            ("/Pages/Widgets/Edit.razor", EDIT),
            ("/Pages/Widgets/Index.razor", "<ul></ul>"),
        ],
        PagesOptions::default(),
        ServiceCollection::new(),
    )
}

#[tokio::test]
async fn get_runs_the_handler_then_renders() {
    let invoker = widgets();
    let mut context = PageContext::new(HttpRequest::new("GET", "/Widgets/Edit/7"));
    invoker.dispatch(&mut context).await.expect("dispatch");
    assert_eq!(context.response.status_code, 200);
    assert!(context.response.body().contains("<h1>editing 7</h1>"));
    assert_eq!(
        context.response.content_type.as_deref(),
        Some("text/html; charset=utf-8")
    );
}

#[tokio::test]
async fn post_returning_a_result_skips_rendering() {
    let invoker = widgets();
    let mut context = PageContext::new(
        HttpRequest::new("post", "/Widgets/Edit/7").with_form_body("name=Bolt+v2"),
    );
    invoker.dispatch(&mut context).await.expect("dispatch");
    assert_eq!(context.response.status_code, 302);
    assert_eq!(context.response.header("location"), Some("/Widgets"));
    assert_eq!(context.response.body(), "");
    assert_eq!(
        context.temp_data.get("saved").map(Value::to_string),
        Some("Bolt v2".to_string())
    );
}

#[tokio::test]
async fn verbs_without_a_handler_render_the_page() {
    let invoker = widgets();
    let mut context = PageContext::new(HttpRequest::new("DELETE", "/Widgets/Edit/7"));
    invoker.dispatch(&mut context).await.expect("dispatch");
    assert!(context.response.body().contains("<h1></h1>"));
}

#[tokio::test]
async fn concurrent_requests_share_one_compilation() {
    let invoker = widgets();
    let mut contexts: Vec<PageContext> = (0..8)
        .map(|_| PageContext::new(HttpRequest::new("GET", "/Widgets/Edit/3")))
        .collect();
    let outcomes = join_all(contexts.iter_mut().map(|context| invoker.dispatch(context))).await;
    assert!(outcomes.iter().all(Result::is_ok));
    assert_eq!(invoker.cache().compilation_count(), 1);
    let first = contexts[0].response.body().to_string();
    assert!(first.contains("editing 3"));
    assert!(contexts.iter().all(|c| c.response.body() == first));

    let mut index = PageContext::new(HttpRequest::new("GET", "/Widgets/Index"));
    invoker.dispatch(&mut index).await.expect("index");
    assert_eq!(invoker.cache().compilation_count(), 2);
    assert!(index.response.body().contains("<ul></ul>"));
}

#[tokio::test]
async fn nested_index_pages_keep_their_segment() {
    let invoker = widgets();
    let mut folder = PageContext::new(HttpRequest::new("GET", "/Widgets"));
    invoker.dispatch(&mut folder).await.expect("unmatched is not an error");
    assert_eq!(folder.response.status_code, 404);
    assert_eq!(invoker.cache().compilation_count(), 0);
}

#[tokio::test]
async fn page_results_carry_a_model() {
    let invoker = invoker_with(
        &[(
            "/Pages/Profile.razor",
            "@model string\n@functions {\n    fn OnGet() -> Result {\n        return page(\"Ada\");\n    }\n}\n<p>@Model</p>",
        )],
        PagesOptions::default(),
        ServiceCollection::new(),
    );
    let mut context = PageContext::new(HttpRequest::new("GET", "/Profile"));
    invoker.dispatch(&mut context).await.expect("dispatch");
    assert!(context.response.body().contains("<p>Ada</p>"));
}

#[tokio::test]
async fn inherited_constructors_resolve_services() {
    let mut options = PagesOptions::default();
    options.references = toml::from_str(
        r#"
        [[types]]
        name = "Clock"
        namespace = "Samples"

        [[types]]
        name = "LayoutPage"
        namespace = "Samples"
        page = true
        constructors = [{ parameters = [{ name = "clock", type = "Clock" }] }]
        "#,
    )
    .expect("declarations");
    let mut services = ServiceCollection::new();
    services.add_singleton("Clock", Value::string("noon"));
    let invoker = invoker_with(
        &[("/Pages/Index.razor", "@using Samples\n@inherits LayoutPage\n<p>@clock</p>")],
        options,
        services,
    );
    let mut context = PageContext::new(HttpRequest::new("GET", "/"));
    invoker.dispatch(&mut context).await.expect("dispatch");
    assert!(context.response.body().contains("<p>noon</p>"));
}

#[tokio::test]
async fn ambiguous_pages_fail_dispatch() {
    let invoker = invoker_with(
        &[(
            "/Pages/Index.razor",
            "@functions {\n    fn OnGet() { }\n    fn OnGetAsync() { }\n}",
        )],
        PagesOptions::default(),
        ServiceCollection::new(),
    );
    let mut context = PageContext::new(HttpRequest::new("GET", "/"));
    let err = invoker.dispatch(&mut context).await.expect_err("ambiguous");
    assert!(matches!(
        err,
        DispatchError::Compilation(CompilationError::AmbiguousHandler { .. })
    ));
}
