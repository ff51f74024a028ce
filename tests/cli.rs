use std::{
    fs,
    path::Path,
    process::{Command, Output, Stdio},
};

fn bin_path() -> &'static str {
    env!("CARGO_BIN_EXE_razor-pages")
}

fn write(root: &Path, path: &str, content: &str) {
    let file = root.join(path);
    fs::create_dir_all(file.parent().expect("parent")).expect("mkdir");
    fs::write(file, content).expect("write");
}

fn run(root: &Path, args: &[&str]) -> Output {
    Command::new(bin_path())
        .arg(args[0])
        .arg(root)
        .args(&args[1..])
        .env("RUST_LOG", "off")
        .stdin(Stdio::null())
        .output()
        .expect("failed to run razor-pages")
}

fn sample_project() -> tempfile::TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    write(dir.path(), "pages.toml", "default_namespace = \"Shop\"\n");
    write(dir.path(), "Pages/_PageImports.razor", "@using Tasks\n");
    write(dir.path(), "Pages/Index.razor", "<h1>Home</h1>\n");
    write(
        dir.path(),
        "Pages/Items/Edit.razor",
        "@page \"{id}\"\n@functions {\n    let Id = 0;\n    fn OnGet(id: int) { this.Id = id; }\n    fn OnPost(name: string) -> Result { return redirect(\"/\"); }\n}\n<p>item @Id</p>\n",
    );
    dir
}

#[test]
fn routes_lists_every_page() {
    let project = sample_project();
    let output = run(project.path(), &["routes"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("/Pages/Index.razor"), "missing index:\n{stdout}");
    assert!(stdout.contains("Items/Edit/{id}"), "missing edit route:\n{stdout}");
    assert!(!stdout.contains("_PageImports"));
}

#[test]
fn generate_prints_the_page_script() {
    let project = sample_project();
    let output = run(project.path(), &["generate", "/Pages/Items/Edit.razor"]);
    assert!(
        output.status.success(),
        "generate failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("namespace Shop.Items;"), "unexpected output:\n{stdout}");
    assert!(stdout.contains("class Generated_Edit : Page {"));
}

#[test]
fn render_dispatches_get_and_post() {
    let project = sample_project();
    let output = run(project.path(), &["render", "/Items/Edit/5"]);
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("HTTP 200"), "unexpected output:\n{stdout}");
    assert!(stdout.contains("<p>item 5</p>"));

    let output = run(project.path(), &["render", "/Items/Edit/5", "POST", "name=x"]);
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("HTTP 302"), "unexpected output:\n{stdout}");
    assert!(stdout.contains("location: /"));
}

#[test]
fn check_fails_on_broken_pages() {
    let project = sample_project();
    let output = run(project.path(), &["check"]);
    assert!(output.status.success());

    write(project.path(), "Pages/Broken.razor", "<p>@nothing</p>\n");
    let output = run(project.path(), &["check"]);
    assert!(!output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("failed /Pages/Broken.razor"), "unexpected output:\n{stdout}");
    assert!(stdout.contains("3 pages, 1 failed"));
}
