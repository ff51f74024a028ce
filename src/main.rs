use razor_pages::compilation::{
    loader::PageLoader, pipeline::CompilerPipeline, references::DeclaredReferences,
    ReferenceProvider,
};
use razor_pages::hosting::{HttpRequest, PageContext, PageInvoker, ServiceCollection};
use razor_pages::project::{FileSystemProject, PagesOptions, RouteTable, TemplateProject};
use razor_pages::tools::diagnostics::{emit_compilation_error, report_io_error};
use std::env;
use std::path::Path;
use std::process;
use std::sync::Arc;

const USAGE: &str = "Usage: razor-pages <command> <project-dir> [args]

Commands:
  routes   <dir>                          list page routes
  generate <dir> <template-path>          print the generated page script
  check    <dir>                          compile every page and report errors
  render   <dir> <url> [method] [form]    dispatch one request and print the response";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let args: Vec<String> = env::args().collect();
    if args.len() < 3 {
        eprintln!("{USAGE}");
        process::exit(1);
    }

    let command = args[1].as_str();
    let root = Path::new(&args[2]);
    let options = match PagesOptions::load_from_dir(root) {
        Ok(options) => options,
        Err(error) => {
            report_io_error(root, &error);
            process::exit(1);
        }
    };
    let project = Arc::new(FileSystemProject::new(root));

    let code = match (command, &args[3..]) {
        ("routes", []) => routes(project.as_ref(), &options),
        ("generate", [path]) => generate(project.as_ref(), options, path),
        ("check", []) => check(project, options),
        ("render", [url, rest @ ..]) if rest.len() <= 2 => {
            let method = rest.first().map(String::as_str).unwrap_or("GET");
            render(project, options, url, method, rest.get(1).map(String::as_str))
        }
        _ => {
            eprintln!("{USAGE}");
            1
        }
    };
    process::exit(code);
}

fn routes(project: &dyn TemplateProject, options: &PagesOptions) -> i32 {
    let table = RouteTable::from_project(project, options);
    let mut rows: Vec<_> = table.descriptors().collect();
    rows.sort_by(|a, b| a.route_template.cmp(&b.route_template));
    for descriptor in rows {
        println!("/{:<30} {}", descriptor.route_template, descriptor.relative_path);
    }
    0
}

fn generate(project: &dyn TemplateProject, options: PagesOptions, path: &str) -> i32 {
    let Some(item) = project.get_item(path) else {
        eprintln!("no template at {path}");
        return 1;
    };
    let references = DeclaredReferences::new(options.references.clone()).references();
    let pipeline = CompilerPipeline::new(options);
    match pipeline.generate(project, &item, &references) {
        Ok(generated) => {
            print!("{}", generated.source.text);
            0
        }
        Err(error) => {
            emit_compilation_error(&error);
            1
        }
    }
}

fn check(project: Arc<FileSystemProject>, options: PagesOptions) -> i32 {
    let table = RouteTable::from_project(project.as_ref(), &options);
    let references = Arc::new(DeclaredReferences::new(options.references.clone()));
    let loader = PageLoader::new(Arc::new(CompilerPipeline::new(options)), project, references);
    let mut failed = 0;
    let mut total = 0;
    for descriptor in table.descriptors() {
        total += 1;
        match loader.load(descriptor.clone()) {
            Ok(compiled) => println!(
                "ok     {} ({} handlers)",
                descriptor.relative_path,
                compiled.handler_methods.len()
            ),
            Err(error) => {
                failed += 1;
                println!("failed {}", descriptor.relative_path);
                emit_compilation_error(&error);
            }
        }
    }
    println!("{} pages, {} failed", total, failed);
    i32::from(failed > 0)
}

fn render(
    project: Arc<FileSystemProject>,
    options: PagesOptions,
    url: &str,
    method: &str,
    form: Option<&str>,
) -> i32 {
    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("failed to start the runtime: {error}");
            return 1;
        }
    };
    let invoker = PageInvoker::for_project(project, options, Arc::new(ServiceCollection::new()));
    let mut request = HttpRequest::new(method, url);
    if let Some(body) = form {
        request = request.with_form_body(body);
    }
    let mut context = PageContext::new(request);
    runtime.block_on(invoker.handle(&mut context));

    let response = &context.response;
    println!("HTTP {}", response.status_code);
    if let Some(content_type) = &response.content_type {
        println!("content-type: {content_type}");
    }
    for (name, value) in &response.headers {
        println!("{name}: {value}");
    }
    println!();
    print!("{}", response.body());
    i32::from(response.status_code >= 500)
}
