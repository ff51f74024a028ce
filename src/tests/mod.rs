mod dispatch;
mod pipeline;

use crate::hosting::{PageInvoker, ServiceCollection};
use crate::project::{item::MemoryProject, options::PagesOptions};
use std::sync::Arc;

pub(crate) fn project(files: &[(&str, &str)]) -> MemoryProject {
    let mut project = MemoryProject::new();
    for (path, content) in files {
        project.add(path, *content);
    }
    project
}

pub(crate) fn invoker_with(
    files: &[(&str, &str)],
    options: PagesOptions,
    services: ServiceCollection,
) -> PageInvoker {
    PageInvoker::for_project(Arc::new(project(files)), options, Arc::new(services))
}
