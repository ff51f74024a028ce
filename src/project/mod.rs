pub mod descriptors;
pub mod item;
pub mod options;

pub use descriptors::{PageActionDescriptor, PageActionDescriptorProvider, RouteMatch, RouteTable};
pub use item::{FileSystemProject, MemoryProject, ProjectError, ProjectItem, TemplateProject};
pub use options::PagesOptions;
