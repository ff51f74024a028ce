//! Serving compiled pages: request context, activation, model binding,
//! handler dispatch and result execution.

pub mod activator;
pub mod binding;
pub mod context;
pub mod handlers;
pub mod host;
pub mod invoker;
pub mod results;
pub mod services;
pub mod tag_helpers;

pub use activator::PageActivator;
pub use binding::{ModelBinder, ValueProviderModelBinder};
pub use context::{HttpRequest, HttpResponse, PageContext};
pub use handlers::{HandlerExecutor, HandlerMethodDescriptor, HandlerShape};
pub use invoker::{DispatchError, PageInvoker};
pub use results::{PageResult, PageResultExecutor};
pub use services::{ServiceCollection, ServiceProvider};
pub use tag_helpers::{TagHelper, TagHelperRegistry};
