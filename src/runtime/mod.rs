//! Embedded interpreter for compiled page scripts.

pub mod builtins;
pub mod environment;
pub mod error;
pub mod interpreter;
pub mod value;

pub use error::{RuntimeError, RuntimeResult};
pub use interpreter::{Interpreter, ScriptHost};
pub use value::{ScriptObject, Value};
