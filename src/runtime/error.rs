use thiserror::Error;

pub type RuntimeResult<T> = Result<T, RuntimeError>;

#[derive(Clone, Debug, Error, PartialEq)]
pub enum RuntimeError {
    #[error("Unknown symbol `{name}`")]
    UnknownSymbol { name: String },
    #[error("Immutable binding `{name}` cannot be reassigned")]
    ImmutableBinding { name: String },
    #[error("Type mismatch: {message}")]
    TypeMismatch { message: String },
    #[error("Operation not supported: {message}")]
    Unsupported { message: String },
    #[error("Function `{name}` expected {expected} arguments but received {received}")]
    ArityMismatch {
        name: String,
        expected: usize,
        received: usize,
    },
    #[error("Division by zero")]
    DivisionByZero,
    #[error("Index {index} is out of range for length {len}")]
    IndexOutOfRange { index: i64, len: usize },
    #[error("Call depth exceeded {limit} in `{method}`")]
    StackOverflow { method: String, limit: usize },
    #[error("Service error in `{service}`: {message}")]
    Service { service: String, message: String },
    #[error("Execution aborted")]
    Aborted,
}
