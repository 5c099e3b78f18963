use crate::value::Type;
use thiserror::Error;

/// Failure to convert a value to a requested static type.
///
/// Conversion failures never abort a pipeline. The caller replaces the value
/// with an unknown placeholder of the requested type and records the error
/// message in a diagnostic.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConvertError {
    #[error("a value of type {from} cannot be converted to {want}")]
    Incompatible { from: Type, want: Type },

    #[error("string {0:?} cannot be parsed as a number")]
    BadNumber(String),

    #[error("string {0:?} is not \"true\" or \"false\"")]
    BadBool(String),

    #[error("required attribute {0:?} is missing")]
    MissingAttribute(String),
}

/// Failure raised by the function registry or a function implementation.
#[derive(Debug, Error)]
pub enum CallError {
    #[error("call to unknown function {0:?}")]
    UnknownFunction(String),

    #[error("function {name:?} expects {expected} arguments, got {got}")]
    BadArity {
        name: String,
        expected: String,
        got: usize,
    },

    #[error("invalid argument to {name:?}: {reason}")]
    InvalidArgument { name: String, reason: String },
}
