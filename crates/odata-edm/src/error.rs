//! Schema error type.

use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EdmError {
    #[error("invalid type name '{0}'")]
    InvalidTypeName(String),
    #[error("unknown primitive type '{0}'")]
    UnknownPrimitive(String),
    #[error("type '{0}' is not declared in the model")]
    UnknownType(String),
    #[error("operation '{0}' is not declared in the model")]
    UnknownOperation(String),
    #[error("an element named '{0}' is already declared")]
    DuplicateElement(String),
}
