//! Error types for argument resolution, validation and drilling.

use thiserror::Error;

use crate::validation::ValidationFailure;

#[derive(Error, Debug, Clone)]
pub enum FargError {
    #[error("{kind} (at {caller}) expected {expected} arguments, got {got}")]
    MissingRequiredArgument {
        /// Name of the constructible type whose spec was being resolved.
        kind: String,
        /// Source location of the resolving call site.
        caller: String,
        /// Required names still absent after resolution, in declaration order.
        missing: Vec<String>,
        expected: usize,
        got: usize,
    },

    #[error("{0}")]
    Validation(ValidationFailure),

    #[error("Attribute not found: '{path}'")]
    AttributeNotFound { path: String },

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl From<ValidationFailure> for FargError {
    fn from(failure: ValidationFailure) -> Self {
        FargError::Validation(failure)
    }
}

pub type Result<T> = std::result::Result<T, FargError>;
