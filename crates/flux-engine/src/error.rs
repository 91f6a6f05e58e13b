//! Error types for calendar-engine operations.

use farg_core::FargError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FluxError {
    #[error("Invalid datetime: {0}")]
    TimeParse(String),

    #[error("Invalid timezone: {0}")]
    InvalidTimezone(String),

    #[error("Out of range: {0}")]
    Arithmetic(String),

    /// Construction arguments failed to resolve or validate.
    #[error(transparent)]
    Resolve(#[from] FargError),
}

pub type Result<T> = std::result::Result<T, FluxError>;
