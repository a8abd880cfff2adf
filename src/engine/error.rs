use thiserror::Error;

use crate::model::{ModelError, Ms};

/// Failure reading from an interval store. "Nothing matched" is never an error.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("already exists: {0}")]
    AlreadyExists(String),
    #[error("invalid span [{start}, {end}): start must be before end")]
    InvalidSpan { start: Ms, end: Ms },
    #[error("invalid value: {0}")]
    Invalid(String),
    #[error("limit exceeded: {0}")]
    LimitExceeded(&'static str),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("conflict data unavailable: {0}")]
    Store(#[from] StoreError),
}
