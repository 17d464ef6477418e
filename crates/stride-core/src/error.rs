use thiserror::Error;

#[derive(Debug, Error)]
pub enum StrideError {
    #[error("source error: {0}")]
    Source(String),
    #[error("shape mismatch: {0}")]
    Mismatch(String),
    #[error("invalid selection: {0}")]
    InvalidSelection(String),
    #[error("invalid input: {0}")]
    Invalid(String),
}

pub type StrideResult<T> = Result<T, StrideError>;
