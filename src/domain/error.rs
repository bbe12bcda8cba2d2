use thiserror::Error;
use validator::ValidationErrors;

/// Failures of an owner-scoped todo operation.
///
/// `NotFound` covers both a missing todo and one owned by someone else.
#[derive(Debug, Error)]
pub enum TodoError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationErrors),
    #[error("todo not found")]
    NotFound,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

pub type TodoResult<T> = Result<T, TodoError>;
