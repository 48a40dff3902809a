use deadpool_postgres::{BuildError, PoolError};
use thiserror::Error;
use tokio_postgres::error::SqlState;

// DbError is the lowest level error type, wrapping errors from the database layer. It does not wrap
// any higher level errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// Record not found
    #[error("not found")]
    NotFound,

    /// Unique constraint violation
    #[error("unique violation")]
    UniqueViolation,

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Pg(#[from] tokio_postgres::Error),

    #[error(transparent)]
    Migrate(#[from] refinery::Error),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error("row decode error: {0}")]
    Decode(String),
}

impl DbError {
    /// Like the `From` conversion, but recognises unique constraint violations.
    pub fn from_pg(e: tokio_postgres::Error) -> Self {
        if e.code() == Some(&SqlState::UNIQUE_VIOLATION) {
            DbError::UniqueViolation
        } else {
            DbError::Pg(e)
        }
    }
}
