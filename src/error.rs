use crate::db::error::DbError;
use crate::models::chest::ChestRef;
use crate::models::types::ChestId;
use thiserror::Error;

pub type AppResult<T> = Result<T, DomainError>;

#[derive(Debug, Error)]
pub enum DomainError {
    /// Malformed id, missing required field, unparsable body
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("validation failed: {field}: {message}")]
    Validation { field: &'static str, message: String },

    /// None (or more than one) of itemId / itemMongoId / name was supplied
    #[error("invalid item reference: {0}")]
    InvalidReference(String),

    #[error("inc must be a non-zero integer")]
    InvalidDelta,

    /// The item reference of a request body did not resolve to a catalog item
    #[error("item not found: {0}")]
    ItemNotFound(String),

    #[error("chest not found: {0}")]
    ChestNotFound(ChestId),

    #[error("migration target chest not found: {0}")]
    MigrationTargetNotFound(ChestId),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    /// Insufficient quantity to perform a withdrawal
    #[error("insufficient quantity: have {have}, need {need}")]
    InsufficientQuantity { have: i64, need: i64 },

    /// A non-empty chest can only be deleted with an explicit migration target or confirmation
    #[error("chest is not empty ({item_count} entries): choose a migration target or confirm the deletion")]
    RequiresDecision { item_count: usize, candidates: Vec<ChestRef> },

    /// Migrating a non-empty chest still needs `confirmed`
    #[error("chest is not empty ({item_count} entries): confirm the migration")]
    RequiresConfirmation { item_count: usize, migrate_to: Option<ChestId> },

    #[error("not logged in")]
    NotLoggedIn,

    /// Permission is denied
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error(transparent)]
    Infra(#[from] InfraError),

    #[error("internal error: {0}")]
    InternalError(String),
}

#[derive(Debug, Error)]
pub enum ConfigErrorKind {
    #[error("failed to read file: {0}")]
    Read(std::io::Error),

    #[error("failed to parse file: {0}")]
    Parse(toml::de::Error),

    #[error("invalid environment variable {0}: {1}")]
    InvalidEnv(String, String),
}

#[derive(Debug, Error)]
pub enum InfraError {
    #[error(transparent)]
    Db(#[from] DbError),

    #[error("invalid configuration in {path}: {source}")]
    Config {
        path: std::path::PathBuf,
        #[source]
        source: ConfigErrorKind,
    },

    #[error("invalid environment: {0}")]
    Env(ConfigErrorKind),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),
}
