//! Error taxonomy for the ledger core.
//!
//! [`StoreError`] covers the persistence layer; [`CoreError`] is the public
//! error type surfaced by the credential, ingestor and settlement modules,
//! with one variant per business error kind.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database connection error: {0}")]
    Connection(#[from] r2d2::Error),

    #[error("database execution error: {0}")]
    Rusqlite(#[from] rusqlite::Error),

    #[error("migration error: {0}")]
    Migration(#[from] rusqlite_migration::Error),

    #[error("serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found")]
    NotFound,

    #[error("unique constraint violated: {0}")]
    UniqueViolation(String),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("no credentials provided")]
    NoCredentialsProvided,

    #[error("invalid username")]
    InvalidUsername,

    #[error("invalid password")]
    InvalidPassword,

    #[error("account lookup failed: {0}")]
    BadAccountLookup(StoreError),

    #[error("username already taken")]
    SignUpUsernameTaken,

    #[error("could not allocate a deposit wallet")]
    AccountCreate,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("account is inactive")]
    AccountInactive,

    #[error("settle failed: no matching row")]
    SettleFailed,

    #[error("deposit ingestion failed fatally: {0}")]
    DepositIngestFatal(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

pub type CoreResult<T> = Result<T, CoreError>;
