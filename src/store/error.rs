use crate::job::{JobId, UnknownVariant};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Transfer job not found: {0}")]
    NotFound(JobId),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Corrupt row: {0}")]
    Corrupt(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        StoreError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

impl From<UnknownVariant> for StoreError {
    fn from(err: UnknownVariant) -> Self {
        StoreError::Corrupt(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
