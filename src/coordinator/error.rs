use crate::job::JobId;
use crate::store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoordinatorError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Transfer not found: {0}")]
    TransferNotFound(JobId),

    #[error("Transfer {0} is still running")]
    TransferActive(JobId),

    #[error("Persistence error: {0}")]
    Persistence(StoreError),
}

impl From<StoreError> for CoordinatorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => CoordinatorError::TransferNotFound(id),
            other => CoordinatorError::Persistence(other),
        }
    }
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
