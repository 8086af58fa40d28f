use thiserror::Error;
use uuid::Uuid;

use crate::jobs::JobQueueError;

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Error taxonomy of the lifecycle engine. Storage and mail failures never
/// show up here: those run behind the job queue and stay in the worker.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("proposal {0} not found")]
    ProposalNotFound(Uuid),

    #[error("client {0} not found")]
    ClientNotFound(Uuid),

    #[error("proposal item {0} not found for proposal {1}")]
    ItemNotFound(Uuid, Uuid),

    #[error("log entry {0} not found for proposal {1}")]
    LogNotFound(Uuid, Uuid),

    #[error("log entry {log_id} cannot be reverted to: {reason}")]
    InvalidSnapshot { log_id: Uuid, reason: String },

    #[error("database error: {0}")]
    Database(#[from] diesel::result::Error),

    #[error("database pool error: {0}")]
    Pool(String),

    #[error(transparent)]
    JobQueue(#[from] JobQueueError),
}

impl ServiceError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            ServiceError::ProposalNotFound(_)
                | ServiceError::ClientNotFound(_)
                | ServiceError::ItemNotFound(_, _)
                | ServiceError::LogNotFound(_, _)
        )
    }

    pub fn is_invalid_snapshot(&self) -> bool {
        matches!(self, ServiceError::InvalidSnapshot { .. })
    }
}
