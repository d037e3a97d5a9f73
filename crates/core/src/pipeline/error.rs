//! Pipeline error types.

use scribe_shared::AppError;
use scribe_shared::types::{ImageId, PostId, TopicId};
use thiserror::Error;

use crate::content::ContentError;
use crate::storage::StorageError;

/// Errors raised by post orchestration and the image workers.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Post not found (or not in the expected deletion state).
    #[error("post not found: {0}")]
    PostNotFound(PostId),

    /// Image row not found.
    #[error("image not found: {0}")]
    ImageNotFound(ImageId),

    /// Topic not found or soft-deleted.
    #[error("topic not found: {0}")]
    TopicNotFound(TopicId),

    /// Unique constraint conflict (e.g. slug already taken).
    #[error("conflict: {0}")]
    Conflict(String),

    /// Invalid input, including rejected inline images.
    #[error("validation error: {0}")]
    Validation(String),

    /// Object storage operation failed.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Staging store operation failed.
    #[error("staging store error: {0}")]
    Staging(String),

    /// Job channel operation failed.
    #[error("job channel error: {0}")]
    Channel(String),

    /// Repository operation failed.
    #[error("repository error: {0}")]
    Repository(String),
}

impl PipelineError {
    /// Create a conflict error.
    #[must_use]
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    /// Create a validation error.
    #[must_use]
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a staging store error.
    #[must_use]
    pub fn staging(msg: impl Into<String>) -> Self {
        Self::Staging(msg.into())
    }

    /// Create a job channel error.
    #[must_use]
    pub fn channel(msg: impl Into<String>) -> Self {
        Self::Channel(msg.into())
    }

    /// Create a repository error.
    #[must_use]
    pub fn repository(msg: impl Into<String>) -> Self {
        Self::Repository(msg.into())
    }

    /// Whether redelivering the job cannot succeed.
    ///
    /// Consumers acknowledge permanent failures and leave transient ones
    /// pending for redelivery.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        match self {
            Self::PostNotFound(_)
            | Self::ImageNotFound(_)
            | Self::TopicNotFound(_)
            | Self::Conflict(_)
            | Self::Validation(_) => true,
            Self::Storage(err) => err.is_permanent(),
            Self::Staging(_) | Self::Channel(_) | Self::Repository(_) => false,
        }
    }
}

impl From<ContentError> for PipelineError {
    fn from(err: ContentError) -> Self {
        Self::Validation(err.to_string())
    }
}

impl From<PipelineError> for AppError {
    fn from(err: PipelineError) -> Self {
        match err {
            PipelineError::PostNotFound(id) => AppError::not_found(format!("post {id}")),
            PipelineError::ImageNotFound(id) => AppError::not_found(format!("image {id}")),
            PipelineError::TopicNotFound(id) => AppError::not_found(format!("topic {id}")),
            PipelineError::Conflict(msg) => AppError::Conflict(msg),
            PipelineError::Validation(msg) => AppError::Validation(msg),
            PipelineError::Storage(err) if err.is_permanent() => {
                AppError::Validation(err.to_string())
            }
            PipelineError::Storage(err) => AppError::ExternalService(err.to_string()),
            PipelineError::Staging(msg) | PipelineError::Channel(msg) => {
                AppError::ExternalService(msg)
            }
            PipelineError::Repository(msg) => AppError::Database(msg),
        }
    }
}
