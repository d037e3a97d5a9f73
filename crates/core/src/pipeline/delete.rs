//! Delete worker for orphaned files.

use std::sync::Arc;

use tracing::{debug, instrument};

use super::error::PipelineError;
use super::messages::DeleteJob;
use super::ports::{JobHandler, ObjectStorage};

/// Consumes [`DeleteJob`]s.
pub struct DeleteWorker<O> {
    storage: Arc<O>,
}

impl<O: ObjectStorage> DeleteWorker<O> {
    /// Create a new delete worker.
    #[must_use]
    pub fn new(storage: Arc<O>) -> Self {
        Self { storage }
    }

    /// Delete the file and purge its cached copy.
    ///
    /// Deleting an already-absent file succeeds.
    ///
    /// # Errors
    ///
    /// Returns an error if object storage or the cache purge fails.
    #[instrument(skip_all, fields(file_id = %job.file_id))]
    pub async fn process(&self, job: &DeleteJob) -> Result<(), PipelineError> {
        self.storage.delete(&job.file_id).await?;
        if let Some(url) = &job.url {
            self.storage.purge_cache(url).await?;
        }
        debug!("orphaned file removed");
        Ok(())
    }
}

impl<O: ObjectStorage> JobHandler for DeleteWorker<O> {
    type Job = DeleteJob;

    async fn handle(&self, job: DeleteJob) -> Result<(), PipelineError> {
        self.process(&job).await
    }
}
