//! Upload worker: one job stores one image.

use std::sync::Arc;

use tracing::{debug, info, instrument, warn};

use super::PipelineSettings;
use super::error::PipelineError;
use super::messages::{DeleteJob, ImagesCompleted, UploadJob};
use super::ports::{JobHandler, JobPublisher, LockedPost, ObjectStorage, PostStore, StagingStore};
use crate::content::replace_placeholder;

/// What processing one upload job did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct UploadOutcome {
    /// Whether the post content was rewritten with the final URL.
    pub rewritten: bool,
    /// Counter value after the decrement; `None` if the counter was missing
    /// or the decrement was skipped.
    pub remaining: Option<i64>,
    /// Whether this job published the completion event.
    pub completed: bool,
    /// Whether this delivery had already been counted.
    pub duplicate: bool,
}

/// Consumes [`UploadJob`]s.
pub struct UploadWorker<S, K, J, O> {
    store: Arc<S>,
    staging: Arc<K>,
    jobs: Arc<J>,
    storage: Arc<O>,
    settings: PipelineSettings,
}

impl<S, K, J, O> UploadWorker<S, K, J, O>
where
    S: PostStore,
    K: StagingStore,
    J: JobPublisher,
    O: ObjectStorage,
{
    /// Create a new upload worker.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        staging: Arc<K>,
        jobs: Arc<J>,
        storage: Arc<O>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            store,
            staging,
            jobs,
            storage,
            settings,
        }
    }

    /// Process one upload job.
    ///
    /// Re-running a job is safe: the object is overwritten under the same
    /// key, the image row gets the same location, and the pending counter is
    /// only decremented by the first delivery. A delivery that fails after
    /// counting its image gives the count back, so the redelivery can still
    /// publish the completion event.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Object storage rejects or fails the upload
    /// - The image row or post no longer exists (permanent)
    /// - The staging store, repository, or job channel fails
    #[instrument(skip_all, fields(image_id = %job.image_id, post_id = %job.post_id))]
    pub async fn process(&self, job: &UploadJob) -> Result<UploadOutcome, PipelineError> {
        let keys = &self.settings.keys;
        let staged_key = keys.staged_payload(job.image_id);

        let file = self
            .storage
            .upload(&job.payload, &job.file_name, &job.folder)
            .await?;
        debug!(file_id = %file.file_id, "image stored");

        let recorded = self
            .store
            .set_image_location(job.image_id, &file.file_id, &file.url)
            .await?;
        if !recorded {
            // Removed by a later edit while in flight; its file is now an orphan.
            warn!(file_id = %file.file_id, "image row gone, scheduling file delete");
            self.jobs
                .publish_delete(&DeleteJob {
                    file_id: file.file_id,
                    url: Some(file.url),
                })
                .await?;
            self.staging.delete(&staged_key).await?;
            return Err(PipelineError::ImageNotFound(job.image_id));
        }

        let Some(lock) = self.store.lock_post(job.post_id).await? else {
            self.staging.delete(&staged_key).await?;
            return Err(PipelineError::PostNotFound(job.post_id));
        };

        let rewritten = match self.staging.get(&staged_key).await? {
            Some(placeholder) => {
                let (content, replaced) =
                    replace_placeholder(lock.content(), &placeholder, &file.url);
                if replaced == 0 {
                    debug!("placeholder not present in content");
                    lock.release().await?;
                    false
                } else {
                    lock.commit(content).await?;
                    debug!(replaced, "content rewritten");
                    true
                }
            }
            None => {
                warn!("staged payload missing or expired, content left unchanged");
                lock.release().await?;
                false
            }
        };

        let marker = keys.processed_marker(job.image_id);
        let first_delivery = self
            .staging
            .set_if_absent(&marker, "1", self.settings.counter_ttl)
            .await?;
        if !first_delivery {
            warn!("duplicate delivery, pending counter already decremented");
            self.staging.delete(&staged_key).await?;
            return Ok(UploadOutcome {
                rewritten,
                duplicate: true,
                ..UploadOutcome::default()
            });
        }

        let counter_key = keys.pending_counter(job.post_id);
        let remaining = match self.staging.decrement(&counter_key).await {
            Ok(remaining) => remaining,
            Err(err) => {
                self.release_claim(&marker, None).await;
                return Err(err);
            }
        };

        let completed = match remaining {
            Some(0) => {
                let event = ImagesCompleted {
                    service: keys.service().to_string(),
                    user_id: job.user_id,
                    post_id: job.post_id,
                };
                if let Err(err) = self.jobs.publish_completed(&event).await {
                    self.release_claim(&marker, Some(&counter_key)).await;
                    return Err(err);
                }
                if let Err(err) = self.staging.delete(&counter_key).await {
                    warn!(error = %err, "failed to remove pending counter, left to expire");
                }
                info!(total_images = job.total_images, "all images processed");
                true
            }
            Some(n) => {
                debug!(remaining = n, "image processed");
                false
            }
            None => {
                warn!("pending counter missing or expired");
                false
            }
        };

        self.staging.delete(&staged_key).await?;

        Ok(UploadOutcome {
            rewritten,
            remaining,
            completed,
            duplicate: false,
        })
    }

    /// Undo this delivery's claim so a redelivery counts the image again.
    ///
    /// `counter` is restored to one when this delivery had taken it to zero.
    async fn release_claim(&self, marker: &str, counter: Option<&str>) {
        if let Some(counter) = counter {
            if let Err(err) = self.staging.set(counter, "1", self.settings.counter_ttl).await {
                warn!(error = %err, "failed to restore pending counter");
            }
        }
        if let Err(err) = self.staging.delete(marker).await {
            warn!(error = %err, "failed to clear processed marker");
        }
    }
}

impl<S, K, J, O> JobHandler for UploadWorker<S, K, J, O>
where
    S: PostStore,
    K: StagingStore,
    J: JobPublisher,
    O: ObjectStorage,
{
    type Job = UploadJob;

    async fn handle(&self, job: UploadJob) -> Result<(), PipelineError> {
        self.process(&job).await.map(|_| ())
    }
}
