//! Collaborator traits implemented by the db, queue, and storage layers.

use std::future::Future;
use std::time::Duration;

use scribe_shared::types::{ImageId, PostId, TopicId};
use serde::de::DeserializeOwned;

use super::error::PipelineError;
use super::messages::{DeleteJob, ImagesCompleted, UploadJob};
use crate::image::{Image, ImagePlacement, NewImage};
use crate::post::{Post, Topic};
use crate::storage::StorageError;

/// Short-lived key/value store for staged payloads and pending counters.
pub trait StagingStore: Send + Sync {
    /// Set `key` to `value`, expiring after `ttl`.
    fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<(), PipelineError>> + Send;

    /// Set `key` only if absent. Returns `true` when this call created it.
    fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool, PipelineError>> + Send;

    /// Get the value at `key`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>, PipelineError>> + Send;

    /// Atomically decrement an existing counter, keeping its TTL.
    ///
    /// Returns `None` when the counter does not exist (never seeded or expired).
    fn decrement(
        &self,
        key: &str,
    ) -> impl Future<Output = Result<Option<i64>, PipelineError>> + Send;

    /// Delete `key`. Deleting a missing key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<(), PipelineError>> + Send;

    /// Check whether `key` exists.
    fn exists(&self, key: &str) -> impl Future<Output = Result<bool, PipelineError>> + Send;
}

/// Publisher side of the job channel.
pub trait JobPublisher: Send + Sync {
    /// Publish an upload job.
    fn publish_upload(
        &self,
        job: &UploadJob,
    ) -> impl Future<Output = Result<(), PipelineError>> + Send;

    /// Publish a delete job.
    fn publish_delete(
        &self,
        job: &DeleteJob,
    ) -> impl Future<Output = Result<(), PipelineError>> + Send;

    /// Publish the completion event of a post edit.
    fn publish_completed(
        &self,
        event: &ImagesCompleted,
    ) -> impl Future<Output = Result<(), PipelineError>> + Send;
}

/// Location of an uploaded object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    /// Object storage file ID.
    pub file_id: String,
    /// Public URL.
    pub url: String,
}

/// External object storage.
pub trait ObjectStorage: Send + Sync {
    /// Decode and store a base64 payload as `folder/file_name`.
    fn upload(
        &self,
        payload: &str,
        file_name: &str,
        folder: &str,
    ) -> impl Future<Output = Result<UploadedFile, StorageError>> + Send;

    /// Delete a stored file. Deleting a missing file is not an error.
    fn delete(&self, file_id: &str) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Purge any cached copy of `url`.
    fn purge_cache(&self, url: &str) -> impl Future<Output = Result<(), StorageError>> + Send;
}

/// Changes of one post edit, applied atomically under the post row lock.
#[derive(Debug, Clone)]
pub struct PostUpdate {
    /// Post with its new fields.
    pub post: Post,
    /// Whether `post.content` is written. Left untouched otherwise.
    pub content_changed: bool,
    /// New positions of kept images.
    pub placements: Vec<ImagePlacement>,
    /// Rows for new inline images.
    pub created: Vec<NewImage>,
    /// Rows of orphaned images.
    pub removed: Vec<ImageId>,
}

/// A post row held under an exclusive lock.
///
/// Dropping the handle without committing also releases the lock.
pub trait LockedPost: Send + Sync {
    /// Post as of lock acquisition.
    fn post(&self) -> &Post;

    /// Post content as of lock acquisition.
    fn content(&self) -> &str {
        &self.post().content
    }

    /// List the post's images, ordered by sort order, holding their rows
    /// until the lock is released.
    fn images(&self) -> impl Future<Output = Result<Vec<Image>, PipelineError>> + Send;

    /// Persist new content and release the lock.
    fn commit(self, content: String) -> impl Future<Output = Result<(), PipelineError>> + Send;

    /// Apply an edit (post fields, image placements, inserts, and removals)
    /// and release the lock.
    fn apply_update(
        self,
        update: PostUpdate,
    ) -> impl Future<Output = Result<(), PipelineError>> + Send;

    /// Release the lock without writing.
    fn release(self) -> impl Future<Output = Result<(), PipelineError>> + Send;
}

/// Post, topic, and image persistence.
pub trait PostStore: Send + Sync {
    /// Lock handle returned by [`PostStore::lock_post`].
    type Lock: LockedPost;

    /// Find a topic by ID, including soft-deleted topics.
    fn find_topic(
        &self,
        id: TopicId,
    ) -> impl Future<Output = Result<Option<Topic>, PipelineError>> + Send;

    /// Check whether a slug is used by any post other than `exclude`.
    fn slug_exists(
        &self,
        slug: &str,
        exclude: Option<PostId>,
    ) -> impl Future<Output = Result<bool, PipelineError>> + Send;

    /// Find a post that is not soft-deleted.
    fn find_post(
        &self,
        id: PostId,
    ) -> impl Future<Output = Result<Option<Post>, PipelineError>> + Send;

    /// Find a post that is soft-deleted.
    fn find_deleted_post(
        &self,
        id: PostId,
    ) -> impl Future<Output = Result<Option<Post>, PipelineError>> + Send;

    /// List a post's images ordered by sort order.
    fn list_images(
        &self,
        post_id: PostId,
    ) -> impl Future<Output = Result<Vec<Image>, PipelineError>> + Send;

    /// Insert a post together with its image rows.
    fn insert_post(
        &self,
        post: &Post,
        images: &[NewImage],
    ) -> impl Future<Output = Result<(), PipelineError>> + Send;

    /// Record the stored location of an image. Returns `false` if the row is gone.
    fn set_image_location(
        &self,
        id: ImageId,
        file_id: &str,
        url: &str,
    ) -> impl Future<Output = Result<bool, PipelineError>> + Send;

    /// Lock a non-deleted post row exclusively.
    fn lock_post(
        &self,
        id: PostId,
    ) -> impl Future<Output = Result<Option<Self::Lock>, PipelineError>> + Send;

    /// Hard-delete a post and its images.
    fn delete_post(&self, id: PostId) -> impl Future<Output = Result<(), PipelineError>> + Send;
}

/// Processes one decoded job from a channel lane.
pub trait JobHandler: Send + Sync {
    /// Job message type.
    type Job: DeserializeOwned + Send;

    /// Handle one job.
    fn handle(&self, job: Self::Job) -> impl Future<Output = Result<(), PipelineError>> + Send;
}
