//! Post use cases that drive the image pipeline.

use std::sync::Arc;

use chrono::Utc;
use scribe_shared::types::{PostId, TopicId, UserId};
use tracing::{debug, info};

use super::policy::ImagePolicy;
use super::types::{CreatePostInput, Post, PostSubmission, UpdatePostInput};
use crate::content::{extract_images, slugify};
use crate::image::{Image, ImagePlan, plan_images};
use crate::pipeline::ports::{JobPublisher, LockedPost, PostStore, PostUpdate, StagingStore};
use crate::pipeline::{DeleteJob, PipelineError, PipelineSettings, UploadJob};

/// Creates, edits, and removes posts, submitting image jobs for each edit.
///
/// Every edit is persisted (post and image rows) before any job is published.
pub struct PostService<S, K, J> {
    store: Arc<S>,
    staging: Arc<K>,
    jobs: Arc<J>,
    settings: PipelineSettings,
    policy: ImagePolicy,
    folder: String,
}

impl<S, K, J> PostService<S, K, J>
where
    S: PostStore,
    K: StagingStore,
    J: JobPublisher,
{
    /// Create a new post service.
    #[must_use]
    pub fn new(
        store: Arc<S>,
        staging: Arc<K>,
        jobs: Arc<J>,
        settings: PipelineSettings,
        policy: ImagePolicy,
        folder: impl Into<String>,
    ) -> Self {
        Self {
            store,
            staging,
            jobs,
            settings,
            policy,
            folder: folder.into(),
        }
    }

    /// Create a post and schedule uploads for its inline images.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Topic does not exist or is deleted
    /// - Title yields an empty or already-used slug
    /// - An inline image is malformed, not allowed, or too large
    /// - Persistence, staging, or publishing fails
    pub async fn create_post(&self, input: CreatePostInput) -> Result<PostSubmission, PipelineError> {
        self.require_topic(input.topic_id).await?;

        let slug = self.available_slug(&input.title, None).await?;
        let sources = extract_images(&input.content)?;

        let now = Utc::now();
        let mut post = Post {
            id: PostId::new(),
            title: input.title,
            slug,
            content: input.content,
            topic_id: input.topic_id,
            is_published: false,
            published_at: None,
            is_deleted: false,
            created_by: input.user_id,
            updated_by: input.user_id,
            created_at: now,
            updated_at: now,
        };
        post.set_published(input.published, now);

        let plan = plan_images(post.id, &[], sources);
        self.check_uploads(&plan)?;

        let new_images: Vec<_> = plan.uploads.iter().map(|u| u.image.clone()).collect();
        self.store.insert_post(&post, &new_images).await?;
        info!(post_id = %post.id, images = new_images.len(), "post created");

        let pending_uploads = plan.upload_count();
        if pending_uploads > 0 {
            self.submit_uploads(&post, input.user_id, &plan).await?;
        }

        Ok(PostSubmission {
            post,
            pending_uploads,
            orphaned: 0,
        })
    }

    /// Update a post.
    ///
    /// The post row stays locked from read to write, so content rewritten by
    /// an upload worker is never overwritten by a stale copy. When content is
    /// given, its images are diffed against the stored set: kept images are
    /// repositioned, inline images are scheduled for upload, and orphaned
    /// images are removed with a delete job for their file. The pending
    /// counter is reset to the number of new uploads, even zero.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Post does not exist
    /// - New topic does not exist or is deleted
    /// - New title yields an empty or already-used slug
    /// - An inline image is malformed, not allowed, or too large
    /// - Persistence, staging, or publishing fails
    pub async fn update_post(
        &self,
        post_id: PostId,
        user_id: UserId,
        input: UpdatePostInput,
    ) -> Result<PostSubmission, PipelineError> {
        let lock = self
            .store
            .lock_post(post_id)
            .await?
            .ok_or(PipelineError::PostNotFound(post_id))?;
        let mut post = lock.post().clone();

        if let Some(topic_id) = input.topic_id.filter(|t| *t != post.topic_id) {
            self.require_topic(topic_id).await?;
            post.topic_id = topic_id;
        }

        if let Some(title) = input.title.filter(|t| *t != post.title) {
            post.slug = self.available_slug(&title, Some(post_id)).await?;
            post.title = title;
        }

        let now = Utc::now();
        if let Some(published) = input.published {
            post.set_published(published, now);
        }

        let plan = match input.content {
            Some(content) => {
                let existing = lock.images().await?;
                let plan = plan_images(post_id, &existing, extract_images(&content)?);
                self.check_uploads(&plan)?;
                post.content = content;
                Some(plan)
            }
            None => None,
        };

        post.updated_by = user_id;
        post.updated_at = now;

        let Some(plan) = plan else {
            lock.apply_update(PostUpdate {
                post: post.clone(),
                content_changed: false,
                placements: Vec::new(),
                created: Vec::new(),
                removed: Vec::new(),
            })
            .await?;
            debug!(post_id = %post_id, "post updated without content change");
            return Ok(PostSubmission {
                post,
                pending_uploads: 0,
                orphaned: 0,
            });
        };

        lock.apply_update(PostUpdate {
            post: post.clone(),
            content_changed: true,
            placements: plan.keep.clone(),
            created: plan.uploads.iter().map(|u| u.image.clone()).collect(),
            removed: plan.orphans.iter().map(|img| img.id).collect(),
        })
        .await?;
        info!(
            post_id = %post_id,
            kept = plan.keep.len(),
            added = plan.upload_count(),
            orphaned = plan.orphans.len(),
            "post updated"
        );

        self.publish_deletes(&plan.orphans).await?;
        self.submit_uploads(&post, user_id, &plan).await?;

        Ok(PostSubmission {
            post,
            pending_uploads: plan.upload_count(),
            orphaned: plan.orphans.len(),
        })
    }

    /// Permanently delete a soft-deleted post and schedule removal of its files.
    ///
    /// Returns the number of delete jobs published.
    ///
    /// # Errors
    ///
    /// Returns an error if the post is not soft-deleted, or if persistence or
    /// publishing fails.
    pub async fn delete_post_permanently(&self, post_id: PostId) -> Result<usize, PipelineError> {
        self.store
            .find_deleted_post(post_id)
            .await?
            .ok_or(PipelineError::PostNotFound(post_id))?;

        let images = self.store.list_images(post_id).await?;
        self.store.delete_post(post_id).await?;

        let published = self.publish_deletes(&images).await?;
        info!(post_id = %post_id, files = published, "post permanently deleted");
        Ok(published)
    }

    async fn require_topic(&self, topic_id: TopicId) -> Result<(), PipelineError> {
        match self.store.find_topic(topic_id).await? {
            Some(topic) if !topic.is_deleted => Ok(()),
            _ => Err(PipelineError::TopicNotFound(topic_id)),
        }
    }

    async fn available_slug(
        &self,
        title: &str,
        exclude: Option<PostId>,
    ) -> Result<String, PipelineError> {
        let slug = slugify(title);
        if slug.is_empty() {
            return Err(PipelineError::validation(
                "title must contain at least one letter or digit",
            ));
        }
        if self.store.slug_exists(&slug, exclude).await? {
            return Err(PipelineError::conflict(format!(
                "slug '{slug}' already exists"
            )));
        }
        Ok(slug)
    }

    fn check_uploads(&self, plan: &ImagePlan) -> Result<(), PipelineError> {
        plan.uploads
            .iter()
            .try_for_each(|upload| self.policy.check(&upload.inline))
    }

    /// Seed the pending counter, then stage and publish each upload.
    async fn submit_uploads(
        &self,
        post: &Post,
        user_id: UserId,
        plan: &ImagePlan,
    ) -> Result<(), PipelineError> {
        let keys = &self.settings.keys;
        let total = plan.upload_count();

        self.staging
            .set(
                &keys.pending_counter(post.id),
                &total.to_string(),
                self.settings.counter_ttl,
            )
            .await?;

        for upload in &plan.uploads {
            let image = &upload.image;
            self.staging
                .set(
                    &keys.staged_payload(image.id),
                    &upload.inline.src,
                    self.settings.staging_ttl,
                )
                .await?;

            let job = UploadJob {
                image_id: image.id,
                file_name: format!(
                    "{}-{}_{}.{}",
                    post.slug, image.id, image.sort_order, upload.inline.extension
                ),
                folder: self.folder.clone(),
                payload: upload.inline.data.clone(),
                post_id: post.id,
                user_id,
                total_images: total,
            };
            self.jobs.publish_upload(&job).await?;
            debug!(post_id = %post.id, image_id = %image.id, "upload job published");
        }

        Ok(())
    }

    async fn publish_deletes(&self, images: &[Image]) -> Result<usize, PipelineError> {
        let mut published = 0;
        for image in images {
            let Some(file_id) = &image.file_id else {
                continue;
            };
            self.jobs
                .publish_delete(&DeleteJob {
                    file_id: file_id.clone(),
                    url: image.url.clone(),
                })
                .await?;
            published += 1;
        }
        Ok(published)
    }
}
