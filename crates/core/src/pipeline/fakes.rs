//! In-memory collaborators for pipeline and post tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use scribe_shared::types::{ImageId, PostId, TopicId, UserId};
use tokio::sync::OwnedMutexGuard;
use tokio::task::JoinHandle;

use super::error::PipelineError;
use super::messages::{DeleteJob, ImagesCompleted, UploadJob};
use super::ports::{
    JobPublisher, LockedPost, ObjectStorage, PostStore, PostUpdate, StagingStore, UploadedFile,
};
use super::{MemoryStagingStore, PipelineSettings, UploadOutcome, UploadWorker};
use crate::image::{Image, NewImage};
use crate::post::{CreatePostInput, ImagePolicy, Post, PostService, PostSubmission, Topic};
use crate::storage::StorageError;

#[derive(Default)]
struct State {
    topics: Mutex<HashMap<TopicId, Topic>>,
    posts: Mutex<HashMap<PostId, Post>>,
    images: Mutex<HashMap<ImageId, Image>>,
    row_locks: Mutex<HashMap<PostId, Arc<tokio::sync::Mutex<()>>>>,
    failing_commits: AtomicUsize,
}

impl State {
    fn row_lock(&self, id: PostId) -> Arc<tokio::sync::Mutex<()>> {
        self.row_locks
            .lock()
            .expect("row locks")
            .entry(id)
            .or_default()
            .clone()
    }

    fn images_of(&self, post_id: PostId) -> Vec<Image> {
        let mut images: Vec<_> = self
            .images
            .lock()
            .expect("images")
            .values()
            .filter(|img| img.post_id == post_id)
            .cloned()
            .collect();
        images.sort_by_key(|img| img.sort_order);
        images
    }
}

/// Post store with one mutex per post standing in for the row lock.
#[derive(Clone, Default)]
pub(crate) struct InMemoryPostStore {
    state: Arc<State>,
}

impl InMemoryPostStore {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn add_topic(&self, name: &str) -> TopicId {
        let topic = Topic {
            id: TopicId::new(),
            name: name.to_string(),
            is_deleted: false,
        };
        let id = topic.id;
        self.state.topics.lock().expect("topics").insert(id, topic);
        id
    }

    pub(crate) fn delete_topic(&self, id: TopicId) {
        if let Some(topic) = self.state.topics.lock().expect("topics").get_mut(&id) {
            topic.is_deleted = true;
        }
    }

    pub(crate) fn post(&self, id: PostId) -> Option<Post> {
        self.state.posts.lock().expect("posts").get(&id).cloned()
    }

    pub(crate) fn soft_delete(&self, id: PostId) {
        if let Some(post) = self.state.posts.lock().expect("posts").get_mut(&id) {
            post.is_deleted = true;
        }
    }

    pub(crate) fn image(&self, id: ImageId) -> Option<Image> {
        self.state.images.lock().expect("images").get(&id).cloned()
    }

    pub(crate) fn images_of(&self, post_id: PostId) -> Vec<Image> {
        self.state.images_of(post_id)
    }

    pub(crate) fn remove_image(&self, id: ImageId) {
        self.state.images.lock().expect("images").remove(&id);
    }

    /// Make the next `n` content commits fail with a repository error.
    pub(crate) fn fail_commits(&self, n: usize) {
        self.state.failing_commits.store(n, Ordering::SeqCst);
    }

    pub(crate) fn seed_image(&self, image: NewImage) {
        self.state.images.lock().expect("images").insert(
            image.id,
            Image {
                id: image.id,
                post_id: image.post_id,
                sort_order: image.sort_order,
                is_thumbnail: image.is_thumbnail,
                file_id: None,
                url: None,
            },
        );
    }
}

/// Exclusive hold on one post.
pub(crate) struct InMemoryLock {
    state: Arc<State>,
    post: Post,
    _guard: OwnedMutexGuard<()>,
}

impl LockedPost for InMemoryLock {
    fn post(&self) -> &Post {
        &self.post
    }

    async fn images(&self) -> Result<Vec<Image>, PipelineError> {
        Ok(self.state.images_of(self.post.id))
    }

    async fn commit(self, content: String) -> Result<(), PipelineError> {
        if take_failure(&self.state.failing_commits) {
            return Err(PipelineError::repository("could not serialize access"));
        }
        let mut posts = self.state.posts.lock().expect("posts");
        let post = posts
            .get_mut(&self.post.id)
            .ok_or(PipelineError::PostNotFound(self.post.id))?;
        post.content = content;
        post.updated_at = Utc::now();
        Ok(())
    }

    async fn apply_update(self, update: PostUpdate) -> Result<(), PipelineError> {
        let PostUpdate {
            mut post,
            content_changed,
            placements,
            created,
            removed,
        } = update;

        let mut posts = self.state.posts.lock().expect("posts");
        let stored = posts
            .get_mut(&post.id)
            .ok_or(PipelineError::PostNotFound(post.id))?;
        if !content_changed {
            post.content = std::mem::take(&mut stored.content);
        }
        post.created_by = stored.created_by;
        post.created_at = stored.created_at;
        *stored = post;
        drop(posts);

        let mut images = self.state.images.lock().expect("images");
        for id in &removed {
            images.remove(id);
        }
        for placement in &placements {
            if let Some(image) = images.get_mut(&placement.image_id) {
                image.sort_order = placement.sort_order;
                image.is_thumbnail = placement.is_thumbnail;
            }
        }
        for image in created {
            images.insert(
                image.id,
                Image {
                    id: image.id,
                    post_id: image.post_id,
                    sort_order: image.sort_order,
                    is_thumbnail: image.is_thumbnail,
                    file_id: None,
                    url: None,
                },
            );
        }
        Ok(())
    }

    async fn release(self) -> Result<(), PipelineError> {
        Ok(())
    }
}

impl PostStore for InMemoryPostStore {
    type Lock = InMemoryLock;

    async fn find_topic(&self, id: TopicId) -> Result<Option<Topic>, PipelineError> {
        Ok(self.state.topics.lock().expect("topics").get(&id).cloned())
    }

    async fn slug_exists(&self, slug: &str, exclude: Option<PostId>) -> Result<bool, PipelineError> {
        Ok(self
            .state
            .posts
            .lock()
            .expect("posts")
            .values()
            .any(|p| p.slug == slug && Some(p.id) != exclude))
    }

    async fn find_post(&self, id: PostId) -> Result<Option<Post>, PipelineError> {
        Ok(self.post(id).filter(|p| !p.is_deleted))
    }

    async fn find_deleted_post(&self, id: PostId) -> Result<Option<Post>, PipelineError> {
        Ok(self.post(id).filter(|p| p.is_deleted))
    }

    async fn list_images(&self, post_id: PostId) -> Result<Vec<Image>, PipelineError> {
        Ok(self.images_of(post_id))
    }

    async fn insert_post(&self, post: &Post, images: &[NewImage]) -> Result<(), PipelineError> {
        self.state
            .posts
            .lock()
            .expect("posts")
            .insert(post.id, post.clone());
        for image in images {
            self.seed_image(image.clone());
        }
        Ok(())
    }

    async fn set_image_location(
        &self,
        id: ImageId,
        file_id: &str,
        url: &str,
    ) -> Result<bool, PipelineError> {
        // Image rows are held by the owning post's lock during an edit.
        let Some(post_id) = self.image(id).map(|img| img.post_id) else {
            return Ok(false);
        };
        let _row = self.state.row_lock(post_id).lock_owned().await;

        let mut images = self.state.images.lock().expect("images");
        let Some(image) = images.get_mut(&id) else {
            return Ok(false);
        };
        image.file_id = Some(file_id.to_string());
        image.url = Some(url.to_string());
        Ok(true)
    }

    async fn lock_post(&self, id: PostId) -> Result<Option<InMemoryLock>, PipelineError> {
        let guard = self.state.row_lock(id).lock_owned().await;
        let Some(post) = self.post(id).filter(|p| !p.is_deleted) else {
            return Ok(None);
        };
        Ok(Some(InMemoryLock {
            state: Arc::clone(&self.state),
            post,
            _guard: guard,
        }))
    }

    async fn delete_post(&self, id: PostId) -> Result<(), PipelineError> {
        self.state.posts.lock().expect("posts").remove(&id);
        self.state
            .images
            .lock()
            .expect("images")
            .retain(|_, img| img.post_id != id);
        Ok(())
    }
}

/// Job publisher that records every message.
#[derive(Default)]
pub(crate) struct RecordingPublisher {
    pub(crate) uploads: Mutex<Vec<UploadJob>>,
    pub(crate) deletes: Mutex<Vec<DeleteJob>>,
    pub(crate) completed: Mutex<Vec<ImagesCompleted>>,
    pub(crate) fail_uploads: AtomicBool,
    /// Number of upcoming completion publishes to fail.
    pub(crate) failing_completed: AtomicUsize,
}

impl RecordingPublisher {
    pub(crate) fn uploads(&self) -> Vec<UploadJob> {
        self.uploads.lock().expect("uploads").clone()
    }

    pub(crate) fn deletes(&self) -> Vec<DeleteJob> {
        self.deletes.lock().expect("deletes").clone()
    }

    pub(crate) fn completed(&self) -> Vec<ImagesCompleted> {
        self.completed.lock().expect("completed").clone()
    }
}

impl JobPublisher for RecordingPublisher {
    async fn publish_upload(&self, job: &UploadJob) -> Result<(), PipelineError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(PipelineError::channel("upload lane unavailable"));
        }
        self.uploads.lock().expect("uploads").push(job.clone());
        Ok(())
    }

    async fn publish_delete(&self, job: &DeleteJob) -> Result<(), PipelineError> {
        self.deletes.lock().expect("deletes").push(job.clone());
        Ok(())
    }

    async fn publish_completed(&self, event: &ImagesCompleted) -> Result<(), PipelineError> {
        if take_failure(&self.failing_completed) {
            return Err(PipelineError::channel("event lane unavailable"));
        }
        self.completed.lock().expect("completed").push(event.clone());
        Ok(())
    }
}

/// Object storage that keeps files in a map.
#[derive(Default)]
pub(crate) struct FakeStorage {
    pub(crate) files: Mutex<HashMap<String, String>>,
    pub(crate) purged: Mutex<Vec<String>>,
    pub(crate) uploads: AtomicUsize,
    pub(crate) fail_uploads: AtomicBool,
}

impl FakeStorage {
    pub(crate) fn has_file(&self, file_id: &str) -> bool {
        self.files.lock().expect("files").contains_key(file_id)
    }

    pub(crate) fn purged(&self) -> Vec<String> {
        self.purged.lock().expect("purged").clone()
    }
}

impl ObjectStorage for FakeStorage {
    async fn upload(
        &self,
        payload: &str,
        file_name: &str,
        folder: &str,
    ) -> Result<UploadedFile, StorageError> {
        if self.fail_uploads.load(Ordering::SeqCst) {
            return Err(StorageError::operation("connection reset"));
        }
        self.uploads.fetch_add(1, Ordering::SeqCst);
        let file_id = format!("{folder}/{file_name}");
        self.files
            .lock()
            .expect("files")
            .insert(file_id.clone(), payload.to_string());
        Ok(UploadedFile {
            url: format!("https://cdn.test/{file_id}"),
            file_id,
        })
    }

    async fn delete(&self, file_id: &str) -> Result<(), StorageError> {
        self.files.lock().expect("files").remove(file_id);
        Ok(())
    }

    async fn purge_cache(&self, url: &str) -> Result<(), StorageError> {
        self.purged.lock().expect("purged").push(url.to_string());
        Ok(())
    }
}

/// Staging store that can fail selected operations.
#[derive(Default)]
pub(crate) struct FlakyStaging {
    inner: MemoryStagingStore,
    /// Number of upcoming decrements to fail.
    pub(crate) failing_decrements: AtomicUsize,
    /// Key whose next delete fails.
    pub(crate) failing_delete: Mutex<Option<String>>,
}

impl FlakyStaging {
    pub(crate) fn fail_delete_of(&self, key: String) {
        *self.failing_delete.lock().expect("failing delete") = Some(key);
    }
}

impl StagingStore for FlakyStaging {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<(), PipelineError> {
        self.inner.set(key, value, ttl).await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, PipelineError> {
        self.inner.set_if_absent(key, value, ttl).await
    }

    async fn get(&self, key: &str) -> Result<Option<String>, PipelineError> {
        self.inner.get(key).await
    }

    async fn decrement(&self, key: &str) -> Result<Option<i64>, PipelineError> {
        if take_failure(&self.failing_decrements) {
            return Err(PipelineError::staging("connection refused"));
        }
        self.inner.decrement(key).await
    }

    async fn delete(&self, key: &str) -> Result<(), PipelineError> {
        {
            let mut failing = self.failing_delete.lock().expect("failing delete");
            if failing.as_deref() == Some(key) {
                *failing = None;
                return Err(PipelineError::staging("connection refused"));
            }
        }
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &str) -> Result<bool, PipelineError> {
        self.inner.exists(key).await
    }
}

/// Post store that starts an upload job in the middle of a post edit.
///
/// The job is spawned on the edit's first slug check, which runs while the
/// edit holds the post lock.
pub(crate) struct MidEditStore {
    inner: Arc<InMemoryPostStore>,
    pending: Mutex<Option<(HarnessWorker, UploadJob)>>,
    running: Mutex<Option<JoinHandle<Result<UploadOutcome, PipelineError>>>>,
}

impl MidEditStore {
    pub(crate) fn new(inner: Arc<InMemoryPostStore>, worker: HarnessWorker, job: UploadJob) -> Self {
        Self {
            inner,
            pending: Mutex::new(Some((worker, job))),
            running: Mutex::new(None),
        }
    }

    /// Wait for the spawned job.
    pub(crate) async fn finish(&self) -> Result<UploadOutcome, PipelineError> {
        let handle = self
            .running
            .lock()
            .expect("running")
            .take()
            .expect("job started during the edit");
        handle.await.expect("join")
    }
}

impl PostStore for MidEditStore {
    type Lock = InMemoryLock;

    async fn find_topic(&self, id: TopicId) -> Result<Option<Topic>, PipelineError> {
        self.inner.find_topic(id).await
    }

    async fn slug_exists(&self, slug: &str, exclude: Option<PostId>) -> Result<bool, PipelineError> {
        let pending = self.pending.lock().expect("pending").take();
        if let Some((worker, job)) = pending {
            let handle = tokio::spawn(async move { worker.process(&job).await });
            *self.running.lock().expect("running") = Some(handle);
            for _ in 0..16 {
                tokio::task::yield_now().await;
            }
        }
        self.inner.slug_exists(slug, exclude).await
    }

    async fn find_post(&self, id: PostId) -> Result<Option<Post>, PipelineError> {
        self.inner.find_post(id).await
    }

    async fn find_deleted_post(&self, id: PostId) -> Result<Option<Post>, PipelineError> {
        self.inner.find_deleted_post(id).await
    }

    async fn list_images(&self, post_id: PostId) -> Result<Vec<Image>, PipelineError> {
        self.inner.list_images(post_id).await
    }

    async fn insert_post(&self, post: &Post, images: &[NewImage]) -> Result<(), PipelineError> {
        self.inner.insert_post(post, images).await
    }

    async fn set_image_location(
        &self,
        id: ImageId,
        file_id: &str,
        url: &str,
    ) -> Result<bool, PipelineError> {
        self.inner.set_image_location(id, file_id, url).await
    }

    async fn lock_post(&self, id: PostId) -> Result<Option<InMemoryLock>, PipelineError> {
        self.inner.lock_post(id).await
    }

    async fn delete_post(&self, id: PostId) -> Result<(), PipelineError> {
        self.inner.delete_post(id).await
    }
}

/// Upload worker over the harness collaborators.
pub(crate) type HarnessWorker =
    UploadWorker<InMemoryPostStore, FlakyStaging, RecordingPublisher, FakeStorage>;

/// Wires the in-memory collaborators into a service and workers.
pub(crate) struct Harness {
    pub(crate) store: Arc<InMemoryPostStore>,
    pub(crate) staging: Arc<FlakyStaging>,
    pub(crate) jobs: Arc<RecordingPublisher>,
    pub(crate) storage: Arc<FakeStorage>,
    pub(crate) settings: PipelineSettings,
}

impl Harness {
    pub(crate) fn new() -> Self {
        Self {
            store: Arc::new(InMemoryPostStore::new()),
            staging: Arc::new(FlakyStaging::default()),
            jobs: Arc::new(RecordingPublisher::default()),
            storage: Arc::new(FakeStorage::default()),
            settings: PipelineSettings::default(),
        }
    }

    pub(crate) fn service(&self) -> PostService<InMemoryPostStore, FlakyStaging, RecordingPublisher> {
        self.service_with(Arc::clone(&self.store))
    }

    /// Post service over a different post store.
    pub(crate) fn service_with<S: PostStore>(
        &self,
        store: Arc<S>,
    ) -> PostService<S, FlakyStaging, RecordingPublisher> {
        PostService::new(
            store,
            Arc::clone(&self.staging),
            Arc::clone(&self.jobs),
            self.settings.clone(),
            ImagePolicy::default(),
            "posts",
        )
    }

    pub(crate) fn worker(&self) -> HarnessWorker {
        UploadWorker::new(
            Arc::clone(&self.store),
            Arc::clone(&self.staging),
            Arc::clone(&self.jobs),
            Arc::clone(&self.storage),
            self.settings.clone(),
        )
    }

    pub(crate) async fn create(&self, title: &str, content: &str) -> PostSubmission {
        let topic_id = self.store.add_topic("general");
        self.service()
            .create_post(CreatePostInput {
                title: title.to_string(),
                content: content.to_string(),
                topic_id,
                published: false,
                user_id: UserId::new(),
            })
            .await
            .expect("post created")
    }

    pub(crate) async fn counter(&self, post_id: PostId) -> Option<String> {
        self.staging
            .get(&self.settings.keys.pending_counter(post_id))
            .await
            .expect("staging get")
    }
}

/// Claim one of the remaining injected failures.
fn take_failure(remaining: &AtomicUsize) -> bool {
    remaining
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// HTML with one inline image per payload, in order.
pub(crate) fn inline_content(payloads: &[&str]) -> String {
    payloads
        .iter()
        .map(|p| format!(r#"<p>{p}</p><img src="data:image/png;base64,{p}">"#))
        .collect()
}
