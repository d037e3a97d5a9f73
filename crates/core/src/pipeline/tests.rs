//! Upload and delete worker scenarios against in-memory collaborators.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use super::fakes::{FakeStorage, Harness, inline_content};
use super::ports::{JobHandler, StagingStore};
use super::{DeleteJob, DeleteWorker, PipelineError, UploadJob};
use crate::post::UpdatePostInput;

#[tokio::test]
async fn test_completion_in_reverse_order() {
    let h = Harness::new();
    let submission = h.create("Three images", &inline_content(&["AAAA", "BBBB", "CCCC"])).await;
    let post_id = submission.post.id;
    let jobs = h.jobs.uploads();
    let worker = h.worker();

    let mut outcomes = Vec::new();
    for job in jobs.iter().rev() {
        outcomes.push(worker.process(job).await.expect("job processed"));
    }

    assert_eq!(
        outcomes.iter().map(|o| o.remaining).collect::<Vec<_>>(),
        vec![Some(2), Some(1), Some(0)]
    );
    assert_eq!(
        outcomes.iter().filter(|o| o.completed).count(),
        1,
        "only the last job completes"
    );

    let completed = h.jobs.completed();
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].post_id, post_id);
    assert_eq!(completed[0].user_id, jobs[0].user_id);
    assert_eq!(completed[0].service, "post-service");

    let content = h.store.post(post_id).expect("post").content;
    assert!(!content.contains("data:image"));
    for job in &jobs {
        let image = h.store.image(job.image_id).expect("image row");
        let url = image.url.expect("url recorded");
        assert!(content.contains(&url));
        assert!(image.file_id.is_some());
    }

    assert!(h.counter(post_id).await.is_none(), "counter removed on completion");
    for job in &jobs {
        let staged = h.settings.keys.staged_payload(job.image_id);
        assert!(!h.staging.exists(&staged).await.expect("exists"));
    }
}

#[tokio::test]
async fn test_staging_expired_still_counts() {
    let h = Harness::new();
    let submission = h.create("Expiring", &inline_content(&["AAAA", "BBBB"])).await;
    let post_id = submission.post.id;
    let jobs = h.jobs.uploads();

    // Simulate expiry of the first image's staged payload.
    h.staging
        .delete(&h.settings.keys.staged_payload(jobs[0].image_id))
        .await
        .expect("delete");

    let outcome = h.worker().process(&jobs[0]).await.expect("job processed");

    assert!(!outcome.rewritten);
    assert_eq!(outcome.remaining, Some(1));
    let image = h.store.image(jobs[0].image_id).expect("image row");
    assert!(image.url.is_some());
    assert!(
        h.store
            .post(post_id)
            .expect("post")
            .content
            .contains("data:image/png;base64,AAAA"),
        "placeholder left in place"
    );
}

#[tokio::test]
async fn test_duplicate_delivery_does_not_double_count() {
    let h = Harness::new();
    let submission = h.create("Duplicates", &inline_content(&["AAAA", "BBBB"])).await;
    let jobs = h.jobs.uploads();
    let worker = h.worker();

    let first = worker.process(&jobs[0]).await.expect("first delivery");
    let second = worker.process(&jobs[0]).await.expect("second delivery");

    assert!(!first.duplicate);
    assert!(second.duplicate);
    assert_eq!(h.counter(submission.post.id).await.as_deref(), Some("1"));
    assert!(h.jobs.completed().is_empty());
    assert_eq!(h.storage.uploads.load(Ordering::SeqCst), 2, "upload is re-run");

    let last = worker.process(&jobs[1]).await.expect("last image");
    assert!(last.completed);
    assert_eq!(h.jobs.completed().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_last_two_complete_once() {
    for _ in 0..20 {
        let h = Harness::new();
        h.create("Racing", &inline_content(&["AAAA", "BBBB"])).await;
        let jobs = h.jobs.uploads();
        let worker = Arc::new(h.worker());

        let handles: Vec<_> = jobs
            .into_iter()
            .map(|job| {
                let worker = Arc::clone(&worker);
                tokio::spawn(async move { worker.process(&job).await })
            })
            .collect();

        let mut completed = 0;
        for handle in handles {
            if handle.await.expect("join").expect("processed").completed {
                completed += 1;
            }
        }

        assert_eq!(completed, 1);
        assert_eq!(h.jobs.completed().len(), 1);
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_rewrites_are_not_lost() {
    let h = Harness::new();
    let payloads = ["AAAA", "BBBB", "CCCC", "DDDD", "EEEE", "FFFF"];
    let submission = h.create("Many", &inline_content(&payloads)).await;
    let worker = Arc::new(h.worker());

    let handles: Vec<_> = h
        .jobs
        .uploads()
        .into_iter()
        .map(|job| {
            let worker = Arc::clone(&worker);
            tokio::spawn(async move { worker.process(&job).await })
        })
        .collect();
    for handle in handles {
        handle.await.expect("join").expect("processed");
    }

    let content = h.store.post(submission.post.id).expect("post").content;
    assert!(!content.contains("data:image"), "every placeholder rewritten");
    assert_eq!(h.jobs.completed().len(), 1);
}

#[tokio::test]
async fn test_image_removed_mid_flight_schedules_delete() {
    let h = Harness::new();
    let submission = h.create("Orphan", &inline_content(&["AAAA"])).await;
    let job = h.jobs.uploads().remove(0);

    // A later edit dropped the image before its upload finished.
    h.store.remove_image(job.image_id);

    let err = h.worker().process(&job).await.expect_err("image is gone");
    assert!(matches!(err, PipelineError::ImageNotFound(id) if id == job.image_id));
    assert!(err.is_permanent());

    let deletes = h.jobs.deletes();
    assert_eq!(deletes.len(), 1);
    assert_eq!(deletes[0].file_id, format!("{}/{}", job.folder, job.file_name));
    assert_eq!(h.counter(submission.post.id).await.as_deref(), Some("1"));
}

#[tokio::test]
async fn test_post_gone_is_permanent() {
    let h = Harness::new();
    let submission = h.create("Gone", &inline_content(&["AAAA"])).await;
    let job = h.jobs.uploads().remove(0);
    h.store.soft_delete(submission.post.id);

    let err = h.worker().process(&job).await.expect_err("post is gone");
    assert!(matches!(err, PipelineError::PostNotFound(_)));
    assert!(err.is_permanent());
    assert!(
        !h.staging
            .exists(&h.settings.keys.staged_payload(job.image_id))
            .await
            .expect("exists"),
        "staged payload removed"
    );
}

#[tokio::test]
async fn test_completion_publish_failure_is_retried() {
    let h = Harness::new();
    let submission = h.create("Event lane down", &inline_content(&["AAAA"])).await;
    let post_id = submission.post.id;
    let job = h.jobs.uploads().remove(0);
    h.jobs.failing_completed.store(1, Ordering::SeqCst);

    let err = h.worker().handle(job.clone()).await.expect_err("publish fails");
    assert!(!err.is_permanent());
    assert!(h.jobs.completed().is_empty());
    assert_eq!(h.counter(post_id).await.as_deref(), Some("1"), "count given back");
    assert!(
        !h.staging
            .exists(&h.settings.keys.processed_marker(job.image_id))
            .await
            .expect("exists")
    );

    let outcome = h.worker().process(&job).await.expect("redelivery");
    assert!(outcome.completed);
    assert!(!outcome.duplicate);
    assert_eq!(h.jobs.completed().len(), 1);
    assert!(h.counter(post_id).await.is_none());
}

#[tokio::test]
async fn test_completion_publish_failure_with_other_images_done() {
    let h = Harness::new();
    let submission = h.create("Last one fails", &inline_content(&["AAAA", "BBBB"])).await;
    let jobs = h.jobs.uploads();
    let worker = h.worker();

    worker.process(&jobs[0]).await.expect("first image");
    h.jobs.failing_completed.store(1, Ordering::SeqCst);
    worker.process(&jobs[1]).await.expect_err("publish fails");

    // A late duplicate of the first image must not take the restored count.
    let duplicate = worker.process(&jobs[0]).await.expect("duplicate");
    assert!(duplicate.duplicate);
    assert_eq!(h.counter(submission.post.id).await.as_deref(), Some("1"));

    assert!(worker.process(&jobs[1]).await.expect("redelivery").completed);
    assert_eq!(h.jobs.completed().len(), 1);
}

#[tokio::test]
async fn test_commit_failure_keeps_payload_for_redelivery() {
    let h = Harness::new();
    let submission = h.create("Busy row", &inline_content(&["AAAA"])).await;
    let post_id = submission.post.id;
    let job = h.jobs.uploads().remove(0);
    h.store.fail_commits(1);

    let err = h.worker().process(&job).await.expect_err("commit fails");
    assert!(matches!(err, PipelineError::Repository(_)));
    assert!(!err.is_permanent());
    assert_eq!(h.counter(post_id).await.as_deref(), Some("1"), "not counted");
    assert!(
        h.staging
            .exists(&h.settings.keys.staged_payload(job.image_id))
            .await
            .expect("exists")
    );

    let outcome = h.worker().process(&job).await.expect("redelivery");
    assert!(outcome.rewritten);
    assert!(outcome.completed);
    let url = h.store.image(job.image_id).and_then(|img| img.url).expect("url");
    assert!(h.store.post(post_id).expect("post").content.contains(&url));
    assert_eq!(h.jobs.completed().len(), 1);
}

#[tokio::test]
async fn test_decrement_failure_releases_marker() {
    let h = Harness::new();
    let submission = h.create("Counter down", &inline_content(&["AAAA"])).await;
    let job = h.jobs.uploads().remove(0);
    h.staging.failing_decrements.store(1, Ordering::SeqCst);

    let err = h.worker().process(&job).await.expect_err("decrement fails");
    assert!(matches!(err, PipelineError::Staging(_)));
    assert!(
        !h.staging
            .exists(&h.settings.keys.processed_marker(job.image_id))
            .await
            .expect("exists"),
        "marker released"
    );
    assert_eq!(h.counter(submission.post.id).await.as_deref(), Some("1"));

    let outcome = h.worker().process(&job).await.expect("redelivery");
    assert!(!outcome.duplicate);
    assert!(outcome.completed);
    assert_eq!(h.jobs.completed().len(), 1);
}

#[tokio::test]
async fn test_counter_cleanup_failure_still_completes_once() {
    let h = Harness::new();
    let submission = h.create("Sticky counter", &inline_content(&["AAAA"])).await;
    let post_id = submission.post.id;
    let job = h.jobs.uploads().remove(0);
    h.staging
        .fail_delete_of(h.settings.keys.pending_counter(post_id));

    let outcome = h.worker().process(&job).await.expect("completes");
    assert!(outcome.completed);
    assert_eq!(h.counter(post_id).await.as_deref(), Some("0"), "left to expire");

    let again = h.worker().process(&job).await.expect("redelivery");
    assert!(again.duplicate);
    assert_eq!(h.jobs.completed().len(), 1);
}

#[tokio::test]
async fn test_staged_cleanup_failure_redelivery_is_duplicate() {
    let h = Harness::new();
    h.create("Sticky payload", &inline_content(&["AAAA"])).await;
    let job = h.jobs.uploads().remove(0);
    let staged = h.settings.keys.staged_payload(job.image_id);
    h.staging.fail_delete_of(staged.clone());

    let err = h.worker().process(&job).await.expect_err("cleanup fails");
    assert!(!err.is_permanent());
    assert_eq!(h.jobs.completed().len(), 1);

    let again = h.worker().process(&job).await.expect("redelivery");
    assert!(again.duplicate);
    assert!(!h.staging.exists(&staged).await.expect("exists"));
    assert_eq!(h.jobs.completed().len(), 1);
}

#[tokio::test]
async fn test_storage_failure_is_retryable() {
    let h = Harness::new();
    let submission = h.create("Flaky", &inline_content(&["AAAA"])).await;
    let job = h.jobs.uploads().remove(0);
    h.storage.fail_uploads.store(true, Ordering::SeqCst);

    let err = h.worker().handle(job.clone()).await.expect_err("upload fails");
    assert!(!err.is_permanent());
    assert_eq!(h.counter(submission.post.id).await.as_deref(), Some("1"));
    assert!(
        h.staging
            .exists(&h.settings.keys.staged_payload(job.image_id))
            .await
            .expect("exists"),
        "staged payload kept for redelivery"
    );

    h.storage.fail_uploads.store(false, Ordering::SeqCst);
    h.worker().handle(job).await.expect("redelivery succeeds");
    assert_eq!(h.jobs.completed().len(), 1);
}

#[tokio::test]
async fn test_stale_job_after_edit_does_not_complete_new_edit() {
    let h = Harness::new();
    let submission = h.create("Edited", &inline_content(&["AAAA"])).await;
    let post_id = submission.post.id;
    let stale = h.jobs.uploads().remove(0);

    // Edit replaces the in-flight image with a new one.
    h.service()
        .update_post(
            post_id,
            stale.user_id,
            UpdatePostInput {
                content: Some(inline_content(&["ZZZZ"])),
                ..UpdatePostInput::default()
            },
        )
        .await
        .expect("update");

    let err = h.worker().process(&stale).await.expect_err("stale image");
    assert!(matches!(err, PipelineError::ImageNotFound(_)));
    assert_eq!(h.counter(post_id).await.as_deref(), Some("1"));

    let fresh = h.jobs.uploads().pop().expect("new upload job");
    let outcome = h.worker().process(&fresh).await.expect("fresh image");
    assert!(outcome.completed);
}

#[tokio::test]
async fn test_delete_worker_purges_url() {
    let storage = Arc::new(FakeStorage::default());
    storage
        .files
        .lock()
        .expect("files")
        .insert("posts/a.png".to_string(), "AAAA".to_string());
    let worker = DeleteWorker::new(Arc::clone(&storage));

    worker
        .handle(DeleteJob {
            file_id: "posts/a.png".to_string(),
            url: Some("https://cdn.test/posts/a.png".to_string()),
        })
        .await
        .expect("deleted");

    assert!(!storage.has_file("posts/a.png"));
    assert_eq!(storage.purged(), vec!["https://cdn.test/posts/a.png".to_string()]);

    // Already gone: still succeeds, nothing to purge without a URL.
    worker
        .handle(DeleteJob {
            file_id: "posts/a.png".to_string(),
            url: None,
        })
        .await
        .expect("idempotent delete");
    assert_eq!(storage.purged().len(), 1);
}

#[test]
fn test_upload_job_json_shape() {
    let job = UploadJob {
        image_id: scribe_shared::types::ImageId::new(),
        file_name: "hello-1_1.png".to_string(),
        folder: "posts".to_string(),
        payload: "AAAA".to_string(),
        post_id: scribe_shared::types::PostId::new(),
        user_id: scribe_shared::types::UserId::new(),
        total_images: 3,
    };
    let value = serde_json::to_value(&job).expect("serializable");
    assert_eq!(value["total_images"], 3);
    assert_eq!(value["image_id"], job.image_id.to_string());
    assert_eq!(value["file_name"], "hello-1_1.png");
}
