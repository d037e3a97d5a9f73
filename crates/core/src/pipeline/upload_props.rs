//! Property-based tests for the upload worker.
//!
//! - Any completion order yields the same final content
//! - The pending counter reaches zero exactly once, on the last job

use proptest::prelude::*;

use super::fakes::{Harness, inline_content};

/// Strategy yielding an image count and a processing order over it.
fn completion_order() -> impl Strategy<Value = Vec<usize>> {
    (1usize..6).prop_flat_map(|n| Just((0..n).collect::<Vec<_>>()).prop_shuffle())
}

fn payloads(n: usize) -> Vec<String> {
    (0..n).map(|i| format!("IMG{i}AAAA")).collect()
}

/// Process a fresh post's jobs in `order`; returns the final content with
/// URLs normalized to positions, and the completion flags in order.
fn run(order: &[usize]) -> (String, Vec<bool>) {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("runtime");

    rt.block_on(async {
        let h = Harness::new();
        let payloads = payloads(order.len());
        let refs: Vec<&str> = payloads.iter().map(String::as_str).collect();
        let submission = h.create("Property", &inline_content(&refs)).await;
        let jobs = h.jobs.uploads();
        let worker = h.worker();

        let mut completions = Vec::new();
        for &i in order {
            let outcome = worker.process(&jobs[i]).await.expect("processed");
            completions.push(outcome.completed);
        }

        let mut content = h.store.post(submission.post.id).expect("post").content;
        for (position, job) in jobs.iter().enumerate() {
            let url = h
                .store
                .image(job.image_id)
                .and_then(|img| img.url)
                .expect("url recorded");
            content = content.replace(&url, &format!("url-{position}"));
        }
        (content, completions)
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_content_independent_of_completion_order(order in completion_order()) {
        let in_order: Vec<usize> = (0..order.len()).collect();
        let (expected, _) = run(&in_order);
        let (actual, _) = run(&order);
        prop_assert_eq!(actual, expected);
    }

    #[test]
    fn prop_only_last_job_completes(order in completion_order()) {
        let (_, completions) = run(&order);
        let last = completions.len() - 1;
        for (i, completed) in completions.iter().enumerate() {
            prop_assert_eq!(*completed, i == last);
        }
    }
}
