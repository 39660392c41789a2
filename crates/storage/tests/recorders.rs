//! Runs the conformance suite against every bundled recorder.

use settle_storage::conformance::run_conformance_suite;
use settle_storage::{EpisodeFilter, EpisodeRecorder, InMemoryRecorder, JsonlRecorder};

#[tokio::test]
async fn in_memory_recorder_conformance() {
    let report = run_conformance_suite(|| async { InMemoryRecorder::new() }).await;
    assert!(report.total > 0);
    assert_eq!(report.failed, 0, "{report}");
}

#[tokio::test]
async fn jsonl_recorder_conformance() {
    let dir = tempfile::tempdir().unwrap();
    let counter = std::sync::atomic::AtomicUsize::new(0);
    let report = run_conformance_suite(|| {
        let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let path = dir.path().join(format!("episodes-{n}.jsonl"));
        async move { JsonlRecorder::open(path).await.unwrap() }
    })
    .await;
    assert_eq!(report.failed, 0, "{report}");
}

#[tokio::test]
async fn jsonl_recorder_remembers_ids_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("episodes.jsonl");

    let first = JsonlRecorder::open(&path).await.unwrap();
    let episode = sample_episode();
    first.record(&episode).await.unwrap();
    drop(first);

    let reopened = JsonlRecorder::open(&path).await.unwrap();
    assert!(reopened.record(&episode).await.is_err());
    let all = reopened.query_episodes(&EpisodeFilter::all()).await.unwrap();
    assert_eq!(all, vec![episode]);
}

#[tokio::test]
async fn jsonl_recorder_rejects_corrupt_lines() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.jsonl");
    std::fs::write(&path, "{not json}\n").unwrap();
    assert!(JsonlRecorder::open(&path).await.is_err());
}

fn sample_episode() -> settle_core::Episode {
    use settle_core::{CallOutcome, EpisodeBuilder, LearnerKind, LearnerTag};
    EpisodeBuilder::new(
        "ep-reopen",
        "session-reopen",
        "IN",
        None,
        LearnerTag {
            kind: LearnerKind::Bandit,
            version: 2,
        },
        "2026-02-01T09:00:00Z",
    )
    .seal(CallOutcome::WrongParty, "2026-02-01T09:01:00Z")
}
