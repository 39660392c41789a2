use std::future::Future;
use std::sync::Arc;

use settle_core::CallOutcome;

use super::{make_episode, TestResult};
use crate::{EpisodeFilter, EpisodeRecorder, RecorderError};

/// Number of concurrent tasks to spawn in each test.
const N: usize = 10;

pub(super) async fn run_concurrent_tests<R, F, Fut>(factory: &F) -> Vec<TestResult>
where
    R: EpisodeRecorder,
    F: Fn() -> Fut,
    Fut: Future<Output = R>,
{
    vec![
        TestResult::from_result(
            "concurrent",
            "concurrent_distinct_records_all_succeed",
            concurrent_distinct_records_all_succeed(factory).await,
        ),
        TestResult::from_result(
            "concurrent",
            "concurrent_duplicate_records_exactly_one_wins",
            concurrent_duplicate_records_exactly_one_wins(factory).await,
        ),
    ]
}

// ── Distinct episodes from many sessions ─────────────────────────────────────

/// N sessions seal at once; every episode must land.
async fn concurrent_distinct_records_all_succeed<R, F, Fut>(factory: &F) -> Result<(), String>
where
    R: EpisodeRecorder,
    F: Fn() -> Fut,
    Fut: Future<Output = R>,
{
    let recorder = Arc::new(factory().await);

    let mut handles = Vec::new();
    for i in 0..N {
        let r = recorder.clone();
        handles.push(tokio::spawn(async move {
            let episode = make_episode(
                &format!("ep-{i}"),
                "cooperative",
                "US",
                CallOutcome::NoResolution,
                &[-0.05],
            );
            r.record(&episode).await
        }));
    }
    for handle in handles {
        handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e| format!("record failed: {e}"))?;
    }

    let found = recorder
        .query_episodes(&EpisodeFilter::all())
        .await
        .map_err(|e| e.to_string())?;
    if found.len() != N {
        return Err(format!("expected {N} episodes, got {}", found.len()));
    }
    Ok(())
}

// ── Same episode raced: exactly one wins ─────────────────────────────────────

/// N tasks record the same episode id. Exactly one succeeds; the rest must
/// get AlreadyRecorded.
async fn concurrent_duplicate_records_exactly_one_wins<R, F, Fut>(
    factory: &F,
) -> Result<(), String>
where
    R: EpisodeRecorder,
    F: Fn() -> Fut,
    Fut: Future<Output = R>,
{
    let recorder = Arc::new(factory().await);
    let episode = Arc::new(make_episode(
        "ep-race",
        "cooperative",
        "US",
        CallOutcome::Callback,
        &[2.95],
    ));

    let mut handles = Vec::new();
    for _ in 0..N {
        let r = recorder.clone();
        let e = episode.clone();
        handles.push(tokio::spawn(async move {
            match r.record(&e).await {
                Ok(()) => Ok(true),
                Err(RecorderError::AlreadyRecorded { .. }) => Ok(false),
                Err(err) => Err(err),
            }
        }));
    }

    let mut winners = 0usize;
    for handle in handles {
        let won = handle
            .await
            .map_err(|e| format!("task panic: {e}"))?
            .map_err(|e: RecorderError| format!("recorder error: {e}"))?;
        if won {
            winners += 1;
        }
    }
    if winners != 1 {
        return Err(format!("expected exactly 1 winner, got {winners}"));
    }

    let found = recorder
        .query_episodes(&EpisodeFilter::all())
        .await
        .map_err(|e| e.to_string())?;
    if found.len() != 1 {
        return Err(format!("expected 1 stored episode, got {}", found.len()));
    }
    Ok(())
}
