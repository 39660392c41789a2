use std::future::Future;

use settle_core::CallOutcome;

use super::{make_episode, TestResult};
use crate::{EpisodeFilter, EpisodeRecorder, RecorderError};

pub(super) async fn run_record_tests<R, F, Fut>(factory: &F) -> Vec<TestResult>
where
    R: EpisodeRecorder,
    F: Fn() -> Fut,
    Fut: Future<Output = R>,
{
    vec![
        TestResult::from_result(
            "record",
            "recorded_episode_is_returned_intact",
            recorded_episode_is_returned_intact(factory).await,
        ),
        TestResult::from_result(
            "record",
            "empty_recorder_returns_nothing",
            empty_recorder_returns_nothing(factory).await,
        ),
        TestResult::from_result(
            "record",
            "duplicate_record_is_refused",
            duplicate_record_is_refused(factory).await,
        ),
        TestResult::from_result(
            "record",
            "duplicate_does_not_replace_original",
            duplicate_does_not_replace_original(factory).await,
        ),
        TestResult::from_result(
            "record",
            "empty_episode_is_recordable",
            empty_episode_is_recordable(factory).await,
        ),
    ]
}

// ── Test implementations ──────────────────────────────────────────────────────

/// A recorded episode must come back equal, transitions and all.
async fn recorded_episode_is_returned_intact<R, F, Fut>(factory: &F) -> Result<(), String>
where
    R: EpisodeRecorder,
    F: Fn() -> Fut,
    Fut: Future<Output = R>,
{
    let r = factory().await;
    let episode = make_episode(
        "ep-1",
        "cooperative",
        "US",
        CallOutcome::PaymentArrangement,
        &[-0.05, 0.45, 9.95],
    );
    r.record(&episode).await.map_err(|e| e.to_string())?;

    let found = r
        .query_episodes(&EpisodeFilter::all())
        .await
        .map_err(|e| e.to_string())?;
    if found.len() != 1 {
        return Err(format!("expected 1 episode, got {}", found.len()));
    }
    if found[0] != episode {
        return Err("stored episode differs from the recorded one".to_string());
    }
    Ok(())
}

async fn empty_recorder_returns_nothing<R, F, Fut>(factory: &F) -> Result<(), String>
where
    R: EpisodeRecorder,
    F: Fn() -> Fut,
    Fut: Future<Output = R>,
{
    let r = factory().await;
    let found = r
        .query_episodes(&EpisodeFilter::all())
        .await
        .map_err(|e| e.to_string())?;
    if !found.is_empty() {
        return Err(format!("expected no episodes, got {}", found.len()));
    }
    Ok(())
}

/// Recording the same id twice must fail with AlreadyRecorded.
async fn duplicate_record_is_refused<R, F, Fut>(factory: &F) -> Result<(), String>
where
    R: EpisodeRecorder,
    F: Fn() -> Fut,
    Fut: Future<Output = R>,
{
    let r = factory().await;
    let episode = make_episode("ep-dup", "hostile", "UK", CallOutcome::Hangup, &[-2.05]);
    r.record(&episode).await.map_err(|e| e.to_string())?;

    match r.record(&episode).await {
        Err(RecorderError::AlreadyRecorded { episode_id }) if episode_id == "ep-dup" => Ok(()),
        Err(RecorderError::AlreadyRecorded { episode_id }) => {
            Err(format!("AlreadyRecorded names wrong episode: {episode_id}"))
        }
        Err(e) => Err(format!("expected AlreadyRecorded, got {e}")),
        Ok(()) => Err("second record of the same episode succeeded".to_string()),
    }
}

/// A refused duplicate must not overwrite the first copy.
async fn duplicate_does_not_replace_original<R, F, Fut>(factory: &F) -> Result<(), String>
where
    R: EpisodeRecorder,
    F: Fn() -> Fut,
    Fut: Future<Output = R>,
{
    let r = factory().await;
    let first = make_episode("ep-x", "hostile", "UK", CallOutcome::Hangup, &[-2.05]);
    let second = make_episode("ep-x", "cooperative", "US", CallOutcome::Callback, &[2.95]);
    r.record(&first).await.map_err(|e| e.to_string())?;
    let _ = r.record(&second).await;

    let found = r
        .query_episodes(&EpisodeFilter::all())
        .await
        .map_err(|e| e.to_string())?;
    if found.len() != 1 || found[0] != first {
        return Err(format!(
            "expected only the first copy, got {} episodes",
            found.len()
        ));
    }
    Ok(())
}

/// Sessions that fail before their first commit still seal an episode.
async fn empty_episode_is_recordable<R, F, Fut>(factory: &F) -> Result<(), String>
where
    R: EpisodeRecorder,
    F: Fn() -> Fut,
    Fut: Future<Output = R>,
{
    let r = factory().await;
    let episode = make_episode("ep-empty", "cooperative", "US", CallOutcome::SystemError, &[]);
    r.record(&episode).await.map_err(|e| e.to_string())?;
    let found = r
        .query_episodes(&EpisodeFilter::all().with_outcome(CallOutcome::SystemError))
        .await
        .map_err(|e| e.to_string())?;
    if found.len() != 1 || !found[0].is_empty() {
        return Err("empty episode not returned".to_string());
    }
    Ok(())
}
