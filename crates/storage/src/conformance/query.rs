use std::future::Future;

use settle_core::CallOutcome;

use super::{make_episode, TestResult};
use crate::{EpisodeFilter, EpisodeRecorder};

pub(super) async fn run_query_tests<R, F, Fut>(factory: &F) -> Vec<TestResult>
where
    R: EpisodeRecorder,
    F: Fn() -> Fut,
    Fut: Future<Output = R>,
{
    let checks: [(&str, EpisodeFilter, &[&str]); 7] = [
        ("no_filter_returns_all_in_record_order", EpisodeFilter::all(), &["a", "b", "c", "d"]),
        (
            "filter_by_outcome",
            EpisodeFilter::all().with_outcome(CallOutcome::Callback),
            &["b", "d"],
        ),
        ("filter_by_persona", EpisodeFilter::all().with_persona("hostile"), &["c"]),
        (
            "filter_by_jurisdiction_ignores_case",
            EpisodeFilter::all().with_jurisdiction("uae"),
            &["b", "c"],
        ),
        ("filter_by_min_return_is_inclusive", EpisodeFilter::all().with_min_return(2.9), &["a", "b"]),
        ("limit_keeps_oldest", EpisodeFilter::all().with_limit(2), &["a", "b"]),
        (
            "filters_combine",
            EpisodeFilter::all()
                .with_outcome(CallOutcome::Callback)
                .with_jurisdiction("US"),
            &["d"],
        ),
    ];

    let mut results = Vec::new();
    for (name, filter, expected) in checks {
        results.push(TestResult::from_result(
            "query",
            name,
            expect_ids(factory, &filter, expected).await,
        ));
    }
    results
}

/// Seed four episodes and check which ids the filter returns.
///
/// | id | persona     | jurisdiction | outcome             | return |
/// |----|-------------|--------------|---------------------|--------|
/// | a  | cooperative | US           | PAYMENT_ARRANGEMENT | 10.8   |
/// | b  | hardship    | UAE          | CALLBACK            | 2.9    |
/// | c  | hostile     | UAE          | HANGUP              | -2.1   |
/// | d  | disputer    | US           | CALLBACK            | 2.8    |
async fn expect_ids<R, F, Fut>(
    factory: &F,
    filter: &EpisodeFilter,
    expected: &[&str],
) -> Result<(), String>
where
    R: EpisodeRecorder,
    F: Fn() -> Fut,
    Fut: Future<Output = R>,
{
    let r = factory().await;
    let seed = [
        make_episode("a", "cooperative", "US", CallOutcome::PaymentArrangement, &[0.8, 10.0]),
        make_episode("b", "hardship", "UAE", CallOutcome::Callback, &[0.0, 2.9]),
        make_episode("c", "hostile", "UAE", CallOutcome::Hangup, &[-0.1, -2.0]),
        make_episode("d", "disputer", "US", CallOutcome::Callback, &[-0.2, 3.0]),
    ];
    for episode in &seed {
        r.record(episode).await.map_err(|e| e.to_string())?;
    }

    let found = r.query_episodes(filter).await.map_err(|e| e.to_string())?;
    let ids: Vec<&str> = found.iter().map(|e| e.episode_id()).collect();
    if ids != expected {
        return Err(format!("expected {:?}, got {:?}", expected, ids));
    }
    Ok(())
}
