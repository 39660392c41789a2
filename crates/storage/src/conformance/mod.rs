//! Conformance test suite for `EpisodeRecorder` implementations.
//!
//! A backend-agnostic suite that any recorder can run to verify it honors
//! the trait contract. The suite covers:
//!
//! - **Record**: recorded episodes come back intact, duplicates are refused
//! - **Query**: every filter field, limits, record ordering
//! - **Concurrency**: racing writers, exactly-once under contention
//!
//! # Usage
//!
//! Backends call [`run_conformance_suite`] with a factory that creates a
//! fresh, empty recorder for each test:
//!
//! ```ignore
//! use settle_storage::conformance::run_conformance_suite;
//!
//! #[tokio::test]
//! async fn memory_conformance() {
//!     let report = run_conformance_suite(|| async { InMemoryRecorder::new() }).await;
//!     assert!(report.failed == 0, "{report}");
//! }
//! ```

mod concurrent;
mod query;
mod record;

use std::fmt;
use std::future::Future;

use settle_core::{
    Action, CallOutcome, ConversationContext, DebtProfile, Episode, EpisodeBuilder, FsmState,
    LearnerKind, LearnerTag, OutcomeSignal, RewardBreakdown, Transition, TransitionInfo,
};

use crate::EpisodeRecorder;

/// Result of a single conformance test.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Test category (e.g. "record", "query", "concurrent").
    pub category: String,
    /// Test name (e.g. "duplicate_record_is_refused").
    pub name: String,
    pub passed: bool,
    /// Error message if the test failed.
    pub message: Option<String>,
}

impl TestResult {
    fn pass(category: &str, name: &str) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: true,
            message: None,
        }
    }

    fn fail(category: &str, name: &str, msg: String) -> Self {
        Self {
            category: category.to_string(),
            name: name.to_string(),
            passed: false,
            message: Some(msg),
        }
    }

    fn from_result(category: &str, name: &str, result: Result<(), String>) -> Self {
        match result {
            Ok(()) => Self::pass(category, name),
            Err(msg) => Self::fail(category, name, msg),
        }
    }
}

/// Aggregated report from a full conformance suite run.
#[derive(Debug, Clone)]
pub struct ConformanceReport {
    pub results: Vec<TestResult>,
    pub passed: usize,
    pub failed: usize,
    pub total: usize,
}

impl fmt::Display for ConformanceReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Conformance: {}/{} passed ({} failed)",
            self.passed, self.total, self.failed
        )?;
        for r in &self.results {
            if !r.passed {
                writeln!(
                    f,
                    "  FAIL [{}/{}]: {}",
                    r.category,
                    r.name,
                    r.message.as_deref().unwrap_or("(no message)")
                )?;
            }
        }
        Ok(())
    }
}

/// Run the full conformance suite against a recorder.
///
/// The `factory` function is called once per test to create a fresh, empty
/// recorder, ensuring test isolation.
pub async fn run_conformance_suite<R, F, Fut>(factory: F) -> ConformanceReport
where
    R: EpisodeRecorder,
    F: Fn() -> Fut,
    Fut: Future<Output = R>,
{
    let mut results = Vec::new();

    results.extend(record::run_record_tests(&factory).await);
    results.extend(query::run_query_tests(&factory).await);
    results.extend(concurrent::run_concurrent_tests(&factory).await);

    let passed = results.iter().filter(|r| r.passed).count();
    let total = results.len();

    ConformanceReport {
        results,
        passed,
        failed: total - passed,
        total,
    }
}

// ── Helpers: episode constructors with sensible defaults ─────────────────────

fn make_context() -> ConversationContext {
    let debt = DebtProfile {
        creditor: "test-creditor".to_string(),
        balance: "1250.00".parse().unwrap_or_default(),
        days_past_due: 45,
        currency: "USD".to_string(),
    };
    ConversationContext::new(&debt, 0, 12 * 60)
}

fn make_transition(turn_index: u32, reward: f64, done: bool) -> Transition {
    let state = make_context();
    let next_state = state.committed(Action::Greet, FsmState::Disclosure);
    Transition {
        state,
        action: Action::Greet,
        reward,
        next_state,
        done,
        info: TransitionInfo {
            turn_index,
            signal: OutcomeSignal::None,
            proposed_action: Action::Greet,
            overridden: false,
            fallback_used: false,
            reward: RewardBreakdown::new(reward + 0.05, 0.0, -0.05),
        },
    }
}

/// An episode whose total return is the sum of `rewards`.
fn make_episode(
    id: &str,
    persona: &str,
    jurisdiction: &str,
    outcome: CallOutcome,
    rewards: &[f64],
) -> Episode {
    let mut builder = EpisodeBuilder::new(
        id,
        format!("session-{id}"),
        jurisdiction,
        Some(persona.to_string()),
        LearnerTag {
            kind: LearnerKind::QLearning,
            version: 1,
        },
        "2026-01-01T00:00:00Z",
    );
    for (i, &r) in rewards.iter().enumerate() {
        builder.push(make_transition(i as u32, r, i + 1 == rewards.len()));
    }
    builder.seal(outcome, "2026-01-01T00:05:00Z")
}
