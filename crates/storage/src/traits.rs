use async_trait::async_trait;
use settle_core::Episode;

use crate::error::RecorderError;
use crate::filter::EpisodeFilter;

/// Sink for sealed episodes.
///
/// The turn processor hands each sealed episode to `record` from a spawned
/// task, so implementations never block a turn's COMMIT. Training and
/// reporting read episodes back through `query_episodes`.
///
/// ## Exactly-once
///
/// Episode ids are unique. Recording an id a second time must fail with
/// `RecorderError::AlreadyRecorded` and leave the stored episode untouched,
/// even when the two calls race.
///
/// ## Ordering
///
/// `query_episodes` returns matches in the order they were recorded.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync + 'static` so one recorder can be
/// shared behind an `Arc` by every session.
#[async_trait]
pub trait EpisodeRecorder: Send + Sync + 'static {
    /// Persist a sealed episode.
    async fn record(&self, episode: &Episode) -> Result<(), RecorderError>;

    /// Episodes matching `filter`, oldest first, truncated to `filter.limit`.
    async fn query_episodes(&self, filter: &EpisodeFilter) -> Result<Vec<Episode>, RecorderError>;
}
