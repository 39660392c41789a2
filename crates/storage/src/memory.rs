use std::collections::HashSet;

use async_trait::async_trait;
use settle_core::Episode;
use tokio::sync::RwLock;

use crate::error::RecorderError;
use crate::filter::EpisodeFilter;
use crate::traits::EpisodeRecorder;

#[derive(Debug, Default)]
struct Inner {
    episodes: Vec<Episode>,
    ids: HashSet<String>,
}

/// Process-local recorder. Used by the trainer and by tests.
#[derive(Debug, Default)]
pub struct InMemoryRecorder {
    inner: RwLock<Inner>,
}

impl InMemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.inner.read().await.episodes.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.episodes.is_empty()
    }
}

#[async_trait]
impl EpisodeRecorder for InMemoryRecorder {
    async fn record(&self, episode: &Episode) -> Result<(), RecorderError> {
        let mut inner = self.inner.write().await;
        if !inner.ids.insert(episode.episode_id().to_string()) {
            return Err(RecorderError::AlreadyRecorded {
                episode_id: episode.episode_id().to_string(),
            });
        }
        inner.episodes.push(episode.clone());
        Ok(())
    }

    async fn query_episodes(&self, filter: &EpisodeFilter) -> Result<Vec<Episode>, RecorderError> {
        let inner = self.inner.read().await;
        Ok(filter.apply(inner.episodes.iter()))
    }
}
