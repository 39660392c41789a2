use std::collections::HashSet;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use settle_core::Episode;
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::RecorderError;
use crate::filter::EpisodeFilter;
use crate::traits::EpisodeRecorder;

/// Append-only JSON-lines file, one episode per line.
///
/// The set of recorded ids is loaded on open and kept under the same lock as
/// the append, so duplicate detection holds across racing writers within the
/// process. Two processes appending to one file are not coordinated.
#[derive(Debug)]
pub struct JsonlRecorder {
    path: PathBuf,
    ids: Mutex<HashSet<String>>,
}

impl JsonlRecorder {
    /// Open (or create on first write) the file at `path`.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, RecorderError> {
        let path = path.into();
        let mut ids = HashSet::new();
        for episode in read_episodes(&path).await? {
            ids.insert(episode.episode_id().to_string());
        }
        debug!(path = %path.display(), existing = ids.len(), "opened episode log");
        Ok(Self {
            path,
            ids: Mutex::new(ids),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn read_episodes(path: &Path) -> Result<Vec<Episode>, RecorderError> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err.into()),
    };
    let mut episodes = Vec::new();
    for (lineno, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let episode: Episode = serde_json::from_str(line).map_err(|e| {
            RecorderError::Backend(format!("{}:{}: {}", path.display(), lineno + 1, e))
        })?;
        episodes.push(episode);
    }
    Ok(episodes)
}

#[async_trait]
impl EpisodeRecorder for JsonlRecorder {
    async fn record(&self, episode: &Episode) -> Result<(), RecorderError> {
        let mut ids = self.ids.lock().await;
        if ids.contains(episode.episode_id()) {
            return Err(RecorderError::AlreadyRecorded {
                episode_id: episode.episode_id().to_string(),
            });
        }

        let mut line = serde_json::to_string(episode)?;
        line.push('\n');
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;

        ids.insert(episode.episode_id().to_string());
        Ok(())
    }

    async fn query_episodes(&self, filter: &EpisodeFilter) -> Result<Vec<Episode>, RecorderError> {
        // Hold the lock so a read never observes a half-written line.
        let _guard = self.ids.lock().await;
        let episodes = read_episodes(&self.path).await?;
        Ok(filter.apply(episodes.iter()))
    }
}
