/// All errors that can be returned by an EpisodeRecorder implementation.
#[derive(Debug, thiserror::Error)]
pub enum RecorderError {
    /// The episode id was already recorded. Episodes are recorded exactly
    /// once per sealed session.
    #[error("episode already recorded: {episode_id}")]
    AlreadyRecorded { episode_id: String },

    /// A backend-specific error (IO, serialization, etc.).
    #[error("recorder backend error: {0}")]
    Backend(String),
}

impl From<std::io::Error> for RecorderError {
    fn from(err: std::io::Error) -> Self {
        RecorderError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for RecorderError {
    fn from(err: serde_json::Error) -> Self {
        RecorderError::Backend(err.to_string())
    }
}
