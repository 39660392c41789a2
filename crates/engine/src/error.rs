use settle_core::{ConfigError, FsmError, FsmState, TraceError};

use crate::collaborators::CollaboratorError;

/// Errors surfaced by [`crate::TurnProcessor`].
///
/// Policy violations and validation failures are not errors: they are
/// handled inside the turn and show up as structured trace fields. Only
/// the variants below reach the caller.
#[derive(Debug, thiserror::Error)]
pub enum TurnError {
    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("session already exists: {0}")]
    SessionExists(String),

    /// The session reached END_CALL or was ended.
    #[error("session {0} is closed")]
    SessionClosed(String),

    #[error("opening already generated for session {0}")]
    OpeningAlreadyGenerated(String),

    #[error("session {0} has no opening yet")]
    OpeningNotGenerated(String),

    #[error("unknown jurisdiction: {0}")]
    UnknownJurisdiction(String),

    #[error("no legal actions in state {0}")]
    NoLegalActions(FsmState),

    /// The state machine refused a transition. Always a bug upstream.
    #[error(transparent)]
    IllegalAction(#[from] FsmError),

    #[error("response generation failed after {attempts} attempts: {source}")]
    GenerationFailure {
        attempts: u32,
        #[source]
        source: CollaboratorError,
    },

    #[error("validator unavailable after {attempts} attempts: {source}")]
    ValidatorUnavailable {
        attempts: u32,
        #[source]
        source: CollaboratorError,
    },

    #[error(transparent)]
    Trace(#[from] TraceError),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

impl TurnError {
    /// Errors that end the session with a system-error outcome.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            TurnError::IllegalAction(_)
                | TurnError::GenerationFailure { .. }
                | TurnError::ValidatorUnavailable { .. }
                | TurnError::Trace(_)
                | TurnError::NoLegalActions(_)
        )
    }
}
