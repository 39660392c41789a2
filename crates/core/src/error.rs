//! Error types for the pure conversation core.

use std::fmt;

use crate::types::{Action, FsmState, OutcomeSignal};

/// Errors raised by [`crate::fsm::StateMachine`].
///
/// Both variants mean an invariant was broken upstream. They are never a
/// normal runtime condition and must not be swallowed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FsmError {
    /// The action is not in the state's legal set.
    IllegalAction { state: FsmState, action: Action },
    /// No edge matched. The state table is malformed.
    NoMatchingEdge {
        state: FsmState,
        action: Action,
        signal: OutcomeSignal,
    },
}

impl fmt::Display for FsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FsmError::IllegalAction { state, action } => {
                write!(f, "illegal action {} in state {}", action, state)
            }
            FsmError::NoMatchingEdge {
                state,
                action,
                signal,
            } => {
                write!(
                    f,
                    "no edge out of {} for action {} with signal {}",
                    state, action, signal
                )
            }
        }
    }
}

impl std::error::Error for FsmError {}

/// Invalid reward or jurisdiction configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// A numeric setting is NaN or infinite.
    NonFinite { field: String },
    /// A setting is outside its allowed range.
    OutOfRange { field: String, message: String },
    /// The terminal reward ladder does not rank outcomes as required.
    RewardOrdering { message: String },
    /// A jurisdiction definition is unusable.
    Jurisdiction { code: String, message: String },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::NonFinite { field } => write!(f, "'{}' must be finite", field),
            ConfigError::OutOfRange { field, message } => {
                write!(f, "'{}' out of range: {}", field, message)
            }
            ConfigError::RewardOrdering { message } => {
                write!(f, "terminal reward ordering violated: {}", message)
            }
            ConfigError::Jurisdiction { code, message } => {
                write!(f, "jurisdiction '{}': {}", code, message)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// A turn trace was sealed before every stage reported in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TraceError {
    Incomplete { field: &'static str },
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceError::Incomplete { field } => {
                write!(f, "turn trace sealed without '{}'", field)
            }
        }
    }
}

impl std::error::Error for TraceError {}
