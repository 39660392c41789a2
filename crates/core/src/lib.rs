//! settle-core: the pure half of the collection-call engine.
//!
//! Everything in this crate is synchronous and free of IO:
//!
//! - [`fsm`] -- the conversation state table and [`StateMachine`]
//! - [`guard`] -- jurisdiction rules and [`PolicyGuard`]
//! - [`reward`] -- [`RewardComputer`] and its configuration
//! - [`features`] -- context encodings for the learners
//! - [`trace`] -- [`TurnTrace`] and [`TraceBuilder`]
//! - [`episode`] -- [`Episode`] and [`Transition`]
//!
//! The async turn processor and the learners live in `settle-engine`.

pub mod episode;
pub mod error;
pub mod features;
pub mod fsm;
pub mod guard;
pub mod reward;
pub mod trace;
pub mod types;

// ── Convenience re-exports ───────────────────────────────────────────

pub use episode::{Episode, EpisodeBuilder, Transition, TransitionInfo};
pub use error::{ConfigError, FsmError, TraceError};
pub use features::{encode_features, state_key, FEATURE_DIM, FEATURE_NAMES};
pub use fsm::{StateKind, StateMachine};
pub use guard::{builtin_jurisdictions, CallWindow, JurisdictionRules, PolicyDecision, PolicyGuard, RiskLevel};
pub use reward::{RewardBreakdown, RewardComputer, RewardConfig, TerminalRewards};
pub use trace::{
    Directive, DirectiveMode, LatencyBreakdown, LearnerKind, LearnerTag, TraceBuilder, TurnTrace,
    ValidationOutcome, ValidatorFailure,
};
pub use types::{
    Action, CallOutcome, ConversationContext, DaysPastDueBucket, DebtBucket, DebtProfile, FsmState,
    Observation, OutcomeSignal, SentimentBand,
};
