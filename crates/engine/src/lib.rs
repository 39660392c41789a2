//! settle-engine: learned action selection and turn processing.
//!
//! - [`policy`] -- [`ActionSelector`] over a bandit or a Q-table, snapshots,
//!   and the swappable [`PolicyHandle`]
//! - [`turn`] -- [`TurnProcessor`]: sessions and the per-turn pipeline
//! - [`collaborators`] -- generator, validator and classifier traits with
//!   reference implementations
//! - [`simulate`] -- personas, a scripted borrower and the [`Trainer`]

pub mod collaborators;
pub mod config;
mod error;
pub mod policy;
pub mod simulate;
pub mod turn;

pub use collaborators::{
    CollaboratorError, Collaborators, KeywordClassifier, ResponseGenerator, RuleValidator, SignalClassifier,
    TemplateGenerator, TemplateLibrary, ValidationReport, Validator,
};
pub use config::{EngineConfig, LearnerConfig, SettleConfig};
pub use error::TurnError;
pub use policy::{
    ActionSelector, ContextualBandit, Learner, PolicyHandle, PolicySnapshot, Selection, SnapshotError,
    TabularQLearner, VersionedSelector,
};
pub use simulate::{run_episode, Persona, ScriptedBorrower, SimulatedCall, Trainer, TrainingOptions, TrainingReport};
pub use turn::{SessionSpec, TurnOutput, TurnPhase, TurnProcessor};
