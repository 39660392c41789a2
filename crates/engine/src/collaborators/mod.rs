//! Collaborators the turn processor delegates to.
//!
//! The engine decides *what* to do; a [`ResponseGenerator`] decides what to
//! say, a [`Validator`] decides whether it may be said, and a
//! [`SignalClassifier`] reads the borrower's reply. Each comes with a
//! deterministic reference implementation so the engine runs end to end
//! without a language model.

mod classifier;
mod rules;
mod template;

pub use classifier::KeywordClassifier;
pub use rules::RuleValidator;
pub use template::{TemplateGenerator, TemplateLibrary};

use std::sync::Arc;

use async_trait::async_trait;
use settle_core::{Action, ConversationContext, Directive, Observation, ValidatorFailure};

/// A collaborator call that did not produce a usable answer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    #[error("{collaborator} unavailable: {message}")]
    Unavailable { collaborator: String, message: String },

    #[error("{collaborator} returned an invalid response: {message}")]
    InvalidResponse { collaborator: String, message: String },
}

impl CollaboratorError {
    pub fn unavailable(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        CollaboratorError::Unavailable {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }

    pub fn invalid(collaborator: impl Into<String>, message: impl Into<String>) -> Self {
        CollaboratorError::InvalidResponse {
            collaborator: collaborator.into(),
            message: message.into(),
        }
    }
}

/// What a validator thinks of one candidate utterance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ValidationReport {
    pub passed: bool,
    pub failures: Vec<ValidatorFailure>,
    /// Whether a regeneration could plausibly fix the failures.
    pub repairable: bool,
}

impl ValidationReport {
    pub fn pass() -> Self {
        Self {
            passed: true,
            failures: Vec::new(),
            repairable: false,
        }
    }

    pub fn fail(failures: Vec<ValidatorFailure>, repairable: bool) -> Self {
        Self {
            passed: false,
            failures,
            repairable,
        }
    }
}

/// Produces the agent's utterance for an action.
#[async_trait]
pub trait ResponseGenerator: Send + Sync + 'static {
    async fn generate(
        &self,
        ctx: &ConversationContext,
        action: Action,
        directive: &Directive,
    ) -> Result<String, CollaboratorError>;
}

/// Accepts or rejects a candidate utterance.
///
/// The directive is passed so the validator can check that the required
/// scripts were actually included.
#[async_trait]
pub trait Validator: Send + Sync + 'static {
    async fn check(
        &self,
        text: &str,
        ctx: &ConversationContext,
        action: Action,
        directive: &Directive,
    ) -> Result<ValidationReport, CollaboratorError>;
}

/// Turns a borrower utterance into a signal and a sentiment delta.
///
/// Synchronous: classification sits on the turn's critical path before
/// action selection and is expected to be cheap.
pub trait SignalClassifier: Send + Sync + 'static {
    fn classify(&self, utterance: &str, ctx: &ConversationContext) -> Observation;
}

/// The three collaborators a turn processor needs.
#[derive(Clone)]
pub struct Collaborators {
    pub generator: Arc<dyn ResponseGenerator>,
    pub validator: Arc<dyn Validator>,
    pub classifier: Arc<dyn SignalClassifier>,
}

impl Collaborators {
    /// Template generator, rule validator and keyword classifier over one
    /// shared template library.
    pub fn reference(library: Arc<TemplateLibrary>) -> Self {
        Self {
            generator: Arc::new(TemplateGenerator::new(library.clone())),
            validator: Arc::new(RuleValidator::new(library)),
            classifier: Arc::new(KeywordClassifier::new()),
        }
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}
