//! Rule-based reference validator.

use std::sync::Arc;

use async_trait::async_trait;
use settle_core::{Action, ConversationContext, Directive, ValidatorFailure};

use super::{CollaboratorError, TemplateLibrary, ValidationReport, Validator};

pub const DEFAULT_MAX_LENGTH: usize = 400;

const ABUSIVE_TERMS: [&str; 6] = ["stupid", "idiot", "liar", "deadbeat", "pathetic", "loser"];

/// Structural checks on a candidate utterance.
///
/// Jurisdiction phrase screening is not done here; the policy guard
/// re-checks every candidate against its own list.
#[derive(Debug, Clone)]
pub struct RuleValidator {
    library: Arc<TemplateLibrary>,
    max_length: usize,
}

impl RuleValidator {
    pub fn new(library: Arc<TemplateLibrary>) -> Self {
        Self {
            library,
            max_length: DEFAULT_MAX_LENGTH,
        }
    }

    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length;
        self
    }

    /// Run every rule. The report is repairable only if each failure is.
    pub fn evaluate(&self, text: &str, directive: &Directive) -> ValidationReport {
        let mut failures = Vec::new();
        let mut repairable = true;

        if text.trim().is_empty() {
            failures.push(ValidatorFailure::new("non_empty", "utterance is empty"));
        }
        let length = text.chars().count();
        if length > self.max_length {
            failures.push(ValidatorFailure::new(
                "max_length",
                format!("{} characters exceeds limit of {}", length, self.max_length),
            ));
        }
        if text.contains('{') || text.contains('}') {
            failures.push(ValidatorFailure::new("placeholder", "unresolved template placeholder"));
        }

        let lowered = text.to_lowercase();
        for term in ABUSIVE_TERMS {
            if lowered.contains(term) {
                failures.push(ValidatorFailure::new("tone", format!("abusive term \"{}\"", term)));
                repairable = false;
            }
        }

        for id in &directive.required_templates {
            match self.library.get(id) {
                Some(script) if !text.contains(script) => {
                    failures.push(ValidatorFailure::new(
                        "required_template",
                        format!("missing required script '{}'", id),
                    ));
                }
                Some(_) => {}
                None => {
                    failures.push(ValidatorFailure::new(
                        "required_template",
                        format!("unknown template '{}'", id),
                    ));
                    repairable = false;
                }
            }
        }

        if failures.is_empty() {
            ValidationReport::pass()
        } else {
            ValidationReport::fail(failures, repairable)
        }
    }
}

#[async_trait]
impl Validator for RuleValidator {
    async fn check(
        &self,
        text: &str,
        _ctx: &ConversationContext,
        _action: Action,
        directive: &Directive,
    ) -> Result<ValidationReport, CollaboratorError> {
        Ok(self.evaluate(text, directive))
    }
}
