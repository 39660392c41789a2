//! Canned scripts: the template library and the template generator.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use async_trait::async_trait;
use settle_core::guard::RECORDING_NOTICE_TEMPLATE;
use settle_core::{Action, ConversationContext, Directive, DirectiveMode, FsmState};
use tracing::warn;

use super::{CollaboratorError, ResponseGenerator};

const BUILTIN_TEMPLATES: [(&str, &str); 5] = [
    (
        "mini_miranda",
        "This is an attempt to collect a debt and any information obtained will be used for that purpose.",
    ),
    (
        "fca_disclosure",
        "This call is from a debt collection agency acting for your creditor, and free debt advice is available from MoneyHelper.",
    ),
    (
        "uae_disclosure",
        "This call concerns an amount owed to your creditor and is made under UAE Central Bank collection rules.",
    ),
    (
        "rbi_disclosure",
        "This call is from an authorised recovery agent of your lender, acting under RBI fair practice guidelines.",
    ),
    (
        RECORDING_NOTICE_TEMPLATE,
        "Please note that this call is recorded for quality and compliance purposes.",
    ),
];

/// Script text by template id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateLibrary {
    texts: BTreeMap<String, String>,
}

impl Default for TemplateLibrary {
    fn default() -> Self {
        Self::builtin()
    }
}

impl TemplateLibrary {
    pub fn builtin() -> Self {
        Self {
            texts: BUILTIN_TEMPLATES
                .iter()
                .map(|(id, text)| (id.to_string(), text.to_string()))
                .collect(),
        }
    }

    /// Built-ins with `overrides` layered on top.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Self {
        let mut library = Self::builtin();
        for (id, text) in overrides {
            library.texts.insert(id.clone(), text.clone());
        }
        library
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.texts.get(id).map(String::as_str)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.texts.keys().map(String::as_str)
    }

    /// The scripts for `ids`, joined in id order. Fails with the first id
    /// the library does not know.
    pub fn preamble(&self, ids: &BTreeSet<String>) -> Result<String, String> {
        let mut parts = Vec::with_capacity(ids.len());
        for id in ids {
            match self.get(id) {
                Some(text) => parts.push(text),
                None => return Err(id.clone()),
            }
        }
        Ok(parts.join(" "))
    }

    /// The pre-approved utterance for `action` under `directive`, used when
    /// generation or validation gives up. Unknown template ids are skipped.
    pub fn fallback(&self, action: Action, directive: &Directive) -> String {
        let mut parts: Vec<&str> = Vec::new();
        for id in &directive.required_templates {
            match self.get(id) {
                Some(text) => parts.push(text),
                None => warn!(template = %id, "unknown template skipped in fallback"),
            }
        }
        parts.push(script_line(action, directive));
        parts.join(" ")
    }
}

fn script_line(action: Action, directive: &Directive) -> &'static str {
    match directive.mode {
        DirectiveMode::Forced => forced_line(directive.forced_target),
        DirectiveMode::Normal | DirectiveMode::Repair => action_line(action),
    }
}

fn forced_line(target: Option<FsmState>) -> &'static str {
    match target {
        Some(FsmState::DoNotCall) => {
            "Understood. We will stop contacting you at this number, and this is confirmed in writing."
        }
        Some(FsmState::CallbackScheduled) => {
            "We cannot continue this call right now, so we will call you back within permitted hours."
        }
        Some(FsmState::EndCall) => {
            "We will end the call here and follow up with you in writing. Thank you for your time."
        }
        Some(_) => "We need to pause this conversation. Someone will be in touch through the proper channel.",
        None => "Let me put that another way. We would like to help you find a manageable way to settle this account.",
    }
}

fn action_line(action: Action) -> &'static str {
    match action {
        Action::Greet => "Hello, this is Alex calling from the accounts team. May I have a moment of your time?",
        Action::DiscloseMiniMiranda => "Please keep this notice in mind as we continue.",
        Action::VerifyIdentity => "Could you please confirm your full name and date of birth?",
        Action::OfferCallback => "If now is not a good time, I can call you back at a time that suits you.",
        Action::RequestRecordingConsent => "Do you consent to this call being recorded?",
        Action::ExplainDebt => "I am calling about an overdue balance on your account that we would like to help you resolve.",
        Action::Empathize => "I understand this can be stressful, and I appreciate you talking it through with me.",
        Action::OfferPlan => "We can spread the balance over monthly instalments that fit your budget. Would that work for you?",
        Action::OfferSettlement => "We can accept a reduced one-time settlement to close the account. Would you like to do that?",
        Action::OfferFullPayment => "The simplest option is to clear the full balance today. Are you able to do that?",
        Action::HandleObjection => "I hear your concern. Let us look for an option that works better for you.",
        Action::ScheduleCallback => "Let me schedule a callback at a time that is more convenient for you.",
        Action::EscalateToHuman => "I will connect you with one of my colleagues who can help further.",
        Action::ConfirmPayment => "Thank you. I have set up the arrangement and you will receive a written confirmation.",
        Action::Summarize => "To summarise, we have agreed the arrangement and you will receive the details in writing.",
        Action::CloseCall => "Thank you for your time today. Have a good day.",
        Action::ApologizeWrongParty => "I apologise for the inconvenience. We will update our records.",
        Action::ExplainDisputeProcess => "You can dispute this debt in writing and we will pause collection while we verify it.",
        Action::ConfirmCallback => "Your callback is booked and we will call you at the agreed time.",
        Action::ConfirmDoNotCall => "Understood. We will not call this number again.",
        Action::TransferToHuman => "Please hold while I transfer you to a colleague.",
        Action::ComplianceExit => "We will end the call here and follow up with you in writing.",
    }
}

/// Reference generator: required scripts followed by the canned line for
/// the action, or for the forced target.
#[derive(Debug, Clone)]
pub struct TemplateGenerator {
    library: Arc<TemplateLibrary>,
}

impl TemplateGenerator {
    pub fn new(library: Arc<TemplateLibrary>) -> Self {
        Self { library }
    }
}

#[async_trait]
impl ResponseGenerator for TemplateGenerator {
    async fn generate(
        &self,
        _ctx: &ConversationContext,
        action: Action,
        directive: &Directive,
    ) -> Result<String, CollaboratorError> {
        let preamble = self
            .library
            .preamble(&directive.required_templates)
            .map_err(|id| {
                CollaboratorError::invalid("template generator", format!("unknown template '{}'", id))
            })?;
        let line = script_line(action, directive);
        if preamble.is_empty() {
            Ok(line.to_string())
        } else {
            Ok(format!("{} {}", preamble, line))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use settle_core::{builtin_jurisdictions, DebtProfile, PolicyGuard};

    fn context() -> ConversationContext {
        let debt = DebtProfile {
            creditor: "Acme Bank".to_string(),
            balance: Decimal::from(900),
            days_past_due: 45,
            currency: "USD".to_string(),
        };
        ConversationContext::new(&debt, 0, 600)
    }

    fn required(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn required_scripts_are_prepended() {
        let generator = TemplateGenerator::new(Arc::new(TemplateLibrary::builtin()));
        let directive = Directive::normal(required(&["mini_miranda"]));
        let text = generator
            .generate(&context(), Action::ExplainDebt, &directive)
            .await
            .unwrap();
        assert!(text.starts_with("This is an attempt to collect a debt"));
        assert!(text.ends_with(action_line(Action::ExplainDebt)));
    }

    #[tokio::test]
    async fn unknown_template_is_an_invalid_response() {
        let generator = TemplateGenerator::new(Arc::new(TemplateLibrary::builtin()));
        let directive = Directive::normal(required(&["no_such_script"]));
        let err = generator
            .generate(&context(), Action::ExplainDebt, &directive)
            .await
            .unwrap_err();
        assert!(matches!(err, CollaboratorError::InvalidResponse { .. }));
    }

    #[tokio::test]
    async fn forced_directive_speaks_for_the_target() {
        let generator = TemplateGenerator::new(Arc::new(TemplateLibrary::builtin()));
        let directive = Directive::forced(vec!["dnc".to_string()], Some(FsmState::DoNotCall), BTreeSet::new());
        let text = generator
            .generate(&context(), Action::ComplianceExit, &directive)
            .await
            .unwrap();
        assert!(text.contains("stop contacting you"));
    }

    #[test]
    fn overrides_replace_builtin_text() {
        let mut overrides = BTreeMap::new();
        overrides.insert("mini_miranda".to_string(), "Custom notice.".to_string());
        let library = TemplateLibrary::with_overrides(&overrides);
        assert_eq!(library.get("mini_miranda"), Some("Custom notice."));
        assert_eq!(library.ids().count(), BUILTIN_TEMPLATES.len());
    }

    #[test]
    fn fallback_skips_unknown_templates() {
        let library = TemplateLibrary::builtin();
        let directive = Directive::normal(required(&["nope", RECORDING_NOTICE_TEMPLATE]));
        let text = library.fallback(Action::CloseCall, &directive);
        assert!(text.starts_with("Please note that this call is recorded"));
    }

    #[test]
    fn canned_scripts_are_clean_in_every_jurisdiction() {
        let library = TemplateLibrary::builtin();
        for rules in builtin_jurisdictions().into_values() {
            let guard = PolicyGuard::new(rules);
            for id in library.ids() {
                let text = library.get(id).unwrap();
                assert!(guard.prohibited_hits(text).is_empty(), "{} in {}", id, guard.rules().code);
            }
            for action in Action::ALL {
                assert!(guard.prohibited_hits(action_line(action)).is_empty(), "{}", action);
            }
            for target in [
                None,
                Some(FsmState::DoNotCall),
                Some(FsmState::CallbackScheduled),
                Some(FsmState::EndCall),
                Some(FsmState::EscalateHuman),
            ] {
                assert!(guard.prohibited_hits(forced_line(target)).is_empty());
            }
        }
    }
}
