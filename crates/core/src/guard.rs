//! Jurisdiction compliance guard.
//!
//! [`PolicyGuard::evaluate`] is pure and idempotent: the turn processor
//! calls it once before generation (no utterance yet) and again on the
//! candidate utterance. Its decision always wins over the learned policy.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{Action, ConversationContext, FsmState};

/// Template id added when recording consent is still outstanding.
pub const RECORDING_NOTICE_TEMPLATE: &str = "recording_notice";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl RiskLevel {
    /// Map an additive risk score onto a level.
    pub fn from_score(score: u32) -> Self {
        match score {
            0 => RiskLevel::Low,
            1 | 2 => RiskLevel::Medium,
            _ => RiskLevel::High,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RiskLevel::Low => "LOW",
            RiskLevel::Medium => "MEDIUM",
            RiskLevel::High => "HIGH",
        })
    }
}

/// The guard's verdict for one proposed action (and utterance, if any).
///
/// Never persisted on its own; it travels inside the turn trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub allowed: bool,
    pub risk_level: RiskLevel,
    pub risk_score: u32,
    pub forced_transition: Option<FsmState>,
    /// In the order the rules fired.
    pub blocked_reasons: Vec<String>,
    pub required_templates: BTreeSet<String>,
}

impl PolicyDecision {
    fn allow() -> Self {
        Self {
            allowed: true,
            risk_level: RiskLevel::Low,
            risk_score: 0,
            forced_transition: None,
            blocked_reasons: Vec::new(),
            required_templates: BTreeSet::new(),
        }
    }

    pub fn is_forced(&self) -> bool {
        self.forced_transition.is_some()
    }
}

// ──────────────────────────────────────────────
// Jurisdiction rules
// ──────────────────────────────────────────────

/// Permitted local calling hours, `[start_minute, end_minute)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallWindow {
    pub start_minute: u16,
    pub end_minute: u16,
}

impl CallWindow {
    pub const fn hours(start: u16, end: u16) -> Self {
        CallWindow {
            start_minute: start * 60,
            end_minute: end * 60,
        }
    }

    pub fn contains(&self, minute_of_day: u16) -> bool {
        minute_of_day >= self.start_minute && minute_of_day < self.end_minute
    }

    /// Distance in minutes to the nearer window edge.
    pub fn minutes_to_edge(&self, minute_of_day: u16) -> u16 {
        let from_start = minute_of_day.abs_diff(self.start_minute);
        let to_end = minute_of_day.abs_diff(self.end_minute);
        from_start.min(to_end)
    }
}

fn default_edge_margin() -> u16 {
    30
}

/// Compliance rules for one jurisdiction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JurisdictionRules {
    pub code: String,
    pub call_window: CallWindow,
    /// Calls allowed per account before further contact is barred.
    pub max_attempts: u32,
    pub prohibited_phrases: Vec<String>,
    /// Templates that make up the required disclosure script.
    pub disclosure_templates: Vec<String>,
    pub requires_recording_consent: bool,
    /// Minutes from a window edge that count as "close to the edge".
    #[serde(default = "default_edge_margin")]
    pub edge_margin_minutes: u16,
    /// Offset of local time from UTC, in minutes.
    #[serde(default)]
    pub utc_offset_minutes: i16,
}

impl JurisdictionRules {
    /// Built-in rule set for a jurisdiction code (case-insensitive).
    pub fn builtin(code: &str) -> Option<Self> {
        let phrases = |list: &[&str]| list.iter().map(|p| p.to_string()).collect::<Vec<_>>();
        let rules = match code.to_ascii_uppercase().as_str() {
            "US" => JurisdictionRules {
                code: "US".to_string(),
                call_window: CallWindow::hours(8, 21),
                max_attempts: 7,
                prohibited_phrases: phrases(&[
                    "arrest",
                    "jail",
                    "police",
                    "criminal charges",
                    "seize your property",
                    "ruin your credit",
                    "we will sue you",
                ]),
                disclosure_templates: vec!["mini_miranda".to_string()],
                requires_recording_consent: false,
                edge_margin_minutes: default_edge_margin(),
                utc_offset_minutes: -300,
            },
            "UK" => JurisdictionRules {
                code: "UK".to_string(),
                call_window: CallWindow::hours(8, 21),
                max_attempts: 5,
                prohibited_phrases: phrases(&[
                    "arrest",
                    "prison",
                    "police",
                    "criminal record",
                    "bailiffs today",
                ]),
                disclosure_templates: vec!["fca_disclosure".to_string()],
                requires_recording_consent: true,
                edge_margin_minutes: default_edge_margin(),
                utc_offset_minutes: 0,
            },
            "UAE" => JurisdictionRules {
                code: "UAE".to_string(),
                call_window: CallWindow::hours(9, 20),
                max_attempts: 3,
                prohibited_phrases: phrases(&[
                    "police",
                    "jail",
                    "travel ban",
                    "deportation",
                    "your employer will know",
                    "shame",
                ]),
                disclosure_templates: vec!["uae_disclosure".to_string()],
                requires_recording_consent: true,
                edge_margin_minutes: default_edge_margin(),
                utc_offset_minutes: 240,
            },
            "IN" => JurisdictionRules {
                code: "IN".to_string(),
                call_window: CallWindow::hours(8, 19),
                max_attempts: 4,
                prohibited_phrases: phrases(&[
                    "police",
                    "jail",
                    "arrest",
                    "your family will know",
                    "public shaming",
                ]),
                disclosure_templates: vec!["rbi_disclosure".to_string()],
                requires_recording_consent: true,
                edge_margin_minutes: default_edge_margin(),
                utc_offset_minutes: 330,
            },
            _ => return None,
        };
        Some(rules)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fail = |message: &str| ConfigError::Jurisdiction {
            code: self.code.clone(),
            message: message.to_string(),
        };
        if self.code.trim().is_empty() {
            return Err(fail("empty jurisdiction code"));
        }
        if self.call_window.start_minute >= self.call_window.end_minute {
            return Err(fail("call window must open before it closes"));
        }
        if self.call_window.end_minute > 24 * 60 {
            return Err(fail("call window ends after midnight"));
        }
        if self.disclosure_templates.is_empty() {
            return Err(fail("at least one disclosure template is required"));
        }
        if self.prohibited_phrases.iter().any(|p| p.trim().is_empty()) {
            return Err(fail("prohibited phrases must be non-empty"));
        }
        Ok(())
    }
}

/// All built-in jurisdictions keyed by code.
pub fn builtin_jurisdictions() -> BTreeMap<String, JurisdictionRules> {
    ["US", "UK", "UAE", "IN"]
        .iter()
        .filter_map(|code| JurisdictionRules::builtin(code))
        .map(|rules| (rules.code.clone(), rules))
        .collect()
}

// ──────────────────────────────────────────────
// Guard
// ──────────────────────────────────────────────

/// Evaluates proposed actions against one jurisdiction's rules.
#[derive(Debug, Clone)]
pub struct PolicyGuard {
    rules: JurisdictionRules,
}

impl PolicyGuard {
    pub fn new(rules: JurisdictionRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &JurisdictionRules {
        &self.rules
    }

    /// Prohibited phrases found in `text` (case-insensitive substring).
    pub fn prohibited_hits<'a>(&'a self, text: &str) -> Vec<&'a str> {
        let lowered = text.to_lowercase();
        self.rules
            .prohibited_phrases
            .iter()
            .filter(|phrase| lowered.contains(&phrase.to_lowercase()))
            .map(|phrase| phrase.as_str())
            .collect()
    }

    /// Evaluate a proposed action, and the candidate utterance when known.
    pub fn evaluate(
        &self,
        ctx: &ConversationContext,
        action: Action,
        utterance: Option<&str>,
    ) -> PolicyDecision {
        let rules = &self.rules;
        let mut decision = PolicyDecision::allow();

        // 1. Additive risk score.
        let mut score = 0;
        if !ctx.identity_verified && action.is_payment_discussion() {
            score += 3;
        }
        if ctx.disputed && !ctx.disclosure_complete {
            score += 3;
        }
        if rules.max_attempts > 0 {
            if ctx.prior_attempts.saturating_add(1) >= rules.max_attempts {
                score += 1;
            }
            if ctx.prior_attempts.saturating_mul(2) >= rules.max_attempts {
                score += 1;
            }
        }
        if rules.call_window.contains(ctx.local_minute_of_day)
            && rules.call_window.minutes_to_edge(ctx.local_minute_of_day)
                < rules.edge_margin_minutes
        {
            score += 1;
        }
        if rules.requires_recording_consent && ctx.recording_consent == Some(false) {
            score += 1;
        }
        decision.risk_score = score;
        decision.risk_level = RiskLevel::from_score(score);

        // 2. Prohibited phrases.
        if let Some(text) = utterance {
            for phrase in self.prohibited_hits(text) {
                decision.allowed = false;
                decision
                    .blocked_reasons
                    .push(format!("prohibited phrase \"{}\" ({})", phrase, rules.code));
            }
        }

        // 3. Scripts that must accompany the action. The disclosure action
        //    reads the jurisdiction's script itself.
        if action == Action::DiscloseMiniMiranda
            || (!ctx.disclosure_complete && !action.is_disclosure_or_identity())
        {
            decision
                .required_templates
                .extend(rules.disclosure_templates.iter().cloned());
        }
        let past_consent_stage = matches!(
            ctx.fsm_state,
            FsmState::DebtContext | FsmState::Negotiation | FsmState::PaymentSetup | FsmState::Wrapup
        );
        if rules.requires_recording_consent
            && past_consent_stage
            && ctx.recording_consent != Some(true)
        {
            decision
                .required_templates
                .insert(RECORDING_NOTICE_TEMPLATE.to_string());
        }

        // 4. Hard violations force a branch. Branch states already exit to
        //    END_CALL, so forcing only applies on the main flow.
        if ctx.fsm_state.is_main_flow() {
            let mut force = |target: FsmState, reason: String| {
                decision.allowed = false;
                decision.blocked_reasons.push(reason);
                if decision.forced_transition.is_none() {
                    decision.forced_transition = Some(target);
                }
            };
            if ctx.do_not_call {
                force(FsmState::DoNotCall, "borrower asked not to be contacted".to_string());
            }
            if !rules.call_window.contains(ctx.local_minute_of_day) {
                force(
                    FsmState::CallbackScheduled,
                    format!(
                        "outside {} call window ({:02}:{:02})",
                        rules.code,
                        ctx.local_minute_of_day / 60,
                        ctx.local_minute_of_day % 60
                    ),
                );
            }
            if rules.max_attempts > 0 && ctx.prior_attempts >= rules.max_attempts {
                force(
                    FsmState::EndCall,
                    format!(
                        "attempt cap reached ({} of {})",
                        ctx.prior_attempts, rules.max_attempts
                    ),
                );
            }
        }

        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DebtProfile, OutcomeSignal};
    use rust_decimal::Decimal;

    fn context(state: FsmState) -> ConversationContext {
        let debt = DebtProfile {
            creditor: "Acme Bank".to_string(),
            balance: Decimal::from(1_200),
            days_past_due: 45,
            currency: "USD".to_string(),
        };
        let mut ctx = ConversationContext::new(&debt, 0, 12 * 60);
        ctx.fsm_state = state;
        ctx
    }

    fn guard(code: &str) -> PolicyGuard {
        PolicyGuard::new(JurisdictionRules::builtin(code).unwrap())
    }

    // -- Built-ins --

    #[test]
    fn builtin_jurisdictions_are_valid() {
        let all = builtin_jurisdictions();
        assert_eq!(all.len(), 4);
        for rules in all.values() {
            rules.validate().unwrap();
        }
        assert!(JurisdictionRules::builtin("uae").is_some());
        assert!(JurisdictionRules::builtin("XX").is_none());
    }

    #[test]
    fn inverted_window_is_rejected() {
        let mut rules = JurisdictionRules::builtin("US").unwrap();
        rules.call_window = CallWindow {
            start_minute: 900,
            end_minute: 600,
        };
        assert!(matches!(
            rules.validate(),
            Err(ConfigError::Jurisdiction { .. })
        ));
    }

    // -- Prohibited phrases --

    #[test]
    fn uae_police_phrase_blocks_utterance() {
        let g = guard("UAE");
        let mut ctx = context(FsmState::Negotiation);
        ctx.disclosure_complete = true;
        ctx.identity_verified = true;
        let decision = g.evaluate(
            &ctx,
            Action::OfferPlan,
            Some("If you do not pay we will involve the POLICE."),
        );
        assert!(!decision.allowed);
        assert!(decision.blocked_reasons.iter().any(|r| r.contains("police")));
        assert!(decision.forced_transition.is_none());
    }

    #[test]
    fn clean_utterance_is_allowed() {
        let g = guard("UAE");
        let mut ctx = context(FsmState::Negotiation);
        ctx.disclosure_complete = true;
        ctx.identity_verified = true;
        ctx.recording_consent = Some(true);
        let decision = g.evaluate(&ctx, Action::OfferPlan, Some("We can split it into 3 payments."));
        assert!(decision.allowed);
        assert!(decision.blocked_reasons.is_empty());
        assert!(decision.required_templates.is_empty());
    }

    // -- Risk scoring --

    #[test]
    fn payment_talk_before_verification_is_high_risk() {
        let g = guard("US");
        let ctx = context(FsmState::Negotiation);
        let decision = g.evaluate(&ctx, Action::OfferSettlement, None);
        assert_eq!(decision.risk_level, RiskLevel::High);
        assert!(decision.allowed);
    }

    #[test]
    fn dispute_without_disclosure_is_high_risk() {
        let g = guard("US");
        let mut ctx = context(FsmState::DebtContext);
        ctx.disputed = true;
        let decision = g.evaluate(&ctx, Action::ExplainDebt, None);
        assert_eq!(decision.risk_level, RiskLevel::High);
    }

    #[test]
    fn attempts_and_window_edge_raise_risk() {
        let g = guard("US");
        let mut ctx = context(FsmState::Opening);
        assert_eq!(g.evaluate(&ctx, Action::Greet, None).risk_level, RiskLevel::Low);

        ctx.prior_attempts = 4;
        assert_eq!(g.evaluate(&ctx, Action::Greet, None).risk_level, RiskLevel::Medium);

        ctx.local_minute_of_day = 20 * 60 + 50;
        ctx.prior_attempts = 6;
        let decision = g.evaluate(&ctx, Action::Greet, None);
        assert_eq!(decision.risk_score, 3);
        assert_eq!(decision.risk_level, RiskLevel::High);
    }

    // -- Required templates --

    #[test]
    fn missing_disclosure_requires_template_without_blocking() {
        let g = guard("US");
        let ctx = context(FsmState::DebtContext);
        let decision = g.evaluate(&ctx, Action::ExplainDebt, None);
        assert!(decision.allowed);
        assert!(decision.required_templates.contains("mini_miranda"));

        let decision = g.evaluate(&context(FsmState::Opening), Action::Greet, None);
        assert!(decision.required_templates.is_empty());

        let decision = g.evaluate(&context(FsmState::Disclosure), Action::DiscloseMiniMiranda, None);
        assert!(decision.allowed);
        assert_eq!(decision.required_templates.len(), 1);
        assert!(decision.required_templates.contains("mini_miranda"));
    }

    #[test]
    fn outstanding_recording_consent_requires_notice() {
        let g = guard("UK");
        let mut ctx = context(FsmState::Negotiation);
        ctx.disclosure_complete = true;
        let decision = g.evaluate(&ctx, Action::Empathize, None);
        assert!(decision.required_templates.contains(RECORDING_NOTICE_TEMPLATE));

        ctx.recording_consent = Some(true);
        let decision = g.evaluate(&ctx, Action::Empathize, None);
        assert!(!decision.required_templates.contains(RECORDING_NOTICE_TEMPLATE));
    }

    // -- Hard violations --

    #[test]
    fn do_not_call_forces_branch() {
        let g = guard("US");
        let mut ctx = context(FsmState::Negotiation);
        ctx.do_not_call = true;
        ctx.last_signal = OutcomeSignal::StopContact;
        let decision = g.evaluate(&ctx, Action::OfferPlan, None);
        assert!(!decision.allowed);
        assert_eq!(decision.forced_transition, Some(FsmState::DoNotCall));
    }

    #[test]
    fn outside_window_forces_callback() {
        let g = guard("UAE");
        let mut ctx = context(FsmState::Opening);
        ctx.local_minute_of_day = 7 * 60;
        let decision = g.evaluate(&ctx, Action::Greet, None);
        assert_eq!(decision.forced_transition, Some(FsmState::CallbackScheduled));
        assert!(decision.blocked_reasons[0].contains("call window"));
    }

    #[test]
    fn attempt_cap_forces_end_call() {
        let g = guard("UAE");
        let mut ctx = context(FsmState::Opening);
        ctx.prior_attempts = 3;
        let decision = g.evaluate(&ctx, Action::Greet, None);
        assert_eq!(decision.forced_transition, Some(FsmState::EndCall));
    }

    #[test]
    fn huge_attempt_count_does_not_overflow() {
        let g = guard("US");
        let mut ctx = context(FsmState::Opening);
        ctx.prior_attempts = u32::MAX;
        let decision = g.evaluate(&ctx, Action::Greet, None);
        assert_eq!(decision.forced_transition, Some(FsmState::EndCall));
        assert!(decision.risk_score >= 2);
    }

    #[test]
    fn first_hard_violation_wins_but_all_are_reported() {
        let g = guard("UAE");
        let mut ctx = context(FsmState::Negotiation);
        ctx.do_not_call = true;
        ctx.prior_attempts = 9;
        let decision = g.evaluate(&ctx, Action::OfferPlan, None);
        assert_eq!(decision.forced_transition, Some(FsmState::DoNotCall));
        assert_eq!(decision.blocked_reasons.len(), 2);
    }

    #[test]
    fn branch_states_are_never_forced() {
        let g = guard("US");
        let mut ctx = context(FsmState::DisputeFlow);
        ctx.do_not_call = true;
        let decision = g.evaluate(&ctx, Action::ExplainDisputeProcess, None);
        assert!(decision.forced_transition.is_none());
    }

    #[test]
    fn evaluate_is_idempotent() {
        let g = guard("IN");
        let mut ctx = context(FsmState::Negotiation);
        ctx.prior_attempts = 2;
        let a = g.evaluate(&ctx, Action::OfferPlan, Some("talk to the police"));
        let b = g.evaluate(&ctx, Action::OfferPlan, Some("talk to the police"));
        assert_eq!(a, b);
    }
}
