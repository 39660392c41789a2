//! Per-turn audit record and the builder that assembles it.
//!
//! A [`TurnTrace`] is sealed once, at COMMIT, and never mutated after. The
//! builder collects one stage at a time as the turn progresses; sealing
//! fails if a required stage never reported.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TraceError;
use crate::guard::PolicyDecision;
use crate::reward::RewardBreakdown;
use crate::types::{Action, CallOutcome, FsmState, OutcomeSignal};

/// Which learner variant produced a decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LearnerKind {
    #[serde(rename = "bandit")]
    Bandit,
    #[serde(rename = "qlearning")]
    QLearning,
}

impl LearnerKind {
    pub fn as_str(self) -> &'static str {
        match self {
            LearnerKind::Bandit => "bandit",
            LearnerKind::QLearning => "qlearning",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "bandit" => Some(LearnerKind::Bandit),
            "qlearning" => Some(LearnerKind::QLearning),
            _ => None,
        }
    }
}

impl fmt::Display for LearnerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Learner kind plus the policy-handle version that served the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LearnerTag {
    pub kind: LearnerKind,
    pub version: u64,
}

// ──────────────────────────────────────────────
// Generation directives and validation
// ──────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DirectiveMode {
    /// Say what the action calls for.
    Normal,
    /// Compliance override: produce a safe utterance for the forced path.
    Forced,
    /// A previous candidate failed validation; fix the listed failures.
    Repair,
}

/// Instructions handed to the response generator alongside the action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Directive {
    pub mode: DirectiveMode,
    /// Template ids the utterance must include.
    pub required_templates: BTreeSet<String>,
    /// Why the turn was forced. Empty unless `mode` is `Forced`.
    pub reasons: Vec<String>,
    pub forced_target: Option<FsmState>,
    /// Failures to repair. Empty unless `mode` is `Repair`.
    pub failures: Vec<ValidatorFailure>,
}

impl Directive {
    pub fn normal(required_templates: BTreeSet<String>) -> Self {
        Self {
            mode: DirectiveMode::Normal,
            required_templates,
            reasons: Vec::new(),
            forced_target: None,
            failures: Vec::new(),
        }
    }

    pub fn forced(
        reasons: Vec<String>,
        forced_target: Option<FsmState>,
        required_templates: BTreeSet<String>,
    ) -> Self {
        Self {
            mode: DirectiveMode::Forced,
            required_templates,
            reasons,
            forced_target,
            failures: Vec::new(),
        }
    }

    pub fn repair(failures: Vec<ValidatorFailure>, required_templates: BTreeSet<String>) -> Self {
        Self {
            mode: DirectiveMode::Repair,
            required_templates,
            reasons: Vec::new(),
            forced_target: None,
            failures,
        }
    }

    pub fn is_forced(&self) -> bool {
        self.mode == DirectiveMode::Forced
    }
}

/// One failed validator check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatorFailure {
    pub validator: String,
    pub detail: String,
}

impl ValidatorFailure {
    pub fn new(validator: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            validator: validator.into(),
            detail: detail.into(),
        }
    }
}

/// How the emitted utterance fared against the validator.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub passed: bool,
    /// Validator calls made, including repairs.
    pub attempts: u32,
    /// Failures from the last rejected candidate.
    pub failures: Vec<ValidatorFailure>,
    pub fallback_used: bool,
    pub timed_out: bool,
}

/// Wall-clock cost of each turn phase, in microseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LatencyBreakdown {
    pub select_us: u64,
    pub policy_us: u64,
    pub generate_us: u64,
    pub validate_us: u64,
    pub total_us: u64,
}

// ──────────────────────────────────────────────
// Turn trace
// ──────────────────────────────────────────────

/// Immutable record of one committed turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TurnTrace {
    pub session_id: String,
    pub turn_index: u32,
    /// RFC 3339.
    pub recorded_at: String,
    pub state_before: FsmState,
    pub state_after: FsmState,
    pub borrower_utterance: Option<String>,
    pub detected_signal: OutcomeSignal,
    /// What the learner chose.
    pub proposed_action: Action,
    /// What was actually said and scored.
    pub emitted_action: Action,
    pub overridden: bool,
    pub decision: PolicyDecision,
    pub directive: DirectiveMode,
    pub agent_utterance: String,
    pub validation: ValidationOutcome,
    pub reward: RewardBreakdown,
    pub latency: LatencyBreakdown,
    pub learner: LearnerTag,
    pub call_outcome: Option<CallOutcome>,
}

/// Stage-by-stage assembly of a [`TurnTrace`].
#[derive(Debug, Clone)]
pub struct TraceBuilder {
    session_id: String,
    turn_index: u32,
    state_before: FsmState,
    recorded_at: Option<String>,
    borrower_utterance: Option<String>,
    detected_signal: OutcomeSignal,
    selection: Option<(Action, LearnerTag)>,
    policy: Option<(PolicyDecision, Action, DirectiveMode)>,
    utterance: Option<(String, ValidationOutcome)>,
    reward: Option<RewardBreakdown>,
    commit: Option<(FsmState, Option<CallOutcome>)>,
    latency: LatencyBreakdown,
}

impl TraceBuilder {
    pub fn new(session_id: impl Into<String>, turn_index: u32, state_before: FsmState) -> Self {
        Self {
            session_id: session_id.into(),
            turn_index,
            state_before,
            recorded_at: None,
            borrower_utterance: None,
            detected_signal: OutcomeSignal::None,
            selection: None,
            policy: None,
            utterance: None,
            reward: None,
            commit: None,
            latency: LatencyBreakdown::default(),
        }
    }

    /// AWAIT_INPUT. Skipped for the opening turn.
    pub fn input(&mut self, utterance: impl Into<String>, signal: OutcomeSignal) -> &mut Self {
        self.borrower_utterance = Some(utterance.into());
        self.detected_signal = signal;
        self
    }

    /// SELECT_ACTION.
    pub fn selection(&mut self, proposed: Action, learner: LearnerTag) -> &mut Self {
        self.selection = Some((proposed, learner));
        self
    }

    /// POLICY_CHECK: the final decision and the action that will be emitted.
    pub fn policy(
        &mut self,
        decision: PolicyDecision,
        emitted: Action,
        directive: DirectiveMode,
    ) -> &mut Self {
        self.policy = Some((decision, emitted, directive));
        self
    }

    /// GENERATE + VALIDATE.
    pub fn utterance(&mut self, text: impl Into<String>, validation: ValidationOutcome) -> &mut Self {
        self.utterance = Some((text.into(), validation));
        self
    }

    /// SCORE.
    pub fn reward(&mut self, reward: RewardBreakdown) -> &mut Self {
        self.reward = Some(reward);
        self
    }

    /// COMMIT.
    pub fn commit(&mut self, state_after: FsmState, outcome: Option<CallOutcome>) -> &mut Self {
        self.commit = Some((state_after, outcome));
        self
    }

    pub fn latency(&mut self, latency: LatencyBreakdown) -> &mut Self {
        self.latency = latency;
        self
    }

    pub fn recorded_at(&mut self, timestamp: impl Into<String>) -> &mut Self {
        self.recorded_at = Some(timestamp.into());
        self
    }

    pub fn seal(self) -> Result<TurnTrace, TraceError> {
        let missing = |field: &'static str| TraceError::Incomplete { field };
        let (proposed_action, learner) = self.selection.ok_or_else(|| missing("selection"))?;
        let (decision, emitted_action, directive) = self.policy.ok_or_else(|| missing("policy"))?;
        let (agent_utterance, validation) = self.utterance.ok_or_else(|| missing("utterance"))?;
        let reward = self.reward.ok_or_else(|| missing("reward"))?;
        let (state_after, call_outcome) = self.commit.ok_or_else(|| missing("commit"))?;
        let recorded_at = self.recorded_at.ok_or_else(|| missing("recorded_at"))?;

        Ok(TurnTrace {
            session_id: self.session_id,
            turn_index: self.turn_index,
            recorded_at,
            state_before: self.state_before,
            state_after,
            borrower_utterance: self.borrower_utterance,
            detected_signal: self.detected_signal,
            overridden: proposed_action != emitted_action,
            proposed_action,
            emitted_action,
            decision,
            directive,
            agent_utterance,
            validation,
            reward,
            latency: self.latency,
            learner,
            call_outcome,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guard::RiskLevel;

    fn decision() -> PolicyDecision {
        PolicyDecision {
            allowed: true,
            risk_level: RiskLevel::Low,
            risk_score: 0,
            forced_transition: None,
            blocked_reasons: Vec::new(),
            required_templates: BTreeSet::new(),
        }
    }

    fn tag() -> LearnerTag {
        LearnerTag {
            kind: LearnerKind::Bandit,
            version: 3,
        }
    }

    fn full_builder() -> TraceBuilder {
        let mut b = TraceBuilder::new("s-1", 4, FsmState::Negotiation);
        b.input("ok, a plan works", OutcomeSignal::Agreement)
            .selection(Action::OfferPlan, tag())
            .policy(decision(), Action::OfferPlan, DirectiveMode::Normal)
            .utterance(
                "Great, let's set that up.",
                ValidationOutcome {
                    passed: true,
                    attempts: 1,
                    ..ValidationOutcome::default()
                },
            )
            .reward(RewardBreakdown::new(0.5, 0.0, -0.05))
            .commit(FsmState::PaymentSetup, None)
            .recorded_at("2026-01-05T10:00:00Z");
        b
    }

    #[test]
    fn seals_when_every_stage_reported() {
        let trace = full_builder().seal().unwrap();
        assert_eq!(trace.turn_index, 4);
        assert_eq!(trace.state_before, FsmState::Negotiation);
        assert_eq!(trace.state_after, FsmState::PaymentSetup);
        assert!(!trace.overridden);
        assert_eq!(trace.detected_signal, OutcomeSignal::Agreement);
    }

    #[test]
    fn override_is_derived_from_actions() {
        let mut b = full_builder();
        b.policy(decision(), Action::ComplianceExit, DirectiveMode::Forced);
        let trace = b.seal().unwrap();
        assert!(trace.overridden);
        assert_eq!(trace.emitted_action, Action::ComplianceExit);
        assert_eq!(trace.directive, DirectiveMode::Forced);
    }

    #[test]
    fn missing_stage_fails_seal() {
        let mut b = TraceBuilder::new("s-1", 0, FsmState::Opening);
        b.selection(Action::Greet, tag())
            .policy(decision(), Action::Greet, DirectiveMode::Normal)
            .recorded_at("2026-01-05T10:00:00Z");
        assert_eq!(
            b.seal().unwrap_err(),
            TraceError::Incomplete { field: "utterance" }
        );
    }

    #[test]
    fn trace_serializes_learner_kind_lowercase() {
        let trace = full_builder().seal().unwrap();
        let json = serde_json::to_value(&trace).unwrap();
        assert_eq!(json["learner"]["kind"], "bandit");
        assert_eq!(json["emitted_action"], "OFFER_PLAN");
        assert_eq!(json["directive"], "normal");
    }
}
