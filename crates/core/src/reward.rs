//! Per-turn reward: shaping + terminal + turn penalty.
//!
//! The sum in [`RewardBreakdown::total`] is the only signal learners see.

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{Action, CallOutcome, ConversationContext, OutcomeSignal};

/// Reward components for one turn. `total` is always the sum of the others.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RewardBreakdown {
    pub shaping: f64,
    pub terminal: f64,
    pub turn_penalty: f64,
    pub total: f64,
}

impl RewardBreakdown {
    pub fn new(shaping: f64, terminal: f64, turn_penalty: f64) -> Self {
        Self {
            shaping,
            terminal,
            turn_penalty,
            total: shaping + terminal + turn_penalty,
        }
    }
}

/// Terminal value per call outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TerminalRewards {
    pub payment_arrangement: f64,
    pub callback: f64,
    pub escalation: f64,
    pub dispute: f64,
    pub wrong_party: f64,
    pub do_not_call: f64,
    pub no_resolution: f64,
    pub compliance_stop: f64,
    pub hangup: f64,
    pub max_turns_exceeded: f64,
    pub system_error: f64,
}

impl Default for TerminalRewards {
    fn default() -> Self {
        Self {
            payment_arrangement: 10.0,
            callback: 3.0,
            escalation: 1.5,
            dispute: 0.5,
            wrong_party: 0.25,
            do_not_call: -0.5,
            no_resolution: -0.5,
            compliance_stop: -1.0,
            hangup: -2.0,
            max_turns_exceeded: -3.0,
            system_error: -3.0,
        }
    }
}

impl TerminalRewards {
    pub fn value(&self, outcome: CallOutcome) -> f64 {
        match outcome {
            CallOutcome::PaymentArrangement => self.payment_arrangement,
            CallOutcome::Callback => self.callback,
            CallOutcome::Escalation => self.escalation,
            CallOutcome::Dispute => self.dispute,
            CallOutcome::WrongParty => self.wrong_party,
            CallOutcome::DoNotCall => self.do_not_call,
            CallOutcome::NoResolution => self.no_resolution,
            CallOutcome::ComplianceStop => self.compliance_stop,
            CallOutcome::Hangup => self.hangup,
            CallOutcome::MaxTurnsExceeded => self.max_turns_exceeded,
            CallOutcome::SystemError => self.system_error,
        }
    }
}

/// Shaping weights and the terminal ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RewardConfig {
    pub disclosure_bonus: f64,
    pub identity_bonus: f64,
    /// Multiplied by the offer's generosity when the borrower agrees.
    pub offer_weight: f64,
    /// Subtracted when objections keep piling up without de-escalation.
    pub repeated_objection_penalty: f64,
    /// Multiplied by the sentiment gain after a de-escalation action.
    pub deescalation_weight: f64,
    /// Applied every turn. Must be negative.
    pub turn_penalty: f64,
    pub terminal: TerminalRewards,
}

impl Default for RewardConfig {
    fn default() -> Self {
        Self {
            disclosure_bonus: 0.5,
            identity_bonus: 0.5,
            offer_weight: 1.0,
            repeated_objection_penalty: 0.3,
            deescalation_weight: 0.2,
            turn_penalty: -0.05,
            terminal: TerminalRewards::default(),
        }
    }
}

impl RewardConfig {
    /// Reject non-finite weights and a terminal ladder that does not rank
    /// payment > callback > escalation > dispute > hangup with hangup < 0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.terminal;
        let fields: [(&str, f64); 17] = [
            ("disclosure_bonus", self.disclosure_bonus),
            ("identity_bonus", self.identity_bonus),
            ("offer_weight", self.offer_weight),
            ("repeated_objection_penalty", self.repeated_objection_penalty),
            ("deescalation_weight", self.deescalation_weight),
            ("turn_penalty", self.turn_penalty),
            ("terminal.payment_arrangement", t.payment_arrangement),
            ("terminal.callback", t.callback),
            ("terminal.escalation", t.escalation),
            ("terminal.dispute", t.dispute),
            ("terminal.wrong_party", t.wrong_party),
            ("terminal.do_not_call", t.do_not_call),
            ("terminal.no_resolution", t.no_resolution),
            ("terminal.compliance_stop", t.compliance_stop),
            ("terminal.hangup", t.hangup),
            ("terminal.max_turns_exceeded", t.max_turns_exceeded),
            ("terminal.system_error", t.system_error),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite {
                    field: field.to_string(),
                });
            }
        }

        if self.turn_penalty >= 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "turn_penalty".to_string(),
                message: "must be negative".to_string(),
            });
        }
        for (field, value) in [
            ("offer_weight", self.offer_weight),
            ("repeated_objection_penalty", self.repeated_objection_penalty),
            ("deescalation_weight", self.deescalation_weight),
        ] {
            if value < 0.0 {
                return Err(ConfigError::OutOfRange {
                    field: field.to_string(),
                    message: "must not be negative".to_string(),
                });
            }
        }

        let ladder = [
            ("payment_arrangement", t.payment_arrangement),
            ("callback", t.callback),
            ("escalation", t.escalation),
            ("dispute", t.dispute),
            ("hangup", t.hangup),
        ];
        for pair in ladder.windows(2) {
            let (hi_name, hi) = pair[0];
            let (lo_name, lo) = pair[1];
            if hi <= lo {
                return Err(ConfigError::RewardOrdering {
                    message: format!("{} ({}) must exceed {} ({})", hi_name, hi, lo_name, lo),
                });
            }
        }
        if t.hangup >= 0.0 {
            return Err(ConfigError::RewardOrdering {
                message: format!("hangup ({}) must be negative", t.hangup),
            });
        }
        if t.max_turns_exceeded >= 0.0 {
            return Err(ConfigError::RewardOrdering {
                message: format!(
                    "max_turns_exceeded ({}) must be negative",
                    t.max_turns_exceeded
                ),
            });
        }
        Ok(())
    }
}

/// Stateless scorer over a [`RewardConfig`].
#[derive(Debug, Clone, Default)]
pub struct RewardComputer {
    config: RewardConfig,
}

impl RewardComputer {
    pub fn new(config: RewardConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RewardConfig {
        &self.config
    }

    /// Score the move from `prev` to `next` via `action`.
    ///
    /// `prev` is the context as the turn started, before the borrower's
    /// utterance was folded in; `next` is the committed context.
    pub fn compute(
        &self,
        prev: &ConversationContext,
        action: Action,
        next: &ConversationContext,
        signal: OutcomeSignal,
    ) -> RewardBreakdown {
        let cfg = &self.config;
        let mut shaping = 0.0;

        if next.disclosure_complete && !prev.disclosure_complete {
            shaping += cfg.disclosure_bonus;
        }
        if next.identity_verified && !prev.identity_verified {
            shaping += cfg.identity_bonus;
        }
        if signal == OutcomeSignal::Agreement {
            if let Some(generosity) = action.offer_generosity() {
                shaping += cfg.offer_weight * generosity;
            }
        }
        if action.is_deescalation() {
            shaping += cfg.deescalation_weight * (next.sentiment - prev.sentiment).max(0.0);
        } else if next.objections_raised > prev.objections_raised && prev.objections_raised >= 1 {
            shaping -= cfg.repeated_objection_penalty;
        }

        let terminal = match (prev.call_outcome, next.call_outcome) {
            (None, Some(outcome)) => cfg.terminal.value(outcome),
            _ => 0.0,
        };

        RewardBreakdown::new(shaping, terminal, cfg.turn_penalty)
    }
}
