//! Conversation vocabulary: FSM states, agent actions, borrower signals,
//! call outcomes, and the per-session conversation context.
//!
//! Everything here is plain data. The transition rules live in
//! [`crate::fsm`]; the compliance rules in [`crate::guard`].

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// ──────────────────────────────────────────────
// FSM states
// ──────────────────────────────────────────────

/// A named stage of the regulated conversation.
///
/// The discriminant doubles as the index into the static state table in
/// [`crate::fsm`], so the variant order must match that table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FsmState {
    Opening,
    Disclosure,
    IdentityVerification,
    ConsentRecording,
    DebtContext,
    Negotiation,
    PaymentSetup,
    Wrapup,
    EndCall,
    WrongPartyFlow,
    DisputeFlow,
    CallbackScheduled,
    DoNotCall,
    EscalateHuman,
}

impl FsmState {
    pub const COUNT: usize = 14;

    pub const ALL: [FsmState; FsmState::COUNT] = [
        FsmState::Opening,
        FsmState::Disclosure,
        FsmState::IdentityVerification,
        FsmState::ConsentRecording,
        FsmState::DebtContext,
        FsmState::Negotiation,
        FsmState::PaymentSetup,
        FsmState::Wrapup,
        FsmState::EndCall,
        FsmState::WrongPartyFlow,
        FsmState::DisputeFlow,
        FsmState::CallbackScheduled,
        FsmState::DoNotCall,
        FsmState::EscalateHuman,
    ];

    /// Position of this state in [`FsmState::ALL`] and the state table.
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FsmState::Opening => "OPENING",
            FsmState::Disclosure => "DISCLOSURE",
            FsmState::IdentityVerification => "IDENTITY_VERIFICATION",
            FsmState::ConsentRecording => "CONSENT_RECORDING",
            FsmState::DebtContext => "DEBT_CONTEXT",
            FsmState::Negotiation => "NEGOTIATION",
            FsmState::PaymentSetup => "PAYMENT_SETUP",
            FsmState::Wrapup => "WRAPUP",
            FsmState::EndCall => "END_CALL",
            FsmState::WrongPartyFlow => "WRONG_PARTY_FLOW",
            FsmState::DisputeFlow => "DISPUTE_FLOW",
            FsmState::CallbackScheduled => "CALLBACK_SCHEDULED",
            FsmState::DoNotCall => "DO_NOT_CALL",
            FsmState::EscalateHuman => "ESCALATE_HUMAN",
        }
    }
}

impl fmt::Display for FsmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// Agent actions
// ──────────────────────────────────────────────

/// A move the agent can make in a turn.
///
/// `ComplianceExit` is not legal in any state; it is what the turn
/// processor emits when the compliance guard forces a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Action {
    Greet,
    DiscloseMiniMiranda,
    VerifyIdentity,
    OfferCallback,
    RequestRecordingConsent,
    ExplainDebt,
    Empathize,
    OfferPlan,
    OfferSettlement,
    OfferFullPayment,
    HandleObjection,
    ScheduleCallback,
    EscalateToHuman,
    ConfirmPayment,
    Summarize,
    CloseCall,
    ApologizeWrongParty,
    ExplainDisputeProcess,
    ConfirmCallback,
    ConfirmDoNotCall,
    TransferToHuman,
    ComplianceExit,
}

impl Action {
    pub const ALL: [Action; 22] = [
        Action::Greet,
        Action::DiscloseMiniMiranda,
        Action::VerifyIdentity,
        Action::OfferCallback,
        Action::RequestRecordingConsent,
        Action::ExplainDebt,
        Action::Empathize,
        Action::OfferPlan,
        Action::OfferSettlement,
        Action::OfferFullPayment,
        Action::HandleObjection,
        Action::ScheduleCallback,
        Action::EscalateToHuman,
        Action::ConfirmPayment,
        Action::Summarize,
        Action::CloseCall,
        Action::ApologizeWrongParty,
        Action::ExplainDisputeProcess,
        Action::ConfirmCallback,
        Action::ConfirmDoNotCall,
        Action::TransferToHuman,
        Action::ComplianceExit,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::Greet => "GREET",
            Action::DiscloseMiniMiranda => "DISCLOSE_MINI_MIRANDA",
            Action::VerifyIdentity => "VERIFY_IDENTITY",
            Action::OfferCallback => "OFFER_CALLBACK",
            Action::RequestRecordingConsent => "REQUEST_RECORDING_CONSENT",
            Action::ExplainDebt => "EXPLAIN_DEBT",
            Action::Empathize => "EMPATHIZE",
            Action::OfferPlan => "OFFER_PLAN",
            Action::OfferSettlement => "OFFER_SETTLEMENT",
            Action::OfferFullPayment => "OFFER_FULL_PAYMENT",
            Action::HandleObjection => "HANDLE_OBJECTION",
            Action::ScheduleCallback => "SCHEDULE_CALLBACK",
            Action::EscalateToHuman => "ESCALATE_TO_HUMAN",
            Action::ConfirmPayment => "CONFIRM_PAYMENT",
            Action::Summarize => "SUMMARIZE",
            Action::CloseCall => "CLOSE_CALL",
            Action::ApologizeWrongParty => "APOLOGIZE_WRONG_PARTY",
            Action::ExplainDisputeProcess => "EXPLAIN_DISPUTE_PROCESS",
            Action::ConfirmCallback => "CONFIRM_CALLBACK",
            Action::ConfirmDoNotCall => "CONFIRM_DO_NOT_CALL",
            Action::TransferToHuman => "TRANSFER_TO_HUMAN",
            Action::ComplianceExit => "COMPLIANCE_EXIT",
        }
    }

    /// How much the offer concedes, in `[0, 1]`. `None` for non-offers.
    pub fn offer_generosity(self) -> Option<f64> {
        match self {
            Action::OfferFullPayment => Some(0.2),
            Action::OfferPlan => Some(0.5),
            Action::OfferSettlement => Some(0.8),
            _ => None,
        }
    }

    pub fn is_offer(self) -> bool {
        self.offer_generosity().is_some()
    }

    /// Actions that talk about paying. Risky before identity is verified.
    pub fn is_payment_discussion(self) -> bool {
        self.is_offer() || matches!(self, Action::ConfirmPayment)
    }

    /// Actions that may run before the disclosure script has been read.
    pub fn is_disclosure_or_identity(self) -> bool {
        matches!(
            self,
            Action::Greet
                | Action::DiscloseMiniMiranda
                | Action::VerifyIdentity
                | Action::OfferCallback
                | Action::ApologizeWrongParty
                | Action::ConfirmDoNotCall
                | Action::ComplianceExit
        )
    }

    pub fn is_deescalation(self) -> bool {
        matches!(self, Action::Empathize | Action::HandleObjection)
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// Borrower signals
// ──────────────────────────────────────────────

/// What the borrower's latest utterance amounts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeSignal {
    #[default]
    None,
    Affirm,
    IdentityConfirmed,
    WrongParty,
    Dispute,
    Agreement,
    Refusal,
    Objection,
    CallbackRequest,
    StopContact,
    HumanRequest,
    Hangup,
}

impl OutcomeSignal {
    pub const COUNT: usize = 12;

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OutcomeSignal::None => "NONE",
            OutcomeSignal::Affirm => "AFFIRM",
            OutcomeSignal::IdentityConfirmed => "IDENTITY_CONFIRMED",
            OutcomeSignal::WrongParty => "WRONG_PARTY",
            OutcomeSignal::Dispute => "DISPUTE",
            OutcomeSignal::Agreement => "AGREEMENT",
            OutcomeSignal::Refusal => "REFUSAL",
            OutcomeSignal::Objection => "OBJECTION",
            OutcomeSignal::CallbackRequest => "CALLBACK_REQUEST",
            OutcomeSignal::StopContact => "STOP_CONTACT",
            OutcomeSignal::HumanRequest => "HUMAN_REQUEST",
            OutcomeSignal::Hangup => "HANGUP",
        }
    }
}

impl fmt::Display for OutcomeSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified borrower utterance.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Observation {
    pub signal: OutcomeSignal,
    /// Change in estimated sentiment implied by the utterance.
    pub sentiment_delta: f64,
}

// ──────────────────────────────────────────────
// Call outcomes
// ──────────────────────────────────────────────

/// How a call ended. Attached to the context on the commit that first
/// reaches a branch state or END_CALL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CallOutcome {
    PaymentArrangement,
    Callback,
    Escalation,
    Dispute,
    WrongParty,
    DoNotCall,
    NoResolution,
    ComplianceStop,
    Hangup,
    MaxTurnsExceeded,
    SystemError,
}

impl CallOutcome {
    pub const ALL: [CallOutcome; 11] = [
        CallOutcome::PaymentArrangement,
        CallOutcome::Callback,
        CallOutcome::Escalation,
        CallOutcome::Dispute,
        CallOutcome::WrongParty,
        CallOutcome::DoNotCall,
        CallOutcome::NoResolution,
        CallOutcome::ComplianceStop,
        CallOutcome::Hangup,
        CallOutcome::MaxTurnsExceeded,
        CallOutcome::SystemError,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CallOutcome::PaymentArrangement => "payment arrangement",
            CallOutcome::Callback => "callback",
            CallOutcome::Escalation => "escalation",
            CallOutcome::Dispute => "dispute",
            CallOutcome::WrongParty => "wrong party",
            CallOutcome::DoNotCall => "do not call",
            CallOutcome::NoResolution => "no resolution",
            CallOutcome::ComplianceStop => "compliance stop",
            CallOutcome::Hangup => "hangup",
            CallOutcome::MaxTurnsExceeded => "max turns exceeded",
            CallOutcome::SystemError => "system error",
        }
    }

    /// Outcome implied by entering `state`, if `state` is a branch state.
    pub fn for_branch(state: FsmState) -> Option<CallOutcome> {
        match state {
            FsmState::WrongPartyFlow => Some(CallOutcome::WrongParty),
            FsmState::DisputeFlow => Some(CallOutcome::Dispute),
            FsmState::CallbackScheduled => Some(CallOutcome::Callback),
            FsmState::DoNotCall => Some(CallOutcome::DoNotCall),
            FsmState::EscalateHuman => Some(CallOutcome::Escalation),
            _ => None,
        }
    }
}

impl fmt::Display for CallOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ──────────────────────────────────────────────
// Debt profile and buckets
// ──────────────────────────────────────────────

/// The account being discussed. Amounts are exact decimals.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtProfile {
    pub creditor: String,
    pub balance: Decimal,
    pub days_past_due: u32,
    pub currency: String,
}

impl DebtProfile {
    pub fn debt_bucket(&self) -> DebtBucket {
        DebtBucket::from_balance(self.balance)
    }

    pub fn dpd_bucket(&self) -> DaysPastDueBucket {
        DaysPastDueBucket::from_days(self.days_past_due)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DebtBucket {
    Low,
    Medium,
    High,
    VeryHigh,
}

impl DebtBucket {
    pub const COUNT: usize = 4;

    pub fn from_balance(balance: Decimal) -> Self {
        if balance < Decimal::from(500) {
            DebtBucket::Low
        } else if balance < Decimal::from(2_500) {
            DebtBucket::Medium
        } else if balance < Decimal::from(10_000) {
            DebtBucket::High
        } else {
            DebtBucket::VeryHigh
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DebtBucket::Low => "low",
            DebtBucket::Medium => "medium",
            DebtBucket::High => "high",
            DebtBucket::VeryHigh => "very_high",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DaysPastDueBucket {
    Under30,
    Days30,
    Days60,
    Days90,
    Days120Plus,
}

impl DaysPastDueBucket {
    pub const COUNT: usize = 5;

    pub fn from_days(days: u32) -> Self {
        match days {
            0..=29 => DaysPastDueBucket::Under30,
            30..=59 => DaysPastDueBucket::Days30,
            60..=89 => DaysPastDueBucket::Days60,
            90..=119 => DaysPastDueBucket::Days90,
            _ => DaysPastDueBucket::Days120Plus,
        }
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn as_str(self) -> &'static str {
        match self {
            DaysPastDueBucket::Under30 => "lt30",
            DaysPastDueBucket::Days30 => "30",
            DaysPastDueBucket::Days60 => "60",
            DaysPastDueBucket::Days90 => "90",
            DaysPastDueBucket::Days120Plus => "120p",
        }
    }
}

/// Coarse sentiment used in tabular state keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SentimentBand {
    Negative,
    Neutral,
    Positive,
}

impl SentimentBand {
    pub fn from_score(score: f64) -> Self {
        if score < -0.25 {
            SentimentBand::Negative
        } else if score > 0.25 {
            SentimentBand::Positive
        } else {
            SentimentBand::Neutral
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SentimentBand::Negative => "neg",
            SentimentBand::Neutral => "neu",
            SentimentBand::Positive => "pos",
        }
    }
}

// ──────────────────────────────────────────────
// Conversation context
// ──────────────────────────────────────────────

/// Mutable per-session record. Also the discretized input to the learners.
///
/// Owned exclusively by one session; the turn processor replaces it with
/// the result of [`ConversationContext::committed`] at the end of a turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub fsm_state: FsmState,
    pub turn_count: u32,
    /// Turns spent in the current state.
    pub time_in_state: u32,
    pub debt_bucket: DebtBucket,
    pub dpd_bucket: DaysPastDueBucket,
    pub prior_attempts: u32,
    pub identity_verified: bool,
    pub disclosure_complete: bool,
    /// `None` until the borrower answers the consent question.
    pub recording_consent: Option<bool>,
    pub last_signal: OutcomeSignal,
    pub last_action: Option<Action>,
    /// Estimated borrower sentiment in `[-1, 1]`.
    pub sentiment: f64,
    pub objections_raised: u32,
    pub offers_made: u32,
    pub disputed: bool,
    pub do_not_call: bool,
    pub payment_arranged: bool,
    /// Minutes since local midnight in the debtor's jurisdiction.
    pub local_minute_of_day: u16,
    pub call_outcome: Option<CallOutcome>,
}

impl ConversationContext {
    /// Fresh context at OPENING.
    pub fn new(debt: &DebtProfile, prior_attempts: u32, local_minute_of_day: u16) -> Self {
        Self {
            fsm_state: FsmState::Opening,
            turn_count: 0,
            time_in_state: 0,
            debt_bucket: debt.debt_bucket(),
            dpd_bucket: debt.dpd_bucket(),
            prior_attempts,
            identity_verified: false,
            disclosure_complete: false,
            recording_consent: None,
            last_signal: OutcomeSignal::None,
            last_action: None,
            sentiment: 0.0,
            objections_raised: 0,
            offers_made: 0,
            disputed: false,
            do_not_call: false,
            payment_arranged: false,
            local_minute_of_day,
            call_outcome: None,
        }
    }

    /// Fold a classified borrower utterance into the context.
    ///
    /// The utterance answers the agent's previous action, so consent answers
    /// are interpreted against `last_action`. Identity counts as confirmed
    /// during IDENTITY_VERIFICATION or right after a verification prompt.
    pub fn observe(&mut self, observation: &Observation) {
        let signal = observation.signal;
        self.last_signal = signal;
        self.sentiment = (self.sentiment + observation.sentiment_delta).clamp(-1.0, 1.0);

        match signal {
            OutcomeSignal::Objection | OutcomeSignal::Refusal => self.objections_raised += 1,
            OutcomeSignal::Dispute => self.disputed = true,
            OutcomeSignal::StopContact => self.do_not_call = true,
            _ => {}
        }

        if signal == OutcomeSignal::IdentityConfirmed
            && (self.fsm_state == FsmState::IdentityVerification
                || self.last_action == Some(Action::VerifyIdentity))
        {
            self.identity_verified = true;
        }

        match self.last_action {
            Some(Action::RequestRecordingConsent) => match signal {
                OutcomeSignal::Affirm | OutcomeSignal::Agreement => {
                    self.recording_consent = Some(true);
                }
                OutcomeSignal::Refusal | OutcomeSignal::Objection => {
                    self.recording_consent = Some(false);
                }
                _ => {}
            },
            _ => {}
        }
    }

    /// The context after `action` moved the conversation to `next_state`.
    ///
    /// Pure: the caller decides when to install the result.
    pub fn committed(&self, action: Action, next_state: FsmState) -> ConversationContext {
        let mut next = self.clone();
        next.turn_count += 1;
        next.time_in_state = if next_state == self.fsm_state {
            self.time_in_state + 1
        } else {
            0
        };
        next.fsm_state = next_state;
        next.last_action = Some(action);

        if action == Action::DiscloseMiniMiranda {
            next.disclosure_complete = true;
        }
        if action.is_offer() {
            next.offers_made += 1;
        }
        if next_state == FsmState::PaymentSetup && self.fsm_state == FsmState::Negotiation {
            next.payment_arranged = true;
        }
        next
    }

    /// True once the call has an outcome (branch state or END_CALL reached).
    pub fn is_concluded(&self) -> bool {
        self.call_outcome.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn debt() -> DebtProfile {
        DebtProfile {
            creditor: "Acme Bank".to_string(),
            balance: Decimal::new(125_000, 2),
            days_past_due: 75,
            currency: "USD".to_string(),
        }
    }

    #[test]
    fn state_index_matches_all_order() {
        for (i, state) in FsmState::ALL.iter().enumerate() {
            assert_eq!(state.index(), i);
        }
    }

    #[test]
    fn states_serialize_screaming_snake_case() {
        let json = serde_json::to_string(&FsmState::IdentityVerification).unwrap();
        assert_eq!(json, "\"IDENTITY_VERIFICATION\"");
        let action: Action = serde_json::from_str("\"OFFER_PLAN\"").unwrap();
        assert_eq!(action, Action::OfferPlan);
        for action in Action::ALL {
            let json = serde_json::to_string(&action).unwrap();
            assert_eq!(json, format!("\"{}\"", action.as_str()));
        }
    }

    #[test]
    fn buckets_from_profile() {
        let profile = debt();
        assert_eq!(profile.debt_bucket(), DebtBucket::Medium);
        assert_eq!(profile.dpd_bucket(), DaysPastDueBucket::Days60);
        assert_eq!(DebtBucket::from_balance(Decimal::new(49_999, 2)), DebtBucket::Low);
        assert_eq!(DebtBucket::from_balance(Decimal::from(10_000)), DebtBucket::VeryHigh);
        assert_eq!(DaysPastDueBucket::from_days(400), DaysPastDueBucket::Days120Plus);
    }

    #[test]
    fn new_context_starts_at_opening() {
        let ctx = ConversationContext::new(&debt(), 2, 600);
        assert_eq!(ctx.fsm_state, FsmState::Opening);
        assert_eq!(ctx.turn_count, 0);
        assert_eq!(ctx.prior_attempts, 2);
        assert!(!ctx.is_concluded());
    }

    #[test]
    fn observe_tracks_objections_and_flags() {
        let mut ctx = ConversationContext::new(&debt(), 0, 600);
        ctx.observe(&Observation {
            signal: OutcomeSignal::Objection,
            sentiment_delta: -0.4,
        });
        ctx.observe(&Observation {
            signal: OutcomeSignal::StopContact,
            sentiment_delta: -0.9,
        });
        assert_eq!(ctx.objections_raised, 1);
        assert!(ctx.do_not_call);
        assert_eq!(ctx.sentiment, -1.0);
        assert_eq!(ctx.last_signal, OutcomeSignal::StopContact);
    }

    #[test]
    fn identity_confirmation_needs_verification_context() {
        let mut ctx = ConversationContext::new(&debt(), 0, 600);
        let confirmed = Observation {
            signal: OutcomeSignal::IdentityConfirmed,
            sentiment_delta: 0.0,
        };
        ctx.observe(&confirmed);
        assert!(!ctx.identity_verified);

        ctx.last_action = Some(Action::VerifyIdentity);
        ctx.observe(&confirmed);
        assert!(ctx.identity_verified);

        let mut ctx = ConversationContext::new(&debt(), 0, 600);
        ctx.fsm_state = FsmState::IdentityVerification;
        ctx.last_action = Some(Action::DiscloseMiniMiranda);
        ctx.observe(&confirmed);
        assert!(ctx.identity_verified);
    }

    #[test]
    fn consent_answer_recorded_against_consent_request() {
        let mut ctx = ConversationContext::new(&debt(), 0, 600);
        ctx.last_action = Some(Action::RequestRecordingConsent);
        ctx.observe(&Observation {
            signal: OutcomeSignal::Refusal,
            sentiment_delta: 0.0,
        });
        assert_eq!(ctx.recording_consent, Some(false));
    }

    #[test]
    fn committed_updates_bookkeeping() {
        let mut ctx = ConversationContext::new(&debt(), 0, 600);
        ctx.fsm_state = FsmState::Negotiation;
        ctx.time_in_state = 2;

        let stay = ctx.committed(Action::OfferPlan, FsmState::Negotiation);
        assert_eq!(stay.turn_count, 1);
        assert_eq!(stay.time_in_state, 3);
        assert_eq!(stay.offers_made, 1);
        assert!(!stay.payment_arranged);

        let moved = stay.committed(Action::OfferSettlement, FsmState::PaymentSetup);
        assert_eq!(moved.time_in_state, 0);
        assert_eq!(moved.offers_made, 2);
        assert!(moved.payment_arranged);
        assert_eq!(moved.last_action, Some(Action::OfferSettlement));
    }
}
