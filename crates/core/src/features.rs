//! Context encodings consumed by the learners.
//!
//! The bandit scores a dense feature vector; the Q-learner keys its table by
//! a canonical string over the state and a few coarse context buckets. Both
//! encodings are versioned by their layout: changing either invalidates
//! stored snapshots.

use crate::types::{
    ConversationContext, DaysPastDueBucket, DebtBucket, FsmState, OutcomeSignal, SentimentBand,
};

/// Length of [`encode_features`]'s output.
pub const FEATURE_DIM: usize =
    1 + FsmState::COUNT + 3 + DebtBucket::COUNT + DaysPastDueBucket::COUNT + 6 + OutcomeSignal::COUNT;

const STATE_OFFSET: usize = 1;
const SCALAR_OFFSET: usize = STATE_OFFSET + FsmState::COUNT;
const DEBT_OFFSET: usize = SCALAR_OFFSET + 3;
const DPD_OFFSET: usize = DEBT_OFFSET + DebtBucket::COUNT;
const FLAG_OFFSET: usize = DPD_OFFSET + DaysPastDueBucket::COUNT;
const SIGNAL_OFFSET: usize = FLAG_OFFSET + 6;

/// Name of each feature slot, in order.
pub const FEATURE_NAMES: [&str; FEATURE_DIM] = [
    "bias",
    "state_opening",
    "state_disclosure",
    "state_identity_verification",
    "state_consent_recording",
    "state_debt_context",
    "state_negotiation",
    "state_payment_setup",
    "state_wrapup",
    "state_end_call",
    "state_wrong_party_flow",
    "state_dispute_flow",
    "state_callback_scheduled",
    "state_do_not_call",
    "state_escalate_human",
    "turn_count_norm",
    "time_in_state_norm",
    "sentiment",
    "debt_low",
    "debt_medium",
    "debt_high",
    "debt_very_high",
    "dpd_lt30",
    "dpd_30",
    "dpd_60",
    "dpd_90",
    "dpd_120p",
    "prior_attempts_norm",
    "identity_verified",
    "disclosure_complete",
    "objections_norm",
    "offers_norm",
    "disputed",
    "signal_none",
    "signal_affirm",
    "signal_identity_confirmed",
    "signal_wrong_party",
    "signal_dispute",
    "signal_agreement",
    "signal_refusal",
    "signal_objection",
    "signal_callback_request",
    "signal_stop_contact",
    "signal_human_request",
    "signal_hangup",
];

/// Dense feature vector for the contextual bandit.
///
/// Counters are scaled to roughly `[0, 1]` and capped so long calls do not
/// dominate the dot product.
pub fn encode_features(ctx: &ConversationContext) -> [f64; FEATURE_DIM] {
    let mut x = [0.0; FEATURE_DIM];
    let flag = |b: bool| if b { 1.0 } else { 0.0 };

    x[0] = 1.0;
    x[STATE_OFFSET + ctx.fsm_state.index()] = 1.0;

    x[SCALAR_OFFSET] = (f64::from(ctx.turn_count) / 20.0).min(1.0);
    x[SCALAR_OFFSET + 1] = (f64::from(ctx.time_in_state) / 5.0).min(1.0);
    x[SCALAR_OFFSET + 2] = ctx.sentiment.clamp(-1.0, 1.0);

    x[DEBT_OFFSET + ctx.debt_bucket.index()] = 1.0;
    x[DPD_OFFSET + ctx.dpd_bucket.index()] = 1.0;

    x[FLAG_OFFSET] = (f64::from(ctx.prior_attempts) / 7.0).min(1.0);
    x[FLAG_OFFSET + 1] = flag(ctx.identity_verified);
    x[FLAG_OFFSET + 2] = flag(ctx.disclosure_complete);
    x[FLAG_OFFSET + 3] = (f64::from(ctx.objections_raised) / 3.0).min(1.0);
    x[FLAG_OFFSET + 4] = (f64::from(ctx.offers_made) / 3.0).min(1.0);
    x[FLAG_OFFSET + 5] = flag(ctx.disputed);
    x[SIGNAL_OFFSET + ctx.last_signal.index()] = 1.0;
    x
}

/// Canonical Q-table row key.
///
/// `NEGOTIATION|dbt=medium|dpd=60|id=1|disc=1|obj=2|off=1|sent=neg|sig=OBJECTION`
pub fn state_key(ctx: &ConversationContext) -> String {
    format!(
        "{}|dbt={}|dpd={}|id={}|disc={}|obj={}|off={}|sent={}|sig={}",
        ctx.fsm_state.as_str(),
        ctx.debt_bucket.as_str(),
        ctx.dpd_bucket.as_str(),
        u8::from(ctx.identity_verified),
        u8::from(ctx.disclosure_complete),
        ctx.objections_raised.min(3),
        ctx.offers_made.min(3),
        SentimentBand::from_score(ctx.sentiment).as_str(),
        ctx.last_signal.as_str(),
    )
}

/// The FSM state a key was built for.
pub fn state_of_key(key: &str) -> Option<FsmState> {
    let name = key.split('|').next()?;
    FsmState::ALL.into_iter().find(|s| s.as_str() == name)
}

/// Dot product over the shared feature layout.
pub fn dot(weights: &[f64], features: &[f64]) -> f64 {
    weights.iter().zip(features).map(|(w, x)| w * x).sum()
}
