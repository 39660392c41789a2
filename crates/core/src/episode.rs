//! Training episodes: the transition history of one sealed session.

use serde::{Deserialize, Serialize};

use crate::reward::RewardBreakdown;
use crate::trace::LearnerTag;
use crate::types::{Action, CallOutcome, ConversationContext, OutcomeSignal};

/// Extra per-step detail kept alongside the learning tuple.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionInfo {
    pub turn_index: u32,
    pub signal: OutcomeSignal,
    pub proposed_action: Action,
    pub overridden: bool,
    pub fallback_used: bool,
    pub reward: RewardBreakdown,
}

/// One `(s, a, r, s', done)` step.
///
/// `state` is the context the action was chosen in. Inside an episode,
/// `next_state` is the context the following step was chosen in, with the
/// borrower's reply folded in; the last step keeps the committed context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    pub state: ConversationContext,
    pub action: Action,
    pub reward: f64,
    pub next_state: ConversationContext,
    pub done: bool,
    pub info: TransitionInfo,
}

/// A sealed episode. Read-only once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    episode_id: String,
    session_id: String,
    persona: Option<String>,
    jurisdiction: String,
    learner: LearnerTag,
    transitions: Vec<Transition>,
    total_return: f64,
    length: usize,
    outcome: CallOutcome,
    started_at: String,
    ended_at: String,
}

impl Episode {
    pub fn episode_id(&self) -> &str {
        &self.episode_id
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn persona(&self) -> Option<&str> {
        self.persona.as_deref()
    }

    pub fn jurisdiction(&self) -> &str {
        &self.jurisdiction
    }

    pub fn learner(&self) -> LearnerTag {
        self.learner
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    pub fn total_return(&self) -> f64 {
        self.total_return
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn outcome(&self) -> CallOutcome {
        self.outcome
    }

    pub fn started_at(&self) -> &str {
        &self.started_at
    }

    pub fn ended_at(&self) -> &str {
        &self.ended_at
    }
}

/// Accumulates transitions for an open session. Sealing consumes it, so an
/// episode can only be sealed once.
#[derive(Debug, Clone)]
pub struct EpisodeBuilder {
    episode_id: String,
    session_id: String,
    persona: Option<String>,
    jurisdiction: String,
    learner: LearnerTag,
    started_at: String,
    transitions: Vec<Transition>,
}

impl EpisodeBuilder {
    pub fn new(
        episode_id: impl Into<String>,
        session_id: impl Into<String>,
        jurisdiction: impl Into<String>,
        persona: Option<String>,
        learner: LearnerTag,
        started_at: impl Into<String>,
    ) -> Self {
        Self {
            episode_id: episode_id.into(),
            session_id: session_id.into(),
            persona,
            jurisdiction: jurisdiction.into(),
            learner,
            started_at: started_at.into(),
            transitions: Vec::new(),
        }
    }

    /// Append a step. An open previous step is chained to it, so that
    /// `transitions[i].next_state == transitions[i + 1].state`.
    pub fn push(&mut self, transition: Transition) {
        if let Some(last) = self.transitions.last_mut().filter(|t| !t.done) {
            last.next_state = transition.state.clone();
        }
        self.transitions.push(transition);
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    /// Outcome of the last transition that carries one.
    pub fn current_outcome(&self) -> Option<CallOutcome> {
        self.transitions
            .iter()
            .rev()
            .find_map(|t| t.next_state.call_outcome)
    }

    pub fn seal(self, outcome: CallOutcome, ended_at: impl Into<String>) -> Episode {
        let total_return = self.transitions.iter().map(|t| t.reward).sum();
        Episode {
            episode_id: self.episode_id,
            session_id: self.session_id,
            persona: self.persona,
            jurisdiction: self.jurisdiction,
            learner: self.learner,
            length: self.transitions.len(),
            transitions: self.transitions,
            total_return,
            outcome,
            started_at: self.started_at,
            ended_at: ended_at.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::LearnerKind;
    use crate::types::{DebtProfile, FsmState};
    use rust_decimal::Decimal;

    fn transition(reward: f64, done: bool) -> Transition {
        let debt = DebtProfile {
            creditor: "Acme Bank".to_string(),
            balance: Decimal::from(300),
            days_past_due: 10,
            currency: "USD".to_string(),
        };
        let state = ConversationContext::new(&debt, 0, 600);
        let next_state = state.committed(Action::Greet, FsmState::Disclosure);
        Transition {
            state,
            action: Action::Greet,
            reward,
            next_state,
            done,
            info: TransitionInfo {
                turn_index: 0,
                signal: OutcomeSignal::None,
                proposed_action: Action::Greet,
                overridden: false,
                fallback_used: false,
                reward: RewardBreakdown::new(0.0, 0.0, reward),
            },
        }
    }

    fn builder() -> EpisodeBuilder {
        EpisodeBuilder::new(
            "ep-1",
            "s-1",
            "US",
            Some("cooperative".to_string()),
            LearnerTag {
                kind: LearnerKind::QLearning,
                version: 1,
            },
            "2026-01-05T10:00:00Z",
        )
    }

    #[test]
    fn seal_aggregates_return_and_length() {
        let mut b = builder();
        b.push(transition(-0.05, false));
        b.push(transition(2.95, true));
        let episode = b.seal(CallOutcome::Callback, "2026-01-05T10:03:00Z");
        assert_eq!(episode.len(), 2);
        assert!((episode.total_return() - 2.9).abs() < 1e-12);
        assert_eq!(episode.outcome(), CallOutcome::Callback);
        assert_eq!(episode.persona(), Some("cooperative"));
    }

    #[test]
    fn empty_episode_has_zero_return() {
        let episode = builder().seal(CallOutcome::SystemError, "2026-01-05T10:00:01Z");
        assert!(episode.is_empty());
        assert_eq!(episode.total_return(), 0.0);
    }

    #[test]
    fn episode_json_round_trips() {
        let mut b = builder();
        b.push(transition(0.1 + 0.2, false));
        let episode = b.seal(CallOutcome::NoResolution, "2026-01-05T10:01:00Z");
        let json = serde_json::to_string(&episode).unwrap();
        let back: Episode = serde_json::from_str(&json).unwrap();
        assert_eq!(back, episode);
    }

    #[test]
    fn push_chains_open_steps() {
        let mut b = builder();
        b.push(transition(-0.05, false));
        let mut reply = transition(0.2, true);
        reply.state.last_signal = OutcomeSignal::Agreement;
        reply.state.sentiment = 0.4;
        b.push(reply.clone());
        // a step after a terminal one is left alone
        b.push(transition(0.0, false));
        let episode = b.seal(CallOutcome::PaymentArrangement, "2026-01-05T10:02:00Z");
        let steps = episode.transitions();
        assert_eq!(steps[0].next_state, reply.state);
        assert_eq!(steps[1].next_state, reply.next_state);
    }
}
