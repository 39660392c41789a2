//! Action selection: the learned half of the turn.
//!
//! [`ActionSelector`] wraps one of two learners in a closed enum. Both pick
//! the arg-max over the legal actions they are given, breaking ties by the
//! order of that list, so selection is a pure function of the learner and
//! the context. Exploration exists only on the explicit
//! [`ActionSelector::select_exploring`] path the trainer uses.

mod bandit;
mod handle;
mod qlearning;
mod snapshot;

pub use bandit::ContextualBandit;
pub use handle::{PolicyHandle, VersionedSelector};
pub use qlearning::TabularQLearner;
pub use snapshot::{parameters_checksum, PolicySnapshot, SnapshotError};

use std::time::{Duration, Instant};

use rand::Rng;
use settle_core::{Action, ConversationContext, LearnerKind, StateMachine, Transition};

use crate::config::LearnerConfig;

/// The steps a learner trains on.
///
/// A forced exit's action is never legal in its state, so no learner can own
/// it. Its reward and end state fold into the chosen step right before it,
/// which then ends where the exit ended. A forced exit with no open chosen
/// step before it is dropped.
pub(crate) fn learning_steps(batch: &[Transition]) -> Vec<Transition> {
    let fsm = StateMachine::new();
    let mut steps: Vec<Transition> = Vec::with_capacity(batch.len());
    let mut open = false;
    for t in batch {
        if fsm.legal_actions(t.state.fsm_state).contains(&t.action) {
            steps.push(t.clone());
            open = !t.done;
        } else if let Some(last) = steps.last_mut().filter(|_| open) {
            last.reward += t.reward;
            last.next_state = t.next_state.clone();
            last.done = t.done;
            open = !t.done;
        } else {
            open = false;
        }
    }
    steps
}

/// The two learner variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Learner {
    Bandit(ContextualBandit),
    QLearning(TabularQLearner),
}

/// A chosen action plus how it was chosen.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub action: Action,
    pub latency: Duration,
    /// Score of every legal action, in legal order.
    pub scores: Vec<(Action, f64)>,
    pub explored: bool,
}

/// A learner plus its training counter.
#[derive(Debug, Clone, PartialEq)]
pub struct ActionSelector {
    learner: Learner,
    episodes_trained: u64,
}

impl ActionSelector {
    /// A fresh, untrained learner of the configured kind.
    pub fn new(config: &LearnerConfig) -> Self {
        let learner = match config.kind {
            LearnerKind::Bandit => Learner::Bandit(ContextualBandit::new(config.learning_rate)),
            LearnerKind::QLearning => Learner::QLearning(TabularQLearner::new(
                config.learning_rate,
                config.discount,
                config.initial_q,
            )),
        };
        Self::from_learner(learner)
    }

    pub fn from_learner(learner: Learner) -> Self {
        Self {
            learner,
            episodes_trained: 0,
        }
    }

    pub fn kind(&self) -> LearnerKind {
        match self.learner {
            Learner::Bandit(_) => LearnerKind::Bandit,
            Learner::QLearning(_) => LearnerKind::QLearning,
        }
    }

    pub fn learner(&self) -> &Learner {
        &self.learner
    }

    pub fn episodes_trained(&self) -> u64 {
        self.episodes_trained
    }

    fn scores(&self, ctx: &ConversationContext, legal: &[Action]) -> Vec<(Action, f64)> {
        match &self.learner {
            Learner::Bandit(b) => b.scores(ctx, legal),
            Learner::QLearning(q) => q.scores(ctx, legal),
        }
    }

    /// Greedy choice among `legal`. `None` only when `legal` is empty.
    pub fn select(&self, ctx: &ConversationContext, legal: &[Action]) -> Option<Selection> {
        let started = Instant::now();
        let scores = self.scores(ctx, legal);
        let mut best: Option<(Action, f64)> = None;
        for &(action, score) in &scores {
            // strict: the first of equal scores wins
            if best.map_or(true, |(_, b)| score > b) {
                best = Some((action, score));
            }
        }
        let (action, _) = best?;
        Some(Selection {
            action,
            latency: started.elapsed(),
            scores,
            explored: false,
        })
    }

    /// Epsilon-greedy choice. Training only.
    pub fn select_exploring<R: Rng + ?Sized>(
        &self,
        ctx: &ConversationContext,
        legal: &[Action],
        epsilon: f64,
        rng: &mut R,
    ) -> Option<Selection> {
        if legal.is_empty() {
            return None;
        }
        if rng.gen::<f64>() < epsilon {
            let started = Instant::now();
            let action = legal[rng.gen_range(0..legal.len())];
            return Some(Selection {
                action,
                latency: started.elapsed(),
                scores: self.scores(ctx, legal),
                explored: true,
            });
        }
        self.select(ctx, legal)
    }

    /// Apply the learner's update rule to a batch. Returns steps taken.
    pub fn update(&mut self, batch: &[Transition]) -> usize {
        match &mut self.learner {
            Learner::Bandit(b) => b.update(batch),
            Learner::QLearning(q) => q.update(batch),
        }
    }

    /// Count one more fully trained episode.
    pub fn record_episode(&mut self) {
        self.episodes_trained += 1;
    }

    pub fn export_snapshot(&self) -> Result<PolicySnapshot, SnapshotError> {
        let parameters = match &self.learner {
            Learner::Bandit(b) => serde_json::to_value(b)?,
            Learner::QLearning(q) => serde_json::to_value(q)?,
        };
        PolicySnapshot::new(self.kind().as_str(), parameters, self.episodes_trained)
    }

    /// Rebuild a selector, refusing anything that does not check out.
    pub fn from_snapshot(snapshot: &PolicySnapshot) -> Result<Self, SnapshotError> {
        snapshot.verify()?;
        let kind = LearnerKind::parse(&snapshot.kind)
            .ok_or_else(|| SnapshotError::UnknownType(snapshot.kind.clone()))?;
        let learner = match kind {
            LearnerKind::Bandit => {
                let b: ContextualBandit = serde_json::from_value(snapshot.parameters.clone())?;
                b.check()?;
                Learner::Bandit(b)
            }
            LearnerKind::QLearning => {
                let q: TabularQLearner = serde_json::from_value(snapshot.parameters.clone())?;
                q.check()?;
                Learner::QLearning(q)
            }
        };
        Ok(Self {
            learner,
            episodes_trained: snapshot.episodes_trained,
        })
    }

    pub fn import_snapshot(blob: &str) -> Result<Self, SnapshotError> {
        Self::from_snapshot(&PolicySnapshot::from_json(blob)?)
    }
}
