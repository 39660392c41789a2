//! Tabular Q-learning over canonical state keys.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use settle_core::features::{state_key, state_of_key};
use settle_core::{Action, ConversationContext, StateMachine, Transition};
use tracing::trace;

use super::learning_steps;
use super::snapshot::SnapshotError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TabularQLearner {
    learning_rate: f64,
    discount: f64,
    /// Value of any (state, action) pair not yet in the table.
    initial_q: f64,
    table: BTreeMap<String, BTreeMap<Action, f64>>,
}

impl TabularQLearner {
    pub fn new(learning_rate: f64, discount: f64, initial_q: f64) -> Self {
        Self {
            learning_rate,
            discount,
            initial_q,
            table: BTreeMap::new(),
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn discount(&self) -> f64 {
        self.discount
    }

    pub fn initial_q(&self) -> f64 {
        self.initial_q
    }

    /// Number of rows (distinct state keys) seen so far.
    pub fn rows(&self) -> usize {
        self.table.len()
    }

    pub fn value(&self, key: &str, action: Action) -> f64 {
        self.table
            .get(key)
            .and_then(|row| row.get(&action))
            .copied()
            .unwrap_or(self.initial_q)
    }

    pub fn scores(&self, ctx: &ConversationContext, legal: &[Action]) -> Vec<(Action, f64)> {
        let key = state_key(ctx);
        legal.iter().map(|&a| (a, self.value(&key, a))).collect()
    }

    /// `max_a' Q[s', a']` over the legal actions of `next`, or 0 when the
    /// transition ends the episode.
    fn bootstrap(&self, fsm: &StateMachine, next: &ConversationContext, done: bool) -> f64 {
        let legal = fsm.legal_actions(next.fsm_state);
        if done || legal.is_empty() {
            return 0.0;
        }
        let key = state_key(next);
        legal
            .iter()
            .map(|&a| self.value(&key, a))
            .fold(f64::NEG_INFINITY, f64::max)
    }

    /// `Q[s,a] += α · (r + γ · max_a' Q[s',a'] − Q[s,a])` per transition,
    /// in order, over [`learning_steps`]. Returns the number of updates.
    pub fn update(&mut self, batch: &[Transition]) -> usize {
        let fsm = StateMachine::new();
        let mut steps = 0;
        for t in &learning_steps(batch) {
            let key = state_key(&t.state);
            let q = self.value(&key, t.action);
            let target = t.reward + self.discount * self.bootstrap(&fsm, &t.next_state, t.done);
            let updated = q + self.learning_rate * (target - q);
            trace!(key = %key, action = %t.action, q, updated, "td update");
            self.table.entry(key).or_default().insert(t.action, updated);
            steps += 1;
        }
        steps
    }

    pub(crate) fn check(&self) -> Result<(), SnapshotError> {
        for (field, value) in [
            ("learning_rate", self.learning_rate),
            ("discount", self.discount),
            ("initial_q", self.initial_q),
        ] {
            if !value.is_finite() {
                return Err(SnapshotError::NonFinite {
                    location: field.to_string(),
                });
            }
        }
        for (key, row) in &self.table {
            if state_of_key(key).is_none() {
                return Err(SnapshotError::Malformed(format!("unknown state in key '{}'", key)));
            }
            for (action, value) in row {
                if !value.is_finite() {
                    return Err(SnapshotError::NonFinite {
                        location: format!("table[{}].{}", key, action),
                    });
                }
            }
        }
        Ok(())
    }
}
