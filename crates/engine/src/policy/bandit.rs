//! Linear contextual bandit: one weight vector per action.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use settle_core::features::{dot, encode_features};
use settle_core::{Action, ConversationContext, Transition, FEATURE_DIM};

use super::learning_steps;
use super::snapshot::SnapshotError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextualBandit {
    learning_rate: f64,
    feature_dim: usize,
    /// Actions never updated have no entry and score 0.
    weights: BTreeMap<Action, Vec<f64>>,
}

impl ContextualBandit {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            feature_dim: FEATURE_DIM,
            weights: BTreeMap::new(),
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.learning_rate
    }

    pub fn weights(&self, action: Action) -> Option<&[f64]> {
        self.weights.get(&action).map(Vec::as_slice)
    }

    fn predict(&self, action: Action, features: &[f64]) -> f64 {
        self.weights
            .get(&action)
            .map_or(0.0, |w| dot(w, features))
    }

    /// Score every legal action, in legal order.
    pub fn scores(&self, ctx: &ConversationContext, legal: &[Action]) -> Vec<(Action, f64)> {
        let x = encode_features(ctx);
        legal.iter().map(|&a| (a, self.predict(a, &x))).collect()
    }

    /// One SGD step on squared error per transition, toward its immediate
    /// reward. Forced exits count through [`learning_steps`]. Returns the
    /// number of steps taken.
    pub fn update(&mut self, batch: &[Transition]) -> usize {
        let mut steps = 0;
        for t in &learning_steps(batch) {
            let x = encode_features(&t.state);
            let error = t.reward - self.predict(t.action, &x);
            let step = self.learning_rate * error;
            let w = self
                .weights
                .entry(t.action)
                .or_insert_with(|| vec![0.0; FEATURE_DIM]);
            for (wi, xi) in w.iter_mut().zip(x.iter()) {
                *wi += step * xi;
            }
            steps += 1;
        }
        steps
    }

    pub(crate) fn check(&self) -> Result<(), SnapshotError> {
        if self.feature_dim != FEATURE_DIM {
            return Err(SnapshotError::DimensionMismatch {
                expected: FEATURE_DIM,
                found: self.feature_dim,
            });
        }
        if !self.learning_rate.is_finite() {
            return Err(SnapshotError::NonFinite {
                location: "learning_rate".to_string(),
            });
        }
        for (action, w) in &self.weights {
            if w.len() != FEATURE_DIM {
                return Err(SnapshotError::DimensionMismatch {
                    expected: FEATURE_DIM,
                    found: w.len(),
                });
            }
            if let Some(i) = w.iter().position(|v| !v.is_finite()) {
                return Err(SnapshotError::NonFinite {
                    location: format!("weights.{}[{}]", action, i),
                });
            }
        }
        Ok(())
    }
}
