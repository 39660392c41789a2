//! Offline training against simulated borrowers.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use settle_core::{CallOutcome, ConfigError};
use tracing::{debug, info};

use super::persona::{sample_debt, Persona, ScriptedBorrower};
use super::run_episode;
use crate::error::TurnError;
use crate::policy::{ActionSelector, PolicyHandle};
use crate::turn::{SessionSpec, TurnProcessor};

/// How a training run is shaped.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingOptions {
    pub episodes: u32,
    /// Install the learner into the policy handle every this many episodes.
    /// The final episode always triggers a swap.
    pub swap_every: u32,
    pub seed: u64,
    pub jurisdiction: String,
    pub currency: String,
    /// Cycled in order, one per episode.
    pub personas: Vec<Persona>,
    pub local_minute_of_day: u16,
}

impl Default for TrainingOptions {
    fn default() -> Self {
        Self {
            episodes: 100,
            swap_every: 10,
            seed: 7,
            jurisdiction: "US".to_string(),
            currency: "USD".to_string(),
            personas: super::BUILTIN_PERSONAS
                .iter()
                .filter_map(|name| Persona::builtin(name))
                .collect(),
            local_minute_of_day: 10 * 60,
        }
    }
}

impl TrainingOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.episodes == 0 || self.swap_every == 0 {
            return Err(ConfigError::OutOfRange {
                field: "training.episodes / training.swap_every".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }
        if self.personas.is_empty() {
            return Err(ConfigError::OutOfRange {
                field: "training.personas".to_string(),
                message: "at least one persona is required".to_string(),
            });
        }
        for persona in &self.personas {
            persona.validate()?;
        }
        Ok(())
    }
}

/// Summary of a training run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub episodes: u32,
    pub mean_return: f64,
    pub outcomes: BTreeMap<CallOutcome, u32>,
    pub episodes_trained: u64,
    pub policy_version: u64,
}

impl fmt::Display for TrainingReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "episodes:         {}", self.episodes)?;
        writeln!(f, "mean return:      {:.3}", self.mean_return)?;
        writeln!(f, "episodes trained: {}", self.episodes_trained)?;
        writeln!(f, "policy version:   {}", self.policy_version)?;
        writeln!(f, "outcomes:")?;
        for (outcome, count) in &self.outcomes {
            writeln!(f, "  {:<20} {}", outcome.as_str(), count)?;
        }
        Ok(())
    }
}

/// Owns a private learner, plays episodes through a processor that serves
/// from `policy`, updates after every sealed episode and periodically
/// swaps the learner into `policy`.
#[derive(Debug)]
pub struct Trainer {
    processor: TurnProcessor,
    policy: Arc<PolicyHandle>,
    learner: ActionSelector,
    options: TrainingOptions,
}

impl Trainer {
    /// `processor` should be built over `policy`, usually with exploration
    /// enabled.
    pub fn new(
        processor: TurnProcessor,
        policy: Arc<PolicyHandle>,
        learner: ActionSelector,
        options: TrainingOptions,
    ) -> Self {
        Self {
            processor,
            policy,
            learner,
            options,
        }
    }

    pub fn learner(&self) -> &ActionSelector {
        &self.learner
    }

    pub fn into_learner(self) -> ActionSelector {
        self.learner
    }

    pub async fn run(&mut self) -> Result<TrainingReport, TurnError> {
        self.options.validate()?;
        let mut rng = StdRng::seed_from_u64(self.options.seed);
        let mut outcomes: BTreeMap<CallOutcome, u32> = BTreeMap::new();
        let mut total_return = 0.0;
        let mut version = self.policy.current().await.version;
        let episodes = self.options.episodes;

        for i in 0..episodes {
            let persona = self.options.personas[i as usize % self.options.personas.len()].clone();
            let name = persona.name.clone();
            let mut borrower = ScriptedBorrower::new(persona, rng.gen());
            let spec = SessionSpec::new(
                self.options.jurisdiction.clone(),
                sample_debt(&mut rng, &self.options.currency),
            )
            .with_persona(name.clone())
            .at_minute(self.options.local_minute_of_day);

            let episode = run_episode(&self.processor, &mut borrower, spec).await?.episode;
            let steps = self.learner.update(episode.transitions());
            self.learner.record_episode();
            total_return += episode.total_return();
            *outcomes.entry(episode.outcome()).or_default() += 1;
            debug!(
                episode = i,
                persona = %name,
                outcome = %episode.outcome(),
                total_return = episode.total_return(),
                steps,
                "episode trained"
            );

            let done = i + 1;
            if done % self.options.swap_every == 0 || done == episodes {
                version = self.policy.swap(self.learner.clone()).await;
            }
        }

        self.processor.flush_recordings().await;
        let report = TrainingReport {
            episodes,
            mean_return: total_return / f64::from(episodes),
            outcomes,
            episodes_trained: self.learner.episodes_trained(),
            policy_version: version,
        };
        info!(
            episodes = report.episodes,
            mean_return = report.mean_return,
            policy_version = report.policy_version,
            "training finished"
        );
        Ok(report)
    }
}
