use serde::{Deserialize, Serialize};
use settle_core::{CallOutcome, Episode};

/// Selection criteria for [`crate::EpisodeRecorder::query_episodes`].
///
/// Every `None` field matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EpisodeFilter {
    pub outcome: Option<CallOutcome>,
    pub persona: Option<String>,
    pub jurisdiction: Option<String>,
    /// Inclusive lower bound on the episode's total return.
    pub min_return: Option<f64>,
    pub limit: Option<usize>,
}

impl EpisodeFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_outcome(mut self, outcome: CallOutcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn with_persona(mut self, persona: impl Into<String>) -> Self {
        self.persona = Some(persona.into());
        self
    }

    pub fn with_jurisdiction(mut self, code: impl Into<String>) -> Self {
        self.jurisdiction = Some(code.into());
        self
    }

    pub fn with_min_return(mut self, min_return: f64) -> Self {
        self.min_return = Some(min_return);
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, episode: &Episode) -> bool {
        if let Some(outcome) = self.outcome {
            if episode.outcome() != outcome {
                return false;
            }
        }
        if let Some(persona) = &self.persona {
            if episode.persona() != Some(persona.as_str()) {
                return false;
            }
        }
        if let Some(code) = &self.jurisdiction {
            if !episode.jurisdiction().eq_ignore_ascii_case(code) {
                return false;
            }
        }
        if let Some(min_return) = self.min_return {
            if episode.total_return() < min_return {
                return false;
            }
        }
        true
    }

    /// Apply the filter to episodes already in record order.
    pub fn apply<'a, I>(&self, episodes: I) -> Vec<Episode>
    where
        I: IntoIterator<Item = &'a Episode>,
    {
        let matching = episodes.into_iter().filter(|e| self.matches(e)).cloned();
        match self.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }
}
