//! Engine configuration.
//!
//! Every struct here is `#[serde(default)]`, so a TOML file only needs the
//! keys it overrides. Call [`SettleConfig::validate`] after loading.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use settle_core::{builtin_jurisdictions, ConfigError, JurisdictionRules, LearnerKind, RewardConfig};

/// Turn-processing limits and collaborator budgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Turns after which the call is forced to END_CALL.
    pub max_turns: u32,
    /// Regenerations allowed after a failed validation.
    pub max_repair_attempts: u32,
    /// Retries after a collaborator error, per call.
    pub max_external_retries: u32,
    /// Base backoff between retries; multiplied by the attempt number.
    pub retry_backoff_ms: u64,
    pub generation_timeout_ms: u64,
    pub validation_timeout_ms: u64,
    pub idle_timeout_secs: u64,
    pub default_jurisdiction: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_turns: 20,
            max_repair_attempts: 2,
            max_external_retries: 2,
            retry_backoff_ms: 50,
            generation_timeout_ms: 2_000,
            validation_timeout_ms: 1_000,
            idle_timeout_secs: 300,
            default_jurisdiction: "US".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_millis(self.generation_timeout_ms)
    }

    pub fn validation_timeout(&self) -> Duration {
        Duration::from_millis(self.validation_timeout_ms)
    }

    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("engine.max_turns", u64::from(self.max_turns)),
            ("engine.generation_timeout_ms", self.generation_timeout_ms),
            ("engine.validation_timeout_ms", self.validation_timeout_ms),
        ];
        for (field, value) in positive {
            if value == 0 {
                return Err(ConfigError::OutOfRange {
                    field: field.to_string(),
                    message: "must be greater than zero".to_string(),
                });
            }
        }
        Ok(())
    }
}

/// Learner selection and hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LearnerConfig {
    pub kind: LearnerKind,
    /// Step size for both the bandit SGD step and the TD update.
    pub learning_rate: f64,
    /// Q-learning discount factor.
    pub discount: f64,
    /// Value assumed for unseen Q-table entries. `0.0` is neutral; a
    /// positive value makes the learner try untested actions first.
    pub initial_q: f64,
    /// Exploration rate used by the trainer only.
    pub epsilon: f64,
}

impl Default for LearnerConfig {
    fn default() -> Self {
        Self {
            kind: LearnerKind::QLearning,
            learning_rate: 0.1,
            discount: 0.95,
            initial_q: 0.0,
            epsilon: 0.1,
        }
    }
}

impl LearnerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("learner.learning_rate", self.learning_rate),
            ("learner.discount", self.discount),
            ("learner.initial_q", self.initial_q),
            ("learner.epsilon", self.epsilon),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite {
                    field: field.to_string(),
                });
            }
        }
        let range = |field: &str, message: &str| ConfigError::OutOfRange {
            field: field.to_string(),
            message: message.to_string(),
        };
        if self.learning_rate <= 0.0 || self.learning_rate > 1.0 {
            return Err(range("learner.learning_rate", "must be in (0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.discount) {
            return Err(range("learner.discount", "must be in [0, 1]"));
        }
        if !(0.0..=1.0).contains(&self.epsilon) {
            return Err(range("learner.epsilon", "must be in [0, 1]"));
        }
        Ok(())
    }
}

/// Everything the CLI reads from a config file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SettleConfig {
    pub engine: EngineConfig,
    pub reward: RewardConfig,
    pub learner: LearnerConfig,
    /// Overrides or additions to the built-in jurisdictions, by code.
    pub jurisdictions: BTreeMap<String, JurisdictionRules>,
    /// Extra or replacement script text, by template id.
    pub templates: BTreeMap<String, String>,
}

impl SettleConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.engine.validate()?;
        self.reward.validate()?;
        self.learner.validate()?;
        for (code, rules) in &self.jurisdictions {
            if !code.eq_ignore_ascii_case(&rules.code) {
                return Err(ConfigError::Jurisdiction {
                    code: code.clone(),
                    message: format!("table key does not match code '{}'", rules.code),
                });
            }
            rules.validate()?;
        }
        let known = self.all_jurisdictions();
        if !known.contains_key(&self.engine.default_jurisdiction.to_ascii_uppercase()) {
            return Err(ConfigError::Jurisdiction {
                code: self.engine.default_jurisdiction.clone(),
                message: "default jurisdiction is not defined".to_string(),
            });
        }
        // Scripts are spoken verbatim, including as fallbacks.
        for (id, text) in &self.templates {
            let lowered = text.to_lowercase();
            for rules in known.values() {
                let hit = rules
                    .prohibited_phrases
                    .iter()
                    .find(|phrase| lowered.contains(&phrase.to_lowercase()));
                if let Some(phrase) = hit {
                    return Err(ConfigError::Jurisdiction {
                        code: rules.code.clone(),
                        message: format!("template '{}' contains prohibited phrase \"{}\"", id, phrase),
                    });
                }
            }
        }
        Ok(())
    }

    /// Built-in jurisdictions with configured ones layered on top.
    /// Keys are upper-case codes.
    pub fn all_jurisdictions(&self) -> BTreeMap<String, JurisdictionRules> {
        let mut all = builtin_jurisdictions();
        for rules in self.jurisdictions.values() {
            all.insert(rules.code.to_ascii_uppercase(), rules.clone());
        }
        all
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        SettleConfig::default().validate().unwrap();
    }

    #[test]
    fn zero_turn_cap_is_rejected() {
        let config = EngineConfig {
            max_turns: 0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::OutOfRange { .. })));
    }

    #[test]
    fn learner_ranges_are_checked() {
        let mut learner = LearnerConfig {
            discount: 1.5,
            ..LearnerConfig::default()
        };
        assert!(learner.validate().is_err());
        learner.discount = 0.9;
        learner.learning_rate = f64::INFINITY;
        assert!(matches!(learner.validate(), Err(ConfigError::NonFinite { .. })));
    }

    #[test]
    fn configured_jurisdiction_overrides_builtin() {
        let mut rules = JurisdictionRules::builtin("US").unwrap();
        rules.max_attempts = 2;
        let mut config = SettleConfig::default();
        config.jurisdictions.insert("US".to_string(), rules);
        config.validate().unwrap();
        assert_eq!(config.all_jurisdictions()["US"].max_attempts, 2);
        assert_eq!(config.all_jurisdictions().len(), 4);
    }

    #[test]
    fn unknown_default_jurisdiction_is_rejected() {
        let mut config = SettleConfig::default();
        config.engine.default_jurisdiction = "ZZ".to_string();
        assert!(matches!(config.validate(), Err(ConfigError::Jurisdiction { .. })));
    }

    #[test]
    fn template_with_prohibited_phrase_is_rejected() {
        let mut config = SettleConfig::default();
        config
            .templates
            .insert("mini_miranda".to_string(), "Pay now or we call the police.".to_string());
        assert!(matches!(config.validate(), Err(ConfigError::Jurisdiction { .. })));
    }

    #[test]
    fn config_loads_from_partial_toml() {
        let config: SettleConfig = toml::from_str(
            r#"
            [engine]
            max_turns = 12

            [learner]
            kind = "bandit"
            learning_rate = 0.05
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.engine.max_turns, 12);
        assert_eq!(config.engine.max_repair_attempts, 2);
        assert_eq!(config.learner.kind, LearnerKind::Bandit);
    }

    #[test]
    fn retry_backoff_scales_with_attempt() {
        let config = EngineConfig::default();
        assert_eq!(config.retry_backoff(3), Duration::from_millis(150));
    }
}
