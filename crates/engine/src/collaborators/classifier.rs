//! Keyword reference classifier.

use settle_core::{ConversationContext, Observation, OutcomeSignal};

use super::SignalClassifier;

/// One phrase rule. Phrases are written in normalized form: lower case,
/// apostrophes dropped, other punctuation replaced by spaces.
struct Rule {
    signal: OutcomeSignal,
    sentiment_delta: f64,
    phrases: &'static [&'static str],
}

/// Checked in order; the first rule with a matching phrase wins.
const RULES: &[Rule] = &[
    Rule {
        signal: OutcomeSignal::Hangup,
        sentiment_delta: -0.5,
        phrases: &["hang up", "hanging up", "goodbye", "bye", "click"],
    },
    Rule {
        signal: OutcomeSignal::StopContact,
        sentiment_delta: -0.6,
        phrases: &["stop calling", "dont call", "do not call", "never call", "stop contacting"],
    },
    Rule {
        signal: OutcomeSignal::WrongParty,
        sentiment_delta: 0.0,
        phrases: &["wrong number", "wrong person", "no one by that name", "nobody by that name", "not me"],
    },
    Rule {
        signal: OutcomeSignal::HumanRequest,
        sentiment_delta: -0.2,
        phrases: &["real person", "a human", "supervisor", "manager", "someone else"],
    },
    Rule {
        signal: OutcomeSignal::Dispute,
        sentiment_delta: -0.3,
        phrases: &["dont owe", "do not owe", "not my debt", "dispute", "never borrowed", "already paid"],
    },
    Rule {
        signal: OutcomeSignal::CallbackRequest,
        sentiment_delta: 0.0,
        phrases: &["call me back", "call back", "bad time", "call later", "busy right now"],
    },
    Rule {
        signal: OutcomeSignal::Refusal,
        sentiment_delta: -0.4,
        phrases: &["no way", "i refuse", "not paying", "wont pay", "will not pay"],
    },
    Rule {
        signal: OutcomeSignal::Objection,
        sentiment_delta: -0.3,
        phrases: &["too much", "cant afford", "cannot afford", "too high", "unfair", "why should"],
    },
    Rule {
        signal: OutcomeSignal::Agreement,
        sentiment_delta: 0.4,
        phrases: &["i agree", "i can do that", "sounds good", "lets do it", "works for me", "deal"],
    },
    Rule {
        signal: OutcomeSignal::IdentityConfirmed,
        sentiment_delta: 0.1,
        phrases: &["speaking", "this is me", "thats me", "it is me", "my date of birth is", "born on"],
    },
    Rule {
        signal: OutcomeSignal::Affirm,
        sentiment_delta: 0.2,
        phrases: &["yes", "yeah", "sure", "okay", "ok", "fine", "go ahead", "alright"],
    },
];

const THANKS_BONUS: f64 = 0.1;

/// Space-padded normalized form, so `" phrase "` matches whole words only.
fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + 2);
    out.push(' ');
    let mut last_space = true;
    for c in text.chars() {
        if c == '\'' || c == '\u{2019}' {
            continue;
        }
        if c.is_alphanumeric() {
            out.extend(c.to_lowercase());
            last_space = false;
        } else if !last_space {
            out.push(' ');
            last_space = true;
        }
    }
    if !last_space {
        out.push(' ');
    }
    out
}

/// Ordered phrase rules over normalized tokens.
///
/// A bare affirmation right after an offer counts as agreement; it never
/// counts as an identity confirmation.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordClassifier;

impl KeywordClassifier {
    pub fn new() -> Self {
        KeywordClassifier
    }
}

impl SignalClassifier for KeywordClassifier {
    fn classify(&self, utterance: &str, ctx: &ConversationContext) -> Observation {
        let normalized = normalize(utterance);
        let matched = RULES.iter().find(|rule| {
            rule.phrases
                .iter()
                .any(|phrase| normalized.contains(&format!(" {} ", phrase)))
        });

        let mut observation = match matched {
            Some(rule) => Observation {
                signal: rule.signal,
                sentiment_delta: rule.sentiment_delta,
            },
            None => Observation::default(),
        };

        if observation.signal == OutcomeSignal::Affirm && ctx.last_action.is_some_and(|a| a.is_offer()) {
            observation.signal = OutcomeSignal::Agreement;
        }
        if normalized.contains(" thank") {
            observation.sentiment_delta += THANKS_BONUS;
        }
        observation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use settle_core::{Action, DebtProfile};

    fn context() -> ConversationContext {
        let debt = DebtProfile {
            creditor: "Acme Bank".to_string(),
            balance: Decimal::from(1_500),
            days_past_due: 65,
            currency: "GBP".to_string(),
        };
        ConversationContext::new(&debt, 0, 600)
    }

    fn signal(text: &str) -> OutcomeSignal {
        KeywordClassifier::new().classify(text, &context()).signal
    }

    #[test]
    fn normalize_pads_and_strips_punctuation() {
        assert_eq!(normalize("Don't CALL me!!"), " dont call me ");
        assert_eq!(normalize(""), " ");
    }

    #[test]
    fn phrases_map_to_signals() {
        assert_eq!(signal("Yes, this is me."), OutcomeSignal::IdentityConfirmed);
        assert_eq!(signal("Sorry, wrong number."), OutcomeSignal::WrongParty);
        assert_eq!(signal("I don't owe you anything"), OutcomeSignal::Dispute);
        assert_eq!(signal("Stop calling me."), OutcomeSignal::StopContact);
        assert_eq!(signal("That's too much for me"), OutcomeSignal::Objection);
        assert_eq!(signal("Can you call me back tomorrow?"), OutcomeSignal::CallbackRequest);
        assert_eq!(signal("I want to talk to a manager"), OutcomeSignal::HumanRequest);
        assert_eq!(signal("Sounds good, I can do that."), OutcomeSignal::Agreement);
        assert_eq!(signal("Okay."), OutcomeSignal::Affirm);
        assert_eq!(signal("hmm"), OutcomeSignal::None);
    }

    #[test]
    fn matching_is_on_whole_words() {
        // "okay" must not fire inside "bokayo", nor "bye" inside "byers"
        assert_eq!(signal("bokayo byers"), OutcomeSignal::None);
    }

    #[test]
    fn hangup_wins_over_later_rules() {
        assert_eq!(signal("No way. Goodbye."), OutcomeSignal::Hangup);
    }

    #[test]
    fn affirmation_after_offer_is_agreement() {
        let mut ctx = context();
        ctx.last_action = Some(Action::OfferPlan);
        let obs = KeywordClassifier::new().classify("Okay, thanks", &ctx);
        assert_eq!(obs.signal, OutcomeSignal::Agreement);
        assert!((obs.sentiment_delta - 0.3).abs() < 1e-12);

        ctx.last_action = Some(Action::VerifyIdentity);
        let obs = KeywordClassifier::new().classify("Okay", &ctx);
        assert_eq!(obs.signal, OutcomeSignal::Affirm);
    }
}
