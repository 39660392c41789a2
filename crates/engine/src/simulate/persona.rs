//! Borrower personas and the scripted borrower that plays them.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use settle_core::{Action, ConfigError, DebtProfile, FsmState};

/// Behavioural traits of a simulated borrower. Every field is a
/// probability in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    /// Base chance of accepting an offer; scaled by the offer's generosity.
    pub cooperativeness: f64,
    pub dispute_propensity: f64,
    pub hangup_propensity: f64,
    pub wrong_party_propensity: f64,
    pub callback_propensity: f64,
    pub human_request_propensity: f64,
    pub stop_contact_propensity: f64,
    pub objection_rate: f64,
}

pub const BUILTIN_PERSONAS: [&str; 5] = ["cooperative", "hardship", "disputer", "wrong_party", "hostile"];

impl Persona {
    pub fn builtin(name: &str) -> Option<Persona> {
        // cooperativeness, dispute, hangup, wrong party, callback, human, stop, objection
        let traits = match name {
            "cooperative" => [0.8, 0.02, 0.02, 0.02, 0.05, 0.02, 0.01, 0.15],
            "hardship" => [0.45, 0.05, 0.05, 0.02, 0.15, 0.05, 0.02, 0.5],
            "disputer" => [0.2, 0.6, 0.05, 0.02, 0.05, 0.1, 0.05, 0.4],
            "wrong_party" => [0.1, 0.0, 0.1, 0.9, 0.0, 0.0, 0.05, 0.1],
            "hostile" => [0.1, 0.2, 0.3, 0.02, 0.05, 0.2, 0.25, 0.7],
            _ => return None,
        };
        Some(Persona {
            name: name.to_string(),
            cooperativeness: traits[0],
            dispute_propensity: traits[1],
            hangup_propensity: traits[2],
            wrong_party_propensity: traits[3],
            callback_propensity: traits[4],
            human_request_propensity: traits[5],
            stop_contact_propensity: traits[6],
            objection_rate: traits[7],
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("cooperativeness", self.cooperativeness),
            ("dispute_propensity", self.dispute_propensity),
            ("hangup_propensity", self.hangup_propensity),
            ("wrong_party_propensity", self.wrong_party_propensity),
            ("callback_propensity", self.callback_propensity),
            ("human_request_propensity", self.human_request_propensity),
            ("stop_contact_propensity", self.stop_contact_propensity),
            ("objection_rate", self.objection_rate),
        ];
        for (field, value) in fields {
            if !value.is_finite() {
                return Err(ConfigError::NonFinite {
                    field: format!("persona.{}.{}", self.name, field),
                });
            }
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::OutOfRange {
                    field: format!("persona.{}.{}", self.name, field),
                    message: "must be in [0, 1]".to_string(),
                });
            }
        }
        Ok(())
    }
}

const CREDITORS: [&str; 4] = ["Acme Bank", "Northwind Finance", "Harbor Credit Union", "Summit Card Services"];

/// A random but plausible account: balance between 100.00 and 15,000.00.
pub fn sample_debt<R: Rng + ?Sized>(rng: &mut R, currency: &str) -> DebtProfile {
    let creditor = CREDITORS[rng.gen_range(0..CREDITORS.len())];
    DebtProfile {
        creditor: creditor.to_string(),
        balance: Decimal::new(rng.gen_range(10_000..=1_500_000), 2),
        days_past_due: rng.gen_range(5..=200),
        currency: currency.to_string(),
    }
}

const HANGUP: &str = "I'm hanging up now.";
const STOP: &str = "Stop calling me.";
const WRONG_PARTY: &str = "Sorry, wrong number.";
const CALLBACK: &str = "This is a bad time, can you call me back?";
const IDENTITY: &str = "Yes, this is me. My date of birth is the fourth of March.";
const DISPUTE: &str = "I don't owe this, it is not my debt.";
const OBJECTION: &str = "That's too much, I can't afford it.";
const REFUSAL: &str = "No way, I'm not paying that.";
const AGREEMENT: &str = "Sounds good, I can do that.";
const HUMAN: &str = "I want to speak to a supervisor.";
const AFFIRM: &str = "Okay.";

/// Seeded borrower that answers each agent action according to a persona.
#[derive(Debug, Clone)]
pub struct ScriptedBorrower {
    persona: Persona,
    rng: StdRng,
}

impl ScriptedBorrower {
    pub fn new(persona: Persona, seed: u64) -> Self {
        Self {
            persona,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    fn roll(&mut self, p: f64) -> bool {
        self.rng.gen::<f64>() < p
    }

    /// Reply to `action`, which the agent spoke while in `state`.
    pub fn respond(&mut self, action: Action, state: FsmState) -> String {
        let p = self.persona.clone();
        if state.is_main_flow() && action != Action::Greet {
            if self.roll(p.hangup_propensity * 0.5) {
                return HANGUP.to_string();
            }
            if self.roll(p.stop_contact_propensity * 0.5) {
                return STOP.to_string();
            }
        }

        let reply = match action {
            Action::Greet => "Hello, who is calling?",
            Action::DiscloseMiniMiranda => AFFIRM,
            Action::VerifyIdentity | Action::OfferCallback => {
                if self.roll(p.wrong_party_propensity) {
                    WRONG_PARTY
                } else if self.roll(p.callback_propensity) {
                    CALLBACK
                } else {
                    IDENTITY
                }
            }
            Action::RequestRecordingConsent => {
                if self.roll(p.objection_rate * 0.5) {
                    "No way, I refuse to be recorded."
                } else {
                    "Yes, that's fine."
                }
            }
            Action::ExplainDebt => self.debt_reaction(&p),
            Action::Empathize if state == FsmState::DebtContext => self.debt_reaction(&p),
            Action::OfferPlan | Action::OfferSettlement | Action::OfferFullPayment => {
                let generosity = action.offer_generosity().unwrap_or(0.0);
                let accept = (p.cooperativeness * (0.5 + generosity)).min(1.0);
                if self.roll(accept) {
                    AGREEMENT
                } else if self.roll(p.dispute_propensity * 0.5) {
                    DISPUTE
                } else if self.roll(p.human_request_propensity) {
                    HUMAN
                } else if self.roll(p.callback_propensity) {
                    CALLBACK
                } else if self.roll(p.objection_rate) {
                    OBJECTION
                } else {
                    REFUSAL
                }
            }
            Action::HandleObjection | Action::Empathize => {
                if self.roll(p.cooperativeness * 0.5) {
                    "Okay, what can you offer me?"
                } else if self.roll(p.human_request_propensity) {
                    HUMAN
                } else {
                    OBJECTION
                }
            }
            Action::ConfirmPayment => "Okay, thanks.",
            Action::Summarize | Action::CloseCall => "Thanks, have a good day.",
            _ => "Alright.",
        };
        reply.to_string()
    }

    fn debt_reaction(&mut self, p: &Persona) -> &'static str {
        if self.roll(p.dispute_propensity) {
            DISPUTE
        } else if self.roll(p.callback_propensity * 0.5) {
            "I'm busy right now, call me back later."
        } else if self.roll(p.objection_rate) {
            OBJECTION
        } else {
            "Okay, I understand."
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::{KeywordClassifier, SignalClassifier};
    use settle_core::{ConversationContext, OutcomeSignal};

    fn classify(text: &str) -> OutcomeSignal {
        let mut rng = StdRng::seed_from_u64(0);
        let ctx = ConversationContext::new(&sample_debt(&mut rng, "USD"), 0, 600);
        KeywordClassifier::new().classify(text, &ctx).signal
    }

    #[test]
    fn builtin_personas_are_valid() {
        for name in BUILTIN_PERSONAS {
            let persona = Persona::builtin(name).unwrap();
            persona.validate().unwrap();
            assert_eq!(persona.name, name);
        }
        assert!(Persona::builtin("nobody").is_none());
    }

    #[test]
    fn out_of_range_trait_is_rejected() {
        let mut persona = Persona::builtin("cooperative").unwrap();
        persona.objection_rate = 1.5;
        assert!(matches!(persona.validate(), Err(ConfigError::OutOfRange { .. })));
    }

    #[test]
    fn scripted_lines_classify_as_intended() {
        assert_eq!(classify(HANGUP), OutcomeSignal::Hangup);
        assert_eq!(classify(STOP), OutcomeSignal::StopContact);
        assert_eq!(classify(WRONG_PARTY), OutcomeSignal::WrongParty);
        assert_eq!(classify(CALLBACK), OutcomeSignal::CallbackRequest);
        assert_eq!(classify(IDENTITY), OutcomeSignal::IdentityConfirmed);
        assert_eq!(classify(DISPUTE), OutcomeSignal::Dispute);
        assert_eq!(classify(OBJECTION), OutcomeSignal::Objection);
        assert_eq!(classify(REFUSAL), OutcomeSignal::Refusal);
        assert_eq!(classify(AGREEMENT), OutcomeSignal::Agreement);
        assert_eq!(classify(HUMAN), OutcomeSignal::HumanRequest);
        assert_eq!(classify("No way, I refuse to be recorded."), OutcomeSignal::Refusal);
        assert_eq!(classify("Yes, that's fine."), OutcomeSignal::Affirm);
        assert_eq!(classify("I'm busy right now, call me back later."), OutcomeSignal::CallbackRequest);
        assert_eq!(classify("Thanks, have a good day."), OutcomeSignal::None);
        assert_eq!(classify("Hello, who is calling?"), OutcomeSignal::None);
    }

    #[test]
    fn same_seed_same_replies() {
        let persona = Persona::builtin("hardship").unwrap();
        let mut a = ScriptedBorrower::new(persona.clone(), 7);
        let mut b = ScriptedBorrower::new(persona, 7);
        for _ in 0..20 {
            assert_eq!(
                a.respond(Action::OfferPlan, FsmState::Negotiation),
                b.respond(Action::OfferPlan, FsmState::Negotiation)
            );
        }
    }

    #[test]
    fn sampled_debt_is_in_range() {
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..50 {
            let debt = sample_debt(&mut rng, "GBP");
            assert!(debt.balance >= Decimal::new(10_000, 2));
            assert!(debt.balance <= Decimal::new(1_500_000, 2));
            assert!((5..=200).contains(&debt.days_past_due));
        }
    }
}
