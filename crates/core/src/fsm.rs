//! Conversation state machine as a static table.
//!
//! Each state is one row of [`STATE_TABLE`], indexed by
//! [`FsmState::index`]. A row lists the legal actions (in tie-break order)
//! and the outbound edges. Resolution is first-match over the global edges
//! (main-flow states only) followed by the row's own edges; every
//! non-terminal row ends in an unconditional edge, so resolution is total
//! and deterministic.
//!
//! Adding a branch state means adding a variant and a row, nothing else.

use crate::error::FsmError;
use crate::types::{Action, FsmState, OutcomeSignal};

/// Role of a state in the conversation graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateKind {
    /// Part of the linear OPENING → … → WRAPUP flow.
    Main,
    /// Absorbing exception state; its only exit is END_CALL.
    Branch,
    /// END_CALL.
    Terminal,
}

/// What has to hold for an edge to fire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Always,
    Signal(OutcomeSignal),
    Action(Action),
    /// The signal arrived on a turn where the agent took one of `actions`.
    SignalAfter {
        signal: OutcomeSignal,
        actions: &'static [Action],
    },
}

impl Trigger {
    fn matches(&self, action: Action, signal: OutcomeSignal) -> bool {
        match *self {
            Trigger::Always => true,
            Trigger::Signal(s) => s == signal,
            Trigger::Action(a) => a == action,
            Trigger::SignalAfter { signal: s, actions } => s == signal && actions.contains(&action),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Edge {
    pub trigger: Trigger,
    pub to: FsmState,
}

impl Edge {
    const fn always(to: FsmState) -> Self {
        Edge {
            trigger: Trigger::Always,
            to,
        }
    }

    const fn on_signal(signal: OutcomeSignal, to: FsmState) -> Self {
        Edge {
            trigger: Trigger::Signal(signal),
            to,
        }
    }

    const fn on_action(action: Action, to: FsmState) -> Self {
        Edge {
            trigger: Trigger::Action(action),
            to,
        }
    }
}

/// One row of the state table.
#[derive(Debug)]
pub struct StateSpec {
    pub state: FsmState,
    pub kind: StateKind,
    pub actions: &'static [Action],
    pub edges: &'static [Edge],
}

const OFFERS: &[Action] = &[
    Action::OfferPlan,
    Action::OfferSettlement,
    Action::OfferFullPayment,
];

/// Checked before a main-flow state's own edges.
pub static GLOBAL_EDGES: [Edge; 2] = [
    Edge::on_signal(OutcomeSignal::Hangup, FsmState::EndCall),
    Edge::on_signal(OutcomeSignal::StopContact, FsmState::DoNotCall),
];

pub static STATE_TABLE: [StateSpec; FsmState::COUNT] = [
    StateSpec {
        state: FsmState::Opening,
        kind: StateKind::Main,
        actions: &[Action::Greet],
        edges: &[Edge::always(FsmState::Disclosure)],
    },
    StateSpec {
        state: FsmState::Disclosure,
        kind: StateKind::Main,
        actions: &[Action::DiscloseMiniMiranda],
        edges: &[Edge::always(FsmState::IdentityVerification)],
    },
    StateSpec {
        state: FsmState::IdentityVerification,
        kind: StateKind::Main,
        actions: &[Action::VerifyIdentity, Action::OfferCallback],
        edges: &[
            Edge::on_signal(OutcomeSignal::WrongParty, FsmState::WrongPartyFlow),
            Edge::on_signal(OutcomeSignal::CallbackRequest, FsmState::CallbackScheduled),
            Edge::on_action(Action::OfferCallback, FsmState::CallbackScheduled),
            Edge::on_signal(OutcomeSignal::IdentityConfirmed, FsmState::ConsentRecording),
            Edge::always(FsmState::IdentityVerification),
        ],
    },
    StateSpec {
        state: FsmState::ConsentRecording,
        kind: StateKind::Main,
        actions: &[Action::RequestRecordingConsent],
        edges: &[Edge::always(FsmState::DebtContext)],
    },
    StateSpec {
        state: FsmState::DebtContext,
        kind: StateKind::Main,
        actions: &[Action::ExplainDebt, Action::Empathize],
        edges: &[
            Edge::on_signal(OutcomeSignal::Dispute, FsmState::DisputeFlow),
            Edge::on_signal(OutcomeSignal::CallbackRequest, FsmState::CallbackScheduled),
            Edge::always(FsmState::Negotiation),
        ],
    },
    StateSpec {
        state: FsmState::Negotiation,
        kind: StateKind::Main,
        actions: &[
            Action::OfferPlan,
            Action::OfferSettlement,
            Action::OfferFullPayment,
            Action::HandleObjection,
            Action::Empathize,
            Action::ScheduleCallback,
            Action::EscalateToHuman,
        ],
        edges: &[
            Edge::on_action(Action::ScheduleCallback, FsmState::CallbackScheduled),
            Edge::on_signal(OutcomeSignal::CallbackRequest, FsmState::CallbackScheduled),
            Edge::on_action(Action::EscalateToHuman, FsmState::EscalateHuman),
            Edge::on_signal(OutcomeSignal::HumanRequest, FsmState::EscalateHuman),
            Edge::on_signal(OutcomeSignal::Dispute, FsmState::DisputeFlow),
            Edge {
                trigger: Trigger::SignalAfter {
                    signal: OutcomeSignal::Agreement,
                    actions: OFFERS,
                },
                to: FsmState::PaymentSetup,
            },
            Edge::always(FsmState::Negotiation),
        ],
    },
    StateSpec {
        state: FsmState::PaymentSetup,
        kind: StateKind::Main,
        actions: &[Action::ConfirmPayment],
        edges: &[Edge::always(FsmState::Wrapup)],
    },
    StateSpec {
        state: FsmState::Wrapup,
        kind: StateKind::Main,
        actions: &[Action::Summarize, Action::CloseCall],
        edges: &[Edge::always(FsmState::EndCall)],
    },
    StateSpec {
        state: FsmState::EndCall,
        kind: StateKind::Terminal,
        actions: &[],
        edges: &[],
    },
    StateSpec {
        state: FsmState::WrongPartyFlow,
        kind: StateKind::Branch,
        actions: &[Action::ApologizeWrongParty],
        edges: &[Edge::always(FsmState::EndCall)],
    },
    StateSpec {
        state: FsmState::DisputeFlow,
        kind: StateKind::Branch,
        actions: &[Action::ExplainDisputeProcess],
        edges: &[Edge::always(FsmState::EndCall)],
    },
    StateSpec {
        state: FsmState::CallbackScheduled,
        kind: StateKind::Branch,
        actions: &[Action::ConfirmCallback],
        edges: &[Edge::always(FsmState::EndCall)],
    },
    StateSpec {
        state: FsmState::DoNotCall,
        kind: StateKind::Branch,
        actions: &[Action::ConfirmDoNotCall],
        edges: &[Edge::always(FsmState::EndCall)],
    },
    StateSpec {
        state: FsmState::EscalateHuman,
        kind: StateKind::Branch,
        actions: &[Action::TransferToHuman],
        edges: &[Edge::always(FsmState::EndCall)],
    },
];

impl FsmState {
    pub fn spec(self) -> &'static StateSpec {
        &STATE_TABLE[self.index()]
    }

    pub fn kind(self) -> StateKind {
        self.spec().kind
    }

    pub fn is_branch(self) -> bool {
        self.kind() == StateKind::Branch
    }

    pub fn is_main_flow(self) -> bool {
        self.kind() == StateKind::Main
    }
}

/// Stateless view over [`STATE_TABLE`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StateMachine;

impl StateMachine {
    pub fn new() -> Self {
        StateMachine
    }

    /// Legal actions in `state`, in tie-break order. Empty only for END_CALL.
    pub fn legal_actions(&self, state: FsmState) -> &'static [Action] {
        state.spec().actions
    }

    pub fn is_terminal(&self, state: FsmState) -> bool {
        state.kind() == StateKind::Terminal
    }

    /// Resolve the next state.
    ///
    /// Fails with [`FsmError::IllegalAction`] when `action` is not legal in
    /// `state`. Callers only ever pass actions drawn from
    /// [`StateMachine::legal_actions`], so that error means a bug upstream.
    pub fn transition(
        &self,
        state: FsmState,
        action: Action,
        signal: OutcomeSignal,
    ) -> Result<FsmState, FsmError> {
        let spec = state.spec();
        if !spec.actions.contains(&action) {
            return Err(FsmError::IllegalAction { state, action });
        }

        let global: &[Edge] = if spec.kind == StateKind::Main {
            &GLOBAL_EDGES
        } else {
            &[]
        };

        global
            .iter()
            .chain(spec.edges.iter())
            .find(|edge| edge.trigger.matches(action, signal))
            .map(|edge| edge.to)
            .ok_or(FsmError::NoMatchingEdge { state, action, signal })
    }

    /// The next state along the main flow, if `state` is on it.
    pub fn main_flow_successor(&self, state: FsmState) -> Option<FsmState> {
        if !state.is_main_flow() {
            return None;
        }
        let next = FsmState::ALL.get(state.index() + 1).copied()?;
        matches!(next.kind(), StateKind::Main | StateKind::Terminal).then_some(next)
    }

    /// Every state reachable from `state` through one edge.
    pub fn successors(&self, state: FsmState) -> Vec<FsmState> {
        let spec = state.spec();
        let mut out: Vec<FsmState> = Vec::new();
        let global: &[Edge] = if spec.kind == StateKind::Main {
            &GLOBAL_EDGES
        } else {
            &[]
        };
        for edge in global.iter().chain(spec.edges.iter()) {
            if !out.contains(&edge.to) {
                out.push(edge.to);
            }
        }
        out
    }
}
