//! Simulated conversations: personas, a scripted borrower, and the trainer.

mod persona;
mod trainer;

pub use persona::{sample_debt, Persona, ScriptedBorrower, BUILTIN_PERSONAS};
pub use trainer::{Trainer, TrainingOptions, TrainingReport};

use serde::Serialize;
use settle_core::{Episode, FsmState, TurnTrace};
use tracing::warn;

use crate::error::TurnError;
use crate::turn::{SessionSpec, TurnProcessor};

/// A finished simulated call: the sealed episode and every turn trace.
#[derive(Debug, Clone, Serialize)]
pub struct SimulatedCall {
    pub episode: Episode,
    pub traces: Vec<TurnTrace>,
}

/// Play one full call between the processor and `borrower`, from the
/// opening to END_CALL.
///
/// On a fatal turn error the session is still ended, so its episode is
/// recorded, and the error is returned.
pub async fn run_episode(
    processor: &TurnProcessor,
    borrower: &mut ScriptedBorrower,
    spec: SessionSpec,
) -> Result<SimulatedCall, TurnError> {
    let id = processor.start_session(spec).await?;
    match play(processor, borrower, &id).await {
        Ok(traces) => {
            let episode = processor.end_session(&id).await?;
            Ok(SimulatedCall { episode, traces })
        }
        Err(err) => {
            if let Err(cleanup) = processor.end_session(&id).await {
                warn!(session = %id, error = %cleanup, "could not end failed session");
            }
            Err(err)
        }
    }
}

async fn play(
    processor: &TurnProcessor,
    borrower: &mut ScriptedBorrower,
    id: &str,
) -> Result<Vec<TurnTrace>, TurnError> {
    let mut output = processor.generate_opening(id).await?;
    let mut traces = Vec::new();
    while output.new_state != FsmState::EndCall {
        let reply = borrower.respond(output.trace.emitted_action, output.trace.state_before);
        traces.push(output.trace);
        output = processor.process_turn(id, &reply).await?;
    }
    traces.push(output.trace);
    Ok(traces)
}
