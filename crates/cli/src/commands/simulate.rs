use std::path::Path;
use std::sync::Arc;

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use settle_core::{CallOutcome, Episode};
use settle_engine::simulate::sample_debt;
use settle_engine::{
    run_episode, ActionSelector, Persona, PolicyHandle, ScriptedBorrower, SessionSpec, SettleConfig, SimulatedCall,
    TurnProcessor,
};

use super::{currency_for, load_selector, open_recorder, resolve_jurisdiction};
use crate::{print_json, OutputFormat};

pub(crate) struct SimulateOptions<'a> {
    pub config: &'a SettleConfig,
    pub persona: &'a str,
    pub episodes: u32,
    pub seed: u64,
    pub jurisdiction: Option<&'a str>,
    pub minute: u16,
    pub policy: Option<&'a Path>,
    pub record: Option<&'a Path>,
    pub transcript: bool,
    pub output: OutputFormat,
}

#[derive(Serialize)]
struct Summary<'a> {
    episode_id: &'a str,
    persona: Option<&'a str>,
    jurisdiction: &'a str,
    outcome: CallOutcome,
    turns: usize,
    total_return: f64,
}

impl<'a> From<&'a Episode> for Summary<'a> {
    fn from(episode: &'a Episode) -> Self {
        Summary {
            episode_id: episode.episode_id(),
            persona: episode.persona(),
            jurisdiction: episode.jurisdiction(),
            outcome: episode.outcome(),
            turns: episode.len(),
            total_return: episode.total_return(),
        }
    }
}

pub(crate) async fn cmd_simulate(opts: SimulateOptions<'_>) -> Result<i32, String> {
    let persona = Persona::builtin(opts.persona).ok_or_else(|| format!("unknown persona '{}'", opts.persona))?;
    let rules = resolve_jurisdiction(opts.config, opts.jurisdiction)?;
    if opts.minute >= 24 * 60 {
        return Err(format!("minute of day out of range: {}", opts.minute));
    }

    let selector = match opts.policy {
        Some(path) => load_selector(path)?,
        None => ActionSelector::new(&opts.config.learner),
    };
    let policy = Arc::new(PolicyHandle::new(selector));
    let mut processor = TurnProcessor::reference(opts.config, policy);
    if let Some(path) = opts.record {
        processor = processor.with_recorder(Arc::new(open_recorder(path).await?));
    }

    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut calls: Vec<SimulatedCall> = Vec::with_capacity(opts.episodes as usize);
    for i in 0..opts.episodes {
        let mut borrower = ScriptedBorrower::new(persona.clone(), opts.seed.wrapping_add(u64::from(i)));
        let spec = SessionSpec::new(rules.code.clone(), sample_debt(&mut rng, currency_for(&rules.code)))
            .with_persona(persona.name.clone())
            .at_minute(opts.minute);
        let call = run_episode(&processor, &mut borrower, spec)
            .await
            .map_err(|e| format!("simulated call {} failed: {}", i + 1, e))?;
        calls.push(call);
    }
    processor.flush_recordings().await;

    match opts.output {
        OutputFormat::Json if opts.transcript => print_json(&calls)?,
        OutputFormat::Json => {
            let summaries: Vec<Summary<'_>> = calls.iter().map(|c| Summary::from(&c.episode)).collect();
            print_json(&summaries)?;
        }
        OutputFormat::Text => {
            for call in &calls {
                if opts.transcript {
                    print_transcript(call);
                }
                let s = Summary::from(&call.episode);
                println!(
                    "{}  {:<12} {:<20} turns={:<3} return={:.2}",
                    s.episode_id,
                    s.persona.unwrap_or("-"),
                    s.outcome.as_str(),
                    s.turns,
                    s.total_return
                );
            }
        }
    }
    Ok(0)
}

fn print_transcript(call: &SimulatedCall) {
    println!("── {} ──", call.episode.episode_id());
    for trace in &call.traces {
        if let Some(reply) = &trace.borrower_utterance {
            println!("  borrower: {}  [{}]", reply, trace.detected_signal);
        }
        let marker = if trace.overridden {
            format!("{} overridden by {}", trace.proposed_action, trace.emitted_action)
        } else {
            trace.emitted_action.to_string()
        };
        println!(
            "  agent:    {}  [{} → {}, {}{}]",
            trace.agent_utterance,
            trace.state_before,
            trace.state_after,
            marker,
            if trace.validation.fallback_used { ", fallback" } else { "" }
        );
    }
}
