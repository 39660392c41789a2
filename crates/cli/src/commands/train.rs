use std::path::Path;
use std::sync::Arc;

use settle_engine::{
    ActionSelector, Persona, PolicyHandle, SettleConfig, Trainer, TrainingOptions, TurnProcessor,
};

use super::{currency_for, load_selector, open_recorder, resolve_jurisdiction};
use crate::{print_json, OutputFormat};

pub(crate) struct TrainOptions<'a> {
    pub config: &'a SettleConfig,
    pub episodes: u32,
    pub swap_every: u32,
    pub seed: u64,
    pub jurisdiction: Option<&'a str>,
    pub personas: &'a [String],
    pub resume: Option<&'a Path>,
    pub out: Option<&'a Path>,
    pub record: Option<&'a Path>,
    pub output: OutputFormat,
    pub quiet: bool,
}

pub(crate) async fn cmd_train(opts: TrainOptions<'_>) -> Result<i32, String> {
    let rules = resolve_jurisdiction(opts.config, opts.jurisdiction)?;
    let mut personas = Vec::with_capacity(opts.personas.len());
    for name in opts.personas {
        personas.push(Persona::builtin(name).ok_or_else(|| format!("unknown persona '{}'", name))?);
    }

    let mut options = TrainingOptions {
        episodes: opts.episodes,
        swap_every: opts.swap_every,
        seed: opts.seed,
        jurisdiction: rules.code.clone(),
        currency: currency_for(&rules.code).to_string(),
        ..TrainingOptions::default()
    };
    if !personas.is_empty() {
        options.personas = personas;
    }

    let learner = match opts.resume {
        Some(path) => load_selector(path)?,
        None => ActionSelector::new(&opts.config.learner),
    };
    if learner.kind() != opts.config.learner.kind {
        return Err(format!(
            "snapshot learner '{}' does not match configured learner '{}'",
            learner.kind().as_str(),
            opts.config.learner.kind.as_str()
        ));
    }

    let policy = Arc::new(PolicyHandle::new(learner.clone()));
    let mut processor = TurnProcessor::reference(opts.config, Arc::clone(&policy))
        .with_exploration(opts.config.learner.epsilon, opts.seed);
    if let Some(path) = opts.record {
        processor = processor.with_recorder(Arc::new(open_recorder(path).await?));
    }

    let mut trainer = Trainer::new(processor, policy, learner, options);
    let report = trainer.run().await.map_err(|e| format!("training failed: {}", e))?;

    if let Some(path) = opts.out {
        let snapshot = trainer
            .learner()
            .export_snapshot()
            .and_then(|s| s.to_json_pretty())
            .map_err(|e| format!("cannot export snapshot: {}", e))?;
        std::fs::write(path, snapshot).map_err(|e| format!("error writing file '{}': {}", path.display(), e))?;
        tracing::info!(path = %path.display(), episodes = report.episodes, "policy snapshot written");
    }

    match opts.output {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => {
            if !opts.quiet {
                print!("{}", report);
                if let Some(path) = opts.out {
                    println!("snapshot written to {}", path.display());
                }
            }
        }
    }
    Ok(0)
}
