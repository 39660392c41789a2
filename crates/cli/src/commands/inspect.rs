use std::path::Path;

use serde::Serialize;
use settle_core::{Action, FEATURE_DIM};
use settle_engine::{ActionSelector, Learner, PolicySnapshot};

use crate::{print_json, OutputFormat};

#[derive(Serialize)]
struct Inspection {
    path: String,
    kind: String,
    episodes_trained: u64,
    checksum: String,
    /// Q-learning: state keys in the table.
    #[serde(skip_serializing_if = "Option::is_none")]
    rows: Option<usize>,
    /// Bandit: actions with a learned weight vector.
    #[serde(skip_serializing_if = "Option::is_none")]
    trained_actions: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    feature_dim: Option<usize>,
}

pub(crate) fn cmd_inspect(path: &Path, output: OutputFormat) -> Result<i32, String> {
    let blob =
        std::fs::read_to_string(path).map_err(|e| format!("error reading file '{}': {}", path.display(), e))?;
    let snapshot = PolicySnapshot::from_json(&blob).map_err(|e| format!("refusing snapshot '{}': {}", path.display(), e))?;
    let selector =
        ActionSelector::from_snapshot(&snapshot).map_err(|e| format!("refusing snapshot '{}': {}", path.display(), e))?;

    let mut inspection = Inspection {
        path: path.display().to_string(),
        kind: snapshot.kind.clone(),
        episodes_trained: selector.episodes_trained(),
        checksum: snapshot.checksum.clone(),
        rows: None,
        trained_actions: None,
        feature_dim: None,
    };
    match selector.learner() {
        Learner::QLearning(q) => inspection.rows = Some(q.rows()),
        Learner::Bandit(b) => {
            inspection.trained_actions = Some(Action::ALL.iter().filter(|&&a| b.weights(a).is_some()).count());
            inspection.feature_dim = Some(FEATURE_DIM);
        }
    }

    match output {
        OutputFormat::Json => print_json(&inspection)?,
        OutputFormat::Text => {
            println!("snapshot:         {}", inspection.path);
            println!("learner:          {}", inspection.kind);
            println!("episodes trained: {}", inspection.episodes_trained);
            println!("checksum:         {} (verified)", inspection.checksum);
            if let Some(rows) = inspection.rows {
                println!("q-table rows:     {}", rows);
            }
            if let Some(actions) = inspection.trained_actions {
                println!("trained actions:  {} of {}", actions, Action::ALL.len());
                println!("feature dim:      {}", FEATURE_DIM);
            }
        }
    }
    Ok(0)
}
