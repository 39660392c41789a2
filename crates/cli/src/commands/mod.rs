pub(crate) mod fsm;
pub(crate) mod inspect;
pub(crate) mod screen;
pub(crate) mod simulate;
pub(crate) mod train;

use std::path::Path;

use settle_core::JurisdictionRules;
use settle_engine::{ActionSelector, SettleConfig};
use settle_storage::JsonlRecorder;

/// The requested jurisdiction, or the configured default, resolved against
/// the built-in and configured tables.
pub(crate) fn resolve_jurisdiction(config: &SettleConfig, requested: Option<&str>) -> Result<JurisdictionRules, String> {
    let code = requested
        .unwrap_or(&config.engine.default_jurisdiction)
        .to_ascii_uppercase();
    config.all_jurisdictions().remove(&code).ok_or_else(|| {
        let known: Vec<String> = config.all_jurisdictions().into_keys().collect();
        format!("unknown jurisdiction '{}' (known: {})", code, known.join(", "))
    })
}

pub(crate) fn currency_for(code: &str) -> &'static str {
    match code {
        "UK" => "GBP",
        "UAE" => "AED",
        "IN" => "INR",
        _ => "USD",
    }
}

/// Load a snapshot file. Corrupt snapshots are refused, never replaced
/// by an empty learner.
pub(crate) fn load_selector(path: &Path) -> Result<ActionSelector, String> {
    let blob =
        std::fs::read_to_string(path).map_err(|e| format!("error reading file '{}': {}", path.display(), e))?;
    ActionSelector::import_snapshot(&blob).map_err(|e| format!("refusing snapshot '{}': {}", path.display(), e))
}

pub(crate) async fn open_recorder(path: &Path) -> Result<JsonlRecorder, String> {
    JsonlRecorder::open(path)
        .await
        .map_err(|e| format!("cannot open episode log '{}': {}", path.display(), e))
}
