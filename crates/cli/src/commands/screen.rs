use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use settle_core::{Directive, PolicyGuard, ValidatorFailure};
use settle_engine::{RuleValidator, SettleConfig, TemplateLibrary};

use super::resolve_jurisdiction;
use crate::{print_json, OutputFormat};

#[derive(Serialize)]
struct Screening<'a> {
    jurisdiction: &'a str,
    clean: bool,
    prohibited_phrases: Vec<&'a str>,
    validator_failures: Vec<ValidatorFailure>,
}

/// Exit status 0 when the text is clean, 2 when it would be blocked.
pub(crate) fn cmd_screen(
    config: &SettleConfig,
    jurisdiction: Option<&str>,
    text: &str,
    output: OutputFormat,
) -> Result<i32, String> {
    let rules = resolve_jurisdiction(config, jurisdiction)?;
    let guard = PolicyGuard::new(rules);
    let validator = RuleValidator::new(Arc::new(TemplateLibrary::with_overrides(&config.templates)));

    let hits = guard.prohibited_hits(text);
    let report = validator.evaluate(text, &Directive::normal(BTreeSet::new()));
    let screening = Screening {
        jurisdiction: &guard.rules().code,
        clean: hits.is_empty() && report.passed,
        prohibited_phrases: hits,
        validator_failures: report.failures,
    };

    match output {
        OutputFormat::Json => print_json(&screening)?,
        OutputFormat::Text => {
            if screening.clean {
                println!("clean ({})", screening.jurisdiction);
            } else {
                println!("blocked ({})", screening.jurisdiction);
                for phrase in &screening.prohibited_phrases {
                    println!("  prohibited phrase: \"{}\"", phrase);
                }
                for failure in &screening.validator_failures {
                    println!("  {}: {}", failure.validator, failure.detail);
                }
            }
        }
    }
    Ok(if screening.clean { 0 } else { 2 })
}
