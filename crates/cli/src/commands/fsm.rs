use serde::Serialize;
use settle_core::fsm::{Edge, StateKind, Trigger, GLOBAL_EDGES, STATE_TABLE};
use settle_core::{Action, FsmState};

use crate::{print_json, OutputFormat};

#[derive(Serialize)]
struct Row {
    state: FsmState,
    kind: &'static str,
    actions: &'static [Action],
    edges: Vec<EdgeRow>,
}

#[derive(Serialize)]
struct EdgeRow {
    when: String,
    to: FsmState,
}

fn kind_name(kind: StateKind) -> &'static str {
    match kind {
        StateKind::Main => "main",
        StateKind::Branch => "branch",
        StateKind::Terminal => "terminal",
    }
}

fn describe(trigger: &Trigger) -> String {
    match trigger {
        Trigger::Always => "always".to_string(),
        Trigger::Signal(signal) => format!("signal {}", signal),
        Trigger::Action(action) => format!("action {}", action),
        Trigger::SignalAfter { signal, actions } => {
            let names: Vec<&str> = actions.iter().map(|a| a.as_str()).collect();
            format!("signal {} after {}", signal, names.join("|"))
        }
    }
}

fn edge_rows(edges: &[Edge]) -> Vec<EdgeRow> {
    edges
        .iter()
        .map(|edge| EdgeRow {
            when: describe(&edge.trigger),
            to: edge.to,
        })
        .collect()
}

pub(crate) fn cmd_fsm(output: OutputFormat) -> Result<i32, String> {
    let rows: Vec<Row> = STATE_TABLE
        .iter()
        .map(|spec| Row {
            state: spec.state,
            kind: kind_name(spec.kind),
            actions: spec.actions,
            edges: edge_rows(spec.edges),
        })
        .collect();
    let global = edge_rows(&GLOBAL_EDGES);

    match output {
        OutputFormat::Json => {
            print_json(&serde_json::json!({ "global_edges": global, "states": rows }))?;
        }
        OutputFormat::Text => {
            println!("global edges (main-flow states, checked first):");
            for edge in &global {
                println!("    {:<40} -> {}", edge.when, edge.to);
            }
            for row in &rows {
                println!();
                println!("{} ({})", row.state, row.kind);
                if !row.actions.is_empty() {
                    let names: Vec<&str> = row.actions.iter().map(|a| a.as_str()).collect();
                    println!("  actions: {}", names.join(", "));
                }
                for edge in &row.edges {
                    println!("    {:<40} -> {}", edge.when, edge.to);
                }
            }
        }
    }
    Ok(0)
}
