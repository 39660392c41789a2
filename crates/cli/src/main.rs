mod commands;

use std::path::{Path, PathBuf};
use std::process;

use clap::{Parser, Subcommand, ValueEnum};
use settle_engine::SettleConfig;
use tracing_subscriber::EnvFilter;

/// Output format for CLI responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    Text,
    Json,
}

/// Compliance-aware collection call engine.
#[derive(Parser)]
#[command(name = "settle", version, about = "Compliance-aware collection call engine")]
struct Cli {
    /// Output format (text or json)
    #[arg(long, global = true, default_value = "text", value_enum)]
    output: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, global = true)]
    quiet: bool,

    /// TOML configuration file ([engine], [reward], [learner], [jurisdictions.*], [templates])
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Play simulated calls against a scripted borrower
    Simulate {
        /// Borrower persona (cooperative, hardship, disputer, wrong_party, hostile)
        #[arg(long, default_value = "cooperative")]
        persona: String,
        /// Number of calls to play
        #[arg(long, default_value = "1")]
        episodes: u32,
        /// Seed for debt profiles and borrower replies
        #[arg(long, default_value = "7")]
        seed: u64,
        /// Jurisdiction code (defaults to engine.default_jurisdiction)
        #[arg(long)]
        jurisdiction: Option<String>,
        /// Local minute of day the calls take place at
        #[arg(long, default_value = "600")]
        minute: u16,
        /// Policy snapshot to serve from (default: an untrained learner)
        #[arg(long)]
        policy: Option<PathBuf>,
        /// Append sealed episodes to this JSON-lines file
        #[arg(long)]
        record: Option<PathBuf>,
        /// Print every turn of every call
        #[arg(long)]
        transcript: bool,
    },

    /// Train a policy offline against simulated borrowers
    Train {
        /// Number of training episodes
        #[arg(long, default_value = "200")]
        episodes: u32,
        /// Swap the learner into the serving policy every N episodes
        #[arg(long, default_value = "20")]
        swap_every: u32,
        /// Seed for exploration, debt profiles and borrower replies
        #[arg(long, default_value = "7")]
        seed: u64,
        /// Jurisdiction code (defaults to engine.default_jurisdiction)
        #[arg(long)]
        jurisdiction: Option<String>,
        /// Persona to train against; repeat for several (default: all built-ins)
        #[arg(long = "persona")]
        personas: Vec<String>,
        /// Continue training from this snapshot
        #[arg(long)]
        resume: Option<PathBuf>,
        /// Write the trained snapshot here
        #[arg(long)]
        out: Option<PathBuf>,
        /// Append sealed episodes to this JSON-lines file
        #[arg(long)]
        record: Option<PathBuf>,
    },

    /// Verify a policy snapshot and summarize it
    Inspect {
        /// Path to the snapshot JSON file
        snapshot: PathBuf,
    },

    /// Print the conversation state table
    Fsm,

    /// Check an agent utterance against a jurisdiction's rules
    Screen {
        /// Jurisdiction code (defaults to engine.default_jurisdiction)
        #[arg(long)]
        jurisdiction: Option<String>,
        /// The utterance to check
        text: String,
    },
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.quiet);

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(msg) => {
            report_error(&msg, cli.output, cli.quiet);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Simulate {
            persona,
            episodes,
            seed,
            jurisdiction,
            minute,
            policy,
            record,
            transcript,
        } => run_async(commands::simulate::cmd_simulate(commands::simulate::SimulateOptions {
            config: &config,
            persona: &persona,
            episodes,
            seed,
            jurisdiction: jurisdiction.as_deref(),
            minute,
            policy: policy.as_deref(),
            record: record.as_deref(),
            transcript,
            output: cli.output,
        })),
        Commands::Train {
            episodes,
            swap_every,
            seed,
            jurisdiction,
            personas,
            resume,
            out,
            record,
        } => run_async(commands::train::cmd_train(commands::train::TrainOptions {
            config: &config,
            episodes,
            swap_every,
            seed,
            jurisdiction: jurisdiction.as_deref(),
            personas: &personas,
            resume: resume.as_deref(),
            out: out.as_deref(),
            record: record.as_deref(),
            output: cli.output,
            quiet: cli.quiet,
        })),
        Commands::Inspect { snapshot } => commands::inspect::cmd_inspect(&snapshot, cli.output),
        Commands::Fsm => commands::fsm::cmd_fsm(cli.output),
        Commands::Screen { jurisdiction, text } => {
            commands::screen::cmd_screen(&config, jurisdiction.as_deref(), &text, cli.output)
        }
    };

    match result {
        Ok(code) => process::exit(code),
        Err(msg) => {
            report_error(&msg, cli.output, cli.quiet);
            process::exit(1);
        }
    }
}

/// Logs go to stderr so `--output json` stays machine-readable.
fn init_tracing(quiet: bool) {
    let default = if quiet { "error" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run_async<F>(fut: F) -> Result<i32, String>
where
    F: std::future::Future<Output = Result<i32, String>>,
{
    let rt = tokio::runtime::Runtime::new().map_err(|e| format!("failed to create tokio runtime: {}", e))?;
    rt.block_on(fut)
}

/// Read and validate the config file, or the defaults when none is given.
pub(crate) fn load_config(path: Option<&Path>) -> Result<SettleConfig, String> {
    let Some(path) = path else {
        return Ok(SettleConfig::default());
    };
    let text =
        std::fs::read_to_string(path).map_err(|e| format!("error reading file '{}': {}", path.display(), e))?;
    let config: SettleConfig =
        toml::from_str(&text).map_err(|e| format!("error parsing TOML in '{}': {}", path.display(), e))?;
    config
        .validate()
        .map_err(|e| format!("invalid configuration in '{}': {}", path.display(), e))?;
    Ok(config)
}

pub(crate) fn report_error(msg: &str, output: OutputFormat, quiet: bool) {
    if quiet {
        return;
    }
    match output {
        OutputFormat::Text => eprintln!("error: {}", msg),
        OutputFormat::Json => {
            eprintln!("{}", serde_json::json!({ "error": msg }));
        }
    }
}

/// Print `value` as pretty JSON on stdout.
pub(crate) fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let pretty = serde_json::to_string_pretty(value).map_err(|e| format!("serialization error: {}", e))?;
    println!("{}", pretty);
    Ok(())
}
