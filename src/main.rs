//! Command-line runner for procedure files.
//!
//! ```text
//! daq_sequencer run sweep.seq --config rack.toml
//! daq_sequencer run sweep.seq --dry-run
//! daq_sequencer check sweep.seq --json
//! ```
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use daq_sequencer::config::Settings;
use daq_sequencer::data::CsvWriter;
use daq_sequencer::instrument;
use daq_sequencer::output::StdoutSink;
use daq_sequencer::sequencer::{self, RunMode, SequenceExecutor};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "daq_sequencer")]
#[command(about = "Parse and run laboratory automation procedures")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Execute a procedure against the configured rack
    Run {
        /// Procedure file
        file: PathBuf,

        /// Settings file (TOML)
        #[arg(long)]
        config: Option<PathBuf>,

        /// Print the command tree without touching any instrument
        #[arg(long)]
        dry_run: bool,
    },
    /// Parse a procedure and report problems without running it
    Check {
        /// Procedure file
        file: PathBuf,

        /// Print the parsed procedure as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            config,
            dry_run,
        } => {
            let settings = load_settings(config.as_deref())?;
            init_tracing(&settings.log_level);
            run(&file, &settings, dry_run).await
        }
        Commands::Check { file, json } => {
            init_tracing("warn");
            check(&file, json)
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let settings = match path {
        Some(path) => Settings::load_from(path)
            .with_context(|| format!("Failed to load settings from {}", path.display()))?,
        None => Settings::load().context("Failed to load settings")?,
    };
    Ok(settings)
}

/// RUST_LOG wins over the configured level.
fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("daq_sequencer={}", default_level)));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

async fn run(file: &Path, settings: &Settings, dry_run: bool) -> Result<()> {
    let rack = instrument::build_rack(settings);
    info!(instruments = ?rack.names(), "Rack ready");

    let writer = match &settings.storage.output_dir {
        Some(dir) => CsvWriter::with_output_dir(dir),
        None => CsvWriter::new(),
    };
    let mut executor =
        SequenceExecutor::with_collaborators(Arc::new(rack), Arc::new(writer), Arc::new(StdoutSink));

    executor
        .load_file(file)
        .with_context(|| format!("Failed to load procedure {}", file.display()))?;

    let mode = if dry_run {
        RunMode::Preview
    } else {
        RunMode::Execute
    };
    executor.run(mode).await?;
    Ok(())
}

fn check(file: &Path, json: bool) -> Result<()> {
    let procedure = sequencer::parse_file(file)
        .with_context(|| format!("Failed to parse {}", file.display()))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&procedure)?);
    } else {
        println!(
            "{}: OK ({} top-level commands, {} total)",
            file.display(),
            procedure.commands.len(),
            procedure.command_count()
        );
        for line in sequencer::render_tree(&procedure.commands) {
            println!("  {}", line);
        }
    }
    Ok(())
}
