use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};

use rns_core::CommandKind;

mod commands;

#[derive(Parser)]
#[command(name = "rns")]
#[command(about = "RackNova station tools", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> site -> overrides...)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Print the resolved layout, tier bindings and subscriptions as JSON
    Topology {
        /// Layered config paths in merge order (defaults when omitted)
        #[arg(long = "config")]
        config_paths: Vec<PathBuf>,
    },

    /// Print the topic and payload that would drive a slot
    Encode {
        /// Slot id, e.g. A-1-3
        #[arg(long)]
        slot: String,

        #[arg(long, value_enum)]
        action: Action,

        #[arg(long = "config")]
        config_paths: Vec<PathBuf>,
    },

    /// Run a JSONL session through an offline engine and print the result
    Replay {
        /// One step per line; see `rns_testkit::replay`
        file: String,

        #[arg(long = "config")]
        config_paths: Vec<PathBuf>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Action {
    Place,
    Remove,
}

impl From<Action> for CommandKind {
    fn from(a: Action) -> Self {
        match a {
            Action::Place => CommandKind::Place,
            Action::Remove => CommandKind::Remove,
        }
    }
}

fn init_tracing() {
    // stdout carries command output; logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    match cli.cmd {
        Commands::ConfigHash { paths } => {
            let loaded = commands::load_config(&paths)?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Topology { config_paths } => {
            let station = commands::load_station(&config_paths)?;
            let view = commands::topology_view(&station)?;
            println!("{}", serde_json::to_string_pretty(&view)?);
        }

        Commands::Encode {
            slot,
            action,
            config_paths,
        } => {
            let station = commands::load_station(&config_paths)?;
            let cmd = commands::encode(&station, &slot, action.into())?;
            println!("topic={}", cmd.topic);
            println!("payload={}", cmd.payload);
        }

        Commands::Replay { file, config_paths } => {
            let station = commands::load_station(&config_paths)?;
            let report = commands::replay(&station, &file)?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            if !report.violations.is_empty() {
                anyhow::bail!(
                    "replay left {} invariant violation(s)",
                    report.violations.len()
                );
            }
            tracing::info!(
                steps = report.steps.len(),
                records = report.records.len(),
                "replay complete"
            );
        }
    }

    Ok(())
}
