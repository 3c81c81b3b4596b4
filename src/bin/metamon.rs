//! metamon CLI - training toolkit for battle agents
//!
//! This CLI provides a unified interface for:
//! - Training agents from offline replays with live evaluation
//! - Listing and smoke-testing the live environment roster
//! - Recording self-play replay corpora

use anyhow::Result;
use clap::{Parser, Subcommand};
use metamon::cli::{
    commands::{envs, record, train},
    telemetry,
};

#[derive(Parser)]
#[command(name = "metamon")]
#[command(version, about = "Training toolkit for battle agents", long_about = None)]
struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit logs as JSON lines
    #[arg(long = "json_logs", global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train an agent (offline RL or imitation learning)
    Train(Box<train::TrainArgs>),

    /// List live environments and optionally play test episodes
    Envs(envs::EnvsArgs),

    /// Record scripted self-play battles as a replay corpus
    Record(record::RecordArgs),
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init_tracing(cli.json_logs, telemetry::level_for(cli.verbose));

    match cli.command {
        Commands::Train(args) => train::execute(*args),
        Commands::Envs(args) => envs::execute(args),
        Commands::Record(args) => record::execute(args),
    }
}
