//! Train command - offline RL / imitation learning with live evaluation

use std::{fs::File, path::PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use serde_json::to_writer_pretty;

use crate::{
    app::App,
    cli::output::{format_number, format_percent, print_kv, print_section, print_subsection},
    config::{RunArgs, RunConfig},
    pipeline::TrainingSummary,
};

/// File name of the end-of-run summary inside the run directory
pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Parser, Debug)]
#[command(about = "Train an agent on offline replays and live battles")]
pub struct TrainArgs {
    #[command(flatten)]
    pub run: RunArgs,

    /// Write the end-of-run summary here instead of {run_dir}/summary.json
    #[arg(long)]
    pub summary: Option<PathBuf>,

    /// Hide the progress bar
    #[arg(long, default_value_t = false)]
    pub quiet: bool,
}

fn print_config(config: &RunConfig) {
    print_section(&format!("Training run: {}", config.run_name()));
    let objective = config.objective();
    let schedule = config.schedule();
    print_kv("Run directory", &config.run_dir().display().to_string());
    print_kv("Mode", if config.il() { "imitation" } else { "offline RL" });
    print_kv("Architecture", config.arch_size().name());
    print_kv("Filter", objective.filter().name());
    print_kv(
        "Coefficients",
        &format!(
            "offline {:.2}, online {:.2}",
            objective.offline_coeff(),
            objective.online_coeff()
        ),
    );
    print_kv(
        "Formats",
        &config
            .formats()
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    );
    print_kv("Epochs", &schedule.epochs.to_string());
    print_kv(
        "Batches per epoch",
        &format_number(schedule.train_batches_per_epoch),
    );
    print_kv("Gradient accumulation", &schedule.batches_per_update.to_string());
    print_kv("Seed", &config.seed().to_string());
    if let Some(ordinal) = config.resume() {
        print_kv("Resume from", &format!("checkpoint {ordinal}"));
    }
}

fn print_summary(summary: &TrainingSummary) {
    print_subsection("Summary");
    print_kv("Epochs completed", &summary.epochs_completed.to_string());
    print_kv("Training batches", &format_number(summary.train_batches));
    print_kv("Optimizer steps", &format_number(summary.optimizer_steps));
    print_kv(
        "Checkpoints written",
        &summary
            .checkpoints
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", "),
    );
    if let Some(eval) = &summary.last_eval {
        print_kv("Final win rate", &format_percent(eval.win_rate));
        print_kv("Final mean return", &format!("{:.2}", eval.mean_return));
        for (spec, result) in &eval.per_spec {
            print_kv(spec, &format_percent(result.win_rate));
        }
    }
    if summary.env_faults + summary.env_timeouts > 0 {
        print_kv(
            "Environment faults",
            &format!(
                "{} faults, {} timeouts, {} skipped",
                summary.env_faults, summary.env_timeouts, summary.env_skipped
            ),
        );
    }
}

pub fn execute(args: TrainArgs) -> Result<()> {
    let config = RunConfig::resolve(&args.run)?;
    let config_path = config.persist()?;
    print_config(&config);

    let summary_path = args
        .summary
        .clone()
        .unwrap_or_else(|| config.run_dir().join(SUMMARY_FILE));
    let resume = config.resume();

    let mut app = App::new(config);
    if args.quiet {
        app = app.without_progress();
    }

    let mut experiment = app.experiment()?;
    experiment.start()?;
    if let Some(ordinal) = resume {
        experiment
            .load_checkpoint(ordinal)
            .with_context(|| format!("resume {}", app.config().run_name()))?;
    }
    let summary = experiment.learn()?;
    print_summary(&summary);

    if let Some(parent) = summary_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = File::create(&summary_path)
        .with_context(|| format!("create {}", summary_path.display()))?;
    to_writer_pretty(file, &summary)?;
    println!("\nConfiguration: {}", config_path.display());
    println!("Summary written to {}", summary_path.display());
    Ok(())
}
