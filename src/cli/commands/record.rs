//! Record command - bootstrap a local parsed-replay corpus from self-play

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;

use crate::{
    battle::BattleFormat,
    cli::output::print_kv,
    config::parse_list,
    dataset::{self, write_corpus},
};

#[derive(Parser, Debug)]
#[command(about = "Record scripted self-play battles as a parsed-replay corpus")]
pub struct RecordArgs {
    /// Corpus root (default: $METAMON_CACHE_DIR/parsed-replays)
    #[arg(long)]
    pub root: Option<PathBuf>,

    /// Comma-separated battle formats
    #[arg(long, default_value = "gen1ou,gen2ou,gen3ou,gen4ou")]
    pub formats: String,

    /// Replays per format
    #[arg(long, default_value_t = 100)]
    pub count: usize,

    /// Random seed
    #[arg(long, default_value_t = 0)]
    pub seed: u64,
}

pub fn execute(args: RecordArgs) -> Result<()> {
    let root = match args.root {
        Some(root) => root,
        None => dataset::default_root()?,
    };
    let formats: Vec<BattleFormat> = parse_list(&args.formats, |s| s.parse())?;
    for format in formats {
        let written = write_corpus(&root, format, args.count, args.seed)?;
        tracing::info!(format = %format, written, "recorded replays");
        print_kv(&format.to_string(), &format!("{written} replays"));
    }
    println!("Corpus written to {}", root.display());
    Ok(())
}
