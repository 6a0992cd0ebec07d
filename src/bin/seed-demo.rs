//! Write synthetic bronze tables so the rest of the pipeline can run offline.
use chrono::{NaiveDate, Utc};
use clap::Parser;
use oil_regime::config::Config;
use oil_regime::logging;
use oil_regime::pipeline::demo::{seed_bronze, DemoOptions};
use oil_regime::pipeline::tiers::TierStore;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "seed-demo")]
#[command(about = "Seed bronze tables with a reproducible random walk")]
struct Args {
    /// Data root (defaults to the configured storage.data_root)
    #[arg(long)]
    data_root: Option<PathBuf>,
    #[arg(long, default_value_t = 42)]
    seed: u64,
    #[arg(long, default_value_t = 156)]
    weeks: u32,
    /// First day of the series, YYYY-MM-DD
    #[arg(long)]
    start: Option<NaiveDate>,
}

fn main() -> anyhow::Result<()> {
    logging::init_logging();
    let args = Args::parse();
    let config = Config::load()?;

    let data_root = args.data_root.unwrap_or(config.storage.data_root);
    let mut opts = DemoOptions {
        seed: args.seed,
        weeks: args.weeks,
        ..DemoOptions::default()
    };
    if let Some(start) = args.start {
        opts.start = start;
    }

    println!("🌱 Seeding demo bronze tables under {}", data_root.display());
    let written = seed_bronze(&TierStore::new(data_root), &opts, Utc::now())?;
    for (source, w) in written {
        println!("   {source}: {} rows -> {}", w.rows, w.path.display());
    }
    println!("Next: oil-regime clean && oil-regime features && oil-regime model && oil-regime load");
    Ok(())
}
