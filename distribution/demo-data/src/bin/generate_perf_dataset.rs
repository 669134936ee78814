//! Generate a synthetic patient dataset for search benchmarks.
//!
//! Usage:
//!     cargo run --release --bin generate-perf-dataset -- --count 50000
//!
//! Default output: ../../chairside/benches/synthetic_patients.json

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Number of patients to generate
    #[arg(short, long, default_value_t = 20_000)]
    count: usize,

    /// RNG seed, so repeated runs produce the same dataset
    #[arg(short, long, default_value_t = 42)]
    seed: u64,

    /// Output path for the JSON file
    #[arg(short, long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let output_path = args.output.unwrap_or_else(|| {
        PathBuf::from(env!("CARGO_MANIFEST_DIR"))
            .join("../../chairside/benches/synthetic_patients.json")
    });

    println!("Generating {} synthetic patients (seed {})...", args.count, args.seed);
    demo_data::write_dataset(&output_path, args.count, args.seed)?;
    println!("Dataset written: {}", output_path.display());

    Ok(())
}
