use std::path::PathBuf;
use std::time::Instant;

use anyhow::{bail, Result};
use clap::Parser;
use rayon::prelude::*;

use pdf_reducer::config::KILOBYTE;
use pdf_reducer::file_ops::{default_output_path, reduce_file, FileReport};
use pdf_reducer::{ReduceConfig, TargetSize};

/// Shrink PDFs towards a target size by re-encoding their images
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Input PDF file(s)
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Target size, e.g. 500 (KB), 500kb, 2mb
    #[arg(short, long)]
    target: TargetSize,

    /// Output PDF file (single input only; default <name>_reduced.pdf)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// JPEG quality of the first attempt (1-100)
    #[arg(long, default_value_t = 50)]
    initial_quality: u8,

    /// Quality decrease after each attempt over target
    #[arg(long, default_value_t = 5)]
    step: u8,

    /// Lowest quality ever used
    #[arg(long, default_value_t = 10)]
    min_quality: u8,

    /// Maximum number of attempts
    #[arg(long, default_value_t = 10)]
    max_iterations: u32,

    /// Stop as soon as an attempt at the minimum quality was measured
    #[arg(long)]
    stop_at_floor: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn config(&self) -> ReduceConfig {
        ReduceConfig {
            initial_quality: self.initial_quality,
            step: self.step,
            min_quality: self.min_quality,
            max_iterations: self.max_iterations,
            stop_at_floor: self.stop_at_floor,
        }
    }
}

fn kb(bytes: u64) -> f64 {
    bytes as f64 / KILOBYTE as f64
}

fn print_report(report: &FileReport) {
    println!("{}", report.input.display());
    println!("  Original size: {:.2} KB", kb(report.original_size));
    println!(
        "  Final size:    {:.2} KB ({} attempts, quality {})",
        kb(report.final_size),
        report.attempts,
        report
            .final_quality
            .map(|q| q.to_string())
            .unwrap_or_else(|| "-".to_string())
    );
    println!("  Written to:    {}", report.output.display());
    if !report.target_met() {
        println!(
            "  Target of {:.2} KB not reached; this is the smallest result found.",
            kb(report.target)
        );
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::new()
        .filter_level(match args.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .init();

    if args.output.is_some() && args.inputs.len() > 1 {
        bail!("--output can only be used with a single input file");
    }

    let config = args.config();
    config.validate()?;

    let jobs: Vec<(PathBuf, PathBuf)> = args
        .inputs
        .iter()
        .map(|input| {
            let output = args
                .output
                .clone()
                .unwrap_or_else(|| default_output_path(input));
            (input.clone(), output)
        })
        .collect();

    let start = Instant::now();
    let results: Vec<Result<FileReport>> = jobs
        .par_iter()
        .map(|(input, output)| reduce_file(input, output, args.target, &config))
        .collect();

    let mut failures = 0;
    for result in &results {
        match result {
            Ok(report) => print_report(report),
            Err(e) => {
                failures += 1;
                eprintln!("Error: {:?}", e);
            }
        }
    }
    println!("Done in {:.2?}", start.elapsed());

    if failures > 0 {
        bail!("{} of {} files failed", failures, results.len());
    }
    Ok(())
}
