//! RFM segmentation CLI: loads transactions, clusters customers, names the
//! segments and projects the revenue impact of an engagement increase.

use std::path::Path;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use rfm_segment::{pipeline, report, Args};

fn main() -> Result<()> {
    let args = Args::parse();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(args.log_filter()))
        .init();

    let start_time = Instant::now();
    info!("Loading transactions from {}", args.input);

    let report = pipeline::run(&args.input, &args.pipeline_options())
        .with_context(|| format!("Segmentation failed for {}", args.input))?;

    report::print_report(&report);

    if let Some(json_path) = &args.json {
        report::write_json(&report, Path::new(json_path))?;
        println!("\nReport saved to: {}", json_path);
    }

    info!("Pipeline complete in {:.2}s", start_time.elapsed().as_secs_f64());
    Ok(())
}
