//! classweave: load-time class rewriting, done ahead of time.
//!
//! ```bash
//! # Rename and inject into an archive in place
//! classweave process --input mods/example.jar --definitions defs.json \
//!     --mappings mappings.tiny --classpath minecraft.jar
//!
//! # Put stubs in a separate compile-only archive
//! classweave process --input a.jar --input b.jar --definitions defs.json --stubs-jar stubs.jar
//!
//! # Incremental build check
//! classweave check --input mods/example.jar --definitions defs.json
//! ```

use anyhow::Result;
use clap::Parser;

use classweave::args::{Cli, Command};
use classweave::config::WeaveConfig;
use classweave::logging;
use classweave::runner::{run_check, run_hash, run_process, JobSummary};

fn main() -> Result<()> {
    let Cli { command, verbose, json } = Cli::parse();
    logging::init(verbose);

    match command {
        Command::Process(args) => {
            let config = WeaveConfig::from_args(&args)?;
            let reports = run_process(&config)?;
            let summaries: Vec<JobSummary> = reports.iter().map(JobSummary::from).collect();
            if json {
                println!("{}", serde_json::to_string_pretty(&summaries)?);
            } else {
                for s in &summaries {
                    if s.skipped {
                        println!("{}: up to date", s.output.display());
                    } else {
                        println!(
                            "{}: {} classes transformed, {} artifacts, {} stubs",
                            s.output.display(),
                            s.transformed,
                            s.artifacts.len(),
                            s.stubs.len()
                        );
                    }
                }
            }
        }
        Command::Hash(args) => {
            let hash = run_hash(&args.definitions)?;
            if json {
                println!("{}", serde_json::json!({ "sha256": hash }));
            } else {
                println!("{}", hash);
            }
        }
        Command::Check(args) => {
            let report = run_check(&args.input, &args.definitions)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else if report.up_to_date {
                println!("{}: up to date ({})", report.input.display(), report.expected);
            } else {
                println!("{}: stale", report.input.display());
            }
            if !report.up_to_date {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}
