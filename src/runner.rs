//! Job runner for the `process`, `hash` and `check` commands.
//!
//! Each input archive is an independent job. Jobs run on a rayon pool and
//! share one [`BuildContext`]: the definitions, parsed mappings and the stub
//! ledger.

use anyhow::{anyhow, Context, Result};
use rayon::prelude::*;
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{error, info};

use classweave_core::cache::{compute_hash, read_trailer};
use classweave_core::definition::DefinitionSet;
use classweave_core::error::{find_weave_error, WeaveError};
use classweave_core::processor::{process_artifact, ArtifactReport, BuildContext};

use crate::config::WeaveConfig;

#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub output: PathBuf,
    pub skipped: bool,
    pub group: String,
    pub transformed: usize,
    pub artifacts: Vec<String>,
    pub stubs: Vec<String>,
    pub mixin_config: Option<String>,
}

impl From<&ArtifactReport> for JobSummary {
    fn from(report: &ArtifactReport) -> Self {
        Self {
            output: report.output.clone(),
            skipped: report.skipped,
            group: report.group.clone(),
            transformed: report.transformed.len(),
            artifacts: report.artifacts.clone(),
            stubs: report.stubs.clone(),
            mixin_config: report.mixin_config.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub input: PathBuf,
    pub expected: String,
    pub recorded: Option<String>,
    pub up_to_date: bool,
}

pub fn run_process(config: &WeaveConfig) -> Result<Vec<ArtifactReport>> {
    let definitions = config.load_definitions()?;
    let mappings = config.load_mappings()?;
    info!(
        "Loaded {} class definitions and {} mapping tables ({} -> {})",
        definitions.len(),
        mappings.len(),
        config.from,
        config.to
    );
    let ctx = BuildContext::new(definitions, mappings, config.options.clone());

    let run_all = || -> Vec<Result<ArtifactReport>> {
        config
            .jobs
            .par_iter()
            .map(|job| {
                process_artifact(&ctx, job).with_context(|| format!("Failed to process {}", job.input.display()))
            })
            .collect()
    };
    let results = match config.threads {
        Some(n) => rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .build()
            .map_err(|e| anyhow!("Failed to build thread pool: {}", e))?
            .install(run_all),
        None => run_all(),
    };

    let mut reports = Vec::with_capacity(results.len());
    let mut failures = Vec::new();
    for result in results {
        match result {
            Ok(report) => reports.push(report),
            Err(err) => {
                log_failure(&err);
                failures.push(err);
            }
        }
    }
    match failures.len() {
        0 => Ok(reports),
        1 => Err(failures.remove(0)),
        n => Err(failures
            .remove(0)
            .context(format!("{} of {} archives failed", n, config.jobs.len()))),
    }
}

fn log_failure(err: &anyhow::Error) {
    match find_weave_error(err) {
        Some(WeaveError::DefinitionConflict { .. }) => {}
        Some(typed) => error!("{}", typed),
        None => error!("{:#}", err),
    }
}

pub fn run_hash(definitions: &Path) -> Result<String> {
    let set = DefinitionSet::load(definitions)?;
    Ok(compute_hash(&set).to_hex())
}

pub fn run_check(input: &Path, definitions: &Path) -> Result<CheckReport> {
    if !input.exists() {
        return Err(WeaveError::MissingInput {
            path: input.to_path_buf(),
        }
        .into());
    }
    let expected = compute_hash(&DefinitionSet::load(definitions)?);
    let recorded = read_trailer(input)?;
    Ok(CheckReport {
        input: input.to_path_buf(),
        expected: expected.to_hex(),
        recorded: recorded.map(|h| h.to_hex()),
        up_to_date: recorded == Some(expected),
    })
}
