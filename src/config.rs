//! Build configuration assembled from CLI arguments and the environment.
//!
//! Precedence: explicit flags, then `CLASSWEAVE_*` variables, then defaults.
//!
//! | Variable | Meaning |
//! |----------|---------|
//! | `CLASSWEAVE_RESERVED_PREFIXES` | comma-separated prefixes never stubbed |
//! | `CLASSWEAVE_METADATA_ENTRY` | metadata entry the mixin config is registered in |
//! | `CLASSWEAVE_THREADS` | worker threads for parallel jobs |

use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::str::FromStr;

use classweave_core::definition::DefinitionSet;
use classweave_core::manifest::DEFAULT_METADATA_ENTRY;
use classweave_core::processor::{ArtifactJob, ProcessOptions};
use classweave_core::stubs::default_reserved_prefixes;
use classweave_mappings::{load_mappings, Mapping};

use crate::args::ProcessArgs;

pub const ENV_RESERVED_PREFIXES: &str = "CLASSWEAVE_RESERVED_PREFIXES";
pub const ENV_METADATA_ENTRY: &str = "CLASSWEAVE_METADATA_ENTRY";
pub const ENV_THREADS: &str = "CLASSWEAVE_THREADS";

/// Parse an environment variable; `None` when unset or unparsable.
pub fn env_var<T: FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

pub fn env_var_or<T: FromStr>(key: &str, default: T) -> T {
    env_var(key).unwrap_or(default)
}

/// Comma-separated list; empty items are dropped.
pub fn env_list(key: &str) -> Option<Vec<String>> {
    let raw = std::env::var(key).ok()?;
    let items: Vec<String> = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();
    if items.is_empty() {
        None
    } else {
        Some(items)
    }
}

#[derive(Debug, Clone)]
pub struct WeaveConfig {
    pub jobs: Vec<ArtifactJob>,
    pub definitions: PathBuf,
    pub mappings: Vec<PathBuf>,
    pub from: String,
    pub to: String,
    pub options: ProcessOptions,
    /// `None` uses the global rayon pool.
    pub threads: Option<usize>,
}

impl WeaveConfig {
    pub fn from_args(args: &ProcessArgs) -> Result<Self> {
        let jobs = match (&args.output, args.input.as_slice()) {
            (Some(output), [input]) => vec![ArtifactJob::new(input, output)],
            (Some(_), _) => bail!("--output requires exactly one --input"),
            (None, inputs) => inputs.iter().map(ArtifactJob::in_place).collect(),
        };

        let reserved_prefixes = if !args.reserved_prefix.is_empty() {
            args.reserved_prefix.clone()
        } else {
            env_list(ENV_RESERVED_PREFIXES).unwrap_or_else(default_reserved_prefixes)
        };
        let metadata_entry = args
            .metadata_entry
            .clone()
            .unwrap_or_else(|| env_var_or(ENV_METADATA_ENTRY, DEFAULT_METADATA_ENTRY.to_string()));
        let threads = args.threads.or_else(|| env_var(ENV_THREADS)).filter(|n| *n > 0);

        Ok(Self {
            jobs,
            definitions: args.definitions.clone(),
            mappings: args.mappings.clone(),
            from: args.from.clone(),
            to: args.to.clone(),
            options: ProcessOptions {
                classpath: args.classpath.clone(),
                stubs_archive: args.stubs_jar.clone(),
                metadata_entry,
                reserved_prefixes,
            },
            threads,
        })
    }

    pub fn load_definitions(&self) -> Result<DefinitionSet> {
        DefinitionSet::load(&self.definitions)
            .with_context(|| format!("Failed to load definitions from {}", self.definitions.display()))
    }

    pub fn load_mappings(&self) -> Result<Vec<Mapping>> {
        load_mappings(&self.mappings, &self.from, &self.to)
    }
}
