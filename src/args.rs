use clap::{ArgAction, Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(
    name = "classweave",
    author,
    version,
    about = "Rename, inject into and stub JVM class archives",
    long_about = "Renames the classes of jar archives between symbol namespaces, adds synthetic \
                  fields and accessors from a JSON definition set, and generates the holder, \
                  mixin and stub classes those additions need."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// More log output (-v info, -vv debug, -vvv trace). CLASSWEAVE_LOG overrides.
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Transform one or more archives
    Process(ProcessArgs),

    /// Print the content hash of a definition set
    Hash(HashArgs),

    /// Report whether an archive is up to date with a definition set
    Check(CheckArgs),
}

#[derive(Debug, Args)]
pub struct ProcessArgs {
    /// Archive to transform. Can be provided multiple times; each is an independent job.
    #[arg(long, value_name = "JAR", required = true)]
    pub input: Vec<PathBuf>,

    /// Output archive. Only valid with a single --input; defaults to rewriting in place.
    #[arg(long, value_name = "JAR")]
    pub output: Option<PathBuf>,

    /// Archives used for hierarchy resolution only, in lookup order.
    #[arg(long, value_name = "JAR")]
    pub classpath: Vec<PathBuf>,

    /// JSON definition set.
    #[arg(long, value_name = "PATH")]
    pub definitions: PathBuf,

    /// Tiny v1/v2 mapping files, highest priority first.
    #[arg(long, value_name = "PATH")]
    pub mappings: Vec<PathBuf>,

    /// Source namespace of the mapping files.
    #[arg(long, default_value = "intermediary")]
    pub from: String,

    /// Target namespace of the mapping files.
    #[arg(long, default_value = "named")]
    pub to: String,

    /// Compile-only archive receiving stubs (created if missing). Stubs go
    /// into each output archive when unset.
    #[arg(long, value_name = "JAR")]
    pub stubs_jar: Option<PathBuf>,

    /// Application metadata entry the mixin configuration is registered in.
    #[arg(long, value_name = "NAME")]
    pub metadata_entry: Option<String>,

    /// Package prefix never stubbed. Can be provided multiple times; replaces the defaults.
    #[arg(long, value_name = "PREFIX")]
    pub reserved_prefix: Vec<String>,

    /// Worker threads for parallel jobs (default: all cores).
    #[arg(long, value_name = "N")]
    pub threads: Option<usize>,
}

#[derive(Debug, Args)]
pub struct HashArgs {
    /// JSON definition set.
    #[arg(long, value_name = "PATH")]
    pub definitions: PathBuf,
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    /// Archive to check.
    #[arg(long, value_name = "JAR")]
    pub input: PathBuf,

    /// JSON definition set.
    #[arg(long, value_name = "PATH")]
    pub definitions: PathBuf,
}
