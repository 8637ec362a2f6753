//! Log subscriber setup for the CLI.

use tracing::Level;
use tracing_subscriber::EnvFilter;

pub const ENV_LOG: &str = "CLASSWEAVE_LOG";

fn level_for(verbose: u8) -> Level {
    match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// `CLASSWEAVE_LOG` takes an `EnvFilter` directive and wins over `-v`.
/// Output goes to stderr so `--json` results stay clean on stdout.
pub fn init(verbose: u8) {
    let filter = EnvFilter::try_from_env(ENV_LOG)
        .unwrap_or_else(|_| EnvFilter::new(level_for(verbose).as_str().to_lowercase()));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
