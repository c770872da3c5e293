//! rtlab entry point.
//!
//! Runs exactly one experiment per invocation: resolve configuration, pick
//! the experiment by id, run it, print the report on stdout. Diagnostics go
//! to stderr through `tracing`.

use anyhow::{Context, Result};
use clap::Parser;
use rtlab_common::config::HarnessConfig;
use rtlab_harness::runner::{ExperimentRunner, RunOutcome};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming an explicit configuration file.
const CONFIG_ENV: &str = "RTLAB_CONFIG";

/// Fallback configuration locations, checked in order.
const CONFIG_FALLBACKS: [&str; 2] = ["/etc/rtlab/config.toml", "rtlab.toml"];

/// rtlab command-line arguments.
#[derive(Parser, Debug)]
#[command(
    name = "rtlab",
    about = "Run one RT/NRT scheduling contention experiment and report per-thread timings",
    version,
    long_about = None
)]
struct Args {
    /// Experiment id (0-5). Absent or non-numeric selects experiment 0.
    #[arg(value_name = "EXPERIMENT_ID", allow_hyphen_values = true)]
    experiment: Option<String>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging();

    info!(version = env!("CARGO_PKG_VERSION"), "Starting rtlab");

    let experiment_id = parse_experiment_id(args.experiment.as_deref());

    let explicit = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
    let fallbacks: Vec<PathBuf> = CONFIG_FALLBACKS.iter().map(PathBuf::from).collect();
    let config = resolve_config(explicit.as_deref(), &fallbacks)?;

    info!(
        lock_memory = config.lock_memory,
        pin_cpu = config.pin_cpu,
        "Configuration loaded"
    );

    let mut runner = ExperimentRunner::new(config);
    match runner
        .run(experiment_id)
        .with_context(|| format!("Experiment {experiment_id} aborted"))?
    {
        RunOutcome::Completed(summary) => {
            info!(
                experiment = summary.experiment_id,
                completed = summary.completed(),
                failed = summary.failures.len(),
                "Done"
            );
        }
        RunOutcome::NotFound(id) => {
            warn!(experiment = id, "No experiment ran");
        }
    }

    Ok(())
}

/// Initialize logging on stderr; `RUST_LOG` overrides the default.
fn init_logging() {
    let filter = "rtlab=info,rtlab_harness=info,rtlab_common=info";

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}

/// Map the positional argument to an experiment id, defaulting to 0.
fn parse_experiment_id(raw: Option<&str>) -> u32 {
    match raw {
        None => {
            warn!("No experiment id given, running experiment 0");
            0
        }
        Some(text) => text.trim().parse().unwrap_or_else(|_| {
            warn!(argument = %text, "Experiment id is not a number, running experiment 0");
            0
        }),
    }
}

/// Load configuration.
///
/// Resolution priority:
/// 1. `explicit` (from `RTLAB_CONFIG`): must exist and parse
/// 2. First existing file in `fallbacks`
/// 3. Built-in defaults
fn resolve_config(explicit: Option<&Path>, fallbacks: &[PathBuf]) -> Result<HarnessConfig> {
    if let Some(config_path) = explicit {
        info!(?config_path, "Loading config from {CONFIG_ENV}");
        return HarnessConfig::from_file(config_path).with_context(|| {
            format!("Failed to load config from {CONFIG_ENV}={}", config_path.display())
        });
    }

    if let Some(config_path) = fallbacks.iter().find(|p| p.exists()) {
        info!(?config_path, "Loading config");
        return HarnessConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {}", config_path.display()));
    }

    info!("No config file found, using built-in defaults");
    Ok(HarnessConfig::default())
}
