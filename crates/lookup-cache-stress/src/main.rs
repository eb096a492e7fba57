use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use humantime::parse_duration;
use lookup_cache::CacheConfig;

mod logging;
mod stresstest;
mod workloads;

use stresstest::perform_stresstest;
use workloads::WorkloadsConfig;

/// The `max_entries` used when the cache config does not provide one.
const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Command line interface parser.
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    /// Path to your cache configuration file.
    #[arg(long, short, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Path to the workload definition file.
    #[arg(long, short, value_name = "FILE")]
    workloads: PathBuf,

    /// Duration of the stresstest.
    #[arg(long, short, value_parser = parse_duration)]
    duration: Duration,

    /// Enable tracing output, in the format used in production.
    #[arg(long)]
    tracing: bool,

    /// Report metrics to a local statsd sink.
    #[arg(long)]
    metrics: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // parse configs
    let workloads_file =
        std::fs::File::open(&cli.workloads).context("failed to open workloads file")?;
    let workloads: WorkloadsConfig =
        serde_yaml::from_reader(workloads_file).context("failed to parse workloads YAML")?;

    let mut cache_config = CacheConfig::get(cli.config.as_deref())?;
    cache_config.max_entries.get_or_insert(DEFAULT_MAX_ENTRIES);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to create runtime")?;

    let guard = runtime.block_on(async {
        logging::init(logging::Config {
            tracing: cli.tracing,
            metrics: cli.metrics,
        })
    })?;
    if let Some(udp_sink) = guard.udp_sink {
        runtime.spawn(udp_sink);
    }

    runtime.block_on(perform_stresstest(cache_config, workloads, cli.duration))
}
