//! CLI argument parsing module

use anyhow::{anyhow, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct CliArgs {
    pub config: Option<PathBuf>,
    pub strict_config: bool,
    pub scenario: PathBuf,
    /// None = bundled demo supervisor
    pub supervisor: Option<PathBuf>,
    pub ticks: u64,
    /// Wall-clock pause between ticks
    pub tick_interval: Option<Duration>,
    pub parallel: bool,
    pub verbose: bool,
    pub json: bool,
}

#[derive(Parser, Debug)]
#[command(name = "swarm-coord")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Run a robot swarm scenario with connector-chain coordination")]
struct Args {
    /// Config file, applied on top of the discovered .swarm-coord.config files
    #[arg(long)]
    config: Option<PathBuf>,

    /// Do not fall back to built-in defaults; every value must come from a file
    #[arg(long, default_value = "false")]
    strict_config: bool,

    /// Scenario file (YAML or JSON)
    #[arg(short, long)]
    scenario: PathBuf,

    /// Supervisor table (YAML or JSON), defaults to the bundled demo table
    #[arg(long)]
    supervisor: Option<PathBuf>,

    /// Number of ticks to run
    #[arg(short = 'n', long, default_value = "100")]
    ticks: u64,

    /// Pause between ticks (e.g., "100ms", "1s")
    #[arg(long)]
    tick_interval: Option<String>,

    /// Step robots on parallel blocking tasks
    #[arg(long, default_value = "false")]
    parallel: bool,

    /// Debug logging
    #[arg(long, default_value = "false")]
    verbose: bool,

    /// Print the final robot summaries as JSON
    #[arg(long, default_value = "false")]
    json: bool,
}

/// Parse CLI arguments
pub fn parse_args() -> Result<CliArgs> {
    from_args(Args::parse())
}

fn from_args(args: Args) -> Result<CliArgs> {
    let tick_interval = args
        .tick_interval
        .as_deref()
        .map(parse_duration)
        .transpose()?;

    Ok(CliArgs {
        config: args.config,
        strict_config: args.strict_config,
        scenario: args.scenario,
        supervisor: args.supervisor,
        ticks: args.ticks,
        tick_interval,
        parallel: args.parallel,
        verbose: args.verbose,
        json: args.json,
    })
}

/// Parse human-readable duration
fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();

    // Try parsing as humantime duration
    if let Ok(duration) = humantime::parse_duration(s) {
        return Ok(duration);
    }

    // Try parsing as plain number (assume milliseconds)
    if let Ok(ms) = s.parse::<u64>() {
        return Ok(Duration::from_millis(ms));
    }

    Err(anyhow!("Invalid duration format: {}", s))
}
