mod cli;
mod logger;

use anyhow::{Context, Result};
use cli::CliArgs;
use std::path::Path;
use std::sync::Arc;
use swarm_coord::config_loader::{get_config_paths, load_cascading_config};
use swarm_coord::sim::{RobotSummary, Scenario, World};
use swarm_coord::swarm::{AutomatonAcceptor, Robot, Scheduler};
use tracing::{debug, info, warn};

/// Demo supervisor used when no table is given
const BUNDLED_SUPERVISOR: &str = include_str!("../supervisors/connector_chain.yaml");

#[tokio::main]
async fn main() -> Result<()> {
    // Parse CLI arguments
    let args = cli::parse_args()?;

    // Initialize logging
    logger::init(args.verbose, args.parallel);

    info!("swarm-coord v{}", env!("CARGO_PKG_VERSION"));

    run(args).await
}

fn load_supervisor(path: Option<&Path>) -> Result<AutomatonAcceptor> {
    match path {
        Some(path) => {
            let source = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read supervisor {}", path.display()))?;
            AutomatonAcceptor::from_yaml(&source)
                .with_context(|| format!("invalid supervisor {}", path.display()))
        }
        None => AutomatonAcceptor::from_yaml(BUNDLED_SUPERVISOR)
            .context("invalid bundled supervisor"),
    }
}

async fn run(args: CliArgs) -> Result<()> {
    debug!("Config search paths: {:?}", get_config_paths());
    let config = load_cascading_config(args.config.as_deref(), args.strict_config)
        .context("invalid configuration")?;
    let config = Arc::new(config);

    let acceptor = load_supervisor(args.supervisor.as_deref())?;
    let scenario = Scenario::load(&args.scenario)?;

    let mut world = World::from_scenario(&scenario, &config);
    let robots = scenario
        .robots
        .iter()
        .map(|spec| {
            Robot::new(
                spec.id.number,
                spec.role(),
                spec.team,
                config.clone(),
                Box::new(acceptor.clone()),
            )
        })
        .collect();
    let mut scheduler = Scheduler::new(robots);

    info!(
        robots = scheduler.robots().len(),
        ticks = args.ticks,
        parallel = args.parallel,
        "Starting scenario"
    );

    let mut interval = args
        .tick_interval
        .filter(|d| !d.is_zero())
        .map(tokio::time::interval);

    for _ in 0..args.ticks {
        if let Some(interval) = interval.as_mut() {
            tokio::select! {
                _ = interval.tick() => {}
                _ = tokio::signal::ctrl_c() => {
                    warn!("Received Ctrl+C, stopping early");
                    break;
                }
            }
        }

        let outputs = if args.parallel {
            scheduler.tick_parallel(&world).await?
        } else {
            scheduler.tick(&world)
        };
        world.advance(&outputs);
    }

    info!(ticks = scheduler.tick_count(), "Scenario finished");
    print_summary(&world.summaries(scheduler.robots()), args.json)
}

fn print_summary(summaries: &[RobotSummary], json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(summaries)?);
        return Ok(());
    }

    for s in summaries {
        let team = s
            .team
            .map_or_else(|| "-".to_string(), |t| t.to_string());
        let hops: Vec<String> = s
            .hops
            .iter()
            .map(|(team, count)| format!("{}:{}", team, count))
            .collect();
        println!(
            "{:<5} {:<10} team={:<3} hops=[{}] mode={:?} task={} pos=({:.1}, {:.1})",
            s.id.to_string(),
            s.role.to_string(),
            team,
            hops.join(" "),
            s.move_mode,
            s.performing_task,
            s.x,
            s.y
        );
    }
    Ok(())
}
