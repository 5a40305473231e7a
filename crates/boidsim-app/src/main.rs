//! Headless flocking run: initialize a seeded population, advance it a fixed
//! number of ticks, and log periodic summaries.
//!
//! Runtime knobs come from environment variables (`BOIDSIM_SEED`,
//! `BOIDSIM_TICKS`, `BOIDSIM_BOIDS`, `BOIDSIM_EDGE_MODE`,
//! `BOIDSIM_LOG_INTERVAL`); there is deliberately no argument parsing.

use anyhow::{Result, bail};
use boidsim_core::{EdgeMode, FlockConfig, Simulation};
use tracing::info;

fn main() -> Result<()> {
    init_tracing();

    let seed = read_env("BOIDSIM_SEED", 42);
    let ticks = read_env("BOIDSIM_TICKS", 500);
    let log_interval = read_env("BOIDSIM_LOG_INTERVAL", 100).max(1);
    let config = build_config()?;

    info!(
        boids = config.num_boids,
        world_width = config.world_width,
        world_height = config.world_height,
        edge_mode = ?config.edge_mode,
        seed,
        ticks,
        "starting headless flocking run",
    );

    let mut sim = Simulation::new(seed, config)?;
    for _ in 0..ticks {
        let tick = sim.step();
        if tick.0.is_multiple_of(log_interval) {
            let summary = sim.summary();
            info!(
                tick = summary.tick.0,
                agents = summary.agent_count,
                mean_speed = summary.mean_speed,
                center_x = summary.center.x,
                center_y = summary.center.y,
                "tick summary",
            );
        }
    }

    let summary = sim.summary();
    info!(
        tick = summary.tick.0,
        mean_speed = summary.mean_speed,
        "run complete",
    );
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn build_config() -> Result<FlockConfig> {
    let mut config = FlockConfig {
        num_boids: read_env("BOIDSIM_BOIDS", 200) as usize,
        ..FlockConfig::default()
    };
    if let Ok(mode) = std::env::var("BOIDSIM_EDGE_MODE") {
        config.edge_mode = match mode.as_str() {
            "wrap" => EdgeMode::Wrap,
            "bounce" => EdgeMode::Bounce,
            other => bail!("unknown edge mode {other:?} (expected wrap or bounce)"),
        };
    }
    config.validate()?;
    Ok(config)
}

fn read_env(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(default)
}
