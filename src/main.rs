use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use open_power_engine::{
    config::Config, domain::SimulatedUnit, telemetry, CycleDispatcher, ManagedUnit, PowerEngine,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    telemetry::init_tracing();

    let cfg = Config::load()?;

    if cfg.units.is_empty() {
        anyhow::bail!("no units configured; add at least one [[units]] entry");
    }

    let units: Vec<Arc<dyn ManagedUnit>> = cfg
        .units
        .iter()
        .map(|unit| {
            Arc::new(SimulatedUnit::new(unit.id.clone(), unit.kind)) as Arc<dyn ManagedUnit>
        })
        .collect();

    let engine = Arc::new(PowerEngine::new(units, cfg.engine.sections_per_quadrant));

    for unit in &cfg.units {
        if let Some(limit) = unit.max_apparent_power {
            if let Err(error) = engine.set_max_apparent_power(&unit.id, limit) {
                warn!(unit = %unit.id, %error, "skipping configured apparent power limit");
            }
        }
    }

    info!(
        units = cfg.units.len(),
        cycle_ms = cfg.dispatcher.cycle_ms,
        "starting Open Power Engine"
    );

    let shutdown = CancellationToken::new();
    let dispatcher = CycleDispatcher::new(
        vec![engine],
        Duration::from_millis(cfg.dispatcher.cycle_ms),
    );
    let dispatcher_task = tokio::spawn(dispatcher.run(shutdown.clone()));

    telemetry::shutdown_signal().await;
    shutdown.cancel();
    dispatcher_task.await?;

    warn!("shutdown complete");
    Ok(())
}
