//! Cycle dispatcher: the fixed-period control loop driving every engine.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::engine::PowerEngine;

/// Drives all registered engines at a fixed cycle period. Each tick commits
/// the pending constraints of every engine via `apply_power` and then clears
/// the per-cycle constraint lists, so a controller request only ever affects
/// the cycle it was made in.
pub struct CycleDispatcher {
    engines: Vec<Arc<PowerEngine>>,
    period: Duration,
}

impl CycleDispatcher {
    pub fn new(engines: Vec<Arc<PowerEngine>>, period: Duration) -> Self {
        Self { engines, period }
    }

    /// Runs until the token is cancelled. A tick that overruns the period is
    /// not replayed; the loop resumes on the next boundary.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut interval = tokio::time::interval(self.period.max(Duration::from_millis(1)));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(period_ms = self.period.as_millis() as u64, "cycle dispatcher started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("cycle dispatcher stopped");
                    return;
                }
                _ = interval.tick() => {
                    for engine in &self.engines {
                        engine.apply_power();
                        engine.clear_cycle_constraints();
                    }
                    debug!(engines = self.engines.len(), "cycle complete");
                }
            }
        }
    }
}
